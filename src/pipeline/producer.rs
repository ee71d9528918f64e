//! Capture loop
//!
//! Receives change records from the upstream and writes them into segments,
//! finalizing a segment every `batches_per_segment` non-empty batches.

use tracing::{debug, error, info, trace, warn};

use super::{attach_with_retry, Interrupt, LoopState, PipelineContext, RunLimit, RunReport};
use crate::config::Config;
use crate::error::Result;
use crate::record::Position;
use crate::segment::SegmentWriter;
use crate::stream::{Received, Upstream, UpstreamSession};

/// How filling one segment ended
enum SegmentExit {
    /// Enough batches; finalize with this checkpoint
    Rotate(Position),
    /// The upstream shut down
    EndOfStream,
}

/// Upstream → segments
pub struct Producer<U: Upstream> {
    context: PipelineContext,
    upstream: U,
    state: LoopState,
    report: RunReport,
}

impl<U: Upstream> Producer<U> {
    /// Create a producer writing into `config.log_dir`
    pub fn new(config: Config, upstream: U) -> Result<Self> {
        Ok(Self::with_context(PipelineContext::for_capture(config)?, upstream))
    }

    pub fn with_context(context: PipelineContext, upstream: U) -> Self {
        Self {
            context,
            upstream,
            state: LoopState::Idle,
            report: RunReport::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Capture until `limit` is reached, the upstream ends, or a fatal error
    pub fn run(&mut self, limit: RunLimit) -> Result<RunReport> {
        match self.run_inner(limit) {
            Ok(()) => {
                self.state = LoopState::Detached;
                info!(
                    segments = self.report.segments,
                    records = self.report.records,
                    "capture loop stopped"
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                self.state = LoopState::Failed;
                error!(error = %e, "capture loop failed");
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, limit: RunLimit) -> Result<()> {
        let endpoint = self.context.config.upstream_endpoint.clone();
        let max_attempts = self.context.config.max_attach_retries;

        loop {
            if limit.reached(self.report.segments) {
                return Ok(());
            }

            // segment S is the newest finalized one; its checkpoint is where
            // the upstream resumes
            let finalized = self.adopt_finalized()?;
            let resume_from = if finalized >= 1 {
                Some(self.context.segments.checkpoint(finalized)?)
            } else {
                None
            };

            self.state = LoopState::Attaching;
            info!(
                endpoint = %endpoint,
                finalized,
                resume_from = ?resume_from,
                "attaching to upstream"
            );
            let upstream = &mut self.upstream;
            let mut session = attach_with_retry(&endpoint, max_attempts, || {
                upstream.attach(&endpoint, resume_from.as_ref())
            })?;
            self.state = LoopState::Streaming;

            let outcome = self.capture(&mut session, finalized + 1, limit);
            let detached = session.detach();

            match outcome {
                Ok(()) => {
                    match detached {
                        Ok(position) => info!(
                            endpoint = %endpoint,
                            position = ?position,
                            "detached from upstream"
                        ),
                        Err(e) => warn!(endpoint = %endpoint, error = %e, "detach failed"),
                    }
                    return Ok(());
                }
                Err(Interrupt::Reattach(e)) => {
                    warn!(
                        endpoint = %endpoint,
                        error = %e,
                        "upstream connection lost, attaching again"
                    );
                    if let Err(e) = detached {
                        debug!(error = %e, "detach after connection loss failed");
                    }
                }
                Err(Interrupt::Fatal(e)) => {
                    if let Err(detach_error) = detached {
                        warn!(error = %detach_error, "detach failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Capture progress, moved past segments finalized before a crash
    /// kept their progress from being stored
    ///
    /// A finalized segment is never rewritten.
    fn adopt_finalized(&self) -> Result<u64> {
        let mut finalized = self.context.progress.load()?;
        while self.context.segments.state(finalized + 1)?.is_complete() {
            finalized += 1;
            warn!(sequence = finalized, "adopting finalized segment missing from capture progress");
            self.context.progress.store(finalized)?;
        }
        Ok(finalized)
    }

    /// Write segments starting at `sequence` until the limit or end of stream
    fn capture(
        &mut self,
        session: &mut U::Session,
        mut sequence: u64,
        limit: RunLimit,
    ) -> std::result::Result<(), Interrupt> {
        loop {
            let path = self.context.segments.path(sequence);
            let mut writer = SegmentWriter::create(&path, self.context.config.sync_strategy)?;
            info!(sequence, path = %path.display(), "started writing segment");

            let batches = self.context.config.batches_per_segment;
            let exit = match fill_segment(session, &mut writer, batches) {
                Ok(exit) => exit,
                Err(e) => {
                    if let Err(abandon_error) = writer.abandon() {
                        warn!(sequence, error = %abandon_error, "cannot abandon segment");
                    }
                    return Err(e);
                }
            };

            match exit {
                SegmentExit::EndOfStream => {
                    let summary = writer.abandon()?;
                    info!(
                        sequence,
                        records = summary.records,
                        "upstream ended, segment left unfinalized"
                    );
                    return Ok(());
                }
                SegmentExit::Rotate(checkpoint) => {
                    self.state = LoopState::Rotating;
                    let summary = writer.finish(&checkpoint)?;
                    self.context.progress.store(sequence)?;
                    info!(
                        sequence,
                        checkpoint = %checkpoint,
                        records = summary.records,
                        chunks = summary.chunks,
                        "finalized segment"
                    );

                    self.report.segments += 1;
                    self.report.records += summary.records;
                    self.report.chunks += summary.chunks;
                    self.report.last_sequence = Some(sequence);
                    self.report.last_checkpoint = Some(checkpoint.clone());
                    sequence += 1;

                    session.report_processed_low_watermark(&checkpoint)?;
                    self.state = LoopState::Streaming;

                    if limit.reached(self.report.segments) {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Append received records until enough batches have been written
fn fill_segment<S: UpstreamSession>(
    session: &mut S,
    writer: &mut SegmentWriter,
    batches_per_segment: u32,
) -> std::result::Result<SegmentExit, Interrupt> {
    let mut batches = 0;
    let mut batch_records = 0u64;

    loop {
        match session.receive_next()? {
            Received::Record(record) => {
                writer.append_record(&record)?;
                if record.has_chunk_data() {
                    loop {
                        let chunk = session.receive_chunk()?;
                        writer.append_chunk(&chunk)?;
                        if chunk.is_end_of_row() {
                            break;
                        }
                    }
                }
                batch_records += 1;
            }
            Received::BatchEnded if batch_records == 0 => {
                trace!("idle batch");
            }
            Received::BatchEnded => {
                batches += 1;
                debug!(batches, records = batch_records, "batch ended");
                batch_records = 0;

                if batches >= batches_per_segment {
                    match writer.last_position() {
                        Some(position) => return Ok(SegmentExit::Rotate(position.clone())),
                        None => warn!(
                            path = %writer.path().display(),
                            "no record carried a position, keeping segment open"
                        ),
                    }
                }
            }
            Received::EndOfStream => return Ok(SegmentExit::EndOfStream),
        }
    }
}
