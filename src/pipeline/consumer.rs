//! Apply loop
//!
//! Replays finalized segments to the downstream, one segment at a time,
//! recording progress only after the downstream has been flushed.

use tracing::{debug, error, info, warn};

use super::{attach_with_retry, Interrupt, LoopState, PipelineContext, RunLimit, RunReport};
use crate::checkpoint::find_resume_anchor;
use crate::config::Config;
use crate::error::Result;
use crate::segment::SegmentReader;
use crate::stream::{Downstream, DownstreamSession};

/// Segments → downstream
pub struct Consumer<D: Downstream> {
    context: PipelineContext,
    downstream: D,
    state: LoopState,
    report: RunReport,
}

impl<D: Downstream> Consumer<D> {
    /// Create a consumer reading from `config.log_dir`
    pub fn new(config: Config, downstream: D) -> Result<Self> {
        Ok(Self::with_context(PipelineContext::for_apply(config)?, downstream))
    }

    pub fn with_context(context: PipelineContext, downstream: D) -> Self {
        Self {
            context,
            downstream,
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

    /// Apply segments until `limit` is reached or a fatal error
    ///
    /// With `RunLimit::Forever` this only returns on error: a missing
    /// segment is waited for indefinitely.
    pub fn run(&mut self, limit: RunLimit) -> Result<RunReport> {
        match self.run_inner(limit) {
            Ok(()) => {
                self.state = LoopState::Detached;
                info!(
                    segments = self.report.segments,
                    records = self.report.records,
                    "apply loop stopped"
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                self.state = LoopState::Failed;
                error!(error = %e, "apply loop failed");
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, limit: RunLimit) -> Result<()> {
        let endpoint = self.context.config.downstream_endpoint.clone();
        let max_attempts = self.context.config.max_attach_retries;

        loop {
            if limit.reached(self.report.segments) {
                return Ok(());
            }

            self.state = LoopState::Attaching;
            info!(endpoint = %endpoint, "attaching to downstream");
            let downstream = &mut self.downstream;
            let mut session =
                attach_with_retry(&endpoint, max_attempts, || downstream.attach(&endpoint))?;
            self.state = LoopState::Streaming;

            let outcome = self.apply(&mut session, limit);
            let detached = session.detach();

            match outcome {
                Ok(()) => {
                    match detached {
                        Ok(position) => info!(
                            endpoint = %endpoint,
                            position = ?position,
                            "detached from downstream"
                        ),
                        Err(e) => warn!(endpoint = %endpoint, error = %e, "detach failed"),
                    }
                    return Ok(());
                }
                Err(Interrupt::Reattach(e)) => {
                    warn!(
                        endpoint = %endpoint,
                        error = %e,
                        "downstream connection lost, attaching again"
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

    fn apply(
        &mut self,
        session: &mut D::Session,
        limit: RunLimit,
    ) -> std::result::Result<(), Interrupt> {
        let applied = self.context.progress.load()?;
        let lwm = session.processed_low_watermark()?;
        let poll = self.context.config.segment_poll_interval;

        // a failed probe while waiting ends the loop instead of reattaching
        let anchor = find_resume_anchor(&self.context.segments, applied, lwm.as_ref(), poll, || {
            session.flush()
        })
        .map_err(Interrupt::Fatal)?;
        let mut sequence = anchor + 1;
        info!(applied, anchor, resume_at = sequence, "resuming apply");

        loop {
            let reader = self
                .context
                .segments
                .wait_for_complete(sequence, poll, || session.flush())
                .map_err(Interrupt::Fatal)?;
            let checkpoint = reader.checkpoint().clone();
            info!(sequence, checkpoint = %checkpoint, "started reading segment");

            let (records, chunks) = forward(reader, session)?;
            session.flush()?;

            self.state = LoopState::Rotating;
            self.context.progress.store(sequence)?;
            info!(sequence, records, chunks, "applied segment");

            self.report.segments += 1;
            self.report.records += records;
            self.report.chunks += chunks;
            self.report.last_sequence = Some(sequence);
            self.report.last_checkpoint = Some(checkpoint);
            sequence += 1;
            self.state = LoopState::Streaming;

            if limit.reached(self.report.segments) {
                return Ok(());
            }
        }
    }
}

/// Send every record of a segment, each followed by its chunk run
fn forward<S: DownstreamSession>(
    mut reader: SegmentReader,
    session: &mut S,
) -> std::result::Result<(u64, u64), Interrupt> {
    while let Some(record) = reader.read_record()? {
        session.send_record(&record)?;
        if record.has_chunk_data() {
            loop {
                let chunk = reader.read_chunk()?;
                session.send_chunk(&chunk)?;
                if chunk.is_end_of_row() {
                    break;
                }
            }
        }
    }
    Ok((reader.records_read(), reader.chunks_read()))
}
