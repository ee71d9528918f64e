//! lcrlog inspection tool
//!
//! Reads segment files and progress markers offline.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lcrlog::checkpoint::{find_resume_anchor, ProgressMarker, SegmentSet};
use lcrlog::segment::{SegmentReader, SegmentState};
use lcrlog::{LcrError, Position, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// lcrlog
#[derive(Parser, Debug)]
#[command(name = "lcrlog")]
#[command(about = "Inspect logical change record segments and progress markers")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the state and checkpoint of a segment
    Header {
        /// Segment file
        file: PathBuf,
    },

    /// Print every record of a finalized segment with its chunks
    Dump {
        /// Segment file
        file: PathBuf,

        /// One JSON object per record
        #[arg(long)]
        json: bool,
    },

    /// List the segments of a log directory
    List {
        #[command(flatten)]
        log: LogArgs,
    },

    /// Show or overwrite a progress marker
    Progress {
        #[command(subcommand)]
        action: ProgressAction,
    },

    /// Find where an apply loop would resume
    Rescan {
        #[command(flatten)]
        log: LogArgs,

        /// Sequence to scan back from (the apply progress)
        #[arg(long)]
        from: u64,

        /// Downstream low watermark, hex
        #[arg(long)]
        lwm: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct LogArgs {
    /// Log directory
    #[arg(short, long, default_value = "./lcrlog_data")]
    dir: PathBuf,

    /// Segment file prefix
    #[arg(short, long, default_value = "lcr_archive")]
    prefix: String,

    /// Segment file extension
    #[arg(short, long, default_value = "lcr")]
    ext: String,
}

impl LogArgs {
    fn segments(&self) -> SegmentSet {
        SegmentSet::new(&self.dir, &self.prefix, &self.ext)
    }
}

#[derive(Subcommand, Debug)]
enum ProgressAction {
    /// Print the stored sequence
    Show { file: PathBuf },

    /// Store a sequence
    Set { file: PathBuf, sequence: u64 },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = execute(args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Header { file } => {
            println!("{}: {}", file.display(), describe_state(&SegmentState::probe(&file)?));
        }

        Commands::Dump { file, json } => {
            let reader = SegmentReader::open(&file)?;
            if !json {
                println!("checkpoint {}", reader.checkpoint());
            }
            for entry in reader.entries() {
                let entry = entry?;
                if json {
                    let line = serde_json::to_string(&entry)
                        .map_err(|e| LcrError::Protocol(format!("cannot render record: {}", e)))?;
                    println!("{}", line);
                } else {
                    println!("{}", entry.record.describe());
                    for chunk in &entry.chunks {
                        println!(
                            "  chunk {} {:?}{}",
                            chunk.name(),
                            chunk.chunk.kind,
                            if chunk.is_end_of_row() { " end of row" } else { "" }
                        );
                    }
                }
            }
        }

        Commands::List { log } => {
            let segments = log.segments();
            for sequence in segments.sequences()? {
                println!("{:>8}  {}", sequence, describe_state(&segments.state(sequence)?));
            }
        }

        Commands::Progress { action } => match action {
            ProgressAction::Show { file } => {
                println!("{}", ProgressMarker::new(file).load()?);
            }
            ProgressAction::Set { file, sequence } => {
                ProgressMarker::new(file).store(sequence)?;
            }
        },

        Commands::Rescan { log, from, lwm } => {
            let lwm = lwm
                .map(|text| {
                    Position::from_hex(&text).ok_or_else(|| {
                        LcrError::Config(format!("low watermark is not hex: {}", text))
                    })
                })
                .transpose()?;

            let segments = log.segments();
            let anchor = find_resume_anchor(&segments, from, lwm.as_ref(), Duration::ZERO, || {
                Err(LcrError::Config(
                    "rescan needs every scanned segment to be finalized".to_string(),
                ))
            })?;
            println!("anchor {}", anchor);
            println!("resume {}", anchor + 1);
        }
    }
    Ok(())
}

fn describe_state(state: &SegmentState) -> String {
    match state {
        SegmentState::Missing => "missing".to_string(),
        SegmentState::InProgress => "in progress".to_string(),
        SegmentState::Complete(checkpoint) => format!("complete, checkpoint {}", checkpoint),
    }
}
