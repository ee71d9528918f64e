//! Configuration for lcrlog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LcrError, Result};

/// Main configuration shared by the capture and apply loops
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Segment Configuration
    // -------------------------------------------------------------------------
    /// Directory holding segments and progress files
    /// Internal structure:
    ///   {log_dir}/
    ///     ├── {prefix}_1.{ext}       (first segment)
    ///     ├── {prefix}_2.{ext}
    ///     ├── capture_progress       (last finalized segment)
    ///     └── apply_progress         (last applied segment)
    pub log_dir: PathBuf,

    /// File name prefix of every segment
    pub prefix: String,

    /// File extension of every segment (without the dot)
    pub extension: String,

    /// Durability of individual appends (finalize always fsyncs)
    pub sync_strategy: SyncStrategy,

    /// Number of non-empty upstream batches collected into one segment
    pub batches_per_segment: u32,

    // -------------------------------------------------------------------------
    // Progress Configuration
    // -------------------------------------------------------------------------
    /// Progress marker of the capture loop, relative to `log_dir`
    pub capture_progress_file: String,

    /// Progress marker of the apply loop, relative to `log_dir`
    pub apply_progress_file: String,

    // -------------------------------------------------------------------------
    // Endpoint Configuration
    // -------------------------------------------------------------------------
    /// Name of the outbound endpoint the capture loop attaches to
    pub upstream_endpoint: String,

    /// Name of the inbound endpoint the apply loop attaches to
    pub downstream_endpoint: String,

    /// Consecutive failed attaches tolerated before giving up
    pub max_attach_retries: u32,

    /// Wait between probes for a segment that is missing or in progress
    pub segment_poll_interval: Duration,
}

/// How hard each append pushes data towards the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Flush the userspace buffer after every record (default)
    Flush,

    /// Flush and fsync after every record (safest, slowest)
    Always,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./lcrlog_data"),
            prefix: "lcr_archive".to_string(),
            extension: "lcr".to_string(),
            sync_strategy: SyncStrategy::Flush,
            batches_per_segment: 1,
            capture_progress_file: "capture_progress".to_string(),
            apply_progress_file: "apply_progress".to_string(),
            upstream_endpoint: "OUTBOUND".to_string(),
            downstream_endpoint: "INBOUND".to_string(),
            max_attach_retries: 3,
            segment_poll_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Full path of the capture progress marker
    pub fn capture_progress_path(&self) -> PathBuf {
        self.log_dir.join(&self.capture_progress_file)
    }

    /// Full path of the apply progress marker
    pub fn apply_progress_path(&self) -> PathBuf {
        self.log_dir.join(&self.apply_progress_file)
    }

    /// Reject settings the loops cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(LcrError::Config("segment prefix must not be empty".to_string()));
        }
        if self.extension.is_empty() || self.extension.contains('.') {
            return Err(LcrError::Config(format!(
                "invalid segment extension: {:?}",
                self.extension
            )));
        }
        if self.batches_per_segment == 0 {
            return Err(LcrError::Config(
                "batches_per_segment must be at least 1".to_string(),
            ));
        }
        if self.max_attach_retries == 0 {
            return Err(LcrError::Config(
                "max_attach_retries must be at least 1".to_string(),
            ));
        }
        if self.capture_progress_file == self.apply_progress_file {
            return Err(LcrError::Config(
                "capture and apply progress files must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the directory holding segments and progress files
    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_dir = path.into();
        self
    }

    /// Set the segment file prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Set the segment file extension
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.extension = ext.into();
        self
    }

    /// Set the append sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set how many non-empty batches go into one segment
    pub fn batches_per_segment(mut self, count: u32) -> Self {
        self.config.batches_per_segment = count;
        self
    }

    /// Set the capture progress file name
    pub fn capture_progress_file(mut self, name: impl Into<String>) -> Self {
        self.config.capture_progress_file = name.into();
        self
    }

    /// Set the apply progress file name
    pub fn apply_progress_file(mut self, name: impl Into<String>) -> Self {
        self.config.apply_progress_file = name.into();
        self
    }

    /// Set the outbound endpoint name
    pub fn upstream_endpoint(mut self, name: impl Into<String>) -> Self {
        self.config.upstream_endpoint = name.into();
        self
    }

    /// Set the inbound endpoint name
    pub fn downstream_endpoint(mut self, name: impl Into<String>) -> Self {
        self.config.downstream_endpoint = name.into();
        self
    }

    /// Set the attach retry budget
    pub fn max_attach_retries(mut self, count: u32) -> Self {
        self.config.max_attach_retries = count;
        self
    }

    /// Set the segment poll interval
    pub fn segment_poll_interval(mut self, interval: Duration) -> Self {
        self.config.segment_poll_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
