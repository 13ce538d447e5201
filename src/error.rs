use crate::job::ResourceSlot;

use std::path::PathBuf;

use thiserror::Error;

/// A time-of-day string could not be parsed.
///
/// Raised while reading the permitted windows; fatal to startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
  #[error("Time `{0}` must be exactly four digits in HHMM form")]
  NotFourDigits(String),
  #[error("Hour {0} is out of range (expected 0..=23)")]
  HourOutOfRange(u32),
  #[error("Minute {0} is out of range (expected 0..=59)")]
  MinuteOutOfRange(u32),
}

/// Errors that can occur while building the scheduler using `SchedulerBuilder`
/// or spawning a `WorkerPool` directly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  #[error("Worker count (`worker_count`) must be specified and greater than zero")]
  ZeroWorkers,
  #[error("{slots} resource slot(s) configured for {workers} worker(s); every worker needs its own slot")]
  InsufficientSlots { slots: usize, workers: usize },
  #[error("Resource slot {0} shares its identity or port with another worker's slot")]
  DuplicateSlot(ResourceSlot),
  #[error("Invalid permitted window: {0}")]
  InvalidWindow(#[from] FormatError),
  #[error("Scheduler must be built from within a Tokio runtime")]
  NoRuntime,
  #[cfg(feature = "toml_config")]
  #[error("Failed to parse configuration: {0}")]
  Config(String),
}

/// Errors raised by `BatchController` operations.
#[derive(Error, Debug)]
pub enum BatchError {
  #[error("Cannot load an empty batch")]
  EmptyBatch,
  #[error("A batch is still in progress ({completed}/{expected} complete)")]
  InProgress { completed: usize, expected: usize },
  #[error("No batch has been loaded")]
  NothingLoaded,
  #[error("Failed to create outcome logs under {path}: {source}")]
  LogCreation {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Failure of a single job body execution.
///
/// Recovered at the worker boundary and routed to the job's failure handler;
/// never retried and never propagated to the control task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
  /// The job body reported a failure.
  #[error("{0}")]
  Failed(String),
  /// The job body panicked. The payload message is kept when it is a string.
  #[error("job body panicked: {0}")]
  Panicked(String),
  /// The job task was cancelled before it produced a result.
  #[error("job body was cancelled")]
  Cancelled,
}

impl JobError {
  /// Convenience constructor for job bodies.
  pub fn failed(msg: impl std::fmt::Display) -> Self {
    JobError::Failed(msg.to_string())
  }
}

/// Errors related to the pool shutdown process (`shutdown_graceful`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
  #[error("Timed out waiting for worker and gate tasks to complete shutdown.")]
  Timeout,
  #[error("A worker task panicked during the shutdown process.")]
  TaskPanic,
  #[error("Shutdown already in progress or completed.")]
  AlreadyShuttingDown,
}
