use crate::error::JobError;
use crate::job::{JobFields, JobResult};
use crate::outcome_log::OutcomeLogs;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Progress report delivered on every recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
  pub completed: usize,
  pub total: usize,
  /// Estimated jobs per hour across the pool, `0.0` until a success is timed.
  pub rate_per_hour: f64,
}

/// Point-in-time view of the current batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatchSnapshot {
  pub expected: usize,
  pub completed: usize,
  pub succeeded: usize,
  pub failed: usize,
  pub mean_elapsed: Option<Duration>,
  pub rate_per_hour: f64,
  pub terminal: bool,
  pub success_log: Option<PathBuf>,
  pub error_log: Option<PathBuf>,
}

pub type ProgressObserver = Arc<dyn Fn(Progress) + Send + Sync + 'static>;
pub type CompletionObserver = Arc<dyn Fn(BatchSnapshot) + Send + Sync + 'static>;

/// Mutable batch accounting. Only ever touched under the aggregator's lock.
#[derive(Debug, Default)]
struct BatchStats {
  loaded: bool,
  expected: usize,
  completed: usize,
  succeeded: usize,
  failed: usize,
  samples: VecDeque<Duration>,
  terminal: bool,
  logs: Option<OutcomeLogs>,
}

impl BatchStats {
  fn push_sample(&mut self, elapsed: Duration, window: Option<usize>) {
    self.samples.push_back(elapsed);
    if let Some(max) = window {
      while self.samples.len() > max.max(1) {
        self.samples.pop_front();
      }
    }
  }

  fn mean_elapsed(&self) -> Option<Duration> {
    if self.samples.is_empty() {
      return None;
    }
    let total: Duration = self.samples.iter().sum();
    Some(total / self.samples.len() as u32)
  }

  fn snapshot(&self, worker_count: usize) -> BatchSnapshot {
    BatchSnapshot {
      expected: self.expected,
      completed: self.completed,
      succeeded: self.succeeded,
      failed: self.failed,
      mean_elapsed: self.mean_elapsed(),
      rate_per_hour: rate_per_hour(self.mean_elapsed(), worker_count),
      terminal: self.terminal,
      success_log: self.logs.as_ref().map(|l| l.success_path().to_path_buf()),
      error_log: self.logs.as_ref().map(|l| l.error_path().to_path_buf()),
    }
  }
}

/// Throughput estimate: `worker_count` jobs every `mean` elapsed.
pub fn rate_per_hour(mean: Option<Duration>, worker_count: usize) -> f64 {
  match mean {
    Some(m) if !m.is_zero() => worker_count as f64 * 3600.0 / m.as_secs_f64(),
    _ => 0.0,
  }
}

/// Single point of mutation for per-batch outcomes.
///
/// Both handlers may be called concurrently from any number of workers. The
/// count update, the log append and the terminal check happen under one lock, so
/// the completion observer fires exactly once per batch.
pub struct ResultAggregator {
  worker_count: usize,
  sample_window: Option<usize>,
  stats: Mutex<BatchStats>,
  on_progress: Option<ProgressObserver>,
  on_complete: Option<CompletionObserver>,
}

impl ResultAggregator {
  /// `sample_window` bounds the elapsed-time samples kept for the rate
  /// estimate; `None` keeps every sample of the batch.
  pub fn new(worker_count: usize, sample_window: Option<usize>) -> Self {
    Self {
      worker_count,
      sample_window,
      stats: Mutex::new(BatchStats::default()),
      on_progress: None,
      on_complete: None,
    }
  }

  /// Observer invoked on every recorded outcome, while the stats lock is held
  /// (so reports arrive in order). It must not call back into the aggregator.
  pub fn with_progress_observer(mut self, observer: ProgressObserver) -> Self {
    self.on_progress = Some(observer);
    self
  }

  /// Observer invoked once, after the lock is released, when the batch turns terminal.
  pub fn with_completion_observer(mut self, observer: CompletionObserver) -> Self {
    self.on_complete = Some(observer);
    self
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  /// Starts accounting for a new batch of `expected` jobs.
  pub fn reset(&self, expected: usize, logs: Option<OutcomeLogs>) {
    let mut stats = self.stats.lock();
    if stats.loaded && !stats.terminal {
      warn!(
        completed = stats.completed,
        expected = stats.expected,
        "Resetting aggregator while the previous batch was not terminal."
      );
    }
    *stats = BatchStats {
      loaded: true,
      expected,
      logs,
      ..BatchStats::default()
    };
    debug!(expected, "Aggregator reset for new batch.");
  }

  pub fn on_success(&self, fields: &JobFields, result: &JobResult, elapsed: Duration) {
    let window = self.sample_window;
    self.record(fields, "success", |stats| {
      stats.push_sample(elapsed, window);
      stats.succeeded += 1;
      if let Some(logs) = stats.logs.as_mut() {
        logs.record_success(fields, result);
      }
    });
  }

  /// Errors count toward completion; they are never retried.
  pub fn on_error(&self, fields: &JobFields, err: &JobError) {
    self.record(fields, "error", |stats| {
      stats.failed += 1;
      if let Some(logs) = stats.logs.as_mut() {
        logs.record_error(fields, err);
      }
    });
  }

  pub fn snapshot(&self) -> BatchSnapshot {
    self.stats.lock().snapshot(self.worker_count)
  }

  pub fn is_terminal(&self) -> bool {
    let stats = self.stats.lock();
    stats.loaded && stats.terminal
  }

  /// Whether a batch is loaded and still expecting outcomes.
  pub fn is_active(&self) -> bool {
    let stats = self.stats.lock();
    stats.loaded && !stats.terminal
  }

  fn record<F>(&self, fields: &JobFields, kind: &'static str, apply: F)
  where
    F: FnOnce(&mut BatchStats),
  {
    let finished = {
      let mut stats = self.stats.lock();
      if !stats.loaded {
        warn!(subject_id = %fields.subject_id, outcome = kind, "Outcome reported with no batch loaded; ignored.");
        return;
      }
      if stats.terminal {
        warn!(
          subject_id = %fields.subject_id,
          outcome = kind,
          expected = stats.expected,
          "Outcome reported after the batch was terminal; ignored."
        );
        return;
      }

      apply(&mut *stats);
      stats.completed += 1;

      let rate = rate_per_hour(stats.mean_elapsed(), self.worker_count);
      info!(
        completed = stats.completed,
        total = stats.expected,
        rate_per_hour = rate,
        outcome = kind,
        "Job outcome recorded."
      );
      if let Some(observer) = &self.on_progress {
        observer(Progress {
          completed: stats.completed,
          total: stats.expected,
          rate_per_hour: rate,
        });
      }

      if stats.completed >= stats.expected {
        stats.terminal = true;
        Some(stats.snapshot(self.worker_count))
      } else {
        None
      }
    };

    if let Some(snapshot) = finished {
      info!(
        succeeded = snapshot.succeeded,
        failed = snapshot.failed,
        "All jobs of the batch are finished."
      );
      if let Some(observer) = &self.on_complete {
        observer(snapshot);
      }
    }
  }
}

impl std::fmt::Debug for ResultAggregator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResultAggregator")
      .field("worker_count", &self.worker_count)
      .field("sample_window", &self.sample_window)
      .field("stats", &self.stats)
      .finish_non_exhaustive()
  }
}
