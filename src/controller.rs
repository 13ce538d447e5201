use crate::aggregator::{BatchSnapshot, CompletionObserver, ResultAggregator};
use crate::error::{BatchError, JobError};
use crate::gate::ScheduleGate;
use crate::job::{FailureHandler, Job, JobFields, JobRequest, JobResult, SuccessHandler};
use crate::outcome_log::OutcomeLogs;
use crate::queue::TaskQueue;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Timestamp format of batch identifiers, e.g. `241017_213005`.
pub const BATCH_ID_FORMAT: &str = "%y%m%d_%H%M%S";

/// Lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
  /// No batch, or the last one is terminal. A new batch may be loaded.
  Idle,
  /// A batch is queued but the gate has not been started.
  Loaded,
  /// The gate is running; workers drain the queue inside permitted windows.
  Running,
  /// The gate is stopped by the operator; queued and in-flight jobs are kept.
  Paused,
}

/// Identity of the batch currently loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInfo {
  pub batch_id: String,
  pub output_dir: PathBuf,
  pub size: usize,
}

/// Orchestrates one load-to-completion run.
///
/// Owns the aggregator. When the aggregator reports the batch terminal the
/// controller stops the gate and goes idle.
#[derive(Debug)]
pub struct BatchController {
  queue: Arc<TaskQueue>,
  gate: Arc<ScheduleGate>,
  aggregator: Arc<ResultAggregator>,
  state: Mutex<BatchState>,
  current: Mutex<Option<BatchInfo>>,
}

impl BatchController {
  /// Wires the controller to its queue, gate and aggregator.
  ///
  /// `on_complete` is called after the controller has handled completion.
  pub fn new(
    queue: Arc<TaskQueue>,
    gate: Arc<ScheduleGate>,
    aggregator: ResultAggregator,
    on_complete: Option<CompletionObserver>,
  ) -> Arc<Self> {
    Arc::new_cyclic(|weak: &Weak<Self>| {
      let weak = weak.clone();
      let hook: CompletionObserver = Arc::new(move |snapshot: BatchSnapshot| {
        if let Some(controller) = weak.upgrade() {
          controller.on_batch_complete();
        }
        if let Some(observer) = &on_complete {
          observer(snapshot);
        }
      });

      Self {
        queue,
        gate,
        aggregator: Arc::new(aggregator.with_completion_observer(hook)),
        state: Mutex::new(BatchState::Idle),
        current: Mutex::new(None),
      }
    })
  }

  /// Loads a batch: resets the aggregator, creates the outcome logs under
  /// `output_dir` and replaces the queue contents with `requests`, in order.
  ///
  /// # Errors
  ///
  /// - [`BatchError::EmptyBatch`] for an empty request list.
  /// - [`BatchError::InProgress`] while the previous batch is not terminal, or
  ///   is terminal but not yet wound down.
  /// - [`BatchError::LogCreation`] when the directory or log files cannot be created.
  pub fn load(&self, requests: Vec<JobRequest>, output_dir: impl AsRef<Path>) -> Result<BatchInfo, BatchError> {
    if requests.is_empty() {
      return Err(BatchError::EmptyBatch);
    }
    // Held until the batch is queued, so a late completion hook or a second
    // load sees either the old batch or the new one.
    let mut state = self.state.lock();
    // The controller only goes idle once the completion hook has run, so a
    // terminal aggregator alone is not enough.
    if self.aggregator.is_active() || *state != BatchState::Idle {
      let snapshot = self.aggregator.snapshot();
      return Err(BatchError::InProgress {
        completed: snapshot.completed,
        expected: snapshot.expected,
      });
    }

    let output_dir = output_dir.as_ref().to_path_buf();
    let batch_id = Local::now().format(BATCH_ID_FORMAT).to_string();
    let logs = OutcomeLogs::create(&output_dir, &batch_id)?;
    let size = requests.len();

    self.aggregator.reset(size, Some(logs));

    let (on_success, on_failure) = self.handlers();
    let jobs = requests.into_iter().map(|request| {
      Job::new(
        request.into_fields(output_dir.clone()),
        on_success.clone(),
        on_failure.clone(),
      )
    });
    self.queue.clear_and_reload(jobs);

    let info = BatchInfo {
      batch_id,
      output_dir,
      size,
    };
    info!(batch_id = %info.batch_id, size, output_dir = %info.output_dir.display(), "Batch loaded.");
    *self.current.lock() = Some(info.clone());
    *state = BatchState::Loaded;
    Ok(info)
  }

  /// Starts (or resumes) the gate for the loaded batch.
  ///
  /// # Errors
  ///
  /// - [`BatchError::NothingLoaded`] when no unfinished batch is loaded.
  pub fn begin(&self) -> Result<(), BatchError> {
    let mut state = self.state.lock();
    match *state {
      BatchState::Idle => Err(BatchError::NothingLoaded),
      BatchState::Running => {
        debug!("Batch already running.");
        Ok(())
      }
      BatchState::Loaded | BatchState::Paused => {
        self.gate.start();
        *state = BatchState::Running;
        info!("Batch started.");
        Ok(())
      }
    }
  }

  /// Stops the gate. Queued jobs stay queued; in-flight jobs run to completion
  /// and are counted.
  pub fn pause(&self) {
    let mut state = self.state.lock();
    self.gate.stop();
    if *state == BatchState::Running {
      *state = BatchState::Paused;
      info!("Batch paused.");
    }
  }

  /// Called once when the aggregator reports the batch terminal.
  ///
  /// Stops the gate under the state lock, so a concurrent `begin()` either runs
  /// before and is undone here, or runs after and finds the controller idle.
  pub fn on_batch_complete(&self) {
    let mut state = self.state.lock();
    if !self.aggregator.is_terminal() {
      debug!("Completion reported for a batch that is no longer current; ignored.");
      return;
    }
    self.gate.stop();
    *state = BatchState::Idle;
    info!("Batch complete; controller idle.");
  }

  /// `load` followed by `begin`.
  pub fn submit_batch(
    &self,
    requests: Vec<JobRequest>,
    output_dir: impl AsRef<Path>,
  ) -> Result<BatchInfo, BatchError> {
    let info = self.load(requests, output_dir)?;
    self.begin()?;
    Ok(info)
  }

  pub fn state(&self) -> BatchState {
    *self.state.lock()
  }

  pub fn current_batch(&self) -> Option<BatchInfo> {
    self.current.lock().clone()
  }

  pub fn aggregator(&self) -> &Arc<ResultAggregator> {
    &self.aggregator
  }

  pub fn queue(&self) -> &Arc<TaskQueue> {
    &self.queue
  }

  pub fn gate(&self) -> &Arc<ScheduleGate> {
    &self.gate
  }

  fn handlers(&self) -> (SuccessHandler, FailureHandler) {
    let agg = self.aggregator.clone();
    let on_success: SuccessHandler = Arc::new(move |fields: &JobFields, result: &JobResult, elapsed: Duration| {
      agg.on_success(fields, result, elapsed)
    });
    let agg = self.aggregator.clone();
    let on_failure: FailureHandler = Arc::new(move |fields: &JobFields, err: &JobError| agg.on_error(fields, err));
    (on_success, on_failure)
  }
}
