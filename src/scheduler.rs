use crate::aggregator::{BatchSnapshot, CompletionObserver, Progress, ProgressObserver, ResultAggregator};
use crate::clock::{Clock, Interval, SystemClock};
use crate::config::SchedulerConfig;
use crate::controller::{BatchController, BatchInfo, BatchState};
use crate::error::{BatchError, BuildError, JobError, ShutdownError};
use crate::gate::{GateState, ScheduleGate, DEFAULT_GATE_TICK};
use crate::job::{BoxedBlockingJobBody, BoxedJobBody, JobBody, JobFields, JobFuture, JobRequest, JobResult, ResourceSlot};
use crate::metrics::{PoolMetrics, PoolMetricsSnapshot};
use crate::pool::{PoolParts, WorkerPool};
use crate::queue::TaskQueue;
use crate::throttle::StartupThrottle;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};

/// Builder for configuring and creating a [`RetrievalScheduler`].
///
/// # Example
///
/// ```no_run
/// use nightgate::{JobError, JobFuture, JobResult, RetrievalScheduler, ResourceSlot};
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let scheduler = RetrievalScheduler::builder()
///     .worker_count(2)
///     .resource_slots(vec![ResourceSlot::new("AUTOQR1", 11112), ResourceSlot::new("AUTOQR2", 11113)])
///     .interval("1800", "0700")
///     .startup_delay(Duration::from_secs(10))
///     .build(|_fields, _slot| -> JobFuture {
///         Box::pin(async move {
///             // retrieve `_fields` through `_slot`...
///             Ok::<_, JobError>(JobResult::default())
///         })
///     })?;
/// # Ok(())
/// # }
/// ```
pub struct SchedulerBuilder {
  worker_count: Option<usize>,
  resource_slots: Vec<ResourceSlot>,
  periods: Vec<(String, String)>,
  startup_delay: Duration,
  output_root: Option<PathBuf>,
  gate_tick: Duration,
  sample_window: Option<usize>,
  clock: Arc<dyn Clock>,
  on_progress: Option<ProgressObserver>,
  on_complete: Option<CompletionObserver>,
}

impl Default for SchedulerBuilder {
  fn default() -> Self {
    Self {
      worker_count: None,
      resource_slots: Vec::new(),
      periods: Vec::new(),
      startup_delay: Duration::ZERO,
      output_root: None,
      gate_tick: DEFAULT_GATE_TICK,
      sample_window: None,
      clock: Arc::new(SystemClock),
      on_progress: None,
      on_complete: None,
    }
  }
}

impl fmt::Debug for SchedulerBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SchedulerBuilder")
      .field("worker_count", &self.worker_count)
      .field("resource_slots", &self.resource_slots)
      .field("periods", &self.periods)
      .field("startup_delay", &self.startup_delay)
      .field("output_root", &self.output_root)
      .field("gate_tick", &self.gate_tick)
      .field("sample_window", &self.sample_window)
      .field("clock", &self.clock)
      .finish_non_exhaustive()
  }
}

impl SchedulerBuilder {
  /// Creates a new builder with default settings.
  /// - `worker_count`: Not set (required).
  /// - No slots, no windows (always permitted), no startup stagger.
  pub fn new() -> Self {
    Self::default()
  }

  /// Starts from deployment settings.
  pub fn from_config(config: &SchedulerConfig) -> Self {
    let mut builder = Self::new()
      .worker_count(config.worker_count)
      .resource_slots(config.resource_slots.clone())
      .startup_delay(config.startup_delay())
      .gate_tick(config.gate_tick());
    for [start, end] in &config.periods {
      builder = builder.interval(start.clone(), end.clone());
    }
    builder.output_root = config.output_root.clone();
    builder.sample_window = config.sample_window;
    builder
  }

  /// Sets the number of workers (required, must be greater than 0).
  pub fn worker_count(mut self, count: usize) -> Self {
    self.worker_count = Some(count);
    self
  }

  /// Sets the resource slots; worker `i` is bound to slot `i`.
  pub fn resource_slots(mut self, slots: Vec<ResourceSlot>) -> Self {
    self.resource_slots = slots;
    self
  }

  /// Adds a permitted daily window given as two `HHMM` strings.
  /// Validated by `build`.
  pub fn interval(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
    self.periods.push((start.into(), end.into()));
    self
  }

  /// Pause between releasing consecutive workers when the gate opens.
  pub fn startup_delay(mut self, delay: Duration) -> Self {
    self.startup_delay = delay;
    self
  }

  /// Root under which dated output directories are created.
  pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
    self.output_root = Some(root.into());
    self
  }

  /// Upper bound on the gate's sleep between re-evaluations.
  pub fn gate_tick(mut self, tick: Duration) -> Self {
    self.gate_tick = tick;
    self
  }

  /// Keeps only the last `n` elapsed-time samples for the rate estimate.
  pub fn sample_window(mut self, n: usize) -> Self {
    self.sample_window = Some(n);
    self
  }

  /// Replaces the wall clock the gate reads.
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Called with `(completed, total, rate_per_hour)` after every outcome.
  pub fn on_progress<F>(mut self, observer: F) -> Self
  where
    F: Fn(Progress) + Send + Sync + 'static,
  {
    self.on_progress = Some(Arc::new(observer));
    self
  }

  /// Called once per batch when every job has reported an outcome.
  pub fn on_complete<F>(mut self, observer: F) -> Self
  where
    F: Fn(BatchSnapshot) + Send + Sync + 'static,
  {
    self.on_complete = Some(Arc::new(observer));
    self
  }

  /// Builds and starts the scheduler with the given job body.
  ///
  /// Spawns the worker pool; the gate stays blocked until a batch is submitted.
  /// Must be called from within a Tokio runtime.
  ///
  /// # Errors
  ///
  /// - [`BuildError::ZeroWorkers`]: `worker_count` was not set or is zero.
  /// - [`BuildError::InsufficientSlots`]: fewer slots than workers.
  /// - [`BuildError::InvalidWindow`]: a window time is not valid `HHMM`.
  /// - [`BuildError::NoRuntime`]: called outside a Tokio runtime.
  pub fn build<F>(self, job_body: F) -> Result<RetrievalScheduler, BuildError>
  where
    F: Fn(JobFields, ResourceSlot) -> JobFuture + Send + Sync + 'static,
  {
    self.build_with(Arc::new(job_body))
  }

  /// Like [`build`](Self::build) for an already boxed job body.
  pub fn build_with(self, job_body: BoxedJobBody) -> Result<RetrievalScheduler, BuildError> {
    self.build_body(JobBody::Async(job_body))
  }

  /// Builds and starts the scheduler with a blocking job body.
  ///
  /// Use this when a retrieval blocks its thread, e.g. by waiting on an external
  /// process. Every call runs on Tokio's blocking thread pool, so the gate,
  /// `pause_batch` and outcome accounting keep running while jobs are in flight.
  /// Panics are isolated exactly as for async bodies.
  ///
  /// # Errors
  ///
  /// Same as [`build`](Self::build).
  pub fn build_blocking<F>(self, job_body: F) -> Result<RetrievalScheduler, BuildError>
  where
    F: Fn(JobFields, ResourceSlot) -> Result<JobResult, JobError> + Send + Sync + 'static,
  {
    self.build_blocking_with(Arc::new(job_body))
  }

  /// Like [`build_blocking`](Self::build_blocking) for an already boxed job body.
  pub fn build_blocking_with(self, job_body: BoxedBlockingJobBody) -> Result<RetrievalScheduler, BuildError> {
    self.build_body(JobBody::Blocking(job_body))
  }

  fn build_body(self, job_body: JobBody) -> Result<RetrievalScheduler, BuildError> {
    let worker_count = self.worker_count.filter(|n| *n > 0).ok_or(BuildError::ZeroWorkers)?;
    let intervals = self
      .periods
      .iter()
      .map(|(start, end)| Interval::parse(start, end))
      .collect::<Result<Vec<_>, _>>()?;
    if intervals.is_empty() {
      warn!("No permitted windows configured; the gate is open whenever a batch runs.");
    }

    let metrics = PoolMetrics::new();
    let queue = Arc::new(TaskQueue::new());
    let gate = Arc::new(ScheduleGate::new(
      intervals,
      self.clock,
      self.gate_tick,
      metrics.clone(),
    )?);

    let pool = WorkerPool::spawn(
      PoolParts {
        worker_count,
        slots: self.resource_slots,
        queue: queue.clone(),
        gate_rx: gate.event(),
        throttle: StartupThrottle::new(self.startup_delay),
        metrics: metrics.clone(),
      },
      job_body,
    )?;

    let mut aggregator = ResultAggregator::new(worker_count, self.sample_window);
    if let Some(observer) = self.on_progress {
      aggregator = aggregator.with_progress_observer(observer);
    }
    let controller = BatchController::new(queue, gate.clone(), aggregator, self.on_complete);

    info!(
      workers = worker_count,
      windows = gate.intervals().len(),
      startup_delay_ms = self.startup_delay.as_millis(),
      "Retrieval scheduler built."
    );

    Ok(RetrievalScheduler {
      controller,
      pool,
      gate,
      metrics,
      output_root: self.output_root,
    })
  }
}

/// The time-windowed retrieval scheduler.
///
/// Runs one batch at a time through a fixed pool of slot-bound workers, only
/// while the clock is inside a permitted window. Use
/// [`RetrievalScheduler::builder()`] to create one.
#[derive(Debug)]
pub struct RetrievalScheduler {
  controller: Arc<BatchController>,
  pool: WorkerPool,
  gate: Arc<ScheduleGate>,
  metrics: PoolMetrics,
  output_root: Option<PathBuf>,
}

impl RetrievalScheduler {
  /// Returns a builder to configure and create a `RetrievalScheduler`.
  pub fn builder() -> SchedulerBuilder {
    SchedulerBuilder::new()
  }

  /// Loads `requests` and starts the gate. Logs go to `output_dir`.
  ///
  /// # Errors
  ///
  /// See [`BatchController::load`].
  pub fn submit_batch(
    &self,
    requests: Vec<JobRequest>,
    output_dir: impl AsRef<Path>,
  ) -> Result<BatchInfo, BatchError> {
    self.controller.submit_batch(requests, output_dir)
  }

  /// Today's output directory under the configured root (`<root>/MMDD`).
  pub fn default_output_dir(&self) -> Option<PathBuf> {
    self
      .output_root
      .as_ref()
      .map(|root| root.join(Local::now().format("%m%d").to_string()))
  }

  /// Withholds further dequeues. Running jobs finish and are counted.
  pub fn pause_batch(&self) {
    self.controller.pause();
  }

  /// Restarts the gate after a pause.
  ///
  /// # Errors
  ///
  /// - [`BatchError::NothingLoaded`]: no unfinished batch.
  pub fn resume_batch(&self) -> Result<(), BatchError> {
    self.controller.begin()
  }

  pub fn batch_state(&self) -> BatchState {
    self.controller.state()
  }

  pub fn batch_snapshot(&self) -> BatchSnapshot {
    self.controller.aggregator().snapshot()
  }

  pub fn current_batch(&self) -> Option<BatchInfo> {
    self.controller.current_batch()
  }

  pub fn queued(&self) -> usize {
    self.controller.queue().len()
  }

  pub fn gate_state(&self) -> GateState {
    self.gate.state()
  }

  pub fn worker_slots(&self) -> &[ResourceSlot] {
    self.pool.slots()
  }

  pub fn metrics_snapshot(&self) -> PoolMetricsSnapshot {
    self.metrics.snapshot()
  }

  pub fn controller(&self) -> &Arc<BatchController> {
    &self.controller
  }

  /// Blocks the gate, lets running jobs finish, then stops every worker.
  ///
  /// Queued jobs are not run. Waits for all tasks or until the optional timeout.
  ///
  /// # Errors
  ///
  /// See [`WorkerPool::shutdown_graceful`].
  pub async fn shutdown_graceful(&self, timeout: Option<Duration>) -> Result<(), ShutdownError> {
    self.gate.stop();
    self.pool.shutdown_graceful(timeout).await
  }
}
