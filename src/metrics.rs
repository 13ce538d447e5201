use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// --- Simple Histogram Implementation ---

/// A basic concurrent histogram storing count and sum.
///
/// Suitable for simple latency tracking without detailed percentile information.
#[derive(Debug, Default)]
pub struct SimpleHistogram {
  count: AtomicUsize,
  sum_millis: AtomicUsize,
}

impl SimpleHistogram {
  /// Records a duration observation in the histogram.
  pub fn record(&self, duration: Duration) {
    self.count.fetch_add(1, Ordering::Relaxed);
    // Job bodies run for seconds to minutes, so millisecond resolution is plenty.
    self.sum_millis.fetch_add(
      duration.as_millis().try_into().unwrap_or(usize::MAX),
      Ordering::Relaxed,
    );
  }

  pub fn get_count(&self) -> usize {
    self.count.load(Ordering::Relaxed)
  }

  pub fn get_sum_millis(&self) -> usize {
    self.sum_millis.load(Ordering::Relaxed)
  }
}

/// Pool-wide counters shared by the gate and every worker.
///
/// Cloning only clones the `Arc`s, so all clones observe the same values.
/// These are operational counters; batch accounting lives in the
/// `ResultAggregator`, which is the single source of truth for completion.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
  // --- Counters ---
  /// Jobs taken off the queue by a worker.
  pub jobs_dequeued: Arc<AtomicUsize>,
  /// Job bodies that returned `Ok`.
  pub jobs_succeeded: Arc<AtomicUsize>,
  /// Job bodies that returned `Err` (panics excluded).
  pub jobs_failed: Arc<AtomicUsize>,
  /// Job bodies that panicked.
  pub jobs_panicked: Arc<AtomicUsize>,
  /// Worker loops restarted by their supervisor after panicking outside a job.
  pub workers_restarted: Arc<AtomicUsize>,
  /// Number of times the gate changed between blocked and permitted.
  pub gate_transitions: Arc<AtomicUsize>,

  // --- Gauges ---
  /// Workers currently executing a job body.
  pub workers_active_current: Arc<AtomicUsize>,

  // --- Histograms ---
  pub job_execution_duration: Arc<SimpleHistogram>,
}

impl PoolMetrics {
  pub fn new() -> Self {
    Self {
      jobs_dequeued: Default::default(),
      jobs_succeeded: Default::default(),
      jobs_failed: Default::default(),
      jobs_panicked: Default::default(),
      workers_restarted: Default::default(),
      gate_transitions: Default::default(),
      workers_active_current: Default::default(),
      job_execution_duration: Arc::new(SimpleHistogram::default()),
    }
  }

  /// Creates a point-in-time snapshot of the current metric values.
  pub fn snapshot(&self) -> PoolMetricsSnapshot {
    let order = Ordering::Relaxed;

    PoolMetricsSnapshot {
      jobs_dequeued: self.jobs_dequeued.load(order),
      jobs_succeeded: self.jobs_succeeded.load(order),
      jobs_failed: self.jobs_failed.load(order),
      jobs_panicked: self.jobs_panicked.load(order),
      workers_restarted: self.workers_restarted.load(order),
      gate_transitions: self.gate_transitions.load(order),
      workers_active_current: self.workers_active_current.load(order),
      job_execution_duration_count: self.job_execution_duration.get_count(),
      job_execution_duration_sum_millis: self.job_execution_duration.get_sum_millis(),
    }
  }
}

impl Default for PoolMetrics {
  fn default() -> Self {
    Self::new()
  }
}

/// A snapshot of the pool metrics at a specific point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolMetricsSnapshot {
  // Counters
  pub jobs_dequeued: usize,
  pub jobs_succeeded: usize,
  pub jobs_failed: usize,
  pub jobs_panicked: usize,
  pub workers_restarted: usize,
  pub gate_transitions: usize,
  // Gauges
  pub workers_active_current: usize,
  // Histogram Data
  pub job_execution_duration_count: usize,
  pub job_execution_duration_sum_millis: usize,
}

impl PoolMetricsSnapshot {
  /// Mean job execution duration, or `None` if no job has finished yet.
  pub fn mean_execution_duration(&self) -> Option<Duration> {
    if self.job_execution_duration_count == 0 {
      None
    } else {
      let mean = self.job_execution_duration_sum_millis as f64 / self.job_execution_duration_count as f64;
      Some(Duration::from_millis(mean as u64))
    }
  }
}
