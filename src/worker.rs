use crate::error::JobError;
use crate::gate::GateState;
use crate::job::{Job, JobBody, JobFuture, JobResult, ResourceSlot, WorkerId};
use crate::metrics::PoolMetrics;
use crate::queue::TaskQueue;
use crate::throttle::{gate_closed, StartupThrottle};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// A long-lived worker bound to one resource slot.
///
/// Loops forever: wait for the gate (and its stagger), dequeue one job, run the
/// job body through this worker's slot, hand the outcome to the job's handler.
/// Only a shutdown signal ends the loop.
pub(crate) struct Worker {
  id: WorkerId,
  slot: ResourceSlot,
  queue: Arc<TaskQueue>,
  gate_rx: watch::Receiver<GateState>,
  throttle: StartupThrottle,
  job_body: JobBody,
  metrics: PoolMetrics,
  shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
  #[allow(clippy::too_many_arguments)] // Necessary state for worker operation
  pub fn new(
    id: WorkerId,
    slot: ResourceSlot,
    queue: Arc<TaskQueue>,
    gate_rx: watch::Receiver<GateState>,
    throttle: StartupThrottle,
    job_body: JobBody,
    metrics: PoolMetrics,
    shutdown_rx: watch::Receiver<bool>,
  ) -> Self {
    Self {
      id,
      slot,
      queue,
      gate_rx,
      throttle,
      job_body,
      metrics,
      shutdown_rx,
    }
  }

  /// Runs the main loop for the worker task.
  pub async fn run(&mut self) {
    info!(worker_id = self.id, slot = %self.slot, "Worker started. Waiting for the gate...");

    loop {
      if self.is_shutting_down() {
        break;
      }

      // --- 1. Wait for the gate (and this worker's stagger) ---
      tokio::select! {
        biased;

        Ok(()) = self.shutdown_rx.changed() => {
          continue; // Re-checked at the top of the loop
        }

        released = self.throttle.wait_for_release(&mut self.gate_rx, self.id) => {
          if released.is_err() {
            error!(worker_id = self.id, "Gate signal dropped. Worker exiting.");
            break;
          }
        }
      }

      // --- 2. Dequeue, unless the gate closes first ---
      let job = tokio::select! {
        biased;

        Ok(()) = self.shutdown_rx.changed() => {
          continue;
        }

        _ = gate_closed(&mut self.gate_rx) => {
          debug!(worker_id = self.id, "Gate closed while waiting for a job.");
          continue;
        }

        job = self.queue.pop() => job,
      };

      // --- 3. Execute ---
      let job_span = tracing::span!(
        tracing::Level::INFO,
        "job_exec",
        worker_id = self.id,
        slot = %self.slot,
        job_id = %job.id(),
        subject_id = job.fields().subject_id.as_str()
      );
      self.execute_and_report(job).instrument(job_span).await;
    }

    info!(worker_id = self.id, "Worker task shutting down.");
  }

  fn is_shutting_down(&self) -> bool {
    *self.shutdown_rx.borrow()
  }

  /// Runs the job body (isolating panics) and delivers exactly one outcome.
  async fn execute_and_report(&self, job: Job) {
    self.metrics.jobs_dequeued.fetch_add(1, AtomicOrdering::Relaxed);
    self
      .metrics
      .workers_active_current
      .fetch_add(1, AtomicOrdering::Relaxed);

    info!(reference_id = job.fields().reference_id.as_str(), "Starting retrieval.");
    let start = Instant::now();
    let result = self.execute_job_body(&job).await;
    let elapsed = start.elapsed();
    self.metrics.job_execution_duration.record(elapsed);

    match &result {
      Ok(_) => info!(duration_ms = elapsed.as_millis(), outcome = "Success", "Finished retrieval."),
      Err(e) => warn!(duration_ms = elapsed.as_millis(), outcome = "Fail", error = %e, "Retrieval failed."),
    }

    job.complete(result.map(|r| (r, elapsed)));

    self
      .metrics
      .workers_active_current
      .fetch_sub(1, AtomicOrdering::Relaxed);
  }

  async fn execute_job_body(&self, job: &Job) -> Result<JobResult, JobError> {
    let fields = job.fields().clone();
    let slot = self.slot.clone();

    let handle = match &self.job_body {
      JobBody::Async(body) => {
        let body = body.clone();
        // A body that panics while building its future is handled like one
        // that panics while running.
        let future: JobFuture = match catch_unwind(AssertUnwindSafe(move || body(fields, slot))) {
          Ok(fut) => fut,
          Err(payload) => return Err(self.panicked(payload)),
        };
        tokio::spawn(future)
      }
      JobBody::Blocking(body) => {
        let body = body.clone();
        tokio::task::spawn_blocking(move || body(fields, slot))
      }
    };

    match handle.await {
      Ok(Ok(result)) => {
        self.metrics.jobs_succeeded.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(result)
      }
      Ok(Err(e)) => {
        self.metrics.jobs_failed.fetch_add(1, AtomicOrdering::Relaxed);
        Err(e)
      }
      Err(join_error) if join_error.is_panic() => Err(self.panicked(join_error.into_panic())),
      Err(_) => {
        warn!(worker_id = self.id, "Job task was cancelled during execution.");
        self.metrics.jobs_failed.fetch_add(1, AtomicOrdering::Relaxed);
        Err(JobError::Cancelled)
      }
    }
  }

  fn panicked(&self, payload: Box<dyn Any + Send>) -> JobError {
    self.metrics.jobs_panicked.fetch_add(1, AtomicOrdering::Relaxed);
    let message = panic_message(payload.as_ref());
    error!(worker_id = self.id, slot = %self.slot, panic = %message, "Job body panicked!");
    JobError::Panicked(message)
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
