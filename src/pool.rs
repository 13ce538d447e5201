use crate::error::{BuildError, ShutdownError};
use crate::gate::GateState;
use crate::job::{JobBody, ResourceSlot};
use crate::metrics::PoolMetrics;
use crate::queue::TaskQueue;
use crate::throttle::StartupThrottle;
use crate::worker::Worker;

use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything a pool needs besides the job body.
#[derive(Debug, Clone)]
pub struct PoolParts {
  pub worker_count: usize,
  pub slots: Vec<ResourceSlot>,
  pub queue: Arc<TaskQueue>,
  pub gate_rx: watch::Receiver<GateState>,
  pub throttle: StartupThrottle,
  pub metrics: PoolMetrics,
}

/// Checks that each of the first `worker_count` slots is distinct.
///
/// Slots beyond `worker_count` are never bound and are not checked.
pub fn check_slots(slots: &[ResourceSlot], worker_count: usize) -> Result<(), BuildError> {
  if worker_count == 0 {
    return Err(BuildError::ZeroWorkers);
  }
  if slots.len() < worker_count {
    return Err(BuildError::InsufficientSlots {
      slots: slots.len(),
      workers: worker_count,
    });
  }
  let bound = &slots[..worker_count];
  for (i, slot) in bound.iter().enumerate() {
    if bound[..i]
      .iter()
      .any(|earlier| earlier.identity == slot.identity || earlier.port == slot.port)
    {
      return Err(BuildError::DuplicateSlot(slot.clone()));
    }
  }
  Ok(())
}

/// A fixed set of long-lived workers, worker `i` bound to `slots[i]` for life.
///
/// Each worker runs under a supervisor task. A worker loop that panics outside
/// the job boundary is restarted with the same slot; job-body panics never reach
/// this level.
#[derive(Debug)]
pub struct WorkerPool {
  slots: Vec<ResourceSlot>,
  shutdown_tx: watch::Sender<bool>,
  handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
  /// Validates the slot list and spawns the workers.
  ///
  /// # Errors
  ///
  /// - [`BuildError::ZeroWorkers`] when `worker_count` is zero.
  /// - [`BuildError::InsufficientSlots`] when there are fewer slots than workers.
  /// - [`BuildError::DuplicateSlot`] when two bound slots share an identity or port.
  /// - [`BuildError::NoRuntime`] when called outside a Tokio runtime.
  pub fn spawn(parts: PoolParts, job_body: impl Into<JobBody>) -> Result<Self, BuildError> {
    let PoolParts {
      worker_count,
      slots,
      queue,
      gate_rx,
      throttle,
      metrics,
    } = parts;
    let job_body = job_body.into();

    check_slots(&slots, worker_count)?;
    if slots.len() > worker_count {
      warn!(
        slots = slots.len(),
        workers = worker_count,
        "More resource slots than workers; the extra slots stay unused."
      );
    }
    let runtime = Handle::try_current().map_err(|_| BuildError::NoRuntime)?;

    let bound: Vec<ResourceSlot> = slots.into_iter().take(worker_count).collect();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(worker_count);
    for (worker_id, slot) in bound.iter().cloned().enumerate() {
      let queue = queue.clone();
      let gate_rx = gate_rx.clone();
      let job_body = job_body.clone();
      let metrics = metrics.clone();
      let shutdown_rx = shutdown_rx.clone();
      let runtime_for_worker = runtime.clone();

      let handle = runtime.spawn(async move {
        loop {
          let mut worker = Worker::new(
            worker_id,
            slot.clone(),
            queue.clone(),
            gate_rx.clone(),
            throttle,
            job_body.clone(),
            metrics.clone(),
            shutdown_rx.clone(),
          );
          match runtime_for_worker.spawn(async move { worker.run().await }).await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
              if *shutdown_rx.borrow() {
                break;
              }
              metrics.workers_restarted.fetch_add(1, AtomicOrdering::Relaxed);
              error!(worker_id, slot = %slot, "Worker loop panicked; restarting with the same slot.");
            }
            Err(_) => break,
          }
        }
      });
      handles.push(handle);
    }

    info!(workers = worker_count, "Worker pool started.");
    Ok(Self {
      slots: bound,
      shutdown_tx,
      handles: Mutex::new(handles),
    })
  }

  /// Slot bound to each worker, indexed by worker id.
  pub fn slots(&self) -> &[ResourceSlot] {
    &self.slots
  }

  pub fn worker_count(&self) -> usize {
    self.slots.len()
  }

  /// Signals all workers to stop after their current job and waits for them.
  ///
  /// Queued jobs are left in the queue. Waits until all tasks finish or until the
  /// optional timeout elapses.
  ///
  /// # Errors
  ///
  /// - [`ShutdownError::AlreadyShuttingDown`]: shutdown was already requested.
  /// - [`ShutdownError::Timeout`]: waiting for tasks exceeded the timeout.
  /// - [`ShutdownError::TaskPanic`]: a supervisor task panicked.
  pub async fn shutdown_graceful(&self, timeout: Option<Duration>) -> Result<(), ShutdownError> {
    info!("Initiating graceful pool shutdown...");
    if self.shutdown_tx.send_replace(true) {
      return Err(ShutdownError::AlreadyShuttingDown);
    }

    let handles = std::mem::take(&mut *self.handles.lock());
    if handles.is_empty() {
      warn!("No worker tasks found to await during shutdown.");
      return Ok(());
    }

    let join_all = try_join_all(handles);
    let result = match timeout {
      Some(limit) => match tokio::time::timeout(limit, join_all).await {
        Ok(joined) => joined.map(|_| ()).map_err(|e| {
          error!("A worker task panicked during shutdown: {:?}", e);
          ShutdownError::TaskPanic
        }),
        Err(_) => {
          error!("Shutdown timed out after {:?}", limit);
          Err(ShutdownError::Timeout)
        }
      },
      None => join_all.await.map(|_| ()).map_err(|e| {
        error!("A worker task panicked during shutdown (no timeout): {:?}", e);
        ShutdownError::TaskPanic
      }),
    };

    if result.is_ok() {
      info!("All worker tasks joined successfully.");
    }
    result
  }

  pub fn is_shutting_down(&self) -> bool {
    *self.shutdown_tx.borrow()
  }
}
