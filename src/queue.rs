use crate::job::Job;

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Unbounded FIFO of pending jobs, filled once per batch and drained by workers.
///
/// Insertion order is processing order. No priorities, no reordering.
#[derive(Debug, Default)]
pub struct TaskQueue {
  items: Mutex<VecDeque<Job>>,
  available: Notify,
}

impl TaskQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, job: Job) {
    self.items.lock().push_back(job);
    self.available.notify_one();
  }

  /// Removes the front job without waiting.
  pub fn try_pop(&self) -> Option<Job> {
    self.items.lock().pop_front()
  }

  /// Waits until a job is available and removes it.
  ///
  /// Cancel-safe: a job is only taken off the queue when it is returned, so
  /// dropping this future never loses an item.
  pub async fn pop(&self) -> Job {
    loop {
      let notified = self.available.notified();
      tokio::pin!(notified);
      // Register before checking so a push between the check and the await
      // still wakes us.
      notified.as_mut().enable();

      if let Some(job) = self.try_pop() {
        if !self.is_empty() {
          // Pass the wake-up on; one notify may cover several pushes.
          self.available.notify_one();
        }
        return job;
      }
      notified.await;
    }
  }

  /// Atomically discards whatever is queued and loads `jobs` in the given order.
  ///
  /// Returns the number of discarded jobs. Only meant to be called between
  /// batches, once the previous batch is terminal.
  pub fn clear_and_reload(&self, jobs: impl IntoIterator<Item = Job>) -> usize {
    let (discarded, loaded) = {
      let mut items = self.items.lock();
      let discarded = items.len();
      items.clear();
      items.extend(jobs);
      (discarded, items.len())
    };
    if discarded > 0 {
      warn!(discarded, "Discarded queued jobs while reloading the task queue.");
    }
    debug!(loaded, "Task queue reloaded.");
    if loaded > 0 {
      // Wake every parked worker; the stored permit covers one that is about to park.
      self.available.notify_waiters();
      self.available.notify_one();
    }
    discarded
  }

  pub fn len(&self) -> usize {
    self.items.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.lock().is_empty()
  }
}
