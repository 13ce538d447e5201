use crate::gate::GateState;

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Staggers worker activation after the gate opens.
///
/// Worker `i` is released `i * delay` after the blocked-to-permitted transition,
/// so the remote server sees connection attempts spread over time. The stagger
/// is tied to the transition instant: a worker that re-checks the gate long after
/// it opened is not delayed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupThrottle {
  delay: Duration,
}

impl StartupThrottle {
  pub fn new(delay: Duration) -> Self {
    Self { delay }
  }

  /// No stagger; every worker is released with the gate.
  pub fn disabled() -> Self {
    Self::new(Duration::ZERO)
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }

  /// Offset from the gate transition at which worker `worker_index` is released.
  pub fn release_offset(&self, worker_index: usize) -> Duration {
    self
      .delay
      .saturating_mul(u32::try_from(worker_index).unwrap_or(u32::MAX))
  }

  /// Instant at which `worker_index` may proceed for a transition at `since`.
  pub fn release_at(&self, since: Instant, worker_index: usize) -> Instant {
    since + self.release_offset(worker_index)
  }

  /// Waits until the gate is permitted and this worker's stagger has elapsed.
  ///
  /// A close of the gate during the wait sends the worker back to waiting for the
  /// next opening. Errors only when the gate sender has been dropped.
  pub async fn wait_for_release(
    &self,
    gate_rx: &mut watch::Receiver<GateState>,
    worker_index: usize,
  ) -> Result<(), watch::error::RecvError> {
    loop {
      let state = *gate_rx.borrow_and_update();
      match state {
        GateState::Blocked => gate_rx.changed().await?,
        GateState::Permitted { since } => {
          let release_at = self.release_at(since, worker_index);
          if Instant::now() >= release_at {
            return Ok(());
          }
          tokio::select! {
            _ = tokio::time::sleep_until(release_at) => {}
            changed = gate_rx.changed() => changed?,
          }
          // Loop re-reads the state; the gate may have been toggled meanwhile.
        }
      }
    }
  }
}

impl Default for StartupThrottle {
  fn default() -> Self {
    Self::disabled()
  }
}

/// Resolves once the gate is no longer permitted. Never resolves if the gate
/// sender is gone.
pub(crate) async fn gate_closed(gate_rx: &mut watch::Receiver<GateState>) {
  loop {
    if !gate_rx.borrow_and_update().is_permitted() {
      return;
    }
    if gate_rx.changed().await.is_err() {
      std::future::pending::<()>().await;
    }
  }
}
