use crate::clock::{until_from, Clock, Interval, TimeOfDay};
use crate::error::BuildError;
use crate::metrics::PoolMetrics;

use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default period of the safety re-evaluation tick.
pub const DEFAULT_GATE_TICK: Duration = Duration::from_secs(60);

/// Lower bound on a single control-loop sleep.
const MIN_RECHECK: Duration = Duration::from_millis(10);

/// The shared signal workers wait on before dequeuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
  /// No new job may be started. In-flight jobs are unaffected.
  Blocked,
  /// Workers may dequeue. `since` is the instant of the blocked-to-permitted
  /// transition; the startup stagger is measured from it.
  Permitted { since: Instant },
}

impl GateState {
  pub fn is_permitted(&self) -> bool {
    matches!(self, GateState::Permitted { .. })
  }
}

/// Result of evaluating the configured windows at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
  pub permitted: bool,
  /// Time until the next window boundary, `None` when no boundary exists.
  pub next_boundary: Option<Duration>,
}

/// Decides whether `now` is inside any window and when to look again.
///
/// The gate closes on a window's `end`: inside a window the next boundary is
/// `until(end)`, and the `end` minute itself is blocked. Outside all windows the
/// next boundary is the nearest window start. No windows means always permitted.
pub fn evaluate(intervals: &[Interval], now: NaiveTime) -> Evaluation {
  if intervals.is_empty() {
    return Evaluation {
      permitted: true,
      next_boundary: None,
    };
  }

  let t = TimeOfDay::from(now);
  let closing = intervals
    .iter()
    .filter(|i| i.is_open_at(t))
    .map(|i| until_from(now, i.end))
    .min();

  match closing {
    Some(until_close) => Evaluation {
      permitted: true,
      next_boundary: Some(until_close),
    },
    None => Evaluation {
      permitted: false,
      next_boundary: intervals.iter().map(|i| until_from(now, i.start)).min(),
    },
  }
}

#[derive(Debug, Default)]
struct Control {
  running: bool,
  /// Bumped by every `stop()`. A control task only publishes while its own
  /// generation is current.
  generation: u64,
  task: Option<JoinHandle<()>>,
}

/// Keeps a `GateState` in step with the configured daily windows.
///
/// A control task sleeps until the next window boundary (capped at `tick`) and
/// re-evaluates; no busy polling. `stop()` cancels the pending timer and blocks
/// the gate; `start()` re-arms from a fresh clock reading.
#[derive(Debug)]
pub struct ScheduleGate {
  intervals: Arc<Vec<Interval>>,
  clock: Arc<dyn Clock>,
  tick: Duration,
  state_tx: Arc<watch::Sender<GateState>>,
  control: Arc<Mutex<Control>>,
  metrics: PoolMetrics,
  runtime: Handle,
}

impl ScheduleGate {
  /// Creates a blocked gate. Must be called from within a Tokio runtime.
  pub fn new(
    intervals: Vec<Interval>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    metrics: PoolMetrics,
  ) -> Result<Self, BuildError> {
    let runtime = Handle::try_current().map_err(|_| BuildError::NoRuntime)?;
    let (state_tx, _) = watch::channel(GateState::Blocked);
    Ok(Self {
      intervals: Arc::new(intervals),
      clock,
      tick: tick.max(MIN_RECHECK),
      state_tx: Arc::new(state_tx),
      control: Arc::new(Mutex::new(Control::default())),
      metrics,
      runtime,
    })
  }

  pub fn intervals(&self) -> &[Interval] {
    &self.intervals
  }

  /// Begins evaluating the windows. Idempotent while running.
  ///
  /// The gate is opened immediately if the clock is inside a window; otherwise it
  /// stays blocked until the next window start.
  pub fn start(&self) {
    let mut control = self.control.lock();
    if control.running {
      debug!("Schedule gate already running.");
      return;
    }
    control.running = true;

    let first = evaluate(&self.intervals, self.clock.now());
    publish(&self.state_tx, &self.metrics, first.permitted);
    info!(
      windows = self.intervals.len(),
      permitted = first.permitted,
      next_boundary_secs = first.next_boundary.map(|d| d.as_secs()),
      "Schedule gate started."
    );

    // Without windows the gate is permanently open; nothing to re-evaluate.
    if first.next_boundary.is_none() {
      return;
    }

    let intervals = self.intervals.clone();
    let clock = self.clock.clone();
    let state_tx = self.state_tx.clone();
    let metrics = self.metrics.clone();
    let shared = self.control.clone();
    let generation = control.generation;
    let tick = self.tick;
    let mut pending = first.next_boundary;

    control.task = Some(self.runtime.spawn(async move {
      loop {
        let wait = pending.map_or(tick, |b| b.min(tick)).max(MIN_RECHECK);
        tokio::time::sleep(wait).await;
        let eval = evaluate(&intervals, clock.now());

        // `stop()` may have run between the wake-up and here; abort only lands
        // at the next await.
        let current = {
          let control = shared.lock();
          let current = control.generation == generation;
          if current {
            publish(&state_tx, &metrics, eval.permitted);
          }
          current
        };
        if !current {
          debug!("Schedule gate control task superseded; exiting.");
          break;
        }
        pending = eval.next_boundary;
      }
    }));
  }

  /// Halts evaluation and blocks the gate. Jobs already running are unaffected.
  ///
  /// Once this returns no earlier control task can publish again.
  pub fn stop(&self) {
    let mut control = self.control.lock();
    control.generation = control.generation.wrapping_add(1);
    if let Some(task) = control.task.take() {
      task.abort();
    }
    let was_running = std::mem::replace(&mut control.running, false);
    publish(&self.state_tx, &self.metrics, false);
    if was_running {
      info!("Schedule gate stopped.");
    }
  }

  /// A receiver for the gate signal. Workers wait on this.
  pub fn event(&self) -> watch::Receiver<GateState> {
    self.state_tx.subscribe()
  }

  pub fn state(&self) -> GateState {
    *self.state_tx.borrow()
  }

  pub fn is_permitted(&self) -> bool {
    self.state().is_permitted()
  }

  pub fn is_running(&self) -> bool {
    self.control.lock().running
  }
}

impl Drop for ScheduleGate {
  fn drop(&mut self) {
    if let Some(task) = self.control.lock().task.take() {
      task.abort();
    }
  }
}

/// Publishes the desired state, keeping `since` intact while already permitted.
fn publish(state_tx: &watch::Sender<GateState>, metrics: &PoolMetrics, permitted: bool) {
  let changed = state_tx.send_if_modified(|state| match (*state, permitted) {
    (GateState::Blocked, true) => {
      *state = GateState::Permitted {
        since: Instant::now(),
      };
      true
    }
    (GateState::Permitted { .. }, false) => {
      *state = GateState::Blocked;
      true
    }
    _ => false,
  });

  if changed {
    metrics.gate_transitions.fetch_add(1, AtomicOrdering::Relaxed);
    if permitted {
      info!("Gate opened: inside a permitted window.");
    } else {
      info!("Gate closed.");
    }
  }
}
