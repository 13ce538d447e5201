mod common;
use crate::common::{setup_tracing, TestClock};
use chrono::NaiveTime;
use nightgate::gate::{evaluate, DEFAULT_GATE_TICK};
use nightgate::{BuildError, GateState, Interval, PoolMetrics, ScheduleGate, SystemClock};
use std::sync::Arc;
use std::time::Duration as StdDuration;

fn night() -> Vec<Interval> {
  vec![Interval::parse("1800", "0700").unwrap()]
}

fn at(h: u32, m: u32) -> NaiveTime {
  NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[test]
fn test_evaluate_windows() {
  let empty = evaluate(&[], at(12, 0));
  assert!(empty.permitted);
  assert_eq!(empty.next_boundary, None);

  // Inside: the next boundary is the window end itself.
  let inside = evaluate(&night(), at(22, 0));
  assert!(inside.permitted);
  assert_eq!(inside.next_boundary, Some(StdDuration::from_secs(9 * 3600)));

  let closing = evaluate(&night(), NaiveTime::from_hms_opt(6, 59, 30).unwrap());
  assert!(closing.permitted);
  assert_eq!(closing.next_boundary, Some(StdDuration::from_secs(30)));

  // Reaching the end closes the gate until the next start.
  let at_end = evaluate(&night(), at(7, 0));
  assert!(!at_end.permitted);
  assert_eq!(at_end.next_boundary, Some(StdDuration::from_secs(11 * 3600)));

  let outside = evaluate(&night(), at(12, 0));
  assert!(!outside.permitted);
  assert_eq!(outside.next_boundary, Some(StdDuration::from_secs(6 * 3600)));

  // Nearest start among several windows.
  let two = vec![
    Interval::parse("0100", "0200").unwrap(),
    Interval::parse("1200", "1300").unwrap(),
  ];
  let between = evaluate(&two, at(3, 0));
  assert!(!between.permitted);
  assert_eq!(between.next_boundary, Some(StdDuration::from_secs(9 * 3600)));
}

#[test]
fn test_gate_requires_runtime() {
  let result = ScheduleGate::new(night(), Arc::new(SystemClock), DEFAULT_GATE_TICK, PoolMetrics::new());
  assert!(matches!(result, Err(BuildError::NoRuntime)));
}

#[tokio::test]
async fn test_gate_without_windows_is_always_permitted() {
  setup_tracing();
  let gate = ScheduleGate::new(vec![], Arc::new(SystemClock), DEFAULT_GATE_TICK, PoolMetrics::new()).unwrap();
  assert_eq!(gate.state(), GateState::Blocked, "Gate starts blocked until started");

  gate.start();
  assert!(gate.is_permitted());
  assert!(gate.is_running());

  gate.stop();
  assert_eq!(gate.state(), GateState::Blocked);
  assert!(!gate.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_gate_opens_and_closes_at_window_boundaries() {
  setup_tracing();
  let metrics = PoolMetrics::new();
  let clock = TestClock::at(17, 59, 0);
  let gate = ScheduleGate::new(night(), clock, DEFAULT_GATE_TICK, metrics.clone()).unwrap();
  let mut rx = gate.event();

  gate.start();
  assert_eq!(gate.state(), GateState::Blocked, "17:59 is outside the window");

  tokio::time::sleep(StdDuration::from_secs(30)).await;
  assert!(!gate.is_permitted(), "Still 17:59:30");

  tokio::time::sleep(StdDuration::from_secs(31)).await;
  assert!(gate.is_permitted(), "18:00:01 is inside the window");
  assert!(rx.has_changed().unwrap());
  let opened_at = match *rx.borrow_and_update() {
    GateState::Permitted { since } => since,
    GateState::Blocked => panic!("expected permitted"),
  };

  // Re-evaluations inside the window keep the original transition instant.
  tokio::time::sleep(StdDuration::from_secs(3600)).await;
  assert_eq!(gate.state(), GateState::Permitted { since: opened_at });

  // Now 19:00:01. The gate stays open up to 07:00 and closes on reaching it.
  tokio::time::sleep(StdDuration::from_secs(12 * 3600 - 31)).await;
  assert!(gate.is_permitted(), "06:59:30 is inside the window");

  tokio::time::sleep(StdDuration::from_secs(31)).await;
  assert_eq!(gate.state(), GateState::Blocked, "07:00:01 is past the window end");

  tokio::time::sleep(StdDuration::from_secs(60)).await;
  assert_eq!(gate.state(), GateState::Blocked, "07:01:01 is outside the window");
  assert_eq!(metrics.snapshot().gate_transitions, 2);

  gate.stop();
}

#[tokio::test(start_paused = true)]
async fn test_gate_opens_immediately_inside_window() {
  setup_tracing();
  let gate = ScheduleGate::new(night(), TestClock::at(23, 15, 0), DEFAULT_GATE_TICK, PoolMetrics::new()).unwrap();
  gate.start();
  assert!(gate.is_permitted());

  let first = gate.state();
  gate.start(); // idempotent
  assert_eq!(gate.state(), first, "Second start must not reset the transition instant");
  gate.stop();
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_reevaluation() {
  setup_tracing();
  let gate = ScheduleGate::new(night(), TestClock::at(17, 55, 0), DEFAULT_GATE_TICK, PoolMetrics::new()).unwrap();
  gate.start();
  assert!(!gate.is_permitted());

  gate.stop();
  tokio::time::sleep(StdDuration::from_secs(3600)).await;
  assert_eq!(gate.state(), GateState::Blocked, "A stopped gate never reopens on its own");

  // Restarting reads the clock afresh: 18:55 is inside.
  gate.start();
  assert!(gate.is_permitted());
  gate.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_is_final_while_control_task_reevaluates() {
  setup_tracing();
  // Two windows covering the whole day, re-evaluated every 10ms.
  let all_day = vec![
    Interval::parse("0000", "1200").unwrap(),
    Interval::parse("1200", "0000").unwrap(),
  ];
  let gate = ScheduleGate::new(all_day, Arc::new(SystemClock), StdDuration::from_millis(10), PoolMetrics::new()).unwrap();

  for round in 0..40u64 {
    gate.start();
    assert!(gate.is_permitted());
    // Land the stop at varying points of the control task's 10ms cycle.
    tokio::time::sleep(StdDuration::from_micros(2_500 * (round % 6))).await;
    gate.stop();
    assert_eq!(gate.state(), GateState::Blocked);

    tokio::time::sleep(StdDuration::from_millis(25)).await;
    assert_eq!(gate.state(), GateState::Blocked, "Round {round}: gate reopened after stop");
  }
}
