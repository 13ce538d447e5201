mod common;
use crate::common::setup_tracing;
use nightgate::job::{FailureHandler, SuccessHandler};
use nightgate::{Job, JobError, JobFields, JobResult, TaskQueue};
use std::sync::Arc;
use std::time::Duration as StdDuration;

fn job(subject: &str) -> Job {
  let on_success: SuccessHandler = Arc::new(|_: &JobFields, _: &JobResult, _: StdDuration| {});
  let on_failure: FailureHandler = Arc::new(|_: &JobFields, _: &JobError| {});
  Job::new(
    JobFields::new(subject, format!("ACC-{subject}"), None, "/tmp/out"),
    on_success,
    on_failure,
  )
}

fn subject(job: Option<Job>) -> String {
  job.expect("expected a job").fields().subject_id.clone()
}

#[test]
fn test_fifo_order() {
  let queue = TaskQueue::new();
  assert!(queue.is_empty());
  for s in ["A", "B", "C"] {
    queue.push(job(s));
  }
  assert_eq!(queue.len(), 3);
  assert_eq!(subject(queue.try_pop()), "A");
  assert_eq!(subject(queue.try_pop()), "B");
  assert_eq!(subject(queue.try_pop()), "C");
  assert!(queue.try_pop().is_none());
}

#[test]
fn test_clear_and_reload_replaces_contents_in_order() {
  let queue = TaskQueue::new();
  queue.push(job("old-1"));
  queue.push(job("old-2"));

  let discarded = queue.clear_and_reload(["X", "Y", "Z"].map(job));
  assert_eq!(discarded, 2);
  assert_eq!(queue.len(), 3);
  assert_eq!(subject(queue.try_pop()), "X");
  assert_eq!(subject(queue.try_pop()), "Y");
  assert_eq!(subject(queue.try_pop()), "Z");

  assert_eq!(queue.clear_and_reload(Vec::new()), 0);
  assert!(queue.is_empty());
}

#[test]
fn test_empty_subrecord_is_absent() {
  let fields = JobFields::new("P1", "ACC1", Some(String::new()), "/tmp");
  assert_eq!(fields.sub_record_id, None);
}

#[tokio::test]
async fn test_pop_waits_for_push() {
  setup_tracing();
  let queue = Arc::new(TaskQueue::new());

  let q = queue.clone();
  let waiter = tokio::spawn(async move { q.pop().await.fields().subject_id.clone() });

  tokio::time::sleep(StdDuration::from_millis(50)).await;
  assert!(!waiter.is_finished(), "pop must wait on an empty queue");

  queue.push(job("late"));
  let got = tokio::time::timeout(StdDuration::from_secs(1), waiter)
    .await
    .expect("pop did not wake")
    .unwrap();
  assert_eq!(got, "late");
}

#[tokio::test]
async fn test_reload_wakes_every_waiting_worker() {
  setup_tracing();
  let queue = Arc::new(TaskQueue::new());

  let waiters: Vec<_> = (0..3)
    .map(|_| {
      let q = queue.clone();
      tokio::spawn(async move { q.pop().await.fields().subject_id.clone() })
    })
    .collect();
  tokio::time::sleep(StdDuration::from_millis(50)).await;

  queue.clear_and_reload(["A", "B", "C"].map(job));

  let mut got = Vec::new();
  for w in waiters {
    let s = tokio::time::timeout(StdDuration::from_secs(1), w)
      .await
      .expect("waiter was not woken")
      .unwrap();
    got.push(s);
  }
  got.sort();
  assert_eq!(got, vec!["A", "B", "C"]);
  assert!(queue.is_empty());
}

#[tokio::test]
async fn test_cancelled_pop_loses_nothing() {
  setup_tracing();
  let queue = TaskQueue::new();

  let timed_out = tokio::time::timeout(StdDuration::from_millis(20), queue.pop()).await;
  assert!(timed_out.is_err());

  queue.push(job("kept"));
  assert_eq!(queue.len(), 1);
  assert_eq!(queue.pop().await.fields().subject_id, "kept");
}
