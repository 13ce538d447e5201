mod common;
use crate::common::{anonymized, requests, setup_tracing, slots, wait_until};
use nightgate::{job_body, JobError, RetrievalScheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

#[tokio::test]
async fn test_job_body_macro_with_setup_block() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let counter = Arc::new(AtomicUsize::new(0));
  let job_counter = counter.clone();

  let body = job_body! {
    |fields, slot|
    {
      let counter = job_counter.clone();
    }
    {
      counter.fetch_add(1, Ordering::SeqCst);
      tracing::debug!(subject = %fields.subject_id, %slot, "macro job running");
      Ok::<_, JobError>(anonymized(&fields))
    }
  };

  let scheduler = RetrievalScheduler::builder()
    .worker_count(2)
    .resource_slots(slots(2))
    .build(body)
    .unwrap();
  scheduler.submit_batch(requests(5), dir.path()).unwrap();

  assert!(wait_until(StdDuration::from_secs(5), || scheduler.batch_snapshot().terminal).await);
  assert_eq!(counter.load(Ordering::SeqCst), 5);
  assert_eq!(scheduler.batch_snapshot().succeeded, 5);

  scheduler.shutdown_graceful(Some(StdDuration::from_secs(1))).await.unwrap();
}

#[tokio::test]
async fn test_job_body_macro_without_setup_block() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();

  let body = job_body! {
    |fields, _slot|
    {
      Err::<nightgate::JobResult, _>(JobError::failed(format!("no route for {}", fields.reference_id)))
    }
  };

  let scheduler = RetrievalScheduler::builder()
    .worker_count(1)
    .resource_slots(slots(1))
    .build(body)
    .unwrap();
  scheduler.submit_batch(requests(2), dir.path()).unwrap();

  assert!(wait_until(StdDuration::from_secs(5), || scheduler.batch_snapshot().terminal).await);
  let snapshot = scheduler.batch_snapshot();
  assert_eq!((snapshot.succeeded, snapshot.failed), (0, 2));

  scheduler.shutdown_graceful(Some(StdDuration::from_secs(1))).await.unwrap();
}
