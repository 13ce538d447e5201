//! demos/pause_resume.rs
//!
//! Pauses a running batch and resumes it later. Jobs in flight at the pause run
//! to completion and are counted; queued jobs wait and run after the resume.

use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Notify;
use tracing::{error, info};
use nightgate::{job_body, JobError, JobRequest, JobResult, ResourceSlot, RetrievalScheduler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  // --- Setup Tracing ---
  let filter = tracing_subscriber::EnvFilter::try_new("warn,nightgate=info,pause_resume=info")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  // --- Build Scheduler (no windows: always permitted while running) ---
  let finished = Arc::new(Notify::new());
  let notify = finished.clone();
  let scheduler = RetrievalScheduler::builder()
    .worker_count(2)
    .resource_slots(vec![ResourceSlot::new("AUTOQR1", 11112), ResourceSlot::new("AUTOQR2", 11113)])
    .startup_delay(StdDuration::from_millis(200))
    .on_complete(move |snapshot| {
      info!("Batch complete: {}/{}", snapshot.completed, snapshot.expected);
      notify.notify_one();
    })
    .build(job_body! {
      |fields, slot|
      {
        info!("Retrieving {} via {}", fields.reference_id, slot);
        tokio::time::sleep(StdDuration::from_millis(500)).await;
        Ok::<_, JobError>(JobResult {
          record_date: "20240101".to_string(),
          subject_id: format!("ANON-{}", fields.subject_id),
          ..JobResult::default()
        })
      }
    })?;

  // --- Submit ---
  let out = tempfile::tempdir()?;
  let requests: Vec<JobRequest> = (1..=8)
    .map(|i| JobRequest::new(format!("P{i:03}"), format!("ACC{i:03}"), None))
    .collect();
  scheduler.submit_batch(requests, out.path())?;

  // --- Pause while jobs are in flight ---
  tokio::time::sleep(StdDuration::from_millis(800)).await;
  scheduler.pause_batch();
  info!("Paused: state {:?}, gate {:?}", scheduler.batch_state(), scheduler.gate_state());

  tokio::time::sleep(StdDuration::from_secs(2)).await;
  let snapshot = scheduler.batch_snapshot();
  info!(
    "While paused: {} completed, {} still queued.",
    snapshot.completed,
    scheduler.queued()
  );

  // --- Resume and wait for the rest ---
  scheduler.resume_batch()?;
  info!("Resumed.");
  if tokio::time::timeout(StdDuration::from_secs(30), finished.notified())
    .await
    .is_err()
  {
    error!("Batch did not finish in time.");
  }

  let success_log = scheduler.batch_snapshot().success_log;
  info!("Success log written to {:?}", success_log);

  // --- Shutdown ---
  match scheduler.shutdown_graceful(Some(StdDuration::from_secs(5))).await {
    Ok(()) => info!("Scheduler shut down successfully."),
    Err(e) => error!("Shutdown failed: {}", e),
  }
  Ok(())
}
