//! demos/daily_window.rs
//!
//! Runs a small batch inside a permitted daily window. The window is placed one
//! minute from now so the demo shows the gate holding workers back, opening,
//! and releasing them one by one with the startup stagger.

use chrono::{Duration as ChronoDuration, Local};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Notify;
use tracing::{error, info};
use nightgate::{JobError, JobFields, JobRequest, JobResult, ResourceSlot, SchedulerBuilder, SchedulerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  // --- Setup Tracing ---
  let filter = tracing_subscriber::EnvFilter::try_new("warn,nightgate=info,daily_window=info")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  // --- Window: opens at the next minute, closes five minutes later ---
  let now = Local::now();
  let start = (now + ChronoDuration::minutes(1)).format("%H%M").to_string();
  let end = (now + ChronoDuration::minutes(6)).format("%H%M").to_string();
  info!("Permitted window {}-{} (deployments typically use 1800-0700).", start, end);

  let config = SchedulerConfig {
    worker_count: 2,
    resource_slots: vec![ResourceSlot::new("AUTOQR1", 11112), ResourceSlot::new("AUTOQR2", 11113)],
    periods: vec![[start, end]],
    ..SchedulerConfig::default()
  };
  config.validate()?;

  // --- Build Scheduler ---
  let finished = Arc::new(Notify::new());
  let notify = finished.clone();
  let scheduler = SchedulerBuilder::from_config(&config)
    .on_progress(|p| info!("Progress: {}/{} ({:.1} jobs/h)", p.completed, p.total, p.rate_per_hour))
    .on_complete(move |snapshot| {
      info!(
        "Batch complete: {} succeeded, {} failed.",
        snapshot.succeeded, snapshot.failed
      );
      notify.notify_one();
    })
    .build_blocking(|fields: JobFields, slot: ResourceSlot| {
      // Stands in for an external retrieval tool bound to `slot`.
      info!("Retrieving {} via {}", fields.reference_id, slot);
      std::thread::sleep(StdDuration::from_secs(1));
      if fields.subject_id == "P003" {
        return Err(JobError::failed("no matching study"));
      }
      Ok(JobResult {
        record_date: "20240101".to_string(),
        subject_id: format!("ANON-{}", fields.subject_id),
        reference_id: format!("ANON-{}", fields.reference_id),
        sub_record_id: String::new(),
      })
    })?;

  // --- Submit Batch ---
  let out = tempfile::tempdir()?;
  let requests: Vec<JobRequest> = (1..=6)
    .map(|i| JobRequest::new(format!("P{i:03}"), format!("ACC{i:03}"), None))
    .collect();
  let info = scheduler.submit_batch(requests, out.path())?;
  info!("Batch {} queued; gate is {:?}.", info.batch_id, scheduler.gate_state());

  // --- Wait for the window and the batch ---
  if tokio::time::timeout(StdDuration::from_secs(6 * 60), finished.notified())
    .await
    .is_err()
  {
    error!("Window closed before the batch finished; {} job(s) left queued.", scheduler.queued());
  }
  info!("Metrics: {:#?}", scheduler.metrics_snapshot());

  // --- Shutdown ---
  match scheduler.shutdown_graceful(Some(StdDuration::from_secs(10))).await {
    Ok(()) => info!("Scheduler shut down successfully."),
    Err(e) => error!("Shutdown failed: {}", e),
  }
  Ok(())
}
