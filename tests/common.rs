//! tests/common.rs
//! Shared helper functions for integration tests.
#![allow(dead_code)]

use chrono::NaiveTime;
use nightgate::{
  BoxedJobBody, Clock, JobError, JobFields, JobFuture, JobRequest, JobResult, ResourceSlot,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::Instant;
use tracing_subscriber::fmt::TestWriter;

// Initializes tracing subscriber for test output.
pub fn setup_tracing() {
  // Use try_init to avoid panic if called multiple times
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_writer(TestWriter::new())
    .with_test_writer()
    .try_init();
}

/// A wall clock that starts at `base` and advances with Tokio time, so
/// `start_paused` tests can jump across window boundaries.
#[derive(Debug)]
pub struct TestClock {
  base: NaiveTime,
  origin: Instant,
}

impl TestClock {
  pub fn at(hour: u32, minute: u32, second: u32) -> Arc<Self> {
    Arc::new(Self {
      base: NaiveTime::from_hms_opt(hour, minute, second).unwrap(),
      origin: Instant::now(),
    })
  }
}

impl Clock for TestClock {
  fn now(&self) -> NaiveTime {
    let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap();
    self.base + elapsed
  }
}

pub fn slots(n: usize) -> Vec<ResourceSlot> {
  (0..n)
    .map(|i| ResourceSlot::new(format!("AUTOQR{}", i + 1), 11112 + i as u16))
    .collect()
}

pub fn requests(n: usize) -> Vec<JobRequest> {
  (1..=n)
    .map(|i| JobRequest::new(format!("P{i:03}"), format!("ACC{i:03}"), Some(format!("1.2.840.{i}"))))
    .collect()
}

pub fn anonymized(fields: &JobFields) -> JobResult {
  JobResult {
    record_date: "20240101".to_string(),
    subject_id: format!("ANON-{}", fields.subject_id),
    reference_id: format!("ANON-{}", fields.reference_id),
    sub_record_id: "2.25.1".to_string(),
  }
}

// A job body that counts executions and succeeds after `delay`.
pub fn body_counter(counter: Arc<AtomicUsize>, delay: StdDuration) -> BoxedJobBody {
  Arc::new(move |fields: JobFields, _slot: ResourceSlot| -> JobFuture {
    let ctr = counter.clone();
    Box::pin(async move {
      ctr.fetch_add(1, Ordering::SeqCst);
      if delay > StdDuration::ZERO {
        tokio::time::sleep(delay).await;
      }
      Ok::<_, JobError>(anonymized(&fields))
    })
  })
}

// A job body that fails for the listed subjects and succeeds for the rest.
pub fn body_failing_for(subjects: &[&str], delay: StdDuration) -> BoxedJobBody {
  let failing: Arc<HashSet<String>> = Arc::new(subjects.iter().map(|s| s.to_string()).collect());
  Arc::new(move |fields: JobFields, _slot: ResourceSlot| -> JobFuture {
    let failing = failing.clone();
    Box::pin(async move {
      if delay > StdDuration::ZERO {
        tokio::time::sleep(delay).await;
      }
      if failing.contains(&fields.subject_id) {
        Err(JobError::failed(format!("C-MOVE rejected for {}", fields.reference_id)))
      } else {
        Ok(anonymized(&fields))
      }
    })
  })
}

// A job body that panics for the listed subject and succeeds for the rest.
pub fn body_panicking_for(subject: &'static str) -> BoxedJobBody {
  Arc::new(move |fields: JobFields, _slot: ResourceSlot| -> JobFuture {
    Box::pin(async move {
      tokio::task::yield_now().await;
      if fields.subject_id == subject {
        panic!("Job forced panic!");
      }
      Ok::<_, JobError>(anonymized(&fields))
    })
  })
}

/// One job start as seen by the job body.
#[derive(Debug, Clone)]
pub struct Started {
  pub subject_id: String,
  pub port: u16,
  pub at: Instant,
}

// A job body that records who ran what through which slot, then sleeps.
pub fn body_recording(log: Arc<Mutex<Vec<Started>>>, delay: StdDuration) -> BoxedJobBody {
  Arc::new(move |fields: JobFields, slot: ResourceSlot| -> JobFuture {
    log.lock().push(Started {
      subject_id: fields.subject_id.clone(),
      port: slot.port,
      at: Instant::now(),
    });
    Box::pin(async move {
      if delay > StdDuration::ZERO {
        tokio::time::sleep(delay).await;
      }
      Ok::<_, JobError>(anonymized(&fields))
    })
  })
}

// Polls `cond` every 10ms until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: StdDuration, mut cond: F) -> bool
where
  F: FnMut() -> bool,
{
  let deadline = Instant::now() + limit;
  while Instant::now() < deadline {
    if cond() {
      return true;
    }
    tokio::time::sleep(StdDuration::from_millis(10)).await;
  }
  cond()
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
  std::fs::read_to_string(path)
    .unwrap()
    .lines()
    .map(str::to_string)
    .collect()
}
