use crate::error::JobError;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

// --- Public Type Aliases ---

/// Identifier of a single job, used for tracing. Uses UUID v4.
pub type JobId = Uuid;

/// Simple numeric ID of a worker; also its index into the resource slot list.
pub type WorkerId = usize;

/// The future a job body returns.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<JobResult, JobError>> + Send + 'static>>;

/// The injected job body: retrieve one record through the given slot.
///
/// Opaque to the scheduler. It may run for seconds to minutes and may fail;
/// panics are caught by the worker and reported as [`JobError::Panicked`].
pub type BoxedJobBody = Arc<dyn Fn(JobFields, ResourceSlot) -> JobFuture + Send + Sync + 'static>;

/// A job body that blocks its calling thread (e.g. waits on a subprocess).
///
/// Each call runs on Tokio's blocking thread pool, so a long call never holds
/// up the gate timer, pause requests or outcome accounting.
pub type BoxedBlockingJobBody =
  Arc<dyn Fn(JobFields, ResourceSlot) -> Result<JobResult, JobError> + Send + Sync + 'static>;

/// Called once with the job, the body's result and the elapsed time.
pub type SuccessHandler = Arc<dyn Fn(&JobFields, &JobResult, Duration) + Send + Sync + 'static>;

/// Called once with the job and the error it failed with.
pub type FailureHandler = Arc<dyn Fn(&JobFields, &JobError) + Send + Sync + 'static>;

/// The job body a pool runs, either async or blocking.
#[derive(Clone)]
pub enum JobBody {
  /// Polled as a spawned task on the async runtime.
  Async(BoxedJobBody),
  /// Called on the blocking thread pool.
  Blocking(BoxedBlockingJobBody),
}

impl fmt::Debug for JobBody {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      JobBody::Async(_) => f.write_str("JobBody::Async(<Fn>)"),
      JobBody::Blocking(_) => f.write_str("JobBody::Blocking(<Fn>)"),
    }
  }
}

impl From<BoxedJobBody> for JobBody {
  fn from(body: BoxedJobBody) -> Self {
    JobBody::Async(body)
  }
}

impl From<BoxedBlockingJobBody> for JobBody {
  fn from(body: BoxedBlockingJobBody) -> Self {
    JobBody::Blocking(body)
  }
}

// --- Core Job Structures ---

/// Identifying fields of one retrieval job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobFields {
  /// Subject (patient) identifier.
  pub subject_id: String,
  /// Accession-like reference identifier.
  pub reference_id: String,
  /// Optional sub-record (study instance) identifier.
  pub sub_record_id: Option<String>,
  /// Directory the retrieved data is written under.
  pub output_dir: PathBuf,
}

impl JobFields {
  pub fn new(
    subject_id: impl Into<String>,
    reference_id: impl Into<String>,
    sub_record_id: Option<String>,
    output_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      subject_id: subject_id.into(),
      reference_id: reference_id.into(),
      sub_record_id: sub_record_id.filter(|s| !s.is_empty()),
      output_dir: output_dir.into(),
    }
  }
}

/// The produced (anonymized) identifiers a successful job body returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobResult {
  pub record_date: String,
  pub subject_id: String,
  pub reference_id: String,
  pub sub_record_id: String,
}

/// An outbound identity and receive port bound to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceSlot {
  pub identity: String,
  pub port: u16,
}

impl ResourceSlot {
  pub fn new(identity: impl Into<String>, port: u16) -> Self {
    Self {
      identity: identity.into(),
      port,
    }
  }
}

impl fmt::Display for ResourceSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.identity, self.port)
  }
}

/// One unit of queued work: immutable fields plus the two continuations.
///
/// Consumed by [`Job::complete`], so exactly one handler runs exactly once.
pub struct Job {
  id: JobId,
  fields: JobFields,
  on_success: SuccessHandler,
  on_failure: FailureHandler,
}

impl Job {
  pub fn new(fields: JobFields, on_success: SuccessHandler, on_failure: FailureHandler) -> Self {
    Self {
      id: Uuid::new_v4(),
      fields,
      on_success,
      on_failure,
    }
  }

  pub fn id(&self) -> JobId {
    self.id
  }

  pub fn fields(&self) -> &JobFields {
    &self.fields
  }

  /// Delivers the outcome to the matching handler and consumes the job.
  pub fn complete(self, outcome: Result<(JobResult, Duration), JobError>) {
    match outcome {
      Ok((result, elapsed)) => (self.on_success)(&self.fields, &result, elapsed),
      Err(e) => (self.on_failure)(&self.fields, &e),
    }
  }
}

impl fmt::Debug for Job {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Job")
      .field("id", &self.id)
      .field("fields", &self.fields)
      .field("on_success", &format_args!("<Fn>"))
      .field("on_failure", &format_args!("<Fn>"))
      .finish()
  }
}

/// One entry of a submitted batch, before the output directory is attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobRequest {
  pub subject_id: String,
  pub reference_id: String,
  pub sub_record_id: Option<String>,
}

impl JobRequest {
  pub fn new(
    subject_id: impl Into<String>,
    reference_id: impl Into<String>,
    sub_record_id: Option<String>,
  ) -> Self {
    Self {
      subject_id: subject_id.into(),
      reference_id: reference_id.into(),
      sub_record_id,
    }
  }

  pub fn into_fields(self, output_dir: impl Into<PathBuf>) -> JobFields {
    JobFields::new(self.subject_id, self.reference_id, self.sub_record_id, output_dir)
  }
}
