use crate::error::{BatchError, JobError};
use crate::job::{JobFields, JobResult};

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

/// Header of the success log, one column per record field.
pub const SUCCESS_LOG_HEADER: &str = "StudyDate,OriginalPatientID,AnonymizedPatientID,OriginalAccessionNumber,AnonymizedAccessionNumber,OriginalStudyInstanceUID,AnonymizedStudyInstanceUID";

/// The per-batch success and error logs.
///
/// Append-only UTF-8 files. Each record is formatted in full and written with a
/// single `write_all`, then flushed. Callers serialize appends (the aggregator
/// holds its lock while writing), so lines never interleave.
#[derive(Debug)]
pub struct OutcomeLogs {
  success_path: PathBuf,
  error_path: PathBuf,
  success: File,
  errors: File,
}

impl OutcomeLogs {
  /// Creates `output_dir` (and parents) plus `<batch_id>.csv` and `<batch_id>_errors.txt`.
  pub fn create(output_dir: &Path, batch_id: &str) -> Result<Self, BatchError> {
    let wrap = |path: &Path| {
      let path = path.to_path_buf();
      move |source: io::Error| BatchError::LogCreation { path, source }
    };

    fs::create_dir_all(output_dir).map_err(wrap(output_dir))?;

    let success_path = output_dir.join(format!("{batch_id}.csv"));
    let error_path = output_dir.join(format!("{batch_id}_errors.txt"));

    let mut success = open_append(&success_path).map_err(wrap(&success_path))?;
    let is_new = success.metadata().map(|m| m.len() == 0).unwrap_or(true);
    if is_new {
      writeln!(success, "{SUCCESS_LOG_HEADER}").map_err(wrap(&success_path))?;
    }
    let errors = open_append(&error_path).map_err(wrap(&error_path))?;

    debug!(success_log = %success_path.display(), error_log = %error_path.display(), "Outcome logs created.");
    Ok(Self {
      success_path,
      error_path,
      success,
      errors,
    })
  }

  pub fn success_path(&self) -> &Path {
    &self.success_path
  }

  pub fn error_path(&self) -> &Path {
    &self.error_path
  }

  /// Appends `date,orig-id,new-id,orig-ref,new-ref,orig-sub,new-sub`.
  pub fn record_success(&mut self, fields: &JobFields, result: &JobResult) {
    let line = success_line(fields, result);
    if let Err(e) = append_line(&mut self.success, &line) {
      error!(path = %self.success_path.display(), error = %e, "Failed to append to success log.");
    }
  }

  /// Appends `orig-id,orig-ref,message`.
  pub fn record_error(&mut self, fields: &JobFields, err: &JobError) {
    let line = error_line(fields, err);
    if let Err(e) = append_line(&mut self.errors, &line) {
      error!(path = %self.error_path.display(), error = %e, "Failed to append to error log.");
    }
  }
}

pub fn success_line(fields: &JobFields, result: &JobResult) -> String {
  [
    result.record_date.as_str(),
    fields.subject_id.as_str(),
    result.subject_id.as_str(),
    fields.reference_id.as_str(),
    result.reference_id.as_str(),
    fields.sub_record_id.as_deref().unwrap_or(""),
    result.sub_record_id.as_str(),
  ]
  .join(",")
}

pub fn error_line(fields: &JobFields, err: &JobError) -> String {
  let message = err.to_string().replace(['\r', '\n'], " ");
  format!("{},{},{}", fields.subject_id, fields.reference_id, message)
}

fn open_append(path: &Path) -> io::Result<File> {
  OpenOptions::new().create(true).append(true).open(path)
}

fn append_line(file: &mut File, line: &str) -> io::Result<()> {
  let mut buf = String::with_capacity(line.len() + 1);
  buf.push_str(line);
  buf.push('\n');
  file.write_all(buf.as_bytes())?;
  file.flush()
}
