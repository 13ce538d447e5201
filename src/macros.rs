/// Macro to simplify creating a job body compatible closure.
///
/// Names the two arguments (job fields and resource slot), takes an optional
/// synchronous setup block and a mandatory async logic block. Handles the
/// necessary boxing (`Box::pin`) and the cast to [`JobFuture`](crate::JobFuture).
///
/// # Usage
///
/// ```ignore
/// # use nightgate::{job_body, JobError, JobResult};
/// # use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// # let job_counter = Arc::new(AtomicUsize::new(0));
/// // With setup block:
/// let body_1 = job_body! {
///     |fields, slot|
///     // Optional setup block runs on every call, before the future is built.
///     {
///         let counter = job_counter.clone(); // Clone Arcs here
///     }
///     // Main logic block (implicitly wrapped in `async move`).
///     {
///         counter.fetch_add(1, Ordering::SeqCst);
///         tracing::info!(subject = %fields.subject_id, %slot, "retrieving");
///         Ok::<_, JobError>(JobResult::default())
///     }
/// };
///
/// // Without setup block:
/// let body_2 = job_body! {
///     |_fields, _slot|
///     {
///         Err::<JobResult, _>(JobError::failed("remote refused the association"))
///     }
/// };
/// ```
#[macro_export]
macro_rules! job_body {
  // Only the main logic block. Tried first so a lone block is never taken
  // as a setup block.
  (
    |$fields:pat_param, $slot:pat_param|
    $main_block:block
  ) => {
    move |$fields: $crate::JobFields, $slot: $crate::ResourceSlot| {
      let fut = async move { $main_block };

      Box::pin(fut) as $crate::JobFuture
    }
  };

  // Setup block `{...}` followed by the main logic block `{...}`.
  (
    |$fields:pat_param, $slot:pat_param|
    { $($setup_stmts:stmt);* $(;)? }
    $main_block:block
  ) => {
    move |$fields: $crate::JobFields, $slot: $crate::ResourceSlot| {
      $($setup_stmts;)*

      let fut = async move { $main_block };

      Box::pin(fut) as $crate::JobFuture
    }
  };
}
