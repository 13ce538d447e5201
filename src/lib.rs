//! NightGate: A Time-Windowed Retrieval Scheduler
//!
//! Drains a batch of retrieval jobs through a fixed pool of workers, but only
//! while the local wall clock is inside one of a set of permitted daily
//! windows (e.g. overnight, `1800`-`0700`). Outside the windows no new job is
//! started; jobs already running are left to finish.
//!
//! # Features
//!
//! - Daily windows given as `HHMM` pairs, including windows that wrap midnight.
//! - A fixed worker pool. Each worker is bound to its own [`ResourceSlot`]
//!   (an outbound identity and receive port) for its whole lifetime.
//! - Staggered startup: when the gate opens, worker `i` starts pulling only
//!   after `i * startup_delay`, so a remote peer is not hit by every worker at once.
//! - One batch at a time: load, start, pause, resume. Loading a new batch
//!   atomically replaces whatever was still queued.
//! - Exactly-once outcome accounting per job, progress callbacks with a rate
//!   estimate, and a single completion notification per batch.
//! - Per-batch success CSV and error log under the batch's output directory.
//! - Panic isolation: a panicking job body fails that one job; the worker keeps going.
//! - Async or blocking job bodies. A blocking body (`build_blocking`) runs on the
//!   blocking thread pool and never stalls the gate or the controller.
//! - Pool metrics (queryable snapshot using `PoolMetricsSnapshot`).
//! - Optional Serde support for public types (requires the `serde` feature)
//!   and TOML configuration (requires the `toml_config` feature).
//!
//! # Usage
//!
//! ```no_run
//! use nightgate::{JobError, JobFuture, JobRequest, JobResult, ResourceSlot, RetrievalScheduler};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // tracing_subscriber::fmt().with_env_filter("warn,nightgate=info").init();
//!
//!     let scheduler = RetrievalScheduler::builder()
//!         .worker_count(2)
//!         .resource_slots(vec![
//!             ResourceSlot::new("AUTOQR1", 11112),
//!             ResourceSlot::new("AUTOQR2", 11113),
//!         ])
//!         .interval("1800", "0700")
//!         .startup_delay(Duration::from_secs(10))
//!         .on_progress(|p| println!("{}/{} ({:.1}/h)", p.completed, p.total, p.rate_per_hour))
//!         .build(|fields, slot| -> JobFuture {
//!             Box::pin(async move {
//!                 println!("retrieving {} via {}", fields.reference_id, slot);
//!                 Ok::<_, JobError>(JobResult::default())
//!             })
//!         })?;
//!
//!     let batch = vec![
//!         JobRequest::new("P001", "ACC001", None),
//!         JobRequest::new("P002", "ACC002", None),
//!     ];
//!     let info = scheduler.submit_batch(batch, "/data/out/1017")?;
//!     println!("batch {} loaded", info.batch_id);
//!
//!     // ... wait for completion ...
//!
//!     scheduler.shutdown_graceful(Some(Duration::from_secs(60))).await?;
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod job;
mod macros;
pub mod metrics;
pub mod outcome_log;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod throttle;
mod worker;

// --- Public Re-exports ---

// Core scheduler components
pub use scheduler::{RetrievalScheduler, SchedulerBuilder};
pub use config::SchedulerConfig;
pub use controller::{BatchController, BatchInfo, BatchState};
pub use pool::{PoolParts, WorkerPool};
pub use queue::TaskQueue;

// Time and windows
pub use clock::{until_from, Clock, Interval, SystemClock, TimeOfDay};
pub use gate::{GateState, ScheduleGate};
pub use throttle::StartupThrottle;

// Outcome accounting
pub use aggregator::{BatchSnapshot, Progress, ResultAggregator};
pub use outcome_log::OutcomeLogs;

// Error types
pub use error::{BatchError, BuildError, FormatError, JobError, ShutdownError};

// Job related types
pub use job::{BoxedBlockingJobBody, BoxedJobBody, Job, JobBody, JobFields, JobFuture, JobId, JobRequest, JobResult, ResourceSlot, WorkerId};

// Metrics related types
pub use metrics::{PoolMetrics, PoolMetricsSnapshot};
