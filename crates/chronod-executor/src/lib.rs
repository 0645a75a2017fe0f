//! `chronod-executor` — runs one job under a timeout and records the outcome.
//!
//! [`JobExecutor::execute`] flips the job to running, dispatches its
//! handler from the [`handlers::HandlerRegistry`], enforces the per-job
//! deadline, and commits the Job statistics plus one finalized
//! `JobExecution` row atomically. Failures and timeouts become data
//! (rows and retry state), never errors to the caller.

pub mod executor;
pub mod handlers;

pub use executor::JobExecutor;
pub use handlers::{HandlerRegistry, JobHandler};
