//! `chronod-jobs` — job data model and SQLite-backed repository.
//!
//! # Overview
//!
//! Jobs and their execution history are persisted to the `jobs` and
//! `job_executions` tables. [`store::JobStore`] is the repository the
//! service layer, executor, and scheduler engine all go through; its
//! commit paths serialize per connection and keep job state plus
//! execution rows consistent under concurrent access.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::JobStore;
pub use types::{Job, JobExecution, JobFilter, JobStatus, JobType, Page};
