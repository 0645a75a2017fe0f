//! `chronod-service` — validated job lifecycle operations.
//!
//! [`service::JobService`] is the write path for everything except
//! execution itself: create, inspect, update, pause, resume, delete,
//! and the execution-history listing. Every mutation persists first
//! and syncs the scheduler's trigger set second, so the engine's
//! pre-dispatch re-read of storage is always the source of truth.

pub mod service;
pub mod validate;

pub use service::{JobService, JobUpdate, NewJob};
