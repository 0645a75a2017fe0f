//! `chronod-scheduler` — the clock-driven scheduling engine.
//!
//! # Overview
//!
//! [`engine::SchedulerEngine`] owns an in-memory map of armed triggers
//! (job ID → next due time) and a tick loop that fires due jobs into a
//! bounded execution pool via `chronod-executor`. The companion
//! [`engine::SchedulerHandle`] shares the trigger map so the service
//! layer can arm, re-arm, and disarm jobs while the loop runs.
//!
//! # Guarantees
//!
//! - At most one execution per job ID is in flight; overlapping fires
//!   are coalesced.
//! - Persisted state is re-read immediately before dispatch, so stale
//!   triggers never fire deleted or paused jobs.
//! - A single job's dispatch failure is contained: logged, recorded on
//!   the job, trigger torn down — the loop keeps running.

pub mod engine;

pub use engine::{SchedulerEngine, SchedulerHandle};
