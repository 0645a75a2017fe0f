//! `chronod-core` — configuration and shared error taxonomy.
//!
//! Every other chronod crate depends on this one for the config types
//! loaded by the daemon and for [`error::ChronodError`], the typed
//! failure surface the service layer exposes to an API layer.

pub mod config;
pub mod error;

pub use config::{ChronodConfig, DatabaseConfig, SchedulerConfig};
pub use error::{ChronodError, Result};
