//! adaptest-service: attempt registry, snapshot sinks and configuration.
//!
//! Wraps `adaptest-core` attempts in an [`AttemptService`] that stores them,
//! serializes concurrent steps per attempt, and persists snapshots.

pub mod config;
pub mod error;
pub mod service;
pub mod sink;
pub mod store;

pub use config::{load_config, load_config_from, AdaptestConfig};
pub use error::{ServiceError, ServiceResult};
pub use service::{AttemptService, InitRequest};
pub use sink::{JsonDirectorySink, MemorySink, NoopSink};
pub use store::{AttemptStore, InMemoryAttemptStore, SharedAttempt};
