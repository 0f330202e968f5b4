//! Trait definitions for the engine's external seams.
//!
//! `ItemSource` supplies items to new attempts; `SnapshotSink` receives
//! attempt snapshots on every lifecycle event. Both are implemented in
//! `adaptest-core` (item banks) and `adaptest-service` (sinks).

use async_trait::async_trait;

use crate::item::Item;
use crate::snapshot::{AttemptSnapshot, SnapshotEvent};

/// Trait for item repositories.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Human-readable source name (e.g. the bank id).
    fn name(&self) -> &str;

    /// All skills the source has items for, in a stable order.
    async fn skills(&self) -> anyhow::Result<Vec<String>>;

    /// Eligible items, restricted to `skills` when given, in source order.
    async fn items(&self, skills: Option<&[String]>) -> anyhow::Result<Vec<Item>>;
}

/// Trait for persistence targets of attempt snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Short identifier (e.g. "json_directory").
    fn name(&self) -> &str;

    /// Persist `snapshot`, taken right after `event`.
    async fn emit(&self, event: SnapshotEvent, snapshot: &AttemptSnapshot) -> anyhow::Result<()>;
}
