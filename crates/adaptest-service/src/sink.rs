//! Snapshot sinks.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;

use adaptest_core::snapshot::{AttemptSnapshot, SnapshotEvent};
use adaptest_core::traits::SnapshotSink;

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl SnapshotSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn emit(&self, _event: SnapshotEvent, _snapshot: &AttemptSnapshot) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps every emitted snapshot in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(SnapshotEvent, AttemptSnapshot)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(SnapshotEvent, AttemptSnapshot)> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Events emitted for one attempt.
    pub fn events_for(&self, attempt_id: &str) -> Vec<SnapshotEvent> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, snap)| snap.attempt_id == attempt_id)
            .map(|(event, _)| *event)
            .collect()
    }

    /// Most recent snapshot of one attempt.
    pub fn latest(&self, attempt_id: &str) -> Option<AttemptSnapshot> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(_, snap)| snap.attempt_id == attempt_id)
            .map(|(_, snap)| snap.clone())
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn emit(&self, event: SnapshotEvent, snapshot: &AttemptSnapshot) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((event, snapshot.clone()));
        Ok(())
    }
}

/// Writes `<dir>/<attempt_id>.json`, overwritten on every event.
#[derive(Debug, Clone)]
pub struct JsonDirectorySink {
    dir: PathBuf,
}

impl JsonDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `attempt_id`. Ids that could name a file outside `dir` are rejected.
    pub fn path_for(&self, attempt_id: &str) -> anyhow::Result<PathBuf> {
        let safe = !attempt_id.is_empty()
            && attempt_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        anyhow::ensure!(safe, "attempt id {attempt_id:?} is not a valid snapshot file name");
        Ok(self.dir.join(format!("{attempt_id}.json")))
    }
}

#[async_trait]
impl SnapshotSink for JsonDirectorySink {
    fn name(&self) -> &str {
        "json_directory"
    }

    async fn emit(&self, event: SnapshotEvent, snapshot: &AttemptSnapshot) -> anyhow::Result<()> {
        let path = self.path_for(&snapshot.attempt_id)?;
        let snapshot = snapshot.clone();
        tracing::debug!(%event, path = %path.display(), "writing snapshot");
        tokio::task::spawn_blocking(move || snapshot.save_json(&path))
            .await
            .context("snapshot writer task failed")?
    }
}
