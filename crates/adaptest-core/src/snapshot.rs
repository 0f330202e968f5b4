//! Serializable attempt state with JSON persistence.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptConfig, AttemptState, PendingItem};
use crate::estimator::{EstimatorConfig, NormalPrior};
use crate::selector::SelectorConfig;
use crate::unidimensional::ResponseRecord;

/// State of one skill's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSnapshot {
    pub skill: String,
    pub theta: f64,
    pub standard_error: f64,
    /// Estimator configuration, including the prior.
    pub estimator: EstimatorConfig,
    pub selector: SelectorConfig,
    /// Full response history in answer order.
    pub responses: Vec<ResponseRecord>,
}

impl SkillSnapshot {
    pub fn prior(&self) -> NormalPrior {
        self.estimator.prior()
    }
}

/// Everything needed to rehydrate an attempt without replaying estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub attempt_id: String,
    pub state: AttemptState,
    /// Stopping and mastery configuration.
    pub config: AttemptConfig,
    /// Per-skill state in registration order.
    pub skills: Vec<SkillSnapshot>,
    pub mastery: BTreeMap<String, bool>,
    pub pending: Option<PendingItem>,
    pub items_administered: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle event a snapshot was emitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotEvent {
    Init,
    Step,
    Finish,
}

impl std::fmt::Display for SnapshotEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotEvent::Init => write!(f, "init"),
            SnapshotEvent::Step => write!(f, "step"),
            SnapshotEvent::Finish => write!(f, "finish"),
        }
    }
}

impl AttemptSnapshot {
    /// Save the snapshot as pretty JSON, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize snapshot")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        Ok(())
    }

    /// Load a snapshot from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot from {}", path.display()))?;
        let snapshot: AttemptSnapshot =
            serde_json::from_str(&content).context("failed to parse snapshot JSON")?;
        Ok(snapshot)
    }

    /// Total number of recorded responses across skills.
    pub fn response_count(&self) -> usize {
        self.skills.iter().map(|s| s.responses.len()).sum()
    }
}
