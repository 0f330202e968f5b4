//! Engine configuration and loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use adaptest_core::attempt::{AttemptConfig, MasteryConfig, SkillBudgetPolicy};
use adaptest_core::error::{EngineError, EngineResult};
use adaptest_core::estimator::EstimatorConfig;
use adaptest_core::selector::SelectorConfig;

/// Top-level adaptest configuration (`adaptest.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptestConfig {
    /// Global item budget per attempt.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Drop attempts from the store once they finish.
    #[serde(default)]
    pub evict_finished: bool,
    /// Where to write JSON snapshots, if anywhere.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub mastery: MasteryConfig,
    /// Per-skill item budgets.
    #[serde(default)]
    pub skill_max_items: BTreeMap<String, usize>,
    /// Whether a spent skill budget ends the attempt or only retires the skill.
    #[serde(default)]
    pub on_skill_budget: SkillBudgetPolicy,
}

fn default_max_items() -> usize {
    20
}

impl Default for AdaptestConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            evict_finished: false,
            snapshot_dir: None,
            estimator: EstimatorConfig::default(),
            selector: SelectorConfig::default(),
            mastery: MasteryConfig::default(),
            skill_max_items: BTreeMap::new(),
            on_skill_budget: SkillBudgetPolicy::default(),
        }
    }
}

impl AdaptestConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        self.estimator.validate()?;
        self.selector.validate()?;
        self.mastery.validate()?;
        if let Some(dir) = &self.snapshot_dir {
            if dir.as_os_str().is_empty() {
                return Err(EngineError::InvalidConfig("snapshot_dir is empty".into()));
            }
        }
        Ok(())
    }

    /// Stopping configuration for a new attempt, optionally with a different budget.
    pub fn attempt_config(&self, max_items: Option<usize>) -> AttemptConfig {
        AttemptConfig {
            max_items: max_items.unwrap_or(self.max_items),
            skill_max_items: self.skill_max_items.clone(),
            on_skill_budget: self.on_skill_budget,
            mastery: self.mastery.clone(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are not expanded again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Apply `ADAPTEST_*` overrides, reading variables through `lookup`.
fn apply_env_overrides(
    mut config: AdaptestConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AdaptestConfig> {
    if let Some(raw) = lookup("ADAPTEST_MAX_ITEMS") {
        config.max_items = raw
            .trim()
            .parse()
            .with_context(|| format!("ADAPTEST_MAX_ITEMS is not a count: {raw}"))?;
    }

    let prior = config.estimator.prior();
    let mut mu = prior.mu;
    let mut sigma2 = prior.sigma2;
    if let Some(raw) = lookup("ADAPTEST_PRIOR_MU") {
        mu = raw
            .trim()
            .parse()
            .with_context(|| format!("ADAPTEST_PRIOR_MU is not a number: {raw}"))?;
    }
    if let Some(raw) = lookup("ADAPTEST_PRIOR_SIGMA2") {
        sigma2 = raw
            .trim()
            .parse()
            .with_context(|| format!("ADAPTEST_PRIOR_SIGMA2 is not a number: {raw}"))?;
    }
    config.estimator = config.estimator.with_prior(mu, sigma2);

    Ok(config)
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `adaptest.toml` in the current directory
/// 2. `~/.config/adaptest/config.toml`
///
/// Environment variable overrides: `ADAPTEST_MAX_ITEMS`, `ADAPTEST_PRIOR_MU`,
/// `ADAPTEST_PRIOR_SIGMA2`.
pub fn load_config() -> Result<AdaptestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AdaptestConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("adaptest.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<AdaptestConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AdaptestConfig::default(),
    };

    let mut config = apply_env_overrides(config, |name| std::env::var(name).ok())?;
    config.snapshot_dir = config
        .snapshot_dir
        .map(|dir| PathBuf::from(resolve_env_vars(&dir.to_string_lossy())));

    config.validate().context("invalid configuration")?;
    tracing::debug!(
        path = ?config_path,
        max_items = config.max_items,
        "configuration loaded"
    );
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("adaptest"))
}
