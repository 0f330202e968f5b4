//! The attempt state machine.
//!
//! An [`Attempt`] owns one [`MultidimensionalModel`] and walks it through a
//! single student's session: `init` selects the first item, each `step`
//! records the pending item's response, refreshes mastery and selects the
//! next item, until the item budget or the eligible items run out.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::estimator::EstimatorConfig;
use crate::item::{Item, ItemPool, PublicItem};
use crate::multidimensional::MultidimensionalModel;
use crate::selector::SelectorConfig;
use crate::snapshot::AttemptSnapshot;
use crate::unidimensional::UnidimensionalModel;

/// Lifecycle state of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    Active,
    Finished,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Active => write!(f, "ACTIVE"),
            AttemptState::Finished => write!(f, "FINISHED"),
        }
    }
}

/// What the caller should do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    Continue,
    Finish,
}

/// When a skill counts as mastered.
///
/// A skill is mastered iff a threshold applies to it (its own entry in
/// `thresholds`, else `default_threshold`) and its theta is at or above it.
/// Omitted fields take their [`Default`] values; `default_threshold = "none"`
/// leaves skills without their own entry unmasterable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryConfig {
    #[serde(with = "threshold_setting")]
    pub default_threshold: Option<f64>,
    pub thresholds: BTreeMap<String, f64>,
    /// Stop asking items from a skill once it is mastered.
    pub retire_mastered: bool,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            default_threshold: Some(1.0),
            thresholds: BTreeMap::new(),
            retire_mastered: false,
        }
    }
}

/// A threshold written either as a number or as the keyword `"none"`.
mod threshold_setting {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const NONE: &str = "none";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Setting {
        Value(f64),
        Keyword(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(threshold) => s.serialize_f64(*threshold),
            None => s.serialize_str(NONE),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Setting::deserialize(d)? {
            Setting::Value(threshold) => Ok(Some(threshold)),
            Setting::Keyword(keyword) if keyword == NONE => Ok(None),
            Setting::Keyword(other) => Err(D::Error::custom(format!(
                "expected a number or \"{NONE}\", got \"{other}\""
            ))),
        }
    }
}

impl MasteryConfig {
    /// A policy under which no skill is ever mastered.
    pub fn disabled() -> Self {
        Self {
            default_threshold: None,
            ..Self::default()
        }
    }

    pub fn threshold_for(&self, skill: &str) -> Option<f64> {
        self.thresholds
            .get(skill)
            .copied()
            .or(self.default_threshold)
    }

    pub fn is_mastered(&self, skill: &str, theta: f64) -> bool {
        self.threshold_for(skill)
            .is_some_and(|threshold| theta >= threshold)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let all = self
            .default_threshold
            .iter()
            .map(|t| ("default", *t))
            .chain(self.thresholds.iter().map(|(s, t)| (s.as_str(), *t)));
        for (skill, threshold) in all {
            if !threshold.is_finite() {
                return Err(EngineError::InvalidConfig(format!(
                    "mastery threshold for {skill} must be finite"
                )));
            }
        }
        Ok(())
    }
}

/// What happens once a skill has used its entry in `skill_max_items`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillBudgetPolicy {
    /// The attempt finishes.
    #[default]
    Finish,
    /// Only that skill leaves selection; the others continue.
    Retire,
}

/// Stopping configuration of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptConfig {
    /// Global item budget.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Optional per-skill budgets.
    #[serde(default)]
    pub skill_max_items: BTreeMap<String, usize>,
    #[serde(default)]
    pub on_skill_budget: SkillBudgetPolicy,
    #[serde(default)]
    pub mastery: MasteryConfig,
}

fn default_max_items() -> usize {
    20
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            skill_max_items: BTreeMap::new(),
            on_skill_budget: SkillBudgetPolicy::default(),
            mastery: MasteryConfig::default(),
        }
    }
}

/// The item administered but not yet answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    pub item_id: String,
    pub skill: String,
}

/// A submitted response: either an explicit correctness flag or an option
/// index graded against the item's answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Graded { item_id: String, correct: bool },
    Choice { item_id: String, answer_index: usize },
}

impl Answer {
    pub fn item_id(&self) -> &str {
        match self {
            Answer::Graded { item_id, .. } | Answer::Choice { item_id, .. } => item_id,
        }
    }
}

/// Public response shape returned after init and every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptView {
    pub attempt_id: String,
    pub theta: BTreeMap<String, f64>,
    pub mastery: BTreeMap<String, bool>,
    pub next_action: NextAction,
    pub next_item: Option<PublicItem>,
}

/// Read-only diagnostic projection of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptDiagnostics {
    pub attempt_id: String,
    pub state: AttemptState,
    pub theta: BTreeMap<String, f64>,
    pub standard_error: BTreeMap<String, f64>,
    pub mastery: BTreeMap<String, bool>,
    /// Answered item ids per skill, in answer order.
    pub administered: BTreeMap<String, Vec<String>>,
    /// Unadministered item ids per skill, in pool order.
    pub remaining: BTreeMap<String, Vec<String>>,
    pub pending: Option<PublicItem>,
    pub items_administered: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One student's adaptive session across one or more skills.
#[derive(Debug)]
pub struct Attempt {
    attempt_id: String,
    model: MultidimensionalModel,
    state: AttemptState,
    config: AttemptConfig,
    mastery: BTreeMap<String, bool>,
    pending: Option<PendingItem>,
    items_administered: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Attempt {
    /// Build an attempt over `pools` and select its first item.
    ///
    /// Every skill starts at the estimator's prior mean. The attempt is
    /// finished immediately when `max_items` is 0 or every pool is empty.
    pub fn init(
        attempt_id: impl Into<String>,
        pools: Vec<ItemPool>,
        estimator: &EstimatorConfig,
        selector: &SelectorConfig,
        config: AttemptConfig,
    ) -> EngineResult<Self> {
        config.mastery.validate()?;
        estimator.validate()?;
        selector.validate()?;

        let initial_theta = estimator.prior().mu;
        let mut model = MultidimensionalModel::new();
        for pool in pools {
            let skill = pool.skill().to_string();
            model.add_model(
                skill,
                pool,
                initial_theta,
                estimator.clone(),
                selector.clone(),
            )?;
        }

        let now = Utc::now();
        let mut attempt = Self {
            attempt_id: attempt_id.into(),
            model,
            state: AttemptState::Active,
            config,
            mastery: BTreeMap::new(),
            pending: None,
            items_administered: 0,
            created_at: now,
            updated_at: now,
        };
        attempt.refresh_mastery();
        attempt.advance();

        tracing::info!(
            attempt_id = %attempt.attempt_id,
            skills = attempt.model.skills().count(),
            state = %attempt.state,
            "attempt initialized"
        );
        Ok(attempt)
    }

    /// Rehydrate an attempt from a snapshot without replaying estimation.
    ///
    /// `pools` supplies the items for each snapshotted skill; pools for other
    /// skills are ignored and a missing pool is treated as empty.
    pub fn restore(snapshot: &AttemptSnapshot, pools: Vec<ItemPool>) -> EngineResult<Self> {
        snapshot.config.mastery.validate()?;
        let mut by_skill: BTreeMap<String, ItemPool> = pools
            .into_iter()
            .map(|pool| (pool.skill().to_string(), pool))
            .collect();

        let mut model = MultidimensionalModel::new();
        for skill in &snapshot.skills {
            let pool = by_skill
                .remove(&skill.skill)
                .unwrap_or_else(|| ItemPool::empty(skill.skill.clone()));
            model.insert_model(UnidimensionalModel::restore(skill, pool)?)?;
        }

        if let Some(pending) = &snapshot.pending {
            let pool = model.model(&pending.skill)?.pool();
            if !pool.contains(&pending.item_id) {
                return Err(EngineError::ItemNotInPool {
                    skill: pending.skill.clone(),
                    item_id: pending.item_id.clone(),
                });
            }
            if pool.is_administered(&pending.item_id) {
                return Err(EngineError::AlreadyAdministered(pending.item_id.clone()));
            }
        }

        tracing::info!(
            attempt_id = %snapshot.attempt_id,
            responses = snapshot.response_count(),
            "attempt restored"
        );
        Ok(Self {
            attempt_id: snapshot.attempt_id.clone(),
            model,
            state: snapshot.state,
            config: snapshot.config.clone(),
            mastery: snapshot.mastery.clone(),
            pending: snapshot.pending.clone(),
            items_administered: snapshot.items_administered,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        })
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == AttemptState::Finished
    }

    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }

    pub fn model(&self) -> &MultidimensionalModel {
        &self.model
    }

    pub fn items_administered(&self) -> usize {
        self.items_administered
    }

    pub fn pending(&self) -> Option<&PendingItem> {
        self.pending.as_ref()
    }

    /// The full pending item, including its answer key.
    pub fn pending_item(&self) -> Option<&Item> {
        let pending = self.pending.as_ref()?;
        self.model
            .model(&pending.skill)
            .ok()?
            .pool()
            .get(&pending.item_id)
    }

    /// Record the response to the pending item and move to the next one.
    pub fn step(&mut self, item_id: &str, correct: bool) -> EngineResult<AttemptView> {
        let pending = self.check_pending(item_id)?.clone();
        let theta = self
            .model
            .record_response(&pending.skill, &pending.item_id, correct)?;

        self.items_administered += 1;
        self.pending = None;
        self.refresh_mastery();
        self.advance();
        self.updated_at = Utc::now();

        tracing::debug!(
            attempt_id = %self.attempt_id,
            skill = %pending.skill,
            item_id = %pending.item_id,
            correct,
            theta,
            "response recorded"
        );
        if self.is_finished() {
            tracing::info!(
                attempt_id = %self.attempt_id,
                items = self.items_administered,
                "attempt finished"
            );
        }
        Ok(self.view())
    }

    /// Grade `answer` against the pending item if needed, then [`Self::step`].
    pub fn submit(&mut self, answer: &Answer) -> EngineResult<AttemptView> {
        let correct = match answer {
            Answer::Graded { item_id, correct } => {
                self.check_pending(item_id)?;
                *correct
            }
            Answer::Choice {
                item_id,
                answer_index,
            } => {
                let pending = self.check_pending(item_id)?.clone();
                let item = self
                    .model
                    .model(&pending.skill)?
                    .pool()
                    .get(&pending.item_id)
                    .ok_or_else(|| EngineError::ItemNotInPool {
                        skill: pending.skill.clone(),
                        item_id: pending.item_id.clone(),
                    })?;
                item.grade(*answer_index)?
            }
        };
        self.step(answer.item_id(), correct)
    }

    fn check_pending(&self, item_id: &str) -> EngineResult<&PendingItem> {
        if self.is_finished() {
            return Err(EngineError::AttemptFinished(self.attempt_id.clone()));
        }
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| EngineError::NoPendingItem(self.attempt_id.clone()))?;
        if pending.item_id != item_id {
            return Err(EngineError::PendingMismatch {
                expected: pending.item_id.clone(),
                got: item_id.to_string(),
            });
        }
        Ok(pending)
    }

    fn refresh_mastery(&mut self) {
        self.mastery = self
            .model
            .models()
            .map(|m| {
                let mastered = self.config.mastery.is_mastered(m.skill(), m.get_theta());
                (m.skill().to_string(), mastered)
            })
            .collect();
    }

    /// Skills whose per-skill budget is used up.
    fn spent_skills(&self) -> HashSet<String> {
        self.model
            .models()
            .filter(|m| {
                self.config
                    .skill_max_items
                    .get(m.skill())
                    .is_some_and(|&max| m.responses().len() >= max)
            })
            .map(|m| m.skill().to_string())
            .collect()
    }

    /// Select the next pending item, or finish.
    fn advance(&mut self) {
        if self.items_administered >= self.config.max_items {
            self.finish();
            return;
        }
        let mut retired = self.spent_skills();
        if !retired.is_empty() && self.config.on_skill_budget == SkillBudgetPolicy::Finish {
            tracing::debug!(attempt_id = %self.attempt_id, ?retired, "skill budget reached");
            self.finish();
            return;
        }
        if self.config.mastery.retire_mastered {
            retired.extend(
                self.mastery
                    .iter()
                    .filter(|(_, &mastered)| mastered)
                    .map(|(skill, _)| skill.clone()),
            );
        }
        let next = self
            .model
            .get_next_item_excluding(&retired)
            .map(|item| PendingItem {
                item_id: item.item_id.clone(),
                skill: item.skill.clone(),
            });
        match next {
            Some(pending) => self.pending = Some(pending),
            None => self.finish(),
        }
    }

    fn finish(&mut self) {
        self.state = AttemptState::Finished;
        self.pending = None;
    }

    fn thetas(&self) -> BTreeMap<String, f64> {
        self.model.thetas().into_iter().collect()
    }

    /// The public response shape for the current state.
    pub fn view(&self) -> AttemptView {
        AttemptView {
            attempt_id: self.attempt_id.clone(),
            theta: self.thetas(),
            mastery: self.mastery.clone(),
            next_action: match self.state {
                AttemptState::Active => NextAction::Continue,
                AttemptState::Finished => NextAction::Finish,
            },
            next_item: self.pending_item().map(Item::to_public),
        }
    }

    pub fn diagnostics(&self) -> AttemptDiagnostics {
        let mut standard_error = BTreeMap::new();
        let mut administered = BTreeMap::new();
        let mut remaining = BTreeMap::new();
        for m in self.model.models() {
            let skill = m.skill().to_string();
            standard_error.insert(skill.clone(), m.get_standard_error());
            administered.insert(
                skill.clone(),
                m.responses().iter().map(|r| r.item_id.clone()).collect(),
            );
            remaining.insert(
                skill,
                m.pool().remaining().map(|i| i.item_id.clone()).collect(),
            );
        }
        AttemptDiagnostics {
            attempt_id: self.attempt_id.clone(),
            state: self.state,
            theta: self.thetas(),
            standard_error,
            mastery: self.mastery.clone(),
            administered,
            remaining,
            pending: self.pending_item().map(Item::to_public),
            items_administered: self.items_administered,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot {
            attempt_id: self.attempt_id.clone(),
            state: self.state,
            config: self.config.clone(),
            skills: self.model.models().map(|m| m.snapshot()).collect(),
            mastery: self.mastery.clone(),
            pending: self.pending.clone(),
            items_administered: self.items_administered,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::item::ItemParams;

    fn pool(skill: &str, n: usize) -> ItemPool {
        let items = (0..n)
            .map(|i| {
                Item::new(
                    format!("{}-{i}", skill.to_lowercase()),
                    skill,
                    ItemParams {
                        a: 1.0 + i as f64 * 0.1,
                        b: i as f64 * 0.4 - 1.0,
                        c: 0.2,
                    },
                )
                .unwrap()
                .with_presentation(
                    format!("question {i}"),
                    vec!["A".into(), "B".into(), "C".into(), "D".into()],
                    Some(i % 4),
                )
            })
            .collect();
        ItemPool::new(skill, items).unwrap()
    }

    fn attempt(pools: Vec<ItemPool>, config: AttemptConfig) -> Attempt {
        Attempt::init(
            "attempt-1",
            pools,
            &EstimatorConfig::default(),
            &SelectorConfig::default(),
            config,
        )
        .unwrap()
    }

    fn answer_pending(attempt: &mut Attempt, correct: bool) -> AttemptView {
        let id = attempt.pending().unwrap().item_id.clone();
        attempt.step(&id, correct).unwrap()
    }

    #[test]
    fn init_selects_first_item() {
        let a = attempt(vec![pool("Testing", 3)], AttemptConfig::default());
        let view = a.view();
        assert_eq!(a.state(), AttemptState::Active);
        assert_eq!(view.next_action, NextAction::Continue);
        let next = view.next_item.unwrap();
        assert_eq!(next.skill, "Testing");
        assert_eq!(a.pending().unwrap().item_id, next.item_id);
        assert_eq!(view.theta["Testing"], 0.0);
    }

    #[test]
    fn init_finishes_when_nothing_to_ask() {
        let a = attempt(
            vec![ItemPool::empty("Testing"), ItemPool::empty("Architecture")],
            AttemptConfig::default(),
        );
        assert!(a.is_finished());
        assert_eq!(a.view().next_action, NextAction::Finish);
        assert!(a.view().next_item.is_none());

        let b = attempt(
            vec![pool("Testing", 3)],
            AttemptConfig {
                max_items: 0,
                ..AttemptConfig::default()
            },
        );
        assert!(b.is_finished());
    }

    #[test]
    fn single_item_budget_finishes_after_one_step() {
        let mut a = attempt(
            vec![pool("Testing", 5)],
            AttemptConfig {
                max_items: 1,
                ..AttemptConfig::default()
            },
        );
        let id = a.pending().unwrap().item_id.clone();
        let view = a.step(&id, true).unwrap();
        assert_eq!(view.next_action, NextAction::Finish);
        assert!(view.next_item.is_none());

        let err = a.step(&id, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(a.items_administered(), 1);
    }

    #[test]
    fn exhaustion_finishes_attempt() {
        let mut a = attempt(vec![pool("Testing", 2)], AttemptConfig::default());
        assert_eq!(answer_pending(&mut a, true).next_action, NextAction::Continue);
        assert_eq!(answer_pending(&mut a, false).next_action, NextAction::Finish);
        assert_eq!(a.diagnostics().remaining["Testing"].len(), 0);
    }

    #[test]
    fn wrong_item_is_rejected_without_mutation() {
        let mut a = attempt(vec![pool("Testing", 3)], AttemptConfig::default());
        let before = a.snapshot();
        let pending = a.pending().unwrap().item_id.clone();
        let other = a
            .model()
            .model("Testing")
            .unwrap()
            .pool()
            .remaining()
            .map(|i| i.item_id.clone())
            .find(|id| *id != pending)
            .unwrap();

        let err = a.step(&other, true).unwrap_err();
        assert!(matches!(err, EngineError::PendingMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(a.snapshot(), before);
    }

    #[test]
    fn weakest_skill_gets_next_item() {
        let mut a = attempt(
            vec![pool("Testing", 4), pool("Architecture", 4)],
            AttemptConfig::default(),
        );
        // Both start at the prior mean; the first registered skill goes first.
        assert_eq!(a.pending().unwrap().skill, "Testing");
        let view = answer_pending(&mut a, true);
        assert_eq!(view.next_item.unwrap().skill, "Architecture");
        let view = answer_pending(&mut a, false);
        assert_eq!(view.next_item.unwrap().skill, "Architecture");
    }

    #[test]
    fn skill_budget_finishes_attempt() {
        let mut a = attempt(
            vec![pool("Testing", 4), pool("Architecture", 4)],
            AttemptConfig {
                skill_max_items: BTreeMap::from([("Testing".to_string(), 1)]),
                ..AttemptConfig::default()
            },
        );
        assert_eq!(a.pending().unwrap().skill, "Testing");
        let view = answer_pending(&mut a, true);
        assert_eq!(view.next_action, NextAction::Finish);
        assert!(view.next_item.is_none());
        assert!(a.is_finished());
        assert_eq!(a.diagnostics().remaining["Architecture"].len(), 4);
    }

    #[test]
    fn zero_skill_budget_finishes_at_init() {
        let a = attempt(
            vec![pool("Testing", 2), pool("Architecture", 2)],
            AttemptConfig {
                skill_max_items: BTreeMap::from([("Architecture".to_string(), 0)]),
                ..AttemptConfig::default()
            },
        );
        assert!(a.is_finished());
    }

    #[test]
    fn retire_policy_keeps_other_skills_going() {
        let mut a = attempt(
            vec![pool("Testing", 4), pool("Architecture", 4)],
            AttemptConfig {
                skill_max_items: BTreeMap::from([("Testing".to_string(), 1)]),
                on_skill_budget: SkillBudgetPolicy::Retire,
                ..AttemptConfig::default()
            },
        );
        answer_pending(&mut a, false);
        while !a.is_finished() {
            assert_eq!(a.pending().unwrap().skill, "Architecture");
            answer_pending(&mut a, false);
        }
        let diagnostics = a.diagnostics();
        assert_eq!(diagnostics.administered["Testing"].len(), 1);
        assert_eq!(diagnostics.administered["Architecture"].len(), 4);
    }

    #[test]
    fn skill_budget_policy_parses() {
        let config: AttemptConfig = toml::from_str("on_skill_budget = \"retire\"").unwrap();
        assert_eq!(config.on_skill_budget, SkillBudgetPolicy::Retire);
        let config: AttemptConfig = toml::from_str("max_items = 3").unwrap();
        assert_eq!(config.on_skill_budget, SkillBudgetPolicy::Finish);
    }

    #[test]
    fn partial_mastery_table_keeps_defaults() {
        let config: MasteryConfig = toml::from_str("retire_mastered = true").unwrap();
        assert!(config.retire_mastered);
        assert_eq!(config.default_threshold, Some(1.0));
        assert!(config.is_mastered("Testing", 3.9));

        let config: MasteryConfig = toml::from_str("default_threshold = \"none\"").unwrap();
        assert_eq!(config, MasteryConfig::disabled());
        assert!(!config.is_mastered("Testing", 3.9));

        let config: MasteryConfig = toml::from_str("default_threshold = 2").unwrap();
        assert_eq!(config.default_threshold, Some(2.0));

        assert!(toml::from_str::<MasteryConfig>("default_threshold = \"never\"").is_err());
    }

    #[test]
    fn disabled_mastery_survives_json_round_trip() {
        let json = serde_json::to_string(&MasteryConfig::disabled()).unwrap();
        assert!(json.contains("\"default_threshold\":\"none\""));
        let back: MasteryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MasteryConfig::disabled());
    }

    #[test]
    fn mastery_follows_thresholds() {
        let config = MasteryConfig {
            default_threshold: None,
            thresholds: BTreeMap::from([("Testing".to_string(), 0.1)]),
            retire_mastered: false,
        };
        assert!(config.is_mastered("Testing", 0.1));
        assert!(!config.is_mastered("Testing", 0.05));
        assert!(!config.is_mastered("Architecture", 3.9));
        assert!(!MasteryConfig::disabled().is_mastered("Testing", 4.0));
        assert!(MasteryConfig::default().is_mastered("Testing", 1.0));
    }

    #[test]
    fn retire_mastered_stops_asking_mastered_skill() {
        let mut a = attempt(
            vec![pool("Testing", 6)],
            AttemptConfig {
                mastery: MasteryConfig {
                    default_threshold: Some(0.2),
                    thresholds: BTreeMap::new(),
                    retire_mastered: true,
                },
                ..AttemptConfig::default()
            },
        );
        let view = answer_pending(&mut a, true);
        assert!(view.mastery["Testing"]);
        assert_eq!(view.next_action, NextAction::Finish);
    }

    #[test]
    fn submit_grades_choice_answers() {
        let mut a = attempt(vec![pool("Testing", 3)], AttemptConfig::default());
        let item = a.pending_item().unwrap().clone();
        let key = item.correct_index.unwrap();

        let bad = Answer::Choice {
            item_id: item.item_id.clone(),
            answer_index: 9,
        };
        assert!(matches!(
            a.submit(&bad).unwrap_err(),
            EngineError::InvalidAnswer { .. }
        ));
        assert_eq!(a.items_administered(), 0);

        let good = Answer::Choice {
            item_id: item.item_id.clone(),
            answer_index: key,
        };
        let view = a.submit(&good).unwrap();
        assert!(view.theta["Testing"] > 0.0);
        let responses = a.model().model("Testing").unwrap().responses();
        assert!(responses[0].correct);
    }

    #[test]
    fn answer_deserializes_both_shapes() {
        let graded: Answer = serde_json::from_str(r#"{"item_id":"q1","correct":true}"#).unwrap();
        assert_eq!(
            graded,
            Answer::Graded {
                item_id: "q1".into(),
                correct: true
            }
        );
        let choice: Answer =
            serde_json::from_str(r#"{"item_id":"q1","answer_index":2}"#).unwrap();
        assert_eq!(choice.item_id(), "q1");
        assert!(matches!(choice, Answer::Choice { answer_index: 2, .. }));
    }

    #[test]
    fn view_hides_answer_key() {
        let a = attempt(vec![pool("Testing", 3)], AttemptConfig::default());
        let json = serde_json::to_value(a.view()).unwrap();
        assert_eq!(json["next_action"], "CONTINUE");
        assert!(json["next_item"].get("correct_index").is_none());
        assert!(json["next_item"].get("params").is_none());
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut a = attempt(
            vec![pool("Testing", 4), pool("Architecture", 4)],
            AttemptConfig::default(),
        );
        answer_pending(&mut a, true);
        answer_pending(&mut a, false);
        let snap = a.snapshot();

        let restored = Attempt::restore(
            &snap,
            vec![pool("Architecture", 4), pool("Testing", 4)],
        )
        .unwrap();
        assert_eq!(restored.snapshot(), snap);
        assert_eq!(restored.view(), a.view());
        assert_eq!(
            restored.diagnostics().administered,
            a.diagnostics().administered
        );
    }

    #[test]
    fn restore_rejects_pending_already_answered() {
        let mut a = attempt(vec![pool("Testing", 3)], AttemptConfig::default());
        answer_pending(&mut a, true);
        let mut snap = a.snapshot();
        let answered = snap.skills[0].responses[0].item_id.clone();
        snap.pending = Some(PendingItem {
            item_id: answered,
            skill: "Testing".into(),
        });
        assert!(Attempt::restore(&snap, vec![pool("Testing", 3)]).is_err());
    }

    #[test]
    fn duplicate_skill_pools_rejected() {
        let err = Attempt::init(
            "x",
            vec![pool("Testing", 1), pool("Testing", 1)],
            &EstimatorConfig::default(),
            &SelectorConfig::default(),
            AttemptConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, EngineError::DuplicateSkill("Testing".into()));
    }
}
