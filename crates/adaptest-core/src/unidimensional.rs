//! Single-skill adaptive model.
//!
//! Couples one skill's item pool with an ability estimator and an item
//! selector, and owns that skill's theta and response history.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::estimator::{AbilityEstimator, EstimatorConfig, ScoredResponse};
use crate::item::{Item, ItemParams, ItemPool};
use crate::selector::{ItemSelector, SelectorConfig};
use crate::snapshot::SkillSnapshot;

/// One recorded response. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub item_id: String,
    pub skill: String,
    pub correct: bool,
    /// Position in this skill's response sequence, starting at 0.
    pub order: usize,
    /// Parameters of the answered item, so a history is self-describing.
    pub params: ItemParams,
}

/// Theta trajectory of one skill.
#[derive(Debug)]
pub struct UnidimensionalModel {
    skill: String,
    theta: f64,
    standard_error: f64,
    responses: Vec<ResponseRecord>,
    pool: ItemPool,
    estimator_config: EstimatorConfig,
    selector_config: SelectorConfig,
    estimator: Box<dyn AbilityEstimator>,
    selector: Box<dyn ItemSelector>,
}

impl UnidimensionalModel {
    pub fn new(
        skill: impl Into<String>,
        pool: ItemPool,
        initial_theta: f64,
        estimator_config: EstimatorConfig,
        selector_config: SelectorConfig,
    ) -> EngineResult<Self> {
        let skill = skill.into();
        if pool.skill() != skill {
            return Err(EngineError::InvalidConfig(format!(
                "pool for skill {} cannot back a model for skill {skill}",
                pool.skill()
            )));
        }
        if !initial_theta.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "initial theta for {skill} must be finite"
            )));
        }
        let estimator = estimator_config.build()?;
        let selector = selector_config.build()?;
        let standard_error = estimator.standard_error(&[], initial_theta);
        Ok(Self {
            skill,
            theta: initial_theta,
            standard_error,
            responses: Vec::new(),
            pool,
            estimator_config,
            selector_config,
            estimator,
            selector,
        })
    }

    /// Rebuild a model from a snapshot without re-running estimation.
    ///
    /// Every answered item in the snapshot must exist in `pool`.
    pub fn restore(snapshot: &SkillSnapshot, mut pool: ItemPool) -> EngineResult<Self> {
        if pool.skill() != snapshot.skill {
            return Err(EngineError::InvalidConfig(format!(
                "pool for skill {} cannot back a model for skill {}",
                pool.skill(),
                snapshot.skill
            )));
        }
        for record in &snapshot.responses {
            if record.skill != snapshot.skill {
                return Err(EngineError::SkillMismatch {
                    item_id: record.item_id.clone(),
                    item_skill: record.skill.clone(),
                    pool_skill: snapshot.skill.clone(),
                });
            }
            pool.mark_administered(&record.item_id)?;
        }
        let estimator = snapshot.estimator.build()?;
        let selector = snapshot.selector.build()?;
        Ok(Self {
            skill: snapshot.skill.clone(),
            theta: snapshot.theta,
            standard_error: snapshot.standard_error,
            responses: snapshot.responses.clone(),
            pool,
            estimator_config: snapshot.estimator.clone(),
            selector_config: snapshot.selector.clone(),
            estimator,
            selector,
        })
    }

    pub fn skill(&self) -> &str {
        &self.skill
    }

    /// Current ability estimate.
    pub fn get_theta(&self) -> f64 {
        self.theta
    }

    pub fn get_standard_error(&self) -> f64 {
        self.standard_error
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        &self.responses
    }

    pub fn pool(&self) -> &ItemPool {
        &self.pool
    }

    pub fn has_remaining(&self) -> bool {
        !self.pool.is_exhausted()
    }

    pub fn estimator_config(&self) -> &EstimatorConfig {
        &self.estimator_config
    }

    pub fn selector_config(&self) -> &SelectorConfig {
        &self.selector_config
    }

    /// The item the selector would administer next. Does not mutate state.
    pub fn get_next_item(&self) -> Option<&Item> {
        self.selector.select(self.theta, &self.pool)
    }

    /// Record a response to an item from this skill's pool and refresh theta.
    ///
    /// Returns the new theta. Fails without mutation if the item is not in the
    /// pool or was already administered.
    pub fn record_response(&mut self, item_id: &str, correct: bool) -> EngineResult<f64> {
        let params = match self.pool.get(item_id) {
            Some(item) => item.params,
            None => {
                return Err(EngineError::ItemNotInPool {
                    skill: self.skill.clone(),
                    item_id: item_id.to_string(),
                })
            }
        };
        self.pool.mark_administered(item_id)?;

        self.responses.push(ResponseRecord {
            item_id: item_id.to_string(),
            skill: self.skill.clone(),
            correct,
            order: self.responses.len(),
            params,
        });
        self.refresh_theta();
        Ok(self.theta)
    }

    fn refresh_theta(&mut self) {
        let scored: Vec<ScoredResponse> = self
            .responses
            .iter()
            .map(|r| (r.params, r.correct))
            .collect();

        let previous = self.theta;
        self.theta = match self.estimator.estimate(&scored, previous) {
            Ok(theta) => theta,
            Err(e) => {
                tracing::warn!(skill = %self.skill, "{e}; clamping theta to the boundary");
                e.boundary()
            }
        };
        self.standard_error = self.estimator.standard_error(&scored, self.theta);

        tracing::debug!(
            skill = %self.skill,
            responses = scored.len(),
            previous,
            theta = self.theta,
            se = self.standard_error,
            "theta updated"
        );
    }

    /// Serializable state of this model.
    pub fn snapshot(&self) -> SkillSnapshot {
        SkillSnapshot {
            skill: self.skill.clone(),
            theta: self.theta,
            standard_error: self.standard_error,
            estimator: self.estimator_config.clone(),
            selector: self.selector_config.clone(),
            responses: self.responses.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ItemPool {
        let items = [("q1", 1.0, -1.0), ("q2", 1.2, 0.0), ("q3", 0.8, 1.0)]
            .iter()
            .map(|&(id, a, b)| Item::new(id, "Testing", ItemParams { a, b, c: 0.2 }).unwrap())
            .collect();
        ItemPool::new("Testing", items).unwrap()
    }

    fn model() -> UnidimensionalModel {
        UnidimensionalModel::new(
            "Testing",
            pool(),
            0.0,
            EstimatorConfig::default(),
            SelectorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn next_item_is_idempotent() {
        let m = model();
        let first = m.get_next_item().unwrap().item_id.clone();
        let second = m.get_next_item().unwrap().item_id.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn recording_updates_theta_and_history() {
        let mut m = model();
        let theta = m.record_response("q2", true).unwrap();
        assert!(theta > 0.0);
        assert_eq!(m.get_theta(), theta);
        assert_eq!(m.responses().len(), 1);
        assert_eq!(m.responses()[0].order, 0);
        assert!(m.pool().is_administered("q2"));
        assert_ne!(m.get_next_item().unwrap().item_id, "q2");
    }

    #[test]
    fn duplicate_response_rejected_without_changing_theta() {
        let mut m = model();
        m.record_response("q1", true).unwrap();
        let theta = m.get_theta();
        let se = m.get_standard_error();

        let err = m.record_response("q1", false).unwrap_err();
        assert_eq!(err, EngineError::AlreadyAdministered("q1".into()));
        assert_eq!(m.get_theta(), theta);
        assert_eq!(m.get_standard_error(), se);
        assert_eq!(m.responses().len(), 1);
    }

    #[test]
    fn foreign_item_rejected() {
        let mut m = model();
        let err = m.record_response("nope", true).unwrap_err();
        assert!(matches!(err, EngineError::ItemNotInPool { .. }));
        assert!(m.responses().is_empty());
    }

    #[test]
    fn never_repeats_until_exhausted() {
        let mut m = model();
        let mut seen = Vec::new();
        while let Some(item) = m.get_next_item() {
            let id = item.item_id.clone();
            assert!(!seen.contains(&id), "{id} returned twice");
            m.record_response(&id, seen.len() % 2 == 0).unwrap();
            seen.push(id);
        }
        assert_eq!(seen.len(), 3);
        assert!(!m.has_remaining());
    }

    #[test]
    fn theta_matches_fresh_estimate_over_full_history() {
        let mut m = model();
        m.record_response("q1", true).unwrap();
        m.record_response("q2", false).unwrap();

        let scored: Vec<ScoredResponse> =
            m.responses().iter().map(|r| (r.params, r.correct)).collect();
        let estimator = EstimatorConfig::default().build().unwrap();
        let fresh = estimator.estimate(&scored, 0.0).unwrap();
        assert!((fresh - m.get_theta()).abs() < 1e-4);
    }

    #[test]
    fn restore_reproduces_state() {
        let mut m = model();
        m.record_response("q2", true).unwrap();
        let snap = m.snapshot();

        let restored = UnidimensionalModel::restore(&snap, pool()).unwrap();
        assert_eq!(restored.get_theta(), m.get_theta());
        assert_eq!(restored.responses(), m.responses());
        assert!(restored.pool().is_administered("q2"));
        assert_eq!(
            restored.get_next_item().map(|i| i.item_id.clone()),
            m.get_next_item().map(|i| i.item_id.clone())
        );
    }

    #[test]
    fn unbounded_posterior_clamps_theta_to_the_bound() {
        let items = (0..30)
            .map(|i| {
                Item::new(format!("q{i:02}"), "Testing", ItemParams { a: 2.0, b: 0.0, c: 0.0 })
                    .unwrap()
            })
            .collect();
        let estimator = EstimatorConfig::BayesModal {
            prior_mu: 0.0,
            prior_sigma2: 100.0,
            lower: -1.0,
            upper: 1.0,
            max_iterations: 20,
            tolerance: 1e-6,
        };
        let mut m = UnidimensionalModel::new(
            "Testing",
            ItemPool::new("Testing", items).unwrap(),
            0.0,
            estimator.clone(),
            SelectorConfig::default(),
        )
        .unwrap();

        let scored: Vec<ScoredResponse> = (0..30)
            .map(|_| (ItemParams { a: 2.0, b: 0.0, c: 0.0 }, true))
            .collect();
        assert!(estimator.build().unwrap().estimate(&scored, 0.0).is_err());

        let thetas: Vec<f64> = (0..30)
            .map(|i| m.record_response(&format!("q{i:02}"), true).unwrap())
            .collect();
        assert_eq!(thetas.last(), Some(&1.0));
        assert_eq!(m.get_theta(), 1.0);
        assert!(m.get_standard_error().is_finite());
        assert_eq!(m.responses().len(), 30);
        assert!(!m.has_remaining());
    }

    #[test]
    fn restore_rejects_unknown_items() {
        let mut m = model();
        m.record_response("q2", true).unwrap();
        let snap = m.snapshot();
        let empty = ItemPool::empty("Testing");
        assert!(UnidimensionalModel::restore(&snap, empty).is_err());
    }
}
