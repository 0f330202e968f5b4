//! Between-item multidimensional model: one [`UnidimensionalModel`] per skill.

use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::estimator::EstimatorConfig;
use crate::item::{Item, ItemPool};
use crate::selector::SelectorConfig;
use crate::unidimensional::UnidimensionalModel;

/// Per-skill models in registration order.
///
/// Next-item policy: target the weakest skill. Among skills with items left,
/// the one with the lowest theta is asked next; ties go to the skill
/// registered first.
#[derive(Debug, Default)]
pub struct MultidimensionalModel {
    models: Vec<UnidimensionalModel>,
}

impl MultidimensionalModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model for a new skill.
    pub fn add_model(
        &mut self,
        skill: impl Into<String>,
        pool: ItemPool,
        initial_theta: f64,
        estimator_config: EstimatorConfig,
        selector_config: SelectorConfig,
    ) -> EngineResult<()> {
        let skill = skill.into();
        if self.contains(&skill) {
            return Err(EngineError::DuplicateSkill(skill));
        }
        let model =
            UnidimensionalModel::new(skill, pool, initial_theta, estimator_config, selector_config)?;
        self.models.push(model);
        Ok(())
    }

    /// Register an already-built model (used when restoring snapshots).
    pub fn insert_model(&mut self, model: UnidimensionalModel) -> EngineResult<()> {
        if self.contains(model.skill()) {
            return Err(EngineError::DuplicateSkill(model.skill().to_string()));
        }
        self.models.push(model);
        Ok(())
    }

    pub fn contains(&self, skill: &str) -> bool {
        self.models.iter().any(|m| m.skill() == skill)
    }

    /// Skills in registration order.
    pub fn skills(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.skill())
    }

    pub fn models(&self) -> impl Iterator<Item = &UnidimensionalModel> {
        self.models.iter()
    }

    pub fn model(&self, skill: &str) -> EngineResult<&UnidimensionalModel> {
        self.models
            .iter()
            .find(|m| m.skill() == skill)
            .ok_or_else(|| EngineError::UnknownSkill(skill.to_string()))
    }

    fn model_mut(&mut self, skill: &str) -> EngineResult<&mut UnidimensionalModel> {
        self.models
            .iter_mut()
            .find(|m| m.skill() == skill)
            .ok_or_else(|| EngineError::UnknownSkill(skill.to_string()))
    }

    pub fn get_theta(&self, skill: &str) -> EngineResult<f64> {
        Ok(self.model(skill)?.get_theta())
    }

    /// `(skill, theta)` pairs in registration order.
    pub fn thetas(&self) -> Vec<(String, f64)> {
        self.models
            .iter()
            .map(|m| (m.skill().to_string(), m.get_theta()))
            .collect()
    }

    /// Forward a response to the named skill's model. Returns the new theta.
    pub fn record_response(
        &mut self,
        skill: &str,
        item_id: &str,
        correct: bool,
    ) -> EngineResult<f64> {
        self.model_mut(skill)?.record_response(item_id, correct)
    }

    /// Next item from the weakest skill that still has items.
    pub fn get_next_item(&self) -> Option<&Item> {
        self.get_next_item_excluding(&HashSet::new())
    }

    /// Same policy as [`Self::get_next_item`], ignoring the `excluded` skills.
    pub fn get_next_item_excluding(&self, excluded: &HashSet<String>) -> Option<&Item> {
        let mut weakest: Option<&UnidimensionalModel> = None;
        for model in &self.models {
            if excluded.contains(model.skill()) || !model.has_remaining() {
                continue;
            }
            // Strict comparison keeps the earliest-registered skill on ties.
            if weakest.map_or(true, |w| model.get_theta() < w.get_theta()) {
                weakest = Some(model);
            }
        }
        let chosen = weakest?;
        let item = chosen.get_next_item();
        if let Some(item) = item {
            tracing::debug!(
                skill = chosen.skill(),
                theta = chosen.get_theta(),
                item_id = %item.item_id,
                "selected next item"
            );
        }
        item
    }
}
