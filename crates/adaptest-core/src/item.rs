//! Item records and per-skill item pools.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// 3PL item parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemParams {
    /// Discrimination, strictly positive.
    pub a: f64,
    /// Difficulty.
    pub b: f64,
    /// Pseudo-guessing, in `[0, 1)`.
    pub c: f64,
}

impl ItemParams {
    /// Validate parameters for the item named `item_id`.
    pub fn validate(&self, item_id: &str) -> EngineResult<()> {
        let reason = if !self.a.is_finite() || self.a <= 0.0 {
            Some(format!("discrimination a must be > 0, got {}", self.a))
        } else if !self.b.is_finite() {
            Some(format!("difficulty b must be finite, got {}", self.b))
        } else if !self.c.is_finite() || !(0.0..1.0).contains(&self.c) {
            Some(format!("guessing c must be in [0, 1), got {}", self.c))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(EngineError::InvalidParameters {
                item_id: item_id.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// A single test item.
///
/// Presentation fields are carried through the engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier.
    pub item_id: String,
    /// The skill (concept, module) this item measures.
    pub skill: String,
    /// IRT parameters.
    pub params: ItemParams,
    /// Question text.
    #[serde(default)]
    pub stem: String,
    /// Answer options, in presentation order.
    #[serde(default)]
    pub options: Vec<String>,
    /// Index of the correct option, when the item carries an answer key.
    #[serde(default)]
    pub correct_index: Option<usize>,
    /// Free-form metadata (bloom category, reference, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Item {
    /// Create an item with validated parameters and no presentation payload.
    pub fn new(
        item_id: impl Into<String>,
        skill: impl Into<String>,
        params: ItemParams,
    ) -> EngineResult<Self> {
        let item_id = item_id.into();
        params.validate(&item_id)?;
        Ok(Self {
            item_id,
            skill: skill.into(),
            params,
            stem: String::new(),
            options: Vec::new(),
            correct_index: None,
            metadata: BTreeMap::new(),
        })
    }

    /// Attach question text and options.
    pub fn with_presentation(
        mut self,
        stem: impl Into<String>,
        options: Vec<String>,
        correct_index: Option<usize>,
    ) -> Self {
        self.stem = stem.into();
        self.options = options;
        self.correct_index = correct_index;
        self
    }

    /// Grade an answer given as an option index.
    pub fn grade(&self, answer_index: usize) -> EngineResult<bool> {
        let Some(correct) = self.correct_index else {
            return Err(EngineError::InvalidAnswer {
                item_id: self.item_id.clone(),
                reason: "item has no answer key".into(),
            });
        };
        if answer_index >= self.options.len() {
            return Err(EngineError::InvalidAnswer {
                item_id: self.item_id.clone(),
                reason: format!(
                    "answer index {answer_index} is out of range for {} options",
                    self.options.len()
                ),
            });
        }
        Ok(answer_index == correct)
    }

    /// The projection exposed to test takers.
    pub fn to_public(&self) -> PublicItem {
        PublicItem {
            item_id: self.item_id.clone(),
            skill: self.skill.clone(),
            stem: self.stem.clone(),
            options: self.options.clone(),
        }
    }
}

/// Item payload returned upward. Never carries the answer key or IRT parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicItem {
    pub item_id: String,
    pub skill: String,
    pub stem: String,
    pub options: Vec<String>,
}

/// Ordered items for one skill plus the set administered in the current attempt.
#[derive(Debug, Clone)]
pub struct ItemPool {
    skill: String,
    items: Vec<Item>,
    index: HashMap<String, usize>,
    administered: BTreeSet<String>,
}

impl ItemPool {
    /// Build a pool, rejecting duplicate ids, foreign skills, and malformed parameters.
    pub fn new(skill: impl Into<String>, items: Vec<Item>) -> EngineResult<Self> {
        let skill = skill.into();
        let mut index = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            item.params.validate(&item.item_id)?;
            if item.skill != skill {
                return Err(EngineError::SkillMismatch {
                    item_id: item.item_id.clone(),
                    item_skill: item.skill.clone(),
                    pool_skill: skill,
                });
            }
            if index.insert(item.item_id.clone(), pos).is_some() {
                return Err(EngineError::DuplicateItem(item.item_id.clone()));
            }
        }
        Ok(Self {
            skill,
            items,
            index,
            administered: BTreeSet::new(),
        })
    }

    /// An empty pool for `skill`.
    pub fn empty(skill: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            items: Vec::new(),
            index: HashMap::new(),
            administered: BTreeSet::new(),
        }
    }

    pub fn skill(&self) -> &str {
        &self.skill
    }

    /// Look up an item by id.
    pub fn get(&self, item_id: &str) -> Option<&Item> {
        self.index.get(item_id).map(|&pos| &self.items[pos])
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.index.contains_key(item_id)
    }

    pub fn is_administered(&self, item_id: &str) -> bool {
        self.administered.contains(item_id)
    }

    /// Items not yet administered, in pool order.
    pub fn remaining(&self) -> impl Iterator<Item = &Item> {
        self.items
            .iter()
            .filter(|item| !self.administered.contains(&item.item_id))
    }

    pub fn remaining_count(&self) -> usize {
        self.items.len() - self.administered.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_count() == 0
    }

    /// Ids administered so far, sorted.
    pub fn administered(&self) -> &BTreeSet<String> {
        &self.administered
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mark an item administered. Fails without mutation if the item is unknown
    /// or was already administered.
    pub fn mark_administered(&mut self, item_id: &str) -> EngineResult<()> {
        if !self.contains(item_id) {
            return Err(EngineError::ItemNotInPool {
                skill: self.skill.clone(),
                item_id: item_id.to_string(),
            });
        }
        if self.administered.contains(item_id) {
            return Err(EngineError::AlreadyAdministered(item_id.to_string()));
        }
        self.administered.insert(item_id.to_string());
        Ok(())
    }
}
