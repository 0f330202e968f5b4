//! Next-item selection strategies.

use std::cmp::Ordering;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::irt::information;
use crate::item::{Item, ItemPool};

/// Trait for item selection strategies.
///
/// Implementations must not depend on anything but `theta` and the pool's
/// state, so that repeated calls without an intervening response agree.
pub trait ItemSelector: Send + Sync + fmt::Debug {
    /// Short identifier (e.g. "max_info").
    fn name(&self) -> &str;

    /// Pick the next item from the pool's unadministered items, or `None` when
    /// the pool is exhausted.
    fn select<'p>(&self, theta: f64, pool: &'p ItemPool) -> Option<&'p Item>;
}

/// Configuration selecting and parameterizing a selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectorConfig {
    /// Maximum Fisher information (the default).
    #[default]
    MaxInfo,
    /// Uniform choice among the `top_k` most informative items.
    Randomesque {
        #[serde(default = "default_top_k")]
        top_k: usize,
        #[serde(default)]
        seed: u64,
    },
}

fn default_top_k() -> usize {
    5
}

impl SelectorConfig {
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            SelectorConfig::Randomesque { top_k: 0, .. } => Err(EngineError::InvalidConfig(
                "randomesque top_k must be at least 1".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Validate and construct the selector.
    pub fn build(&self) -> EngineResult<Box<dyn ItemSelector>> {
        self.validate()?;
        Ok(match self {
            SelectorConfig::MaxInfo => Box::new(MaxInformation),
            SelectorConfig::Randomesque { top_k, seed } => Box::new(Randomesque {
                top_k: *top_k,
                seed: *seed,
            }),
        })
    }
}

/// Remaining items ranked by information at `theta`, most informative first.
/// Equal information is ordered by ascending item id.
fn ranked<'p>(theta: f64, pool: &'p ItemPool) -> Vec<(f64, &'p Item)> {
    let mut scored: Vec<(f64, &Item)> = pool
        .remaining()
        .map(|item| {
            let p = &item.params;
            (information(p.a, p.b, p.c, theta), item)
        })
        .collect();
    scored.sort_by(|(ia, a), (ib, b)| {
        ib.partial_cmp(ia)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    scored
}

/// Maximum information criterion.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxInformation;

impl ItemSelector for MaxInformation {
    fn name(&self) -> &str {
        "max_info"
    }

    fn select<'p>(&self, theta: f64, pool: &'p ItemPool) -> Option<&'p Item> {
        let mut best: Option<(f64, &Item)> = None;
        for item in pool.remaining() {
            let p = &item.params;
            let info = information(p.a, p.b, p.c, theta);
            let better = match best {
                None => true,
                Some((best_info, best_item)) => {
                    info > best_info || (info == best_info && item.item_id < best_item.item_id)
                }
            };
            if better {
                best = Some((info, item));
            }
        }
        best.map(|(_, item)| item)
    }
}

/// Randomesque exposure control.
///
/// The RNG is reseeded from the configured seed and the number of items
/// already administered, so the choice is fixed for a given pool state.
#[derive(Debug, Clone)]
pub struct Randomesque {
    top_k: usize,
    seed: u64,
}

impl ItemSelector for Randomesque {
    fn name(&self) -> &str {
        "randomesque"
    }

    fn select<'p>(&self, theta: f64, pool: &'p ItemPool) -> Option<&'p Item> {
        let ranked = ranked(theta, pool);
        if ranked.is_empty() {
            return None;
        }
        let k = self.top_k.min(ranked.len());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ pool.administered().len() as u64);
        let pick = rng.gen_range(0..k);
        Some(ranked[pick].1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemParams;

    fn pool(specs: &[(&str, f64, f64, f64)]) -> ItemPool {
        let items = specs
            .iter()
            .map(|&(id, a, b, c)| Item::new(id, "Testing", ItemParams { a, b, c }).unwrap())
            .collect();
        ItemPool::new("Testing", items).unwrap()
    }

    #[test]
    fn max_info_picks_item_closest_to_theta() {
        let pool = pool(&[
            ("far", 1.0, 3.0, 0.0),
            ("near", 1.0, 0.1, 0.0),
            ("mid", 1.0, -1.5, 0.0),
        ]);
        let item = MaxInformation.select(0.0, &pool).unwrap();
        assert_eq!(item.item_id, "near");
    }

    #[test]
    fn max_info_breaks_ties_by_lowest_id() {
        let pool = pool(&[("q3", 1.0, 0.0, 0.2), ("q1", 1.0, 0.0, 0.2), ("q2", 1.0, 0.0, 0.2)]);
        assert_eq!(MaxInformation.select(0.0, &pool).unwrap().item_id, "q1");
    }

    #[test]
    fn max_info_skips_administered_and_signals_exhaustion() {
        let mut pool = pool(&[("q1", 1.0, 0.0, 0.0), ("q2", 1.0, 2.0, 0.0)]);
        pool.mark_administered("q1").unwrap();
        assert_eq!(MaxInformation.select(0.0, &pool).unwrap().item_id, "q2");
        pool.mark_administered("q2").unwrap();
        assert!(MaxInformation.select(0.0, &pool).is_none());
    }

    #[test]
    fn ranked_orders_by_information_then_id() {
        let pool = pool(&[("b", 1.0, 0.0, 0.0), ("a", 1.0, 0.0, 0.0), ("c", 2.0, 0.0, 0.0)]);
        let ids: Vec<&str> = ranked(0.0, &pool)
            .iter()
            .map(|(_, i)| i.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn randomesque_is_idempotent_and_stays_in_top_k() {
        let pool = pool(&[
            ("q1", 1.0, 0.0, 0.0),
            ("q2", 1.0, 0.2, 0.0),
            ("q3", 1.0, -0.2, 0.0),
            ("q4", 1.0, 3.5, 0.0),
            ("q5", 1.0, -3.5, 0.0),
        ]);
        let selector = SelectorConfig::Randomesque { top_k: 3, seed: 7 }
            .build()
            .unwrap();
        let first = selector.select(0.0, &pool).unwrap().item_id.clone();
        let second = selector.select(0.0, &pool).unwrap().item_id.clone();
        assert_eq!(first, second);
        assert!(["q1", "q2", "q3"].contains(&first.as_str()));
    }

    #[test]
    fn randomesque_rejects_zero_k() {
        assert!(SelectorConfig::Randomesque { top_k: 0, seed: 0 }
            .build()
            .is_err());
    }
}
