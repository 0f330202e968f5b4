//! Ability (theta) estimation.
//!
//! The default estimator is Bayesian modal (MAP) estimation under a normal
//! prior, solved with a bounded Newton-Raphson iteration. An expected a
//! posteriori (EAP) estimator over a fixed quadrature grid is available as an
//! alternative through [`EstimatorConfig`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult, EstimationError};
use crate::irt::{information, log_likelihood, log_likelihood_derivatives};
use crate::item::ItemParams;

/// One scored response as seen by an estimator.
pub type ScoredResponse = (ItemParams, bool);

/// Normal prior on theta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPrior {
    pub mu: f64,
    pub sigma2: f64,
}

impl NormalPrior {
    fn log_density(&self, theta: f64) -> f64 {
        -(theta - self.mu).powi(2) / (2.0 * self.sigma2)
    }
}

/// Trait for ability estimators.
pub trait AbilityEstimator: Send + Sync + fmt::Debug {
    /// Short identifier (e.g. "bayes_modal").
    fn name(&self) -> &str;

    /// The prior this estimator shrinks towards.
    fn prior(&self) -> NormalPrior;

    /// Estimate theta from the full response history.
    ///
    /// `start` is the current estimate and seeds iterative methods. An empty
    /// history yields the prior mean.
    fn estimate(&self, responses: &[ScoredResponse], start: f64) -> Result<f64, EstimationError>;

    /// Standard error of the estimate `theta`.
    fn standard_error(&self, responses: &[ScoredResponse], theta: f64) -> f64;
}

/// Configuration selecting and parameterizing an estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EstimatorConfig {
    /// Maximum a posteriori estimation (the default).
    BayesModal {
        #[serde(default)]
        prior_mu: f64,
        #[serde(default = "default_prior_sigma2")]
        prior_sigma2: f64,
        #[serde(default = "default_lower")]
        lower: f64,
        #[serde(default = "default_upper")]
        upper: f64,
        #[serde(default = "default_max_iterations")]
        max_iterations: u32,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    /// Posterior mean over an evenly spaced grid on `[lower, upper]`.
    Eap {
        #[serde(default)]
        prior_mu: f64,
        #[serde(default = "default_prior_sigma2")]
        prior_sigma2: f64,
        #[serde(default = "default_lower")]
        lower: f64,
        #[serde(default = "default_upper")]
        upper: f64,
        #[serde(default = "default_quadrature_points")]
        quadrature_points: usize,
    },
}

fn default_prior_sigma2() -> f64 {
    1.0
}
fn default_lower() -> f64 {
    -4.0
}
fn default_upper() -> f64 {
    4.0
}
fn default_max_iterations() -> u32 {
    20
}
fn default_tolerance() -> f64 {
    1e-6
}
fn default_quadrature_points() -> usize {
    61
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig::BayesModal {
            prior_mu: 0.0,
            prior_sigma2: default_prior_sigma2(),
            lower: default_lower(),
            upper: default_upper(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

impl EstimatorConfig {
    /// MAP estimation with the given prior and default bounds.
    pub fn bayes_modal(prior_mu: f64, prior_sigma2: f64) -> Self {
        Self::default().with_prior(prior_mu, prior_sigma2)
    }

    /// The configured prior.
    pub fn prior(&self) -> NormalPrior {
        match self {
            EstimatorConfig::BayesModal {
                prior_mu,
                prior_sigma2,
                ..
            }
            | EstimatorConfig::Eap {
                prior_mu,
                prior_sigma2,
                ..
            } => NormalPrior {
                mu: *prior_mu,
                sigma2: *prior_sigma2,
            },
        }
    }

    /// Copy of this configuration with a different prior.
    pub fn with_prior(mut self, mu: f64, sigma2: f64) -> Self {
        match &mut self {
            EstimatorConfig::BayesModal {
                prior_mu,
                prior_sigma2,
                ..
            }
            | EstimatorConfig::Eap {
                prior_mu,
                prior_sigma2,
                ..
            } => {
                *prior_mu = mu;
                *prior_sigma2 = sigma2;
            }
        }
        self
    }

    /// Reject configurations the estimators cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        let prior = self.prior();
        if !prior.mu.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "prior_mu must be finite, got {}",
                prior.mu
            )));
        }
        if !(prior.sigma2.is_finite() && prior.sigma2 > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "prior_sigma2 must be > 0, got {}",
                prior.sigma2
            )));
        }
        let (lower, upper) = match self {
            EstimatorConfig::BayesModal { lower, upper, .. }
            | EstimatorConfig::Eap { lower, upper, .. } => (*lower, *upper),
        };
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(EngineError::InvalidConfig(format!(
                "theta bounds must satisfy lower < upper, got [{lower}, {upper}]"
            )));
        }
        match self {
            EstimatorConfig::BayesModal {
                max_iterations,
                tolerance,
                ..
            } => {
                if *max_iterations == 0 {
                    return Err(EngineError::InvalidConfig(
                        "max_iterations must be at least 1".into(),
                    ));
                }
                if !(tolerance.is_finite() && *tolerance > 0.0) {
                    return Err(EngineError::InvalidConfig(format!(
                        "tolerance must be > 0, got {tolerance}"
                    )));
                }
            }
            EstimatorConfig::Eap {
                quadrature_points, ..
            } => {
                if *quadrature_points < 2 {
                    return Err(EngineError::InvalidConfig(
                        "quadrature_points must be at least 2".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validate and construct the estimator.
    pub fn build(&self) -> EngineResult<Box<dyn AbilityEstimator>> {
        self.validate()?;
        let prior = self.prior();
        Ok(match self {
            EstimatorConfig::BayesModal {
                lower,
                upper,
                max_iterations,
                tolerance,
                ..
            } => Box::new(BayesModal {
                prior,
                lower: *lower,
                upper: *upper,
                max_iterations: *max_iterations,
                tolerance: *tolerance,
            }),
            EstimatorConfig::Eap {
                lower,
                upper,
                quadrature_points,
                ..
            } => Box::new(ExpectedAPosteriori {
                prior,
                lower: *lower,
                upper: *upper,
                quadrature_points: *quadrature_points,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Bayesian modal (MAP)
// ---------------------------------------------------------------------------

/// MAP estimation with bounded Newton-Raphson.
///
/// Where the 3PL posterior is locally non-concave the Newton denominator is
/// replaced by the negative expected information (Fisher scoring), and a step
/// that lowers the posterior is halved until it does not.
#[derive(Debug, Clone)]
pub struct BayesModal {
    prior: NormalPrior,
    lower: f64,
    upper: f64,
    max_iterations: u32,
    tolerance: f64,
}

const MAX_STEP_HALVINGS: u32 = 16;

impl BayesModal {
    fn log_posterior(&self, responses: &[ScoredResponse], theta: f64) -> f64 {
        responses
            .iter()
            .map(|(p, correct)| log_likelihood(p.a, p.b, p.c, theta, *correct))
            .sum::<f64>()
            + self.prior.log_density(theta)
    }

    /// (f', f'', expected information) of the log-posterior at `theta`.
    fn derivatives(&self, responses: &[ScoredResponse], theta: f64) -> (f64, f64, f64) {
        let mut d1 = -(theta - self.prior.mu) / self.prior.sigma2;
        let mut d2 = -1.0 / self.prior.sigma2;
        let mut info = 1.0 / self.prior.sigma2;
        for (p, correct) in responses {
            let (g, h) = log_likelihood_derivatives(p.a, p.b, p.c, theta, *correct);
            d1 += g;
            d2 += h;
            info += information(p.a, p.b, p.c, theta);
        }
        (d1, d2, info)
    }
}

impl AbilityEstimator for BayesModal {
    fn name(&self) -> &str {
        "bayes_modal"
    }

    fn prior(&self) -> NormalPrior {
        self.prior
    }

    fn estimate(&self, responses: &[ScoredResponse], start: f64) -> Result<f64, EstimationError> {
        if responses.is_empty() {
            return Ok(self.prior.mu);
        }

        let mut theta = if start.is_finite() {
            start.clamp(self.lower, self.upper)
        } else {
            self.prior.mu.clamp(self.lower, self.upper)
        };
        let mut current = self.log_posterior(responses, theta);

        for _ in 0..self.max_iterations {
            let (d1, d2, info) = self.derivatives(responses, theta);
            let curvature = if d2 < -f64::EPSILON { d2 } else { -info };
            let mut candidate = (theta - d1 / curvature).clamp(self.lower, self.upper);
            let mut value = self.log_posterior(responses, candidate);

            let mut halvings = 0;
            while value < current && halvings < MAX_STEP_HALVINGS {
                candidate = theta + (candidate - theta) / 2.0;
                value = self.log_posterior(responses, candidate);
                halvings += 1;
            }
            if value < current {
                break;
            }

            let step = (candidate - theta).abs();
            theta = candidate;
            current = value;
            if step < self.tolerance {
                break;
            }
        }

        let (d1, _, _) = self.derivatives(responses, theta);
        let pinned_high = theta >= self.upper && d1 > 0.0;
        let pinned_low = theta <= self.lower && d1 < 0.0;
        if pinned_high || pinned_low {
            return Err(EstimationError::Degenerate { boundary: theta });
        }
        Ok(theta)
    }

    fn standard_error(&self, responses: &[ScoredResponse], theta: f64) -> f64 {
        let (_, _, info) = self.derivatives(responses, theta);
        1.0 / info.sqrt()
    }
}

// ---------------------------------------------------------------------------
// Expected a posteriori
// ---------------------------------------------------------------------------

/// Posterior mean over an evenly spaced quadrature grid.
#[derive(Debug, Clone)]
pub struct ExpectedAPosteriori {
    prior: NormalPrior,
    lower: f64,
    upper: f64,
    quadrature_points: usize,
}

impl ExpectedAPosteriori {
    /// Normalized posterior weights at each node.
    fn posterior(&self, responses: &[ScoredResponse]) -> Vec<(f64, f64)> {
        let n = self.quadrature_points;
        let width = (self.upper - self.lower) / (n - 1) as f64;
        let log_post: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let node = self.lower + width * i as f64;
                let ll: f64 = responses
                    .iter()
                    .map(|(p, correct)| log_likelihood(p.a, p.b, p.c, node, *correct))
                    .sum();
                (node, ll + self.prior.log_density(node))
            })
            .collect();

        let max = log_post
            .iter()
            .map(|(_, lp)| *lp)
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<(f64, f64)> = log_post
            .iter()
            .map(|(node, lp)| (*node, (lp - max).exp()))
            .collect();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        weights
            .into_iter()
            .map(|(node, w)| (node, w / total))
            .collect()
    }

    fn moments(&self, responses: &[ScoredResponse]) -> (f64, f64) {
        let posterior = self.posterior(responses);
        let mean: f64 = posterior.iter().map(|(node, w)| node * w).sum();
        let var: f64 = posterior
            .iter()
            .map(|(node, w)| (node - mean).powi(2) * w)
            .sum();
        (mean, var.sqrt())
    }
}

impl AbilityEstimator for ExpectedAPosteriori {
    fn name(&self) -> &str {
        "eap"
    }

    fn prior(&self) -> NormalPrior {
        self.prior
    }

    fn estimate(&self, responses: &[ScoredResponse], _start: f64) -> Result<f64, EstimationError> {
        if responses.is_empty() {
            return Ok(self.prior.mu);
        }
        Ok(self.moments(responses).0)
    }

    fn standard_error(&self, responses: &[ScoredResponse], _theta: f64) -> f64 {
        self.moments(responses).1
    }
}
