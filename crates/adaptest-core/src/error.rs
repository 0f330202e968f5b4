//! Engine error types.
//!
//! Every failure the engine can report is a typed, recoverable outcome. Callers
//! use [`EngineError::kind`] to decide whether to reject the request, report a
//! missing resource, or surface a lifecycle violation, without string matching.

use thiserror::Error;

/// Errors reported by the adaptive-testing engine.
///
/// All variants are raised before any state is mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// No model is registered for the named skill.
    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    /// A model for the named skill is already registered.
    #[error("skill already registered: {0}")]
    DuplicateSkill(String),

    /// The item id does not belong to the skill's pool.
    #[error("item {item_id} is not in the pool for skill {skill}")]
    ItemNotInPool { skill: String, item_id: String },

    /// The item was already administered in this attempt.
    #[error("item {0} has already been administered")]
    AlreadyAdministered(String),

    /// Two items in one pool share an id.
    #[error("duplicate item id in pool: {0}")]
    DuplicateItem(String),

    /// An item was added to a pool for a different skill.
    #[error("item {item_id} measures skill {item_skill}, not {pool_skill}")]
    SkillMismatch {
        item_id: String,
        item_skill: String,
        pool_skill: String,
    },

    /// IRT parameters outside their domain (`a > 0`, `c` in `[0, 1)`).
    #[error("invalid IRT parameters for item {item_id}: {reason}")]
    InvalidParameters { item_id: String, reason: String },

    /// The answered item is not the one currently pending.
    #[error("response is for item {got}, but the pending item is {expected}")]
    PendingMismatch { expected: String, got: String },

    /// An answer index outside the item's options, or an item without an answer key.
    #[error("invalid answer for item {item_id}: {reason}")]
    InvalidAnswer { item_id: String, reason: String },

    /// Engine or stopping-rule configuration that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The attempt id is not known to the store.
    #[error("unknown attempt: {0}")]
    UnknownAttempt(String),

    /// An attempt id that is not a UUID.
    #[error("invalid attempt id: {0:?}")]
    InvalidAttemptId(String),

    /// An attempt with this id is already live.
    #[error("attempt already exists: {0}")]
    AttemptExists(String),

    /// The attempt is finished and accepts no further responses.
    #[error("attempt {0} is finished")]
    AttemptFinished(String),

    /// A response was submitted while no item is pending.
    #[error("attempt {0} has no pending item")]
    NoPendingItem(String),
}

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; rejected before mutation.
    Validation,
    /// A referenced attempt does not exist.
    NotFound,
    /// The request is not valid in the attempt's current state.
    State,
}

impl EngineError {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnknownAttempt(_) => ErrorKind::NotFound,
            EngineError::AttemptExists(_)
            | EngineError::AttemptFinished(_)
            | EngineError::NoPendingItem(_) => ErrorKind::State,
            _ => ErrorKind::Validation,
        }
    }

    /// Returns `true` for errors caused by the attempt's lifecycle state.
    pub fn is_state_error(&self) -> bool {
        self.kind() == ErrorKind::State
    }
}

/// Outcome of an ability estimation that could not settle inside the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EstimationError {
    /// The posterior keeps increasing past a bound; `boundary` is the clipped value.
    #[error("posterior is unbounded past theta = {boundary}")]
    Degenerate { boundary: f64 },
}

impl EstimationError {
    /// The clipped boundary value callers fall back to.
    pub fn boundary(&self) -> f64 {
        match self {
            EstimationError::Degenerate { boundary } => *boundary,
        }
    }
}

/// Convenience alias used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_classified() {
        assert_eq!(
            EngineError::UnknownSkill("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::AlreadyAdministered("i1".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::UnknownAttempt("a".into()).kind(),
            ErrorKind::NotFound
        );
        assert!(EngineError::AttemptFinished("a".into()).is_state_error());
        assert!(EngineError::NoPendingItem("a".into()).is_state_error());
        assert_eq!(
            EngineError::InvalidAttemptId("../x".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn messages_name_the_subject() {
        let err = EngineError::ItemNotInPool {
            skill: "Testing".into(),
            item_id: "q7".into(),
        };
        assert_eq!(err.to_string(), "item q7 is not in the pool for skill Testing");

        let est = EstimationError::Degenerate { boundary: 4.0 };
        assert_eq!(est.boundary(), 4.0);
    }
}
