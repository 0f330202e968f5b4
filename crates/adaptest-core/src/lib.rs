//! adaptest-core: IRT response model, ability estimation, item selection
//! and the attempt state machine.
//!
//! This crate performs no I/O beyond item bank and snapshot files and has no
//! internal concurrency; `adaptest-service` layers attempt storage and
//! locking on top of it.

pub mod attempt;
pub mod bank;
pub mod error;
pub mod estimator;
pub mod irt;
pub mod item;
pub mod multidimensional;
pub mod selector;
pub mod snapshot;
pub mod traits;
pub mod unidimensional;

pub use attempt::{
    Answer, Attempt, AttemptConfig, AttemptDiagnostics, AttemptState, AttemptView, MasteryConfig,
    NextAction, PendingItem, SkillBudgetPolicy,
};
pub use error::{EngineError, EngineResult, ErrorKind, EstimationError};
pub use item::{Item, ItemParams, ItemPool, PublicItem};
