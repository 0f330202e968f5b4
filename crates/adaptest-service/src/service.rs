//! Attempt lifecycle orchestration.
//!
//! [`AttemptService`] resolves items from an [`ItemSource`], keeps attempts
//! in an [`AttemptStore`], serializes steps on each attempt behind that
//! attempt's lock, and reports every transition to a [`SnapshotSink`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adaptest_core::attempt::{Answer, Attempt, AttemptDiagnostics, AttemptView};
use adaptest_core::bank::group_into_pools;
use adaptest_core::error::EngineError;
use adaptest_core::item::ItemPool;
use adaptest_core::snapshot::{AttemptSnapshot, SnapshotEvent};
use adaptest_core::traits::{ItemSource, SnapshotSink};

use crate::config::AdaptestConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::sink::NoopSink;
use crate::store::{AttemptStore, InMemoryAttemptStore};

/// Parameters of a new attempt. Unset fields fall back to the configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Skills to assess; all skills of the item source when `None`.
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub prior_mu: Option<f64>,
    #[serde(default)]
    pub prior_sigma2: Option<f64>,
}

/// Runs attempts against one item source.
pub struct AttemptService<S: AttemptStore = InMemoryAttemptStore> {
    store: S,
    source: Arc<dyn ItemSource>,
    sink: Arc<dyn SnapshotSink>,
    config: AdaptestConfig,
}

impl AttemptService<InMemoryAttemptStore> {
    /// A service with an in-memory store and no persistence.
    pub fn in_memory(source: Arc<dyn ItemSource>, config: AdaptestConfig) -> Self {
        Self::new(InMemoryAttemptStore::new(), source, config)
    }
}

impl<S: AttemptStore> AttemptService<S> {
    pub fn new(store: S, source: Arc<dyn ItemSource>, config: AdaptestConfig) -> Self {
        Self {
            store,
            source,
            sink: Arc::new(NoopSink),
            config,
        }
    }

    /// Report snapshots to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &AdaptestConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn pools_for(&self, skills: &[String]) -> ServiceResult<Vec<ItemPool>> {
        let items = self
            .source
            .items(Some(skills))
            .await
            .map_err(ServiceError::ItemSource)?;
        Ok(group_into_pools(skills, items)?)
    }

    async fn emit(&self, event: SnapshotEvent, snapshot: &AttemptSnapshot) {
        if let Err(e) = self.sink.emit(event, snapshot).await {
            tracing::warn!(
                attempt_id = %snapshot.attempt_id,
                sink = self.sink.name(),
                %event,
                "failed to persist snapshot: {e:#}"
            );
        }
    }

    fn evict_if_finished(&self, attempt_id: &str, finished: bool) {
        if finished && self.config.evict_finished {
            self.store.remove(attempt_id);
            tracing::debug!(attempt_id, "evicted finished attempt");
        }
    }

    /// Start a new attempt and return its first view.
    pub async fn init(&self, request: InitRequest) -> ServiceResult<AttemptView> {
        let skills = match request.skills {
            Some(skills) => skills,
            None => self
                .source
                .skills()
                .await
                .map_err(ServiceError::ItemSource)?,
        };
        let pools = self.pools_for(&skills).await?;

        let prior = self.config.estimator.prior();
        let estimator = self.config.estimator.clone().with_prior(
            request.prior_mu.unwrap_or(prior.mu),
            request.prior_sigma2.unwrap_or(prior.sigma2),
        );
        let attempt = Attempt::init(
            Uuid::new_v4().to_string(),
            pools,
            &estimator,
            &self.config.selector,
            self.config.attempt_config(request.max_items),
        )?;

        let view = attempt.view();
        let snapshot = attempt.snapshot();
        let finished = attempt.is_finished();
        self.store.insert(attempt)?;

        self.emit(SnapshotEvent::Init, &snapshot).await;
        if finished {
            self.emit(SnapshotEvent::Finish, &snapshot).await;
        }
        self.evict_if_finished(&view.attempt_id, finished);
        Ok(view)
    }

    /// Submit an answer to the pending item, or with `None` re-read the current view.
    pub async fn step(
        &self,
        attempt_id: &str,
        answer: Option<Answer>,
    ) -> ServiceResult<AttemptView> {
        let shared = self.store.get(attempt_id)?;
        let mut attempt = shared.lock().await;
        let Some(answer) = answer else {
            return Ok(attempt.view());
        };

        let view = attempt.submit(&answer)?;
        let finished = attempt.is_finished();
        let event = if finished {
            SnapshotEvent::Finish
        } else {
            SnapshotEvent::Step
        };
        // Emitted under the attempt lock so snapshots of one attempt stay ordered.
        self.emit(event, &attempt.snapshot()).await;
        drop(attempt);

        self.evict_if_finished(attempt_id, finished);
        Ok(view)
    }

    pub async fn state(&self, attempt_id: &str) -> ServiceResult<AttemptDiagnostics> {
        let shared = self.store.get(attempt_id)?;
        let attempt = shared.lock().await;
        Ok(attempt.diagnostics())
    }

    pub async fn snapshot(&self, attempt_id: &str) -> ServiceResult<AttemptSnapshot> {
        let shared = self.store.get(attempt_id)?;
        let attempt = shared.lock().await;
        Ok(attempt.snapshot())
    }

    /// Rehydrate an attempt from a snapshot, rebuilding pools from the item source.
    pub async fn resume(&self, snapshot: AttemptSnapshot) -> ServiceResult<AttemptView> {
        if Uuid::parse_str(&snapshot.attempt_id).is_err() {
            return Err(EngineError::InvalidAttemptId(snapshot.attempt_id).into());
        }
        if self.store.contains(&snapshot.attempt_id) {
            return Err(EngineError::AttemptExists(snapshot.attempt_id).into());
        }
        let skills: Vec<String> = snapshot.skills.iter().map(|s| s.skill.clone()).collect();
        let pools = self.pools_for(&skills).await?;
        let attempt = Attempt::restore(&snapshot, pools)?;
        let view = attempt.view();
        self.store.insert(attempt)?;
        Ok(view)
    }

    /// Drop a live attempt.
    pub fn evict(&self, attempt_id: &str) -> ServiceResult<()> {
        match self.store.remove(attempt_id) {
            Some(_) => Ok(()),
            None => Err(EngineError::UnknownAttempt(attempt_id.to_string()).into()),
        }
    }

    /// Evict attempts idle for at least `ttl`. Returns the evicted ids.
    pub fn sweep_idle(&self, ttl: Duration) -> Vec<String> {
        let idle: Vec<String> = self
            .store
            .idle(ttl)
            .into_iter()
            .filter(|attempt_id| self.store.remove_if_idle(attempt_id, ttl).is_some())
            .collect();
        if !idle.is_empty() {
            tracing::info!(count = idle.len(), "evicted idle attempts");
        }
        idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use adaptest_core::attempt::NextAction;
    use adaptest_core::bank::{parse_bank_str, ItemBank};
    use adaptest_core::error::ErrorKind;

    use crate::sink::{JsonDirectorySink, MemorySink};

    const BANK: &str = r#"
[bank]
id = "unit"

[[items]]
id = "t1"
skill = "Testing"
stem = "t1?"
options = ["A", "B", "C", "D"]
correct_index = 0
a = 1.0
b = -0.5
c = 0.2

[[items]]
id = "t2"
skill = "Testing"
stem = "t2?"
options = ["A", "B", "C", "D"]
correct_index = 1
a = 1.2
b = 0.3
c = 0.2

[[items]]
id = "a1"
skill = "Architecture"
stem = "a1?"
options = ["A", "B"]
correct_index = 1
a = 0.9
b = 0.0
c = 0.25
"#;

    fn bank() -> Arc<ItemBank> {
        Arc::new(parse_bank_str(BANK, &PathBuf::from("unit.toml")).unwrap())
    }

    fn answer(view: &AttemptView, correct: bool) -> Option<Answer> {
        view.next_item.as_ref().map(|item| Answer::Graded {
            item_id: item.item_id.clone(),
            correct,
        })
    }

    #[tokio::test]
    async fn init_uses_all_bank_skills() {
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default());
        let view = service.init(InitRequest::default()).await.unwrap();
        assert_eq!(view.next_action, NextAction::Continue);
        assert_eq!(view.theta.len(), 2);
        assert_eq!(view.next_item.as_ref().unwrap().skill, "Testing");

        let again = service.step(&view.attempt_id, None).await.unwrap();
        assert_eq!(again, view);
    }

    #[tokio::test]
    async fn unknown_requested_skill_gets_empty_pool() {
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default());
        let view = service
            .init(InitRequest {
                skills: Some(vec!["Security".into()]),
                ..InitRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(view.next_action, NextAction::Finish);
        assert!(view.next_item.is_none());
    }

    #[tokio::test]
    async fn prior_override_sets_starting_theta() {
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default());
        let view = service
            .init(InitRequest {
                skills: Some(vec!["Testing".into()]),
                prior_mu: Some(0.3),
                ..InitRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(view.theta["Testing"], 0.3);
    }

    #[tokio::test]
    async fn step_emits_snapshots_and_finishes() {
        let sink = Arc::new(MemorySink::new());
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default())
            .with_sink(sink.clone());

        let mut view = service
            .init(InitRequest {
                skills: Some(vec!["Testing".into()]),
                ..InitRequest::default()
            })
            .await
            .unwrap();
        while view.next_action == NextAction::Continue {
            view = service
                .step(&view.attempt_id, answer(&view, true))
                .await
                .unwrap();
        }

        assert_eq!(
            sink.events_for(&view.attempt_id),
            vec![SnapshotEvent::Init, SnapshotEvent::Step, SnapshotEvent::Finish]
        );
        let err = service
            .step(
                &view.attempt_id,
                Some(Answer::Graded {
                    item_id: "t1".into(),
                    correct: true,
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
    }

    #[tokio::test]
    async fn finished_attempts_are_evicted_when_configured() {
        let config = AdaptestConfig {
            evict_finished: true,
            max_items: 1,
            ..AdaptestConfig::default()
        };
        let service = AttemptService::in_memory(bank(), config);
        let view = service.init(InitRequest::default()).await.unwrap();
        let done = service
            .step(&view.attempt_id, answer(&view, false))
            .await
            .unwrap();
        assert_eq!(done.next_action, NextAction::Finish);

        let err = service.state(&view.attempt_id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn unknown_attempt_is_not_found() {
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default());
        let err = service.step("missing", None).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert!(service.evict("missing").is_err());
    }

    #[tokio::test]
    async fn resume_rehydrates_and_rejects_live_ids() {
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default());
        let view = service.init(InitRequest::default()).await.unwrap();
        let view = service
            .step(&view.attempt_id, answer(&view, true))
            .await
            .unwrap();
        let snapshot = service.snapshot(&view.attempt_id).await.unwrap();

        let err = service.resume(snapshot.clone()).await.unwrap_err();
        assert!(err.engine_error().unwrap().is_state_error());

        service.evict(&view.attempt_id).unwrap();
        let resumed = service.resume(snapshot).await.unwrap();
        assert_eq!(resumed, view);
    }

    #[tokio::test]
    async fn resume_rejects_ids_that_are_not_uuids() {
        let dir = tempfile::tempdir().unwrap();
        let sink_dir = dir.path().join("snaps");
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default())
            .with_sink(Arc::new(JsonDirectorySink::new(&sink_dir)));
        let view = service.init(InitRequest::default()).await.unwrap();
        let mut snapshot = service.snapshot(&view.attempt_id).await.unwrap();
        service.evict(&view.attempt_id).unwrap();

        snapshot.attempt_id = "../escaped".into();
        let err = service.resume(snapshot).await.unwrap_err();
        assert_eq!(
            err.engine_error(),
            Some(&EngineError::InvalidAttemptId("../escaped".into()))
        );
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
        assert!(!dir.path().join("escaped.json").exists());
        assert!(service.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_idle_evicts_stale_attempts() {
        let service = AttemptService::in_memory(bank(), AdaptestConfig::default());
        let stale = service.init(InitRequest::default()).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;
        let fresh = service.init(InitRequest::default()).await.unwrap();

        let evicted = service.sweep_idle(Duration::from_secs(60));
        assert_eq!(evicted, vec![stale.attempt_id.clone()]);
        assert!(service.state(&fresh.attempt_id).await.is_ok());
        assert!(service.state(&stale.attempt_id).await.is_err());
    }
}
