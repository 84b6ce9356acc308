use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::Cache;
use crate::config::{RecencyPolicy, ScoringWeights};
use crate::error::{PipelineError, Result};
use crate::models::{GradeEvent, TimeGranularity};
use crate::{db, mastery, service};

/// A downstream consumer of grade events. Implementations must be idempotent
/// for the same event: each recomputes from durable state, so re-dispatch
/// after a failure never double-counts.
#[async_trait]
pub trait GradeHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, event: &GradeEvent) -> Result<()>;
}

/// Outcome of one handler invocation, recorded for logs and manual retry.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    pub handler: &'static str,
    pub succeeded: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Runs each registered handler with independent error containment. A
/// failure or timeout in handler i is logged with enough context to retry by
/// hand and never prevents handler i+1 from running. No ordering between
/// handlers is guaranteed; none may assume another has already run.
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn GradeHandler>>,
    timeout: Duration,
}

impl EventDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: Vec::new(),
            timeout,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn GradeHandler>) {
        self.handlers.push(handler);
    }

    pub async fn dispatch(&self, event: &GradeEvent) -> Vec<HandlerResult> {
        let mut results = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.timeout, handler.handle(event)).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            let result = match outcome {
                Ok(Ok(())) => {
                    debug!(handler = handler.name(), duration_ms, "handler completed");
                    HandlerResult {
                        handler: handler.name(),
                        succeeded: true,
                        error: None,
                        duration_ms,
                    }
                }
                Ok(Err(err)) => {
                    warn!(
                        handler = handler.name(),
                        student = %event.student_id,
                        activity = %event.activity_id,
                        class = %event.class_id,
                        error = %err,
                        "handler failed"
                    );
                    HandlerResult {
                        handler: handler.name(),
                        succeeded: false,
                        error: Some(err.to_string()),
                        duration_ms,
                    }
                }
                Err(_) => {
                    warn!(
                        handler = handler.name(),
                        student = %event.student_id,
                        activity = %event.activity_id,
                        class = %event.class_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "handler timed out"
                    );
                    HandlerResult {
                        handler: handler.name(),
                        succeeded: false,
                        error: Some(
                            PipelineError::HandlerTimeout(self.timeout.as_millis() as u64)
                                .to_string(),
                        ),
                        duration_ms,
                    }
                }
            };
            results.push(result);
        }
        results
    }
}

/// Emits events after a grade write has durably committed. Dispatch runs on
/// its own task; nothing here can fail or delay the grading caller, which
/// observes outcomes only through logs.
#[derive(Clone)]
pub struct GradeEventPublisher {
    dispatcher: Arc<EventDispatcher>,
}

impl GradeEventPublisher {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Fire-and-forget. The returned handle may be dropped; the CLI awaits
    /// it so the process does not exit mid-dispatch.
    pub fn publish(&self, event: GradeEvent) -> JoinHandle<Vec<HandlerResult>> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let results = dispatcher.dispatch(&event).await;
            let failed = results.iter().filter(|r| !r.succeeded).count();
            if failed > 0 {
                warn!(
                    student = %event.student_id,
                    activity = %event.activity_id,
                    failed,
                    total = results.len(),
                    "grade event dispatched with failures"
                );
            } else {
                info!(
                    student = %event.student_id,
                    activity = %event.activity_id,
                    handlers = results.len(),
                    "grade event dispatched"
                );
            }
            results
        })
    }
}

/// Recomputes the student's mastery vector for the graded topic and drops
/// the cached read for it, so the refreshed vector is visible immediately.
pub struct MasteryRefreshHandler {
    pool: PgPool,
    cache: Cache,
    recency_policy: RecencyPolicy,
}

impl MasteryRefreshHandler {
    pub fn new(pool: PgPool, cache: Cache, recency_policy: RecencyPolicy) -> Self {
        Self {
            pool,
            cache,
            recency_policy,
        }
    }
}

#[async_trait]
impl GradeHandler for MasteryRefreshHandler {
    fn name(&self) -> &'static str {
        "topic-mastery"
    }

    async fn handle(&self, event: &GradeEvent) -> Result<()> {
        let Some(topic_id) = event.topic_id else {
            debug!(activity = %event.activity_id, "grade carries no topic, skipping mastery");
            return Ok(());
        };
        let grades = db::fetch_topic_grades(&self.pool, event.student_id, topic_id).await?;
        let mastery = mastery::compute_mastery(
            event.student_id,
            event.class_id,
            topic_id,
            &grades,
            self.recency_policy,
            chrono::Utc::now(),
        );
        db::upsert_topic_mastery(&self.pool, &mastery).await?;
        self.cache
            .invalidate(&service::mastery_cache_key(
                event.student_id,
                event.class_id,
                topic_id,
            ))
            .await;
        Ok(())
    }
}

/// Rebuilds the class leaderboard at every granularity and invalidates the
/// cache scopes the grade touched. Wider scopes are rebuilt lazily on read.
pub struct LeaderboardRefreshHandler {
    pool: PgPool,
    cache: Cache,
    weights: ScoringWeights,
    history_months: u32,
}

impl LeaderboardRefreshHandler {
    pub fn new(pool: PgPool, cache: Cache, weights: ScoringWeights, history_months: u32) -> Self {
        Self {
            pool,
            cache,
            weights,
            history_months,
        }
    }
}

#[async_trait]
impl GradeHandler for LeaderboardRefreshHandler {
    fn name(&self) -> &'static str {
        "leaderboard-refresh"
    }

    async fn handle(&self, event: &GradeEvent) -> Result<()> {
        for granularity in TimeGranularity::ALL {
            service::rebuild_leaderboard(
                &self.pool,
                crate::models::EntityScope::Class,
                event.class_id,
                granularity,
                &self.weights,
                self.history_months,
                chrono::Utc::now(),
            )
            .await?;
        }
        let lineage = db::class_lineage(&self.pool, event.class_id).await?;
        let group_ids = db::student_group_ids(&self.pool, event.student_id).await?;
        for prefix in invalidation_prefixes(event, lineage.as_ref(), &group_ids) {
            self.cache.invalidate(&prefix).await;
        }
        Ok(())
    }
}

/// Cache prefixes a grade write dirties: every scope the class rolls up into
/// plus the student's ad-hoc groups. A class with no resolvable lineage still
/// dirties its class and subject boards.
pub(crate) fn invalidation_prefixes(
    event: &GradeEvent,
    lineage: Option<&db::ClassLineage>,
    group_ids: &[Uuid],
) -> Vec<String> {
    let mut prefixes = vec![
        format!("class:{}", event.class_id),
        format!("subject:{}", event.subject_id),
    ];
    if let Some(lineage) = lineage {
        prefixes.push(format!("course:{}", lineage.course_id));
        prefixes.push(format!("campus:{}", lineage.campus_id));
    }
    for group_id in group_ids {
        prefixes.push(format!("group:{group_id}"));
    }
    prefixes
}

/// Keeps the one explicitly incremental metric: a count of events seen since
/// process start.
pub struct ActivityCounterHandler {
    counter: Arc<AtomicU64>,
}

impl ActivityCounterHandler {
    pub fn new(counter: Arc<AtomicU64>) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl GradeHandler for ActivityCounterHandler {
    fn name(&self) -> &'static str {
        "activity-counter"
    }

    async fn handle(&self, _event: &GradeEvent) -> Result<()> {
        self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use uuid::Uuid;

    fn sample_event() -> GradeEvent {
        GradeEvent {
            student_id: Uuid::from_u128(1),
            activity_id: Uuid::from_u128(2),
            class_id: Uuid::from_u128(3),
            subject_id: Uuid::from_u128(4),
            topic_id: Some(Uuid::from_u128(5)),
            score: 8.0,
            max_score: 10.0,
            graded_by: Uuid::from_u128(6),
            graded_at: chrono::Utc::now(),
            blooms_level_scores: None,
        }
    }

    struct FaultyHandler;

    #[async_trait]
    impl GradeHandler for FaultyHandler {
        fn name(&self) -> &'static str {
            "faulty"
        }

        async fn handle(&self, _event: &GradeEvent) -> Result<()> {
            Err(PipelineError::TransientStore("injected".to_string()))
        }
    }

    struct CountingHandler {
        calls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl GradeHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _event: &GradeEvent) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl GradeHandler for SlowHandler {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn handle(&self, _event: &GradeEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_next() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut dispatcher = EventDispatcher::new(Duration::from_secs(5));
        dispatcher.register(Arc::new(FaultyHandler));
        dispatcher.register(Arc::new(CountingHandler {
            calls: calls.clone(),
        }));

        let results = dispatcher.dispatch(&sample_event()).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].succeeded);
        assert!(results[0].error.as_deref().unwrap().contains("injected"));
        assert!(results[1].succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_handler_is_recorded_as_failed() {
        let mut dispatcher = EventDispatcher::new(Duration::from_millis(20));
        dispatcher.register(Arc::new(SlowHandler));

        let results = dispatcher.dispatch(&sample_event()).await;
        assert!(!results[0].succeeded);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn publish_never_fails_the_caller() {
        let mut dispatcher = EventDispatcher::new(Duration::from_secs(5));
        dispatcher.register(Arc::new(FaultyHandler));
        let publisher = GradeEventPublisher::new(Arc::new(dispatcher));

        let results = publisher.publish(sample_event()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].succeeded);
    }

    #[test]
    fn grade_write_dirties_every_enclosing_scope() {
        let event = sample_event();
        let lineage = db::ClassLineage {
            course_id: Uuid::from_u128(10),
            campus_id: Uuid::from_u128(11),
        };
        let groups = [Uuid::from_u128(20), Uuid::from_u128(21)];
        let prefixes = invalidation_prefixes(&event, Some(&lineage), &groups);
        assert_eq!(
            prefixes,
            vec![
                format!("class:{}", event.class_id),
                format!("subject:{}", event.subject_id),
                "course:00000000-0000-0000-0000-00000000000a".to_string(),
                "campus:00000000-0000-0000-0000-00000000000b".to_string(),
                "group:00000000-0000-0000-0000-000000000014".to_string(),
                "group:00000000-0000-0000-0000-000000000015".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn invalidation_reaches_cached_wider_scope_boards() {
        let cache = Cache::new();
        let event = sample_event();
        let lineage = db::ClassLineage {
            course_id: Uuid::from_u128(10),
            campus_id: Uuid::from_u128(11),
        };
        let group = Uuid::from_u128(20);
        for key in [
            format!("course:{}:leaderboard:weekly", lineage.course_id),
            format!("campus:{}:leaderboard:weekly", lineage.campus_id),
            format!("group:{group}:leaderboard:weekly"),
        ] {
            let _: i64 = cache
                .get_or_compute(&key, Duration::from_secs(300), || async { Ok(1) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len().await, 3);

        for prefix in invalidation_prefixes(&event, Some(&lineage), &[group]) {
            cache.invalidate(&prefix).await;
        }
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn counter_handler_increments_per_event() {
        let counter = Arc::new(AtomicU64::new(0));
        let handler = ActivityCounterHandler::new(counter.clone());
        handler.handle(&sample_event()).await.unwrap();
        handler.handle(&sample_event()).await.unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }
}
