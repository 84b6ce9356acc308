use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::cache::Cache;
use crate::config::{Config, ScoringWeights};
use crate::error::Result;
use crate::events::{
    ActivityCounterHandler, EventDispatcher, GradeEventPublisher, HandlerResult,
    LeaderboardRefreshHandler, MasteryRefreshHandler,
};
use crate::models::{
    EntityScope, GradeEvent, LeaderboardEntry, LeaderboardPage, LeaderboardSnapshot,
    TimeGranularity, TopicMastery,
};
use crate::snapshot::TrendPoint;
use crate::{db, leaderboard, snapshot, window};

/// Resolves scope membership and raw metrics, ranks them, and rewrites the
/// stored board. Shared by the refresh handler, cold cache reads, and
/// snapshot capture.
pub(crate) async fn rebuild_leaderboard(
    pool: &PgPool,
    scope: EntityScope,
    entity_id: Uuid,
    granularity: TimeGranularity,
    weights: &ScoringWeights,
    history_months: u32,
    now: DateTime<Utc>,
) -> Result<Vec<LeaderboardEntry>> {
    let students = db::resolve_scope(pool, scope, entity_id).await?;
    if students.is_empty() {
        debug!(scope = %scope, entity = %entity_id, "scope resolved to zero students");
        return Ok(Vec::new());
    }
    let student_ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
    let active = window::active_window(granularity, now, history_months);

    let class_ids = db::resolve_scope_classes(pool, scope, entity_id).await?;
    let grades = db::fetch_grades(pool, &student_ids, &active).await?;
    let attendance = db::fetch_attendance(pool, &student_ids, &active).await?;
    let submissions = db::fetch_submissions(pool, &student_ids, &active).await?;
    let rewards = db::fetch_rewards(pool, &student_ids, &active).await?;
    let activities = db::fetch_activity_ids(pool, &class_ids, &active).await?;
    let prior_ranks = db::latest_snapshot_ranks(pool, scope, entity_id, granularity).await?;

    let entries = leaderboard::compute_leaderboard(
        scope,
        entity_id,
        granularity,
        &active,
        &students,
        &grades,
        &attendance,
        &submissions,
        &rewards,
        &activities,
        &prior_ranks,
        weights,
    );
    db::replace_leaderboard(pool, scope, entity_id, granularity, &entries).await?;
    Ok(entries)
}

/// Cache key for one student's mastery vector. Shared by the read path and
/// the invalidation the mastery handler performs after a rewrite, so the two
/// can never drift apart.
pub(crate) fn mastery_cache_key(student_id: Uuid, class_id: Uuid, topic_id: Uuid) -> String {
    format!("mastery:{student_id}:{class_id}:{topic_id}")
}

/// The surface the surrounding CRUD layer talks to.
pub struct PipelineService {
    pool: PgPool,
    cache: Cache,
    config: Config,
    publisher: GradeEventPublisher,
    events_seen: Arc<AtomicU64>,
}

impl PipelineService {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let cache = Cache::new();
        let events_seen = Arc::new(AtomicU64::new(0));

        let mut dispatcher = EventDispatcher::new(config.handler_timeout);
        dispatcher.register(Arc::new(MasteryRefreshHandler::new(
            pool.clone(),
            cache.clone(),
            config.recency_policy,
        )));
        dispatcher.register(Arc::new(LeaderboardRefreshHandler::new(
            pool.clone(),
            cache.clone(),
            config.weights.clone(),
            config.history_months,
        )));
        dispatcher.register(Arc::new(ActivityCounterHandler::new(events_seen.clone())));
        let publisher = GradeEventPublisher::new(Arc::new(dispatcher));

        Self {
            pool,
            cache,
            config,
            publisher,
            events_seen,
        }
    }

    /// Called exactly once per successful grade write. Fire-and-forget: the
    /// grade commit is already durable and nothing downstream can undo it.
    pub fn on_grade_committed(&self, event: GradeEvent) {
        drop(self.publisher.publish(event));
    }

    /// Write path used by the CLI: inserts the grade, invalidates the scopes
    /// it feeds, then publishes. Returns the event and the dispatch handle
    /// so the caller can await handler results before exiting.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_grade(
        &self,
        student_id: Uuid,
        activity_id: Uuid,
        class_id: Uuid,
        subject_id: Uuid,
        topic_id: Option<Uuid>,
        cognitive_level: Option<&str>,
        score: f64,
        max_score: f64,
        graded_by: Uuid,
    ) -> Result<(GradeEvent, JoinHandle<Vec<HandlerResult>>)> {
        let event = db::insert_grade(
            &self.pool,
            student_id,
            activity_id,
            class_id,
            subject_id,
            topic_id,
            cognitive_level,
            score,
            max_score,
            graded_by,
        )
        .await?;
        self.cache.invalidate(&format!("class:{class_id}")).await;
        self.cache.invalidate(&format!("subject:{subject_id}")).await;
        if let Some(topic_id) = topic_id {
            self.cache
                .invalidate(&mastery_cache_key(student_id, class_id, topic_id))
                .await;
        }
        let handle = self.publisher.publish(event.clone());
        Ok((event, handle))
    }

    /// Cached leaderboard read. The engine's ordering is preserved; this
    /// only slices for pagination.
    pub async fn get_leaderboard(
        &self,
        scope: EntityScope,
        entity_id: Uuid,
        granularity: TimeGranularity,
        limit: usize,
        offset: usize,
    ) -> Result<LeaderboardPage> {
        let entries = self.cached_leaderboard(scope, entity_id, granularity).await?;
        let total_count = entries.len();
        let entries = entries.into_iter().skip(offset).take(limit).collect();
        Ok(LeaderboardPage {
            entries,
            total_count,
        })
    }

    pub async fn get_student_position(
        &self,
        scope: EntityScope,
        entity_id: Uuid,
        student_id: Uuid,
        granularity: TimeGranularity,
    ) -> Result<Option<LeaderboardEntry>> {
        let entries = self.cached_leaderboard(scope, entity_id, granularity).await?;
        Ok(entries.into_iter().find(|e| e.student_id == student_id))
    }

    pub async fn capture_snapshot(
        &self,
        scope: EntityScope,
        entity_id: Uuid,
        granularity: TimeGranularity,
    ) -> Result<LeaderboardSnapshot> {
        snapshot::capture(
            &self.pool,
            scope,
            entity_id,
            granularity,
            &self.config.weights,
            self.config.history_months,
        )
        .await
    }

    pub async fn get_trends(
        &self,
        scope: EntityScope,
        entity_id: Uuid,
        granularity: TimeGranularity,
        periods: usize,
    ) -> Result<Vec<TrendPoint>> {
        let snapshots =
            snapshot::history(&self.pool, scope, entity_id, granularity, None, None).await?;
        Ok(snapshot::trends(&snapshots, periods))
    }

    pub async fn get_topic_mastery(
        &self,
        student_id: Uuid,
        class_id: Uuid,
        topic_id: Uuid,
    ) -> Result<Option<TopicMastery>> {
        let key = mastery_cache_key(student_id, class_id, topic_id);
        self.cache
            .get_or_compute(&key, self.config.mastery_ttl, || {
                db::get_topic_mastery(&self.pool, student_id, class_id, topic_id)
            })
            .await
    }

    /// Events dispatched since process start (the incremental counter metric).
    pub fn events_processed(&self) -> u64 {
        self.events_seen.load(Ordering::Relaxed)
    }

    async fn cached_leaderboard(
        &self,
        scope: EntityScope,
        entity_id: Uuid,
        granularity: TimeGranularity,
    ) -> Result<Vec<LeaderboardEntry>> {
        let key = format!("{scope}:{entity_id}:leaderboard:{granularity}");
        self.cache
            .get_or_compute(&key, self.config.leaderboard_ttl, || {
                rebuild_leaderboard(
                    &self.pool,
                    scope,
                    entity_id,
                    granularity,
                    &self.config.weights,
                    self.config.history_months,
                    Utc::now(),
                )
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // A mastery rewrite must be visible to the next read, not hidden behind
    // the TTL: priming the read key with an old vector and then applying the
    // handler's invalidation has to force a recompute.
    #[tokio::test]
    async fn mastery_rewrite_invalidates_the_cached_read() {
        let cache = Cache::new();
        let (student, class, topic) = (
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            Uuid::from_u128(3),
        );
        let key = mastery_cache_key(student, class, topic);
        let ttl = Duration::from_secs(120);

        let stale: f64 = cache
            .get_or_compute(&key, ttl, || async { Ok(70.0) })
            .await
            .unwrap();
        assert_eq!(stale, 70.0);

        cache.invalidate(&mastery_cache_key(student, class, topic)).await;

        let fresh: f64 = cache
            .get_or_compute(&key, ttl, || async { Ok(95.0) })
            .await
            .unwrap();
        assert_eq!(fresh, 95.0);
    }
}
