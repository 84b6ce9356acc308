use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::ScoringWeights;
use crate::error::Result;
use crate::models::{EntityScope, LeaderboardSnapshot, TimeGranularity};
use crate::{db, service, window};

/// One aggregated point of a rank-over-time trend read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period_label: String,
    pub period_start: DateTime<Utc>,
    pub average_rank: f64,
    pub average_score: f64,
    pub entry_count: usize,
}

/// Materializes the current leaderboard into a write-once snapshot for the
/// active period. Appends, never updates.
pub async fn capture(
    pool: &sqlx::PgPool,
    scope: EntityScope,
    entity_id: Uuid,
    granularity: TimeGranularity,
    weights: &ScoringWeights,
    history_months: u32,
) -> Result<LeaderboardSnapshot> {
    let now = Utc::now();
    let entries = service::rebuild_leaderboard(
        pool,
        scope,
        entity_id,
        granularity,
        weights,
        history_months,
        now,
    )
    .await?;
    let period = window::active_window(granularity, now, history_months);

    let snapshot = LeaderboardSnapshot {
        id: Uuid::new_v4(),
        entity_scope: scope,
        entity_id,
        time_granularity: granularity,
        period,
        captured_at: now,
        entries,
    };
    db::insert_snapshot(pool, &snapshot).await?;
    info!(
        scope = %scope,
        entity = %entity_id,
        granularity = %granularity,
        period = %snapshot.period.label,
        entries = snapshot.entries.len(),
        "leaderboard snapshot captured"
    );
    Ok(snapshot)
}

/// Snapshots in ascending period order. Finite and restartable: the same
/// bounds return the same sequence barring new captures.
pub async fn history(
    pool: &sqlx::PgPool,
    scope: EntityScope,
    entity_id: Uuid,
    granularity: TimeGranularity,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<LeaderboardSnapshot>> {
    db::fetch_snapshots(pool, scope, entity_id, granularity, from, to).await
}

/// Collapses the trailing `periods` snapshots into per-period averages.
pub fn trends(snapshots: &[LeaderboardSnapshot], periods: usize) -> Vec<TrendPoint> {
    let skip = snapshots.len().saturating_sub(periods);
    snapshots[skip..]
        .iter()
        .map(|snapshot| {
            let count = snapshot.entries.len();
            let (rank_sum, score_sum) = snapshot
                .entries
                .iter()
                .fold((0.0, 0.0), |(r, s), e| {
                    (r + e.rank as f64, s + e.composite_score)
                });
            TrendPoint {
                period_label: snapshot.period.label.clone(),
                period_start: snapshot.period.start,
                average_rank: if count == 0 { 0.0 } else { rank_sum / count as f64 },
                average_score: if count == 0 { 0.0 } else { score_sum / count as f64 },
                entry_count: count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::{LeaderboardEntry, Period};

    fn entry(rank: i64, composite: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            entity_scope: EntityScope::Class,
            entity_id: Uuid::from_u128(1),
            time_granularity: TimeGranularity::Weekly,
            student_id: Uuid::from_u128(rank as u128),
            student_name: format!("Student {rank}"),
            rank,
            rank_delta: 0,
            academic_score: composite,
            reward_points: 0.0,
            attendance_rate: 0.0,
            participation_rate: 0.0,
            improvement_score: 0.0,
            composite_score: composite,
        }
    }

    fn snapshot(week: i64, entries: Vec<LeaderboardEntry>) -> LeaderboardSnapshot {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).single().unwrap()
            + Duration::weeks(week);
        LeaderboardSnapshot {
            id: Uuid::new_v4(),
            entity_scope: EntityScope::Class,
            entity_id: Uuid::from_u128(1),
            time_granularity: TimeGranularity::Weekly,
            period: Period {
                label: format!("week-{}", start.format("%Y-%m-%d")),
                start,
                end: start + Duration::weeks(1),
            },
            captured_at: start + Duration::weeks(1),
            entries,
        }
    }

    #[test]
    fn trends_average_rank_and_score_per_period() {
        let snapshots = vec![
            snapshot(0, vec![entry(1, 90.0), entry(2, 70.0)]),
            snapshot(1, vec![entry(1, 95.0), entry(2, 75.0)]),
        ];
        let points = trends(&snapshots, 10);
        assert_eq!(points.len(), 2);
        assert!((points[0].average_rank - 1.5).abs() < 1e-9);
        assert!((points[0].average_score - 80.0).abs() < 1e-9);
        assert!((points[1].average_score - 85.0).abs() < 1e-9);
        assert_eq!(points[0].entry_count, 2);
    }

    #[test]
    fn trends_keep_only_the_trailing_periods() {
        let snapshots = vec![
            snapshot(0, vec![entry(1, 50.0)]),
            snapshot(1, vec![entry(1, 60.0)]),
            snapshot(2, vec![entry(1, 70.0)]),
        ];
        let points = trends(&snapshots, 2);
        assert_eq!(points.len(), 2);
        assert!((points[0].average_score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_yields_zeroed_point() {
        let snapshots = vec![snapshot(0, Vec::new())];
        let points = trends(&snapshots, 5);
        assert_eq!(points[0].entry_count, 0);
        assert_eq!(points[0].average_rank, 0.0);
    }
}
