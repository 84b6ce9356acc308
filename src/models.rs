use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bloom's-taxonomy cognitive level attached to a graded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl CognitiveLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveLevel::Remember => "remember",
            CognitiveLevel::Understand => "understand",
            CognitiveLevel::Apply => "apply",
            CognitiveLevel::Analyze => "analyze",
            CognitiveLevel::Evaluate => "evaluate",
            CognitiveLevel::Create => "create",
        }
    }
}

impl FromStr for CognitiveLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remember" => Ok(CognitiveLevel::Remember),
            "understand" => Ok(CognitiveLevel::Understand),
            "apply" => Ok(CognitiveLevel::Apply),
            "analyze" => Ok(CognitiveLevel::Analyze),
            "evaluate" => Ok(CognitiveLevel::Evaluate),
            "create" => Ok(CognitiveLevel::Create),
            other => Err(format!("unknown cognitive level: {other}")),
        }
    }
}

impl fmt::Display for CognitiveLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of group a leaderboard is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    Class,
    Subject,
    Course,
    Campus,
    Group,
}

impl EntityScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityScope::Class => "class",
            EntityScope::Subject => "subject",
            EntityScope::Course => "course",
            EntityScope::Campus => "campus",
            EntityScope::Group => "group",
        }
    }
}

impl FromStr for EntityScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "class" => Ok(EntityScope::Class),
            "subject" => Ok(EntityScope::Subject),
            "course" => Ok(EntityScope::Course),
            "campus" => Ok(EntityScope::Campus),
            "group" => Ok(EntityScope::Group),
            other => Err(format!("unknown entity scope: {other}")),
        }
    }
}

impl fmt::Display for EntityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Period resolution for leaderboards and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    Weekly,
    Monthly,
    Term,
    AllTime,
}

impl TimeGranularity {
    pub const ALL: [TimeGranularity; 4] = [
        TimeGranularity::Weekly,
        TimeGranularity::Monthly,
        TimeGranularity::Term,
        TimeGranularity::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGranularity::Weekly => "weekly",
            TimeGranularity::Monthly => "monthly",
            TimeGranularity::Term => "term",
            TimeGranularity::AllTime => "all_time",
        }
    }
}

impl FromStr for TimeGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weekly" => Ok(TimeGranularity::Weekly),
            "monthly" => Ok(TimeGranularity::Monthly),
            "term" => Ok(TimeGranularity::Term),
            "all_time" | "all-time" | "alltime" => Ok(TimeGranularity::AllTime),
            other => Err(format!("unknown time granularity: {other}")),
        }
    }
}

impl fmt::Display for TimeGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The immutable fact emitted once per grading action. Never persisted as its
/// own record; it is the unit of work handed to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeEvent {
    pub student_id: Uuid,
    pub activity_id: Uuid,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub score: f64,
    pub max_score: f64,
    pub graded_by: Uuid,
    pub graded_at: DateTime<Utc>,
    pub blooms_level_scores: Option<BTreeMap<CognitiveLevel, f64>>,
}

impl GradeEvent {
    /// Per-level percentage map for an event graded at one cognitive level.
    /// None when the grade carries no level or the max score is unusable.
    pub fn level_scores(
        level: Option<CognitiveLevel>,
        score: f64,
        max_score: f64,
    ) -> Option<BTreeMap<CognitiveLevel, f64>> {
        let level = level?;
        if max_score <= 0.0 {
            return None;
        }
        Some(BTreeMap::from([(level, score / max_score * 100.0)]))
    }
}

/// A student resolved into some leaderboard scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRef {
    pub id: Uuid,
    pub name: String,
}

/// Raw graded attempt as read back from the score store.
#[derive(Debug, Clone)]
pub struct GradeRecord {
    pub student_id: Uuid,
    pub activity_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub cognitive_level: Option<CognitiveLevel>,
    pub score: f64,
    pub max_score: f64,
    pub graded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub student_id: Uuid,
    pub present: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub student_id: Uuid,
    pub activity_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RewardRecord {
    pub student_id: Uuid,
    pub points: i64,
    pub awarded_at: DateTime<Utc>,
}

/// Per-student, per-topic mastery vector. One row per (student, topic),
/// always recomputed from full grade history, never patched incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMastery {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub topic_id: Uuid,
    pub per_level_score: BTreeMap<CognitiveLevel, f64>,
    pub overall_score: f64,
    pub updated_at: DateTime<Utc>,
}

/// One ranked row of a leaderboard. Rank is derived from composite_score and
/// the tie-break rules; it is never an independent source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub entity_scope: EntityScope,
    pub entity_id: Uuid,
    pub time_granularity: TimeGranularity,
    pub student_id: Uuid,
    pub student_name: String,
    pub rank: i64,
    pub rank_delta: i64,
    pub academic_score: f64,
    pub reward_points: f64,
    pub attendance_rate: f64,
    pub participation_rate: f64,
    pub improvement_score: f64,
    pub composite_score: f64,
}

/// A concrete time bucket with a stable label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Write-once capture of a leaderboard for one period, used for trend reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub id: Uuid,
    pub entity_scope: EntityScope,
    pub entity_id: Uuid,
    pub time_granularity: TimeGranularity,
    pub period: Period,
    pub captured_at: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
}

/// Paginated leaderboard read result.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_scores_derive_from_the_graded_level() {
        let scores = GradeEvent::level_scores(Some(CognitiveLevel::Apply), 8.0, 10.0).unwrap();
        assert_eq!(scores.len(), 1);
        assert!((scores[&CognitiveLevel::Apply] - 80.0).abs() < 1e-9);
    }

    #[test]
    fn level_scores_absent_without_a_level_or_valid_max() {
        assert!(GradeEvent::level_scores(None, 8.0, 10.0).is_none());
        assert!(GradeEvent::level_scores(Some(CognitiveLevel::Apply), 8.0, 0.0).is_none());
    }
}
