use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::RecencyPolicy;
use crate::models::{CognitiveLevel, GradeRecord, TopicMastery};

/// Recomputes a student's mastery vector for one topic from the full grade
/// history. Replace-on-write and derived entirely from durable inputs, so
/// re-running with the same grades is idempotent and concurrent runs converge.
pub fn compute_mastery(
    student_id: Uuid,
    class_id: Uuid,
    topic_id: Uuid,
    grades: &[GradeRecord],
    policy: RecencyPolicy,
    now: DateTime<Utc>,
) -> TopicMastery {
    let mut by_level: BTreeMap<CognitiveLevel, Vec<&GradeRecord>> = BTreeMap::new();
    for grade in grades {
        if grade.student_id != student_id || grade.topic_id != Some(topic_id) {
            continue;
        }
        if let Some(level) = grade.cognitive_level {
            by_level.entry(level).or_default().push(grade);
        }
    }

    let per_level_score: BTreeMap<CognitiveLevel, f64> = by_level
        .into_iter()
        .map(|(level, mut attempts)| {
            attempts.sort_by_key(|g| g.graded_at);
            (level, level_score(&attempts, policy))
        })
        .collect();

    // Levels with no data are excluded, never counted as zero.
    let overall_score = if per_level_score.is_empty() {
        0.0
    } else {
        per_level_score.values().sum::<f64>() / per_level_score.len() as f64
    };

    TopicMastery {
        student_id,
        class_id,
        topic_id,
        per_level_score,
        overall_score,
        updated_at: now,
    }
}

/// Weighted mean of score/max over attempts sorted oldest-first. Linear
/// weighting gives attempt k weight k, so recent attempts never weigh less.
fn level_score(attempts: &[&GradeRecord], policy: RecencyPolicy) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (index, grade) in attempts.iter().enumerate() {
        let weight = match policy {
            RecencyPolicy::SimpleMean => 1.0,
            RecencyPolicy::Linear => (index + 1) as f64,
        };
        let pct = if grade.max_score <= 0.0 {
            0.0
        } else {
            grade.score / grade.max_score * 100.0
        };
        weighted += pct * weight;
        total_weight += weight;
    }
    if total_weight == 0.0 {
        0.0
    } else {
        weighted / total_weight
    }
}
