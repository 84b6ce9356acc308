use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::config::ScoringWeights;
use crate::models::{
    AttendanceRecord, EntityScope, GradeRecord, LeaderboardEntry, Period, RewardRecord,
    StudentRef, SubmissionRecord, TimeGranularity,
};

/// Raw per-student metrics pulled for one time window.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentMetrics {
    pub academic_score: f64,
    pub reward_points: f64,
    pub attendance_rate: f64,
    pub participation_rate: f64,
    pub improvement_score: f64,
}

/// Computes one student's window metrics. Missing data yields 0 for each
/// component; every enrolled student gets a metrics row.
///
/// `scoped_activities` is the set of activities in scope for the window;
/// submissions outside it are ignored so the participation rate numerator
/// and denominator always cover the same activities.
pub fn compute_metrics(
    student_id: Uuid,
    window: &Period,
    grades: &[GradeRecord],
    attendance: &[AttendanceRecord],
    submissions: &[SubmissionRecord],
    rewards: &[RewardRecord],
    scoped_activities: &HashSet<Uuid>,
) -> StudentMetrics {
    let mut windowed: Vec<&GradeRecord> = grades
        .iter()
        .filter(|g| {
            g.student_id == student_id && g.graded_at >= window.start && g.graded_at < window.end
        })
        .collect();
    windowed.sort_by_key(|g| g.graded_at);

    let academic_score = mean(
        windowed
            .iter()
            .map(|g| percentage(g.score, g.max_score)),
    );

    let reward_points: f64 = rewards
        .iter()
        .filter(|r| {
            r.student_id == student_id && r.awarded_at >= window.start && r.awarded_at < window.end
        })
        .map(|r| r.points as f64)
        .sum();

    let (present, total) = attendance
        .iter()
        .filter(|a| {
            a.student_id == student_id
                && a.recorded_at >= window.start
                && a.recorded_at < window.end
        })
        .fold((0usize, 0usize), |(p, t), a| {
            (p + usize::from(a.present), t + 1)
        });
    let attendance_rate = if total == 0 {
        0.0
    } else {
        present as f64 / total as f64
    };

    let submitted: HashSet<Uuid> = submissions
        .iter()
        .filter(|s| {
            s.student_id == student_id
                && s.submitted_at >= window.start
                && s.submitted_at < window.end
                && scoped_activities.contains(&s.activity_id)
        })
        .map(|s| s.activity_id)
        .collect();
    let participation_rate = if scoped_activities.is_empty() {
        0.0
    } else {
        submitted.len() as f64 / scoped_activities.len() as f64
    };

    StudentMetrics {
        academic_score,
        reward_points,
        attendance_rate,
        participation_rate,
        improvement_score: improvement(&windowed, window),
    }
}

/// Second-half window average minus first-half average, split at the window
/// midpoint. Zero unless both halves contain at least one grade.
fn improvement(windowed: &[&GradeRecord], window: &Period) -> f64 {
    let midpoint = window.start + (window.end - window.start) / 2;
    let first: Vec<f64> = windowed
        .iter()
        .filter(|g| g.graded_at < midpoint)
        .map(|g| percentage(g.score, g.max_score))
        .collect();
    let second: Vec<f64> = windowed
        .iter()
        .filter(|g| g.graded_at >= midpoint)
        .map(|g| percentage(g.score, g.max_score))
        .collect();
    if first.is_empty() || second.is_empty() {
        return 0.0;
    }
    mean(second.into_iter()) - mean(first.into_iter())
}

fn percentage(score: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 {
        0.0
    } else {
        score / max_score * 100.0
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn composite_score(metrics: &StudentMetrics, weights: &ScoringWeights) -> f64 {
    metrics.academic_score * weights.academic
        + metrics.reward_points * weights.rewards
        + metrics.attendance_rate * 100.0 * weights.attendance
        + metrics.participation_rate * 100.0 * weights.participation
        + metrics.improvement_score * weights.improvement
}

/// Ranks the students of one (scope, entity, granularity) over one window.
///
/// Ordering is by composite score descending; ties break on attendance rate
/// descending, then participation rate descending, then student id ascending,
/// so the result never depends on storage or iteration order. Ranks are dense
/// 1..N. Callers may slice the result but must never re-sort it.
#[allow(clippy::too_many_arguments)]
pub fn compute_leaderboard(
    scope: EntityScope,
    entity_id: Uuid,
    granularity: TimeGranularity,
    window: &Period,
    students: &[StudentRef],
    grades: &[GradeRecord],
    attendance: &[AttendanceRecord],
    submissions: &[SubmissionRecord],
    rewards: &[RewardRecord],
    activities: &[Uuid],
    prior_ranks: &HashMap<Uuid, i64>,
    weights: &ScoringWeights,
) -> Vec<LeaderboardEntry> {
    let scoped_activities: HashSet<Uuid> = activities.iter().copied().collect();
    let mut entries: Vec<LeaderboardEntry> = students
        .iter()
        .map(|student| {
            let metrics = compute_metrics(
                student.id,
                window,
                grades,
                attendance,
                submissions,
                rewards,
                &scoped_activities,
            );
            LeaderboardEntry {
                entity_scope: scope,
                entity_id,
                time_granularity: granularity,
                student_id: student.id,
                student_name: student.name.clone(),
                rank: 0,
                rank_delta: 0,
                composite_score: composite_score(&metrics, weights),
                academic_score: metrics.academic_score,
                reward_points: metrics.reward_points,
                attendance_rate: metrics.attendance_rate,
                participation_rate: metrics.participation_rate,
                improvement_score: metrics.improvement_score,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(Ordering::Equal)
            .then(
                b.attendance_rate
                    .partial_cmp(&a.attendance_rate)
                    .unwrap_or(Ordering::Equal),
            )
            .then(
                b.participation_rate
                    .partial_cmp(&a.participation_rate)
                    .unwrap_or(Ordering::Equal),
            )
            .then(a.student_id.cmp(&b.student_id))
    });

    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index as i64 + 1;
        entry.rank_delta = prior_ranks
            .get(&entry.student_id)
            .map(|prior| prior - entry.rank)
            .unwrap_or(0);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn window() -> Period {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();
        Period {
            label: "2026-03".to_string(),
            start,
            end: start + Duration::days(28),
        }
    }

    fn student(n: u128) -> StudentRef {
        StudentRef {
            id: Uuid::from_u128(n),
            name: format!("Student {n}"),
        }
    }

    fn grade(student_id: Uuid, score: f64, days_in: i64) -> GradeRecord {
        GradeRecord {
            student_id,
            activity_id: Uuid::from_u128(900 + days_in as u128),
            topic_id: None,
            cognitive_level: None,
            score,
            max_score: 100.0,
            graded_at: window().start + Duration::days(days_in),
        }
    }

    fn attendance(student_id: Uuid, present: bool, days_in: i64) -> AttendanceRecord {
        AttendanceRecord {
            student_id,
            present,
            recorded_at: window().start + Duration::days(days_in),
        }
    }

    fn rank_for(
        students: &[StudentRef],
        grades: &[GradeRecord],
        attendance: &[AttendanceRecord],
    ) -> Vec<LeaderboardEntry> {
        compute_leaderboard(
            EntityScope::Class,
            Uuid::from_u128(42),
            TimeGranularity::Monthly,
            &window(),
            students,
            grades,
            attendance,
            &[],
            &[],
            &[],
            &HashMap::new(),
            &ScoringWeights::default(),
        )
    }

    #[test]
    fn ranking_is_deterministic() {
        let students = vec![student(3), student(1), student(2)];
        let grades = vec![
            grade(students[0].id, 70.0, 2),
            grade(students[1].id, 90.0, 2),
            grade(students[2].id, 80.0, 2),
        ];
        let first = rank_for(&students, &grades, &[]);
        let second = rank_for(&students, &grades, &[]);
        assert_eq!(first, second);
        assert_eq!(first[0].student_id, students[1].id);
    }

    #[test]
    fn ranks_are_dense_one_to_n() {
        let students: Vec<StudentRef> = (1..=5).map(student).collect();
        let entries = rank_for(&students, &[], &[]);
        let ranks: Vec<i64> = entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ties_break_on_ascending_student_id() {
        // Identical composite, attendance and participation for both.
        let students = vec![student(9), student(4)];
        let grades = vec![
            grade(students[0].id, 85.0, 3),
            grade(students[1].id, 85.0, 3),
        ];
        let entries = rank_for(&students, &grades, &[]);
        assert_eq!(entries[0].student_id, Uuid::from_u128(4));
        assert_eq!(entries[1].student_id, Uuid::from_u128(9));
    }

    #[test]
    fn tied_pair_resolved_then_third_ranks_last() {
        // 90/90/70 scenario: the tied pair lands at ranks 1 and 2 by id,
        // the 70 lands at rank 3, and first-ever deltas are all zero.
        let students = vec![student(1), student(2), student(3)];
        let grades = vec![
            grade(students[0].id, 90.0, 2),
            grade(students[1].id, 90.0, 2),
            grade(students[2].id, 70.0, 2),
        ];
        let entries = rank_for(&students, &grades, &[]);
        assert_eq!(entries[0].student_id, Uuid::from_u128(1));
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].student_id, Uuid::from_u128(2));
        assert_eq!(entries[1].rank, 2);
        assert_eq!(entries[2].student_id, Uuid::from_u128(3));
        assert_eq!(entries[2].rank, 3);
        assert!(entries.iter().all(|e| e.rank_delta == 0));
    }

    #[test]
    fn attendance_breaks_composite_ties_before_id() {
        // Attendance weight pushes the better-attending student up, so give
        // both students identical grades and differing attendance, with the
        // attendance component removed from the composite via zero weight.
        let weights = ScoringWeights {
            academic: 1.0,
            rewards: 0.0,
            attendance: 0.0,
            participation: 0.0,
            improvement: 0.0,
        };
        let students = vec![student(1), student(2)];
        let grades = vec![
            grade(students[0].id, 80.0, 2),
            grade(students[1].id, 80.0, 2),
        ];
        let records = vec![
            attendance(students[0].id, false, 1),
            attendance(students[1].id, true, 1),
        ];
        let entries = compute_leaderboard(
            EntityScope::Class,
            Uuid::from_u128(42),
            TimeGranularity::Monthly,
            &window(),
            &students,
            &grades,
            &records,
            &[],
            &[],
            &[],
            &HashMap::new(),
            &weights,
        );
        assert_eq!(entries[0].student_id, Uuid::from_u128(2));
    }

    #[test]
    fn empty_scope_yields_empty_leaderboard() {
        let entries = rank_for(&[], &[], &[]);
        assert!(entries.is_empty());
    }

    #[test]
    fn students_without_records_still_appear_with_zero_metrics() {
        let students = vec![student(1), student(2)];
        let grades = vec![grade(students[0].id, 95.0, 2)];
        let entries = rank_for(&students, &grades, &[]);
        assert_eq!(entries.len(), 2);
        let idle = entries
            .iter()
            .find(|e| e.student_id == Uuid::from_u128(2))
            .unwrap();
        assert_eq!(idle.academic_score, 0.0);
        assert_eq!(idle.composite_score, 0.0);
        assert_eq!(idle.rank, 2);
    }

    #[test]
    fn rank_delta_reflects_prior_snapshot() {
        let students = vec![student(1), student(2)];
        let grades = vec![
            grade(students[0].id, 60.0, 2),
            grade(students[1].id, 90.0, 2),
        ];
        let mut prior = HashMap::new();
        prior.insert(Uuid::from_u128(1), 1);
        prior.insert(Uuid::from_u128(2), 2);
        let entries = compute_leaderboard(
            EntityScope::Class,
            Uuid::from_u128(42),
            TimeGranularity::Monthly,
            &window(),
            &students,
            &grades,
            &[],
            &[],
            &[],
            &[],
            &prior,
            &ScoringWeights::default(),
        );
        let climber = entries.iter().find(|e| e.student_id == Uuid::from_u128(2)).unwrap();
        let faller = entries.iter().find(|e| e.student_id == Uuid::from_u128(1)).unwrap();
        assert_eq!(climber.rank_delta, 1);
        assert_eq!(faller.rank_delta, -1);
    }

    #[test]
    fn improvement_needs_both_halves() {
        let id = Uuid::from_u128(7);
        let none = HashSet::new();
        let early_only = vec![grade(id, 50.0, 1), grade(id, 60.0, 2)];
        let metrics = compute_metrics(id, &window(), &early_only, &[], &[], &[], &none);
        assert_eq!(metrics.improvement_score, 0.0);

        let both = vec![grade(id, 50.0, 1), grade(id, 90.0, 20)];
        let metrics = compute_metrics(id, &window(), &both, &[], &[], &[], &none);
        assert!((metrics.improvement_score - 40.0).abs() < 1e-9);
    }

    #[test]
    fn grades_outside_the_window_are_ignored() {
        let id = Uuid::from_u128(7);
        let mut outside = grade(id, 10.0, 0);
        outside.graded_at = window().start - Duration::days(1);
        let grades = vec![outside, grade(id, 90.0, 5)];
        let metrics = compute_metrics(id, &window(), &grades, &[], &[], &[], &HashSet::new());
        assert!((metrics.academic_score - 90.0).abs() < 1e-9);
    }

    fn submission(student_id: Uuid, activity: u128, days_in: i64) -> SubmissionRecord {
        SubmissionRecord {
            student_id,
            activity_id: Uuid::from_u128(activity),
            submitted_at: window().start + Duration::days(days_in),
        }
    }

    #[test]
    fn participation_counts_distinct_activities() {
        let id = Uuid::from_u128(7);
        let scoped: HashSet<Uuid> = (500..504).map(Uuid::from_u128).collect();
        let submissions = vec![submission(id, 500, 1), submission(id, 500, 2)];
        let metrics = compute_metrics(id, &window(), &[], &[], &submissions, &[], &scoped);
        assert!((metrics.participation_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn out_of_scope_submissions_do_not_inflate_participation() {
        // Submissions to activities outside the counted set must not push
        // the rate above 1.0 or count at all.
        let id = Uuid::from_u128(7);
        let scoped: HashSet<Uuid> = [Uuid::from_u128(501)].into_iter().collect();
        let submissions = vec![
            submission(id, 501, 1),
            submission(id, 600, 2),
            submission(id, 601, 3),
        ];
        let metrics = compute_metrics(id, &window(), &[], &[], &submissions, &[], &scoped);
        assert!((metrics.participation_rate - 1.0).abs() < 1e-9);

        let only_foreign = vec![submission(id, 600, 2)];
        let metrics = compute_metrics(id, &window(), &[], &[], &only_foreign, &[], &scoped);
        assert_eq!(metrics.participation_rate, 0.0);
    }
}
