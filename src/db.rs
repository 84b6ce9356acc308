use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::models::{
    AttendanceRecord, EntityScope, GradeEvent, GradeRecord, LeaderboardEntry,
    LeaderboardSnapshot, Period, RewardRecord, StudentRef, SubmissionRecord, TimeGranularity,
    TopicMastery,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts a grade row. The returned event is constructed only after the
/// insert has committed, so publishing never races a rolled-back write.
#[allow(clippy::too_many_arguments)]
pub async fn insert_grade(
    pool: &PgPool,
    student_id: Uuid,
    activity_id: Uuid,
    class_id: Uuid,
    subject_id: Uuid,
    topic_id: Option<Uuid>,
    cognitive_level: Option<&str>,
    score: f64,
    max_score: f64,
    graded_by: Uuid,
) -> Result<GradeEvent> {
    let graded_at = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO grade_pipeline.grades
        (id, student_id, activity_id, class_id, subject_id, topic_id,
         cognitive_level, score, max_score, graded_by, graded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(activity_id)
    .bind(class_id)
    .bind(subject_id)
    .bind(topic_id)
    .bind(cognitive_level)
    .bind(score)
    .bind(max_score)
    .bind(graded_by)
    .bind(graded_at)
    .execute(pool)
    .await?;

    Ok(GradeEvent {
        student_id,
        activity_id,
        class_id,
        subject_id,
        topic_id,
        score,
        max_score,
        graded_by,
        graded_at,
        blooms_level_scores: GradeEvent::level_scores(
            cognitive_level.and_then(|raw| raw.parse().ok()),
            score,
            max_score,
        ),
    })
}

/// Resolves the students belonging to a scope entity. A scope referencing a
/// missing parent simply yields no rows; readers degrade to an empty board.
pub async fn resolve_scope(
    pool: &PgPool,
    scope: EntityScope,
    entity_id: Uuid,
) -> Result<Vec<StudentRef>> {
    let sql = match scope {
        EntityScope::Class => {
            "SELECT DISTINCT st.id, st.full_name
             FROM grade_pipeline.students st
             JOIN grade_pipeline.enrollments e ON e.student_id = st.id
             WHERE e.class_id = $1 AND e.active"
        }
        EntityScope::Subject => {
            "SELECT DISTINCT st.id, st.full_name
             FROM grade_pipeline.students st
             JOIN grade_pipeline.enrollments e ON e.student_id = st.id
             JOIN grade_pipeline.classes c ON c.id = e.class_id
             WHERE c.subject_id = $1 AND e.active"
        }
        EntityScope::Course => {
            "SELECT DISTINCT st.id, st.full_name
             FROM grade_pipeline.students st
             JOIN grade_pipeline.enrollments e ON e.student_id = st.id
             JOIN grade_pipeline.classes c ON c.id = e.class_id
             JOIN grade_pipeline.subjects sb ON sb.id = c.subject_id
             WHERE sb.course_id = $1 AND e.active"
        }
        EntityScope::Campus => {
            "SELECT DISTINCT st.id, st.full_name
             FROM grade_pipeline.students st
             JOIN grade_pipeline.enrollments e ON e.student_id = st.id
             JOIN grade_pipeline.classes c ON c.id = e.class_id
             JOIN grade_pipeline.subjects sb ON sb.id = c.subject_id
             JOIN grade_pipeline.courses co ON co.id = sb.course_id
             WHERE co.campus_id = $1 AND e.active"
        }
        EntityScope::Group => {
            "SELECT DISTINCT st.id, st.full_name
             FROM grade_pipeline.students st
             JOIN grade_pipeline.group_members gm ON gm.student_id = st.id
             WHERE gm.group_id = $1"
        }
    };

    let rows = sqlx::query(sql).bind(entity_id).fetch_all(pool).await?;
    let mut students: Vec<StudentRef> = rows
        .iter()
        .map(|row| StudentRef {
            id: row.get("id"),
            name: row.get("full_name"),
        })
        .collect();
    students.sort_by_key(|s| s.id);
    Ok(students)
}

/// Class ids reachable from a scope entity, used to bound activity counts.
pub async fn resolve_scope_classes(
    pool: &PgPool,
    scope: EntityScope,
    entity_id: Uuid,
) -> Result<Vec<Uuid>> {
    let sql = match scope {
        EntityScope::Class => "SELECT id FROM grade_pipeline.classes WHERE id = $1",
        EntityScope::Subject => "SELECT id FROM grade_pipeline.classes WHERE subject_id = $1",
        EntityScope::Course => {
            "SELECT c.id FROM grade_pipeline.classes c
             JOIN grade_pipeline.subjects sb ON sb.id = c.subject_id
             WHERE sb.course_id = $1"
        }
        EntityScope::Campus => {
            "SELECT c.id FROM grade_pipeline.classes c
             JOIN grade_pipeline.subjects sb ON sb.id = c.subject_id
             JOIN grade_pipeline.courses co ON co.id = sb.course_id
             WHERE co.campus_id = $1"
        }
        EntityScope::Group => {
            "SELECT DISTINCT e.class_id AS id
             FROM grade_pipeline.enrollments e
             JOIN grade_pipeline.group_members gm ON gm.student_id = e.student_id
             WHERE gm.group_id = $1 AND e.active"
        }
    };
    let rows = sqlx::query(sql).bind(entity_id).fetch_all(pool).await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

pub async fn fetch_grades(
    pool: &PgPool,
    student_ids: &[Uuid],
    window: &Period,
) -> Result<Vec<GradeRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, activity_id, topic_id, cognitive_level, score, max_score, graded_at
         FROM grade_pipeline.grades
         WHERE student_id = ANY($1) AND graded_at >= $2 AND graded_at < $3",
    )
    .bind(student_ids)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(grade_from_row).collect())
}

/// Full grade history for one student/topic pair, oldest first. Mastery
/// recompute always reads everything, never just the triggering grade.
pub async fn fetch_topic_grades(
    pool: &PgPool,
    student_id: Uuid,
    topic_id: Uuid,
) -> Result<Vec<GradeRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, activity_id, topic_id, cognitive_level, score, max_score, graded_at
         FROM grade_pipeline.grades
         WHERE student_id = $1 AND topic_id = $2
         ORDER BY graded_at ASC",
    )
    .bind(student_id)
    .bind(topic_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(grade_from_row).collect())
}

fn grade_from_row(row: &sqlx::postgres::PgRow) -> GradeRecord {
    let level: Option<String> = row.get("cognitive_level");
    let cognitive_level = level.as_deref().and_then(|raw| {
        raw.parse().map_err(|e| warn!(level = raw, "{e}")).ok()
    });
    GradeRecord {
        student_id: row.get("student_id"),
        activity_id: row.get("activity_id"),
        topic_id: row.get("topic_id"),
        cognitive_level,
        score: row.get("score"),
        max_score: row.get("max_score"),
        graded_at: row.get("graded_at"),
    }
}

pub async fn fetch_attendance(
    pool: &PgPool,
    student_ids: &[Uuid],
    window: &Period,
) -> Result<Vec<AttendanceRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, present, recorded_at
         FROM grade_pipeline.attendance
         WHERE student_id = ANY($1) AND recorded_at >= $2 AND recorded_at < $3",
    )
    .bind(student_ids)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AttendanceRecord {
            student_id: row.get("student_id"),
            present: row.get("present"),
            recorded_at: row.get("recorded_at"),
        })
        .collect())
}

pub async fn fetch_submissions(
    pool: &PgPool,
    student_ids: &[Uuid],
    window: &Period,
) -> Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, activity_id, submitted_at
         FROM grade_pipeline.submissions
         WHERE student_id = ANY($1) AND submitted_at >= $2 AND submitted_at < $3",
    )
    .bind(student_ids)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SubmissionRecord {
            student_id: row.get("student_id"),
            activity_id: row.get("activity_id"),
            submitted_at: row.get("submitted_at"),
        })
        .collect())
}

pub async fn fetch_rewards(
    pool: &PgPool,
    student_ids: &[Uuid],
    window: &Period,
) -> Result<Vec<RewardRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, points, awarded_at
         FROM grade_pipeline.reward_points
         WHERE student_id = ANY($1) AND awarded_at >= $2 AND awarded_at < $3",
    )
    .bind(student_ids)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RewardRecord {
            student_id: row.get("student_id"),
            points: row.get::<i32, _>("points") as i64,
            awarded_at: row.get("awarded_at"),
        })
        .collect())
}

/// Activities in scope for the window; participation numerator and
/// denominator are both restricted to this set.
pub async fn fetch_activity_ids(
    pool: &PgPool,
    class_ids: &[Uuid],
    window: &Period,
) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        "SELECT id FROM grade_pipeline.activities
         WHERE class_id = ANY($1) AND scheduled_at >= $2 AND scheduled_at < $3",
    )
    .bind(class_ids)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

/// The course and campus a class rolls up into, for cache invalidation.
#[derive(Debug, Clone)]
pub struct ClassLineage {
    pub course_id: Uuid,
    pub campus_id: Uuid,
}

pub async fn class_lineage(pool: &PgPool, class_id: Uuid) -> Result<Option<ClassLineage>> {
    let row = sqlx::query(
        "SELECT co.id AS course_id, co.campus_id
         FROM grade_pipeline.classes c
         JOIN grade_pipeline.subjects sb ON sb.id = c.subject_id
         JOIN grade_pipeline.courses co ON co.id = sb.course_id
         WHERE c.id = $1",
    )
    .bind(class_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| ClassLineage {
        course_id: row.get("course_id"),
        campus_id: row.get("campus_id"),
    }))
}

pub async fn student_group_ids(pool: &PgPool, student_id: Uuid) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        "SELECT group_id FROM grade_pipeline.group_members WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("group_id")).collect())
}

pub async fn upsert_topic_mastery(pool: &PgPool, mastery: &TopicMastery) -> Result<()> {
    let per_level = serde_json::to_value(&mastery.per_level_score)?;
    sqlx::query(
        r#"
        INSERT INTO grade_pipeline.topic_mastery
        (student_id, class_id, topic_id, per_level_score, overall_score, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, class_id, topic_id) DO UPDATE
        SET per_level_score = EXCLUDED.per_level_score,
            overall_score = EXCLUDED.overall_score,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(mastery.student_id)
    .bind(mastery.class_id)
    .bind(mastery.topic_id)
    .bind(per_level)
    .bind(mastery.overall_score)
    .bind(mastery.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_topic_mastery(
    pool: &PgPool,
    student_id: Uuid,
    class_id: Uuid,
    topic_id: Uuid,
) -> Result<Option<TopicMastery>> {
    let row = sqlx::query(
        "SELECT per_level_score, overall_score, updated_at
         FROM grade_pipeline.topic_mastery
         WHERE student_id = $1 AND class_id = $2 AND topic_id = $3",
    )
    .bind(student_id)
    .bind(class_id)
    .bind(topic_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let per_level: serde_json::Value = row.get("per_level_score");
    Ok(Some(TopicMastery {
        student_id,
        class_id,
        topic_id,
        per_level_score: serde_json::from_value(per_level)?,
        overall_score: row.get("overall_score"),
        updated_at: row.get("updated_at"),
    }))
}

/// Rewrites the rows for one (scope, entity, granularity) in a single
/// transaction, so readers never observe a partially updated board.
pub async fn replace_leaderboard(
    pool: &PgPool,
    scope: EntityScope,
    entity_id: Uuid,
    granularity: TimeGranularity,
    entries: &[LeaderboardEntry],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "DELETE FROM grade_pipeline.leaderboard_entries
         WHERE entity_scope = $1 AND entity_id = $2 AND time_granularity = $3",
    )
    .bind(scope.as_str())
    .bind(entity_id)
    .bind(granularity.as_str())
    .execute(&mut *tx)
    .await?;

    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO grade_pipeline.leaderboard_entries
            (entity_scope, entity_id, time_granularity, student_id, student_name,
             rank, rank_delta, academic_score, reward_points, attendance_rate,
             participation_rate, improvement_score, composite_score, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(scope.as_str())
        .bind(entity_id)
        .bind(granularity.as_str())
        .bind(entry.student_id)
        .bind(&entry.student_name)
        .bind(entry.rank)
        .bind(entry.rank_delta)
        .bind(entry.academic_score)
        .bind(entry.reward_points)
        .bind(entry.attendance_rate)
        .bind(entry.participation_rate)
        .bind(entry.improvement_score)
        .bind(entry.composite_score)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Student ranks from the most recent snapshot for the board, used to derive
/// rank deltas. Empty when no snapshot has ever been captured.
pub async fn latest_snapshot_ranks(
    pool: &PgPool,
    scope: EntityScope,
    entity_id: Uuid,
    granularity: TimeGranularity,
) -> Result<HashMap<Uuid, i64>> {
    let row = sqlx::query(
        "SELECT entries FROM grade_pipeline.leaderboard_snapshots
         WHERE entity_scope = $1 AND entity_id = $2 AND time_granularity = $3
         ORDER BY captured_at DESC
         LIMIT 1",
    )
    .bind(scope.as_str())
    .bind(entity_id)
    .bind(granularity.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(HashMap::new());
    };
    let entries: Vec<LeaderboardEntry> = serde_json::from_value(row.get("entries"))?;
    Ok(entries.into_iter().map(|e| (e.student_id, e.rank)).collect())
}

/// Appends a snapshot record. Snapshots are write-once; there is no update
/// path on purpose.
pub async fn insert_snapshot(pool: &PgPool, snapshot: &LeaderboardSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO grade_pipeline.leaderboard_snapshots
        (id, entity_scope, entity_id, time_granularity,
         period_label, period_start, period_end, captured_at, entries)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(snapshot.id)
    .bind(snapshot.entity_scope.as_str())
    .bind(snapshot.entity_id)
    .bind(snapshot.time_granularity.as_str())
    .bind(&snapshot.period.label)
    .bind(snapshot.period.start)
    .bind(snapshot.period.end)
    .bind(snapshot.captured_at)
    .bind(serde_json::to_value(&snapshot.entries)?)
    .execute(pool)
    .await?;
    Ok(())
}

/// Snapshots for a board in ascending period order, optionally bounded.
/// Repeated calls with the same bounds return the same sequence barring new
/// captures.
pub async fn fetch_snapshots(
    pool: &PgPool,
    scope: EntityScope,
    entity_id: Uuid,
    granularity: TimeGranularity,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<LeaderboardSnapshot>> {
    let rows = sqlx::query(
        "SELECT id, period_label, period_start, period_end, captured_at, entries
         FROM grade_pipeline.leaderboard_snapshots
         WHERE entity_scope = $1 AND entity_id = $2 AND time_granularity = $3
           AND ($4::timestamptz IS NULL OR period_start >= $4)
           AND ($5::timestamptz IS NULL OR period_end <= $5)
         ORDER BY period_start ASC, captured_at ASC",
    )
    .bind(scope.as_str())
    .bind(entity_id)
    .bind(granularity.as_str())
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let mut snapshots = Vec::with_capacity(rows.len());
    for row in rows {
        let entries: Vec<LeaderboardEntry> = serde_json::from_value(row.get("entries"))
            .map_err(|e| {
                PipelineError::DataIntegrity(format!("undecodable snapshot entries: {e}"))
            })?;
        snapshots.push(LeaderboardSnapshot {
            id: row.get("id"),
            entity_scope: scope,
            entity_id,
            time_granularity: granularity,
            period: Period {
                label: row.get("period_label"),
                start: row.get("period_start"),
                end: row.get("period_end"),
            },
            captured_at: row.get("captured_at"),
            entries,
        });
    }
    Ok(snapshots)
}

/// Loads realistic seed data: one campus, one course, two classes, a study
/// group, and enough raw metrics to exercise every scope.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let campus = Uuid::parse_str("0b54f841-9f21-4d57-9f5c-1f8f4de3a911")?;
    let course = Uuid::parse_str("42b3a6d2-7c1e-4a59-9d0a-5cbfb9f6f3c4")?;
    let subject = Uuid::parse_str("9a1f6f6e-8c7d-4b8a-8d8c-2f1f0e9d8c7b")?;
    let class_a = Uuid::parse_str("5f6a7b8c-9d0e-4f1a-8b2c-3d4e5f6a7b8c")?;
    let class_b = Uuid::parse_str("6a7b8c9d-0e1f-4a2b-8c3d-4e5f6a7b8c9d")?;
    let group = Uuid::parse_str("7b8c9d0e-1f2a-4b3c-8d4e-5f6a7b8c9d0e")?;
    let topic = Uuid::parse_str("8c9d0e1f-2a3b-4c4d-8e5f-6a7b8c9d0e1f")?;

    sqlx::query(
        "INSERT INTO grade_pipeline.campuses (id, name) VALUES ($1, $2)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(campus)
    .bind("North Campus")
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO grade_pipeline.courses (id, campus_id, name) VALUES ($1, $2, $3)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(course)
    .bind(campus)
    .bind("Lower Secondary")
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO grade_pipeline.subjects (id, course_id, name) VALUES ($1, $2, $3)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(subject)
    .bind(course)
    .bind("Mathematics")
    .execute(pool)
    .await?;

    for (id, name) in [(class_a, "Math 8A"), (class_b, "Math 8B")] {
        sqlx::query(
            "INSERT INTO grade_pipeline.classes (id, subject_id, name) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(subject)
        .bind(name)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO grade_pipeline.study_groups (id, name) VALUES ($1, $2)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(group)
    .bind("Olympiad Prep")
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO grade_pipeline.topics (id, subject_id, name) VALUES ($1, $2, $3)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(topic)
    .bind(subject)
    .bind("Linear Equations")
    .execute(pool)
    .await?;

    let students = [
        ("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2", "Avery Lee", class_a),
        ("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc", "Jules Moreno", class_a),
        ("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2", "Kiara Patel", class_a),
        ("1e2f3a4b-5c6d-4e7f-8a9b-0c1d2e3f4a5b", "Sam Okafor", class_b),
        ("2f3a4b5c-6d7e-4f8a-9b0c-1d2e3f4a5b6c", "Mina Haddad", class_b),
    ];

    for (raw_id, name, class_id) in students {
        let id = Uuid::parse_str(raw_id)?;
        sqlx::query(
            "INSERT INTO grade_pipeline.students (id, full_name) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name",
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO grade_pipeline.enrollments (id, student_id, class_id, active)
             VALUES ($1, $2, $3, TRUE)
             ON CONFLICT (student_id, class_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(class_id)
        .execute(pool)
        .await?;
    }

    // First three students also form the ad-hoc group.
    for (raw_id, _, _) in students.iter().take(3) {
        sqlx::query(
            "INSERT INTO grade_pipeline.group_members (group_id, student_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(group)
        .bind(Uuid::parse_str(raw_id)?)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();
    for (offset, (raw_id, _, class_id)) in students.iter().enumerate() {
        let student = Uuid::parse_str(raw_id)?;
        let activity = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO grade_pipeline.activities (id, class_id, title, scheduled_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(activity)
        .bind(class_id)
        .bind(format!("Worksheet {}", offset + 1))
        .bind(now - chrono::Duration::days(offset as i64 + 1))
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO grade_pipeline.grades
            (id, student_id, activity_id, class_id, subject_id, topic_id,
             cognitive_level, score, max_score, graded_by, graded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(activity)
        .bind(class_id)
        .bind(subject)
        .bind(topic)
        .bind("apply")
        .bind(60.0 + offset as f64 * 8.0)
        .bind(100.0)
        .bind(Uuid::nil())
        .bind(now - chrono::Duration::days(offset as i64 + 1))
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO grade_pipeline.attendance (id, student_id, class_id, present, recorded_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(class_id)
        .bind(offset % 2 == 0)
        .bind(now - chrono::Duration::days(2))
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO grade_pipeline.submissions (id, student_id, activity_id, submitted_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(activity)
        .bind(now - chrono::Duration::days(offset as i64 + 1))
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO grade_pipeline.reward_points (id, student_id, points, awarded_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(5 * (offset as i32 + 1))
        .bind(now - chrono::Duration::days(3))
        .execute(pool)
        .await?;
    }

    Ok(())
}
