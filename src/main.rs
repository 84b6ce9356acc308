use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod cache;
mod config;
mod db;
mod error;
mod events;
mod leaderboard;
mod mastery;
mod models;
mod service;
mod snapshot;
mod window;

use models::{EntityScope, TimeGranularity};
use service::PipelineService;

#[derive(Parser)]
#[command(name = "grade-pipeline")]
#[command(about = "Post-grade event pipeline and leaderboard aggregation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Record a grade and dispatch the post-grade event pipeline
    RecordGrade {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        activity: Uuid,
        #[arg(long)]
        class: Uuid,
        #[arg(long)]
        subject: Uuid,
        #[arg(long)]
        topic: Option<Uuid>,
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        score: f64,
        #[arg(long, default_value_t = 100.0)]
        max_score: f64,
        #[arg(long)]
        graded_by: Uuid,
    },
    /// Show the ranked leaderboard for a scope entity
    Leaderboard {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        entity: Uuid,
        #[arg(long, default_value = "weekly")]
        granularity: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show one student's leaderboard position
    Position {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        entity: Uuid,
        #[arg(long)]
        student: Uuid,
        #[arg(long, default_value = "weekly")]
        granularity: String,
    },
    /// Capture a leaderboard snapshot for the active period
    Capture {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        entity: Uuid,
        #[arg(long, default_value = "weekly")]
        granularity: String,
    },
    /// Show rank/score trends from captured snapshots
    Trends {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        entity: Uuid,
        #[arg(long, default_value = "weekly")]
        granularity: String,
        #[arg(long, default_value_t = 12)]
        periods: usize,
    },
    /// Show a student's mastery vector for one topic
    Mastery {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        class: Uuid,
        #[arg(long)]
        topic: Uuid,
    },
}

fn parse_scope(raw: &str) -> anyhow::Result<EntityScope> {
    raw.parse().map_err(|e: String| anyhow::anyhow!(e))
}

fn parse_granularity(raw: &str) -> anyhow::Result<TimeGranularity> {
    raw.parse().map_err(|e: String| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::RecordGrade {
            student,
            activity,
            class,
            subject,
            topic,
            level,
            score,
            max_score,
            graded_by,
        } => {
            let config = config::Config::load()?;
            let service = PipelineService::new(pool, config);
            let (event, handle) = service
                .record_grade(
                    student,
                    activity,
                    class,
                    subject,
                    topic,
                    level.as_deref(),
                    score,
                    max_score,
                    graded_by,
                )
                .await?;
            if let Some(levels) = &event.blooms_level_scores {
                for (level, pct) in levels {
                    println!("Graded at level {level}: {pct:.1}%");
                }
            }
            // The grade is already committed; waiting here only lets the CLI
            // report handler outcomes before the process exits.
            let results = handle.await.context("dispatch task panicked")?;
            for result in &results {
                let status = if result.succeeded { "ok" } else { "FAILED" };
                println!(
                    "- {} {} ({} ms){}",
                    result.handler,
                    status,
                    result.duration_ms,
                    result
                        .error
                        .as_deref()
                        .map(|e| format!(": {e}"))
                        .unwrap_or_default()
                );
            }
            println!("Events processed: {}", service.events_processed());
        }
        Commands::Leaderboard {
            scope,
            entity,
            granularity,
            limit,
            offset,
        } => {
            let config = config::Config::load()?;
            let service = PipelineService::new(pool, config);
            let page = service
                .get_leaderboard(
                    parse_scope(&scope)?,
                    entity,
                    parse_granularity(&granularity)?,
                    limit,
                    offset,
                )
                .await?;
            if page.entries.is_empty() {
                println!("No students in scope.");
                return Ok(());
            }
            println!("Leaderboard ({} students total):", page.total_count);
            for entry in &page.entries {
                println!(
                    "{:>3}. {} composite {:.2} (academic {:.1}, attendance {:.0}%, delta {:+})",
                    entry.rank,
                    entry.student_name,
                    entry.composite_score,
                    entry.academic_score,
                    entry.attendance_rate * 100.0,
                    entry.rank_delta,
                );
            }
        }
        Commands::Position {
            scope,
            entity,
            student,
            granularity,
        } => {
            let config = config::Config::load()?;
            let service = PipelineService::new(pool, config);
            match service
                .get_student_position(
                    parse_scope(&scope)?,
                    entity,
                    student,
                    parse_granularity(&granularity)?,
                )
                .await?
            {
                Some(entry) => println!(
                    "{} is rank {} of this board (composite {:.2}, delta {:+})",
                    entry.student_name, entry.rank, entry.composite_score, entry.rank_delta
                ),
                None => println!("Student is not on this leaderboard."),
            }
        }
        Commands::Capture {
            scope,
            entity,
            granularity,
        } => {
            let config = config::Config::load()?;
            let service = PipelineService::new(pool, config);
            let snapshot = service
                .capture_snapshot(
                    parse_scope(&scope)?,
                    entity,
                    parse_granularity(&granularity)?,
                )
                .await?;
            println!(
                "Captured {} entries for period {}.",
                snapshot.entries.len(),
                snapshot.period.label
            );
        }
        Commands::Trends {
            scope,
            entity,
            granularity,
            periods,
        } => {
            let config = config::Config::load()?;
            let service = PipelineService::new(pool, config);
            let points = service
                .get_trends(
                    parse_scope(&scope)?,
                    entity,
                    parse_granularity(&granularity)?,
                    periods,
                )
                .await?;
            if points.is_empty() {
                println!("No snapshots captured yet.");
                return Ok(());
            }
            for point in &points {
                println!(
                    "- {}: avg rank {:.2}, avg score {:.2} across {} students",
                    point.period_label, point.average_rank, point.average_score, point.entry_count
                );
            }
        }
        Commands::Mastery {
            student,
            class,
            topic,
        } => {
            let config = config::Config::load()?;
            let service = PipelineService::new(pool, config);
            match service.get_topic_mastery(student, class, topic).await? {
                Some(mastery) => {
                    println!("Overall mastery: {:.1}", mastery.overall_score);
                    for (level, score) in &mastery.per_level_score {
                        println!("- {level}: {score:.1}");
                    }
                }
                None => println!("No mastery recorded for this student/topic."),
            }
        }
    }

    Ok(())
}
