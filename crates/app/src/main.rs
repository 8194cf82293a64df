use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use services::{AppServices, EnrollmentServiceError, PrincipalSource};
use storage::repository::Storage;

mod config;
mod logging;
mod seed;

use config::{Cli, Command, normalize_sqlite_url, prepare_sqlite_file};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("encoding response")?;
    println!("{out}");
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("opening {db_url}"))?;
    tracing::debug!(%db_url, "storage ready");

    match cli.command {
        Command::Migrate => {
            print_json(&serde_json::json!({ "migrated": true }))?;
            return Ok(());
        }
        Command::Seed => {
            let courses = seed::seed_demo_catalog(storage.catalog_writer.as_ref()).await?;
            print_json(&serde_json::json!({ "seededCourses": courses }))?;
            return Ok(());
        }
        _ => {}
    }

    let principal = cli
        .principal_source()
        .current_principal()
        .map_err(EnrollmentServiceError::from)?;
    let app = AppServices::from_storage(&storage, cli.clock());
    let enrollment = app.enrollment();

    match cli.command {
        Command::Enroll { course_id } => {
            print_json(&enrollment.enroll(&principal, course_id).await?)
        }
        Command::Unenroll { course_id } => {
            print_json(&enrollment.unenroll(&principal, course_id).await?)
        }
        Command::Complete {
            course_id,
            lesson_id,
        } => print_json(
            &enrollment
                .mark_lesson_completed(&principal, course_id, lesson_id)
                .await?,
        ),
        Command::Touch {
            course_id,
            lesson_id,
        } => print_json(
            &enrollment
                .record_lesson_access(&principal, course_id, lesson_id)
                .await?,
        ),
        Command::Progress { course_id } => {
            print_json(&enrollment.course_progress(&principal, course_id).await?)
        }
        Command::MyCourses => print_json(&enrollment.enrolled_courses(&principal).await?),
        Command::Available => print_json(&enrollment.available_courses(&principal).await?),
        Command::Stats => print_json(&app.stats().learning_stats(&principal).await?),
        Command::Roster { course_id } => {
            print_json(&app.roster().course_roster(&principal, course_id).await?)
        }
        Command::PurgeCourse { course_id } => {
            print_json(&app.roster().purge_course(&principal, course_id).await?)
        }
        Command::PurgeStudent { student_id } => {
            print_json(&app.roster().purge_student(&principal, student_id).await?)
        }
        Command::Migrate | Command::Seed => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.verbose);

    if let Err(err) = run(cli).await {
        if let Some(domain) = err.downcast_ref::<EnrollmentServiceError>() {
            if domain.is_client_error() {
                let body = serde_json::json!({
                    "error": { "code": domain.code(), "message": domain.to_string() }
                });
                println!("{body}");
                std::process::exit(1);
            }
        }
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}
