use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use lms_core::Clock;
use lms_core::model::{CourseId, LessonId, Principal, Role, UserId};
use services::StaticPrincipalSource;

#[derive(Debug, Parser)]
#[command(name = "lms")]
#[command(about = "Course enrollment and progress tracking")]
pub struct Cli {
    /// SQLite database URL or file path
    #[arg(long = "db", env = "LMS_DB_URL", default_value = "sqlite:lms.sqlite3")]
    pub db_url: String,

    /// Id of the calling user
    #[arg(long, env = "LMS_USER_ID")]
    pub user_id: Option<UserId>,

    /// Role of the calling user
    #[arg(long, env = "LMS_ROLE", default_value = "student")]
    pub role: Role,

    /// Pin the clock to an RFC3339 timestamp
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or upgrade the database schema
    Migrate,
    /// Load the demo course catalog
    Seed,
    /// Enroll in a course
    Enroll { course_id: CourseId },
    /// Leave a course
    Unenroll { course_id: CourseId },
    /// Mark a lesson completed
    Complete {
        course_id: CourseId,
        lesson_id: LessonId,
    },
    /// Record that a lesson was opened
    Touch {
        course_id: CourseId,
        lesson_id: LessonId,
    },
    /// Show a course with per-lesson progress
    Progress { course_id: CourseId },
    /// List enrolled courses
    MyCourses,
    /// List approved courses not yet enrolled in
    Available,
    /// Show learning statistics
    Stats,
    /// List students enrolled in a course
    Roster { course_id: CourseId },
    /// Delete a course with its enrollments and completions
    PurgeCourse { course_id: CourseId },
    /// Delete a student's enrollments and completions
    PurgeStudent { student_id: UserId },
}

impl Cli {
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.now.map_or_else(Clock::default_clock, Clock::fixed)
    }

    #[must_use]
    pub fn principal_source(&self) -> StaticPrincipalSource {
        StaticPrincipalSource::new(self.user_id.map(|id| Principal::new(id, self.role)))
    }
}

/// Turns a bare path or `sqlite:` path into an absolute `sqlite://` URL.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }
    if trimmed.starts_with("sqlite:file:") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Make sure the database file and its directory exist.
pub fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" || db_url.starts_with("sqlite:file:") {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid database url: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}
