use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::roster_service::CourseRosterService;
use crate::stats_service::LearningStatsService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    enrollment: Arc<EnrollmentService>,
    stats: Arc<LearningStatsService>,
    roster: Arc<CourseRosterService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Build services over an already wired storage backend.
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let enrollment = Arc::new(EnrollmentService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
        ));
        let stats = Arc::new(LearningStatsService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.completions),
            Arc::clone(&storage.progress),
        ));
        let roster = Arc::new(CourseRosterService::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.purge),
        ));

        Self {
            enrollment,
            stats,
            roster,
        }
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn enrollment(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollment)
    }

    #[must_use]
    pub fn stats(&self) -> Arc<LearningStatsService> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn roster(&self) -> Arc<CourseRosterService> {
        Arc::clone(&self.roster)
    }
}
