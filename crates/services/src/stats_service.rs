use std::sync::Arc;

use tracing::{debug, warn};

use lms_core::model::Principal;
use lms_core::stats::{CourseActivity, LearningStats};
use storage::repository::{
    CompletionRepository, CourseCatalog, EnrollmentRepository, ProgressPersistence, StorageError,
};

use crate::Clock;
use crate::error::EnrollmentServiceError;
use crate::principal::require_student;
use crate::views::LearningStatsView;

/// Aggregates learning statistics across a student's enrollments.
#[derive(Clone)]
pub struct LearningStatsService {
    clock: Clock,
    catalog: Arc<dyn CourseCatalog>,
    enrollments: Arc<dyn EnrollmentRepository>,
    completions: Arc<dyn CompletionRepository>,
    progress: Arc<dyn ProgressPersistence>,
}

impl LearningStatsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CourseCatalog>,
        enrollments: Arc<dyn EnrollmentRepository>,
        completions: Arc<dyn CompletionRepository>,
        progress: Arc<dyn ProgressPersistence>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
            completions,
            progress,
        }
    }

    /// Totals, learning hours and streak for the calling student.
    ///
    /// Progress is recomputed per enrollment before counting. A student with
    /// no history gets all zeros.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-students and `Storage` if repository access
    /// fails.
    pub async fn learning_stats(
        &self,
        principal: &Principal,
    ) -> Result<LearningStatsView, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let enrollments = self.enrollments.list_for_student(student_id).await?;
        if enrollments.is_empty() {
            return Ok(LearningStatsView::default());
        }

        let mut courses = Vec::with_capacity(enrollments.len());
        for enrollment in &enrollments {
            let Some(course) = self.catalog.get_course(enrollment.course_id()).await? else {
                warn!(
                    %student_id,
                    course_id = %enrollment.course_id(),
                    "skipping enrollment with missing course"
                );
                continue;
            };
            let snapshot = match self
                .progress
                .refresh_progress(enrollment.key(), &course.lesson_ids())
                .await
            {
                Ok(snapshot) => snapshot,
                Err(StorageError::NotFound) => {
                    warn!(
                        %student_id,
                        course_id = %enrollment.course_id(),
                        "enrollment removed while computing stats"
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            courses.push(CourseActivity::from_course(&course, &snapshot.completions));
        }

        let activity = self
            .completions
            .completions_for_student(student_id)
            .await?
            .into_iter()
            .flat_map(|c| c.completed_at().into_iter().chain([c.last_accessed_at()]))
            .collect::<Vec<_>>();

        let stats = LearningStats::compute(&courses, activity, self.clock.today());
        debug!(%student_id, ?stats, "learning stats computed");
        Ok(stats.into())
    }
}
