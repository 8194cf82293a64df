use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, UserId};
use crate::progress::ProgressSummary;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("progress must be a finite percentage in [0, 100], got {0}")]
    InvalidProgress(f64),
}

/// Identity of an enrollment: one per (student, course).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnrollmentKey {
    pub student_id: UserId,
    pub course_id: CourseId,
}

impl EnrollmentKey {
    #[must_use]
    pub fn new(student_id: UserId, course_id: CourseId) -> Self {
        Self {
            student_id,
            course_id,
        }
    }
}

/// A student's membership in a course plus the derived progress percentage.
///
/// `progress` is only ever replaced by a freshly aggregated `ProgressSummary`;
/// there is no way to nudge it incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    key: EnrollmentKey,
    enrolled_at: DateTime<Utc>,
    progress: f64,
}

impl Enrollment {
    /// A brand-new enrollment at 0% progress.
    #[must_use]
    pub fn new(student_id: UserId, course_id: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            key: EnrollmentKey::new(student_id, course_id),
            enrolled_at,
            progress: 0.0,
        }
    }

    /// Rehydrate an enrollment from storage.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::InvalidProgress` if the stored percentage is
    /// not finite or lies outside `[0, 100]`.
    pub fn from_persisted(
        student_id: UserId,
        course_id: CourseId,
        enrolled_at: DateTime<Utc>,
        progress: f64,
    ) -> Result<Self, EnrollmentError> {
        if !progress.is_finite() || !(0.0..=100.0).contains(&progress) {
            return Err(EnrollmentError::InvalidProgress(progress));
        }
        Ok(Self {
            key: EnrollmentKey::new(student_id, course_id),
            enrolled_at,
            progress,
        })
    }

    #[must_use]
    pub fn key(&self) -> EnrollmentKey {
        self.key
    }

    #[must_use]
    pub fn student_id(&self) -> UserId {
        self.key.student_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.key.course_id
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    /// Stored progress percentage in `[0, 100]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.progress >= 100.0
    }

    /// Replace the stored percentage with a recomputed one.
    pub fn apply_progress(&mut self, summary: &ProgressSummary) {
        self.progress = summary.percentage();
    }
}
