//! Shared error types for the services crate.

use thiserror::Error;

use lms_core::model::{CourseId, LessonId, Role};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Raised by a `PrincipalSource` when no caller can be resolved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("no authenticated principal")]
    Unauthenticated,
}

/// Errors emitted by the enrollment, stats, roster and purge services.
///
/// Everything except `Storage` is a client-facing outcome scoped to the
/// single request; none of them is transient.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrollmentServiceError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("lesson {0} not found")]
    LessonNotFound(LessonId),
    #[error("already enrolled in course {0}")]
    AlreadyEnrolled(CourseId),
    #[error("course {0} is not available for enrollment")]
    CourseNotApproved(CourseId),
    #[error("not enrolled in course {0}")]
    NotEnrolled(CourseId),
    #[error("lesson {lesson_id} does not belong to course {course_id}")]
    LessonCourseMismatch {
        lesson_id: LessonId,
        course_id: CourseId,
    },
    #[error("authentication required")]
    Unauthenticated,
    #[error("operation not permitted for role {0}")]
    Forbidden(Role),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EnrollmentServiceError {
    /// Stable machine-readable code for the API boundary.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CourseNotFound(_) | Self::LessonNotFound(_) => "not_found",
            Self::AlreadyEnrolled(_) => "already_enrolled",
            Self::CourseNotApproved(_) => "course_not_approved",
            Self::NotEnrolled(_) => "not_enrolled",
            Self::LessonCourseMismatch { .. } => "lesson_course_mismatch",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::Storage(_) => "storage",
        }
    }

    /// True for outcomes caused by the request rather than the backend.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<AuthError> for EnrollmentServiceError {
    fn from(_: AuthError) -> Self {
        Self::Unauthenticated
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
