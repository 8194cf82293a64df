use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompletionError {
    #[error("completed lesson is missing completed_at")]
    MissingCompletedAt,

    #[error("completed_at is after last_accessed_at")]
    InvalidTimeRange,
}

/// Per-student, per-lesson completion marker.
///
/// `completed_at` is written on the first transition to completed and never
/// again; `last_accessed_at` moves forward on every touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonCompletion {
    student_id: UserId,
    lesson_id: LessonId,
    course_id: CourseId,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    last_accessed_at: DateTime<Utc>,
}

impl LessonCompletion {
    /// First touch of a lesson that has not been completed yet.
    #[must_use]
    pub fn opened(
        student_id: UserId,
        lesson_id: LessonId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id,
            lesson_id,
            course_id,
            completed: false,
            completed_at: None,
            last_accessed_at: now,
        }
    }

    /// First touch of a lesson that is completed on the spot.
    #[must_use]
    pub fn completed_now(
        student_id: UserId,
        lesson_id: LessonId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Self {
        let mut completion = Self::opened(student_id, lesson_id, course_id, now);
        completion.mark_completed(now);
        completion
    }

    /// Rehydrate a completion from storage.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::MissingCompletedAt` if `completed` is set
    /// without a timestamp, and `CompletionError::InvalidTimeRange` if the
    /// completion happened after the last access.
    pub fn from_persisted(
        student_id: UserId,
        lesson_id: LessonId,
        course_id: CourseId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        last_accessed_at: DateTime<Utc>,
    ) -> Result<Self, CompletionError> {
        if completed && completed_at.is_none() {
            return Err(CompletionError::MissingCompletedAt);
        }
        if completed_at.is_some_and(|at| at > last_accessed_at) {
            return Err(CompletionError::InvalidTimeRange);
        }
        Ok(Self {
            student_id,
            lesson_id,
            course_id,
            completed,
            completed_at,
            last_accessed_at,
        })
    }

    #[must_use]
    pub fn student_id(&self) -> UserId {
        self.student_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    /// Mark completed. Repeated calls keep the original `completed_at`.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        if !self.completed {
            self.completed = true;
            self.completed_at = Some(now);
        }
        self.touch(now);
    }

    /// Record an access without changing completion state.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn ids() -> (UserId, LessonId, CourseId) {
        (UserId::new(1), LessonId::new(2), CourseId::new(3))
    }

    #[test]
    fn repeated_completion_keeps_first_timestamp() {
        let (s, l, c) = ids();
        let first = fixed_now();
        let later = first + Duration::hours(3);

        let mut completion = LessonCompletion::completed_now(s, l, c, first);
        completion.mark_completed(later);

        assert!(completion.is_completed());
        assert_eq!(completion.completed_at(), Some(first));
        assert_eq!(completion.last_accessed_at(), later);
    }

    #[test]
    fn opened_lesson_completes_on_first_mark() {
        let (s, l, c) = ids();
        let opened_at = fixed_now();
        let mut completion = LessonCompletion::opened(s, l, c, opened_at);
        assert!(!completion.is_completed());

        let done_at = opened_at + Duration::minutes(20);
        completion.mark_completed(done_at);
        assert_eq!(completion.completed_at(), Some(done_at));
    }

    #[test]
    fn touch_never_moves_access_time_backwards() {
        let (s, l, c) = ids();
        let now = fixed_now();
        let mut completion = LessonCompletion::opened(s, l, c, now);
        completion.touch(now - Duration::days(1));
        assert_eq!(completion.last_accessed_at(), now);
    }

    #[test]
    fn persisted_completion_requires_timestamp() {
        let (s, l, c) = ids();
        let err = LessonCompletion::from_persisted(s, l, c, true, None, fixed_now()).unwrap_err();
        assert_eq!(err, CompletionError::MissingCompletedAt);
    }
}
