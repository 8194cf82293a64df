use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use lms_core::model::{Course, CourseId, Enrollment, EnrollmentKey, LessonId, Principal, UserId};
use lms_core::progress;
use storage::repository::{
    CourseCatalog, EnrollmentRepository, LessonEvent, LessonEventKind, LessonEventOutcome,
    ProgressPersistence, StorageError,
};

use crate::Clock;
use crate::error::EnrollmentServiceError;
use crate::principal::require_student;
use crate::views::{
    CompleteLessonResponse, CourseProgressView, CourseView, EnrollResponse, EnrolledCourseView,
    LessonAccessResponse, LessonProgressView,
};

/// Orchestrates enrollment, lesson completion and progress queries.
#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    catalog: Arc<dyn CourseCatalog>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressPersistence>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CourseCatalog>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressPersistence>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
            progress,
        }
    }

    /// Enroll the calling student in a course.
    ///
    /// Checks run in order: course exists, not already enrolled, course
    /// approved.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound`, `AlreadyEnrolled` or `CourseNotApproved` for
    /// the respective failures, `Forbidden` for non-students and `Storage` if
    /// persistence fails.
    pub async fn enroll(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<EnrollResponse, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let course = self.course(course_id).await?;

        let key = EnrollmentKey::new(student_id, course_id);
        if self.enrollments.get_enrollment(key).await?.is_some() {
            return Err(EnrollmentServiceError::AlreadyEnrolled(course_id));
        }
        if !course.is_approved() {
            return Err(EnrollmentServiceError::CourseNotApproved(course_id));
        }

        let enrollment = Enrollment::new(student_id, course_id, self.clock.now());
        match self.enrollments.insert_enrollment(&enrollment).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                warn!(%student_id, %course_id, "concurrent enrollment lost the race");
                return Err(EnrollmentServiceError::AlreadyEnrolled(course_id));
            }
            Err(err) => return Err(err.into()),
        }

        info!(%student_id, %course_id, "student enrolled");
        Ok(EnrollResponse {
            enrolled: true,
            course_id,
        })
    }

    /// Remove the calling student's enrollment. Completion rows are kept.
    ///
    /// # Errors
    ///
    /// Returns `NotEnrolled` if there is nothing to remove and `Storage` if
    /// persistence fails.
    pub async fn unenroll(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<EnrollResponse, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let removed = self
            .enrollments
            .delete_enrollment(EnrollmentKey::new(student_id, course_id))
            .await?;
        if !removed {
            return Err(EnrollmentServiceError::NotEnrolled(course_id));
        }
        info!(%student_id, %course_id, "student unenrolled");
        Ok(EnrollResponse {
            enrolled: false,
            course_id,
        })
    }

    /// Courses the student is enrolled in, oldest enrollment first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if repository access fails.
    pub async fn enrolled_courses(
        &self,
        principal: &Principal,
    ) -> Result<Vec<EnrolledCourseView>, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let enrollments = self.enrollments.list_for_student(student_id).await?;

        let mut views = Vec::with_capacity(enrollments.len());
        for enrollment in &enrollments {
            let Some(course) = self.catalog.get_course(enrollment.course_id()).await? else {
                warn!(
                    %student_id,
                    course_id = %enrollment.course_id(),
                    "enrollment references a missing course"
                );
                continue;
            };
            views.push(EnrolledCourseView {
                course: CourseView::from(&course),
                enrolled_at: enrollment.enrolled_at(),
                progress_percentage: progress::round_percentage(enrollment.progress()),
            });
        }
        Ok(views)
    }

    /// Approved courses the student is not enrolled in.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if repository access fails.
    pub async fn available_courses(
        &self,
        principal: &Principal,
    ) -> Result<Vec<CourseView>, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let enrolled: HashSet<CourseId> = self
            .enrollments
            .list_for_student(student_id)
            .await?
            .iter()
            .map(Enrollment::course_id)
            .collect();

        let courses = self.catalog.list_approved_courses().await?;
        Ok(courses
            .iter()
            .filter(|c| !enrolled.contains(&c.id()))
            .map(CourseView::from)
            .collect())
    }

    /// Mark a lesson completed and recompute course progress in the same unit.
    ///
    /// Repeating the call is harmless: the first completion time is kept.
    ///
    /// # Errors
    ///
    /// Returns `LessonNotFound`, `LessonCourseMismatch` or `NotEnrolled` for
    /// the respective failures; nothing is written in those cases.
    pub async fn mark_lesson_completed(
        &self,
        principal: &Principal,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<CompleteLessonResponse, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let snapshot = self
            .record(student_id, course_id, lesson_id, LessonEventKind::Completed)
            .await?
            .snapshot;

        info!(
            %student_id,
            %course_id,
            %lesson_id,
            progress = snapshot.summary.percentage(),
            "lesson completed"
        );
        Ok(CompleteLessonResponse {
            completed: true,
            lesson_id,
            progress_percentage: snapshot.summary.display_percentage(),
        })
    }

    /// Record that the student opened a lesson without completing it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::mark_lesson_completed`].
    pub async fn record_lesson_access(
        &self,
        principal: &Principal,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<LessonAccessResponse, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let completion = self
            .record(student_id, course_id, lesson_id, LessonEventKind::Accessed)
            .await?
            .completion;

        Ok(LessonAccessResponse {
            lesson_id,
            completed: completion.is_completed(),
            last_accessed_at: completion.last_accessed_at(),
        })
    }

    /// Course detail with per-lesson completion state.
    ///
    /// Progress is recomputed against the current lesson set and stored back.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` if the course is gone and `NotEnrolled` if the
    /// student has no enrollment.
    pub async fn course_progress(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<CourseProgressView, EnrollmentServiceError> {
        let student_id = require_student(principal)?;
        let course = self.course(course_id).await?;
        let lesson_ids = course.lesson_ids();

        let snapshot = self
            .progress
            .refresh_progress(EnrollmentKey::new(student_id, course_id), &lesson_ids)
            .await
            .map_err(|err| not_enrolled(err, course_id))?;

        let done = progress::completed_lessons(&lesson_ids, &snapshot.completions);
        let lessons = course
            .lessons()
            .iter()
            .map(|l| LessonProgressView::new(l, done.contains(&l.id())))
            .collect();

        Ok(CourseProgressView::new(
            &course,
            &snapshot.enrollment,
            &snapshot.summary,
            lessons,
        ))
    }

    async fn course(&self, course_id: CourseId) -> Result<Course, EnrollmentServiceError> {
        self.catalog
            .get_course(course_id)
            .await?
            .ok_or(EnrollmentServiceError::CourseNotFound(course_id))
    }

    async fn record(
        &self,
        student_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        kind: LessonEventKind,
    ) -> Result<LessonEventOutcome, EnrollmentServiceError> {
        let lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or(EnrollmentServiceError::LessonNotFound(lesson_id))?;
        if lesson.course_id() != course_id {
            return Err(EnrollmentServiceError::LessonCourseMismatch {
                lesson_id,
                course_id,
            });
        }
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(EnrollmentServiceError::LessonNotFound(lesson_id))?;

        let event = LessonEvent {
            student_id,
            course_id,
            lesson_id,
            kind,
            at: self.clock.now(),
        };
        self.progress
            .record_lesson_event(event, &course.lesson_ids())
            .await
            .map_err(|err| not_enrolled(err, course_id))
    }
}

/// `NotFound` from the progress store means the enrollment is missing.
fn not_enrolled(err: StorageError, course_id: CourseId) -> EnrollmentServiceError {
    match err {
        StorageError::NotFound => EnrollmentServiceError::NotEnrolled(course_id),
        other => EnrollmentServiceError::Storage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{Lesson, Role};
    use lms_core::time::{fixed_clock, fixed_now};
    use storage::repository::{CatalogWriter, CompletionRepository, InMemoryRepository, Storage};

    fn course(id: u64, lessons: &[u64], approved: bool) -> Course {
        let lessons = lessons
            .iter()
            .enumerate()
            .map(|(pos, l)| {
                Lesson::new(
                    LessonId::new(*l),
                    CourseId::new(id),
                    format!("Lesson {l}"),
                    u32::try_from(pos).unwrap(),
                    Some(600),
                )
                .unwrap()
            })
            .collect();
        Course::new(
            CourseId::new(id),
            format!("Course {id}"),
            None,
            UserId::new(100),
            approved,
            lessons,
        )
        .unwrap()
    }

    async fn service_with(courses: &[Course]) -> (EnrollmentService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        for c in courses {
            repo.upsert_course(c).await.unwrap();
        }
        let storage = Storage::from_repo(repo.clone());
        let service = EnrollmentService::new(
            fixed_clock(),
            storage.catalog,
            storage.enrollments,
            storage.progress,
        );
        (service, repo)
    }

    fn student() -> Principal {
        Principal::student(UserId::new(1))
    }

    #[tokio::test]
    async fn enroll_checks_existence_then_duplicate_then_approval() {
        let (service, _) = service_with(&[course(1, &[10], true), course(2, &[20], false)]).await;

        let missing = service.enroll(&student(), CourseId::new(9)).await;
        assert!(matches!(missing, Err(EnrollmentServiceError::CourseNotFound(_))));

        let draft = service.enroll(&student(), CourseId::new(2)).await;
        assert!(matches!(draft, Err(EnrollmentServiceError::CourseNotApproved(_))));

        let ok = service.enroll(&student(), CourseId::new(1)).await.unwrap();
        assert!(ok.enrolled);

        let again = service.enroll(&student(), CourseId::new(1)).await;
        assert!(matches!(again, Err(EnrollmentServiceError::AlreadyEnrolled(_))));
    }

    #[tokio::test]
    async fn instructors_cannot_use_student_operations() {
        let (service, _) = service_with(&[course(1, &[10], true)]).await;
        let instructor = Principal::new(UserId::new(100), Role::Instructor);
        let err = service.enroll(&instructor, CourseId::new(1)).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[tokio::test]
    async fn completion_validates_lesson_before_enrollment() {
        let (service, _) =
            service_with(&[course(1, &[10, 11], true), course(2, &[20], true)]).await;

        let unknown = service
            .mark_lesson_completed(&student(), CourseId::new(1), LessonId::new(99))
            .await;
        assert!(matches!(unknown, Err(EnrollmentServiceError::LessonNotFound(_))));

        let mismatch = service
            .mark_lesson_completed(&student(), CourseId::new(1), LessonId::new(20))
            .await;
        assert!(matches!(
            mismatch,
            Err(EnrollmentServiceError::LessonCourseMismatch { .. })
        ));

        let not_enrolled = service
            .mark_lesson_completed(&student(), CourseId::new(1), LessonId::new(10))
            .await;
        assert!(matches!(not_enrolled, Err(EnrollmentServiceError::NotEnrolled(_))));
    }

    #[tokio::test]
    async fn access_keeps_progress_and_completion_keeps_first_timestamp() {
        let (service, repo) = service_with(&[course(1, &[10, 11], true)]).await;
        service.enroll(&student(), CourseId::new(1)).await.unwrap();

        let access = service
            .record_lesson_access(&student(), CourseId::new(1), LessonId::new(10))
            .await
            .unwrap();
        assert!(!access.completed);
        assert_eq!(access.last_accessed_at, fixed_now());

        let first = service
            .mark_lesson_completed(&student(), CourseId::new(1), LessonId::new(10))
            .await
            .unwrap();
        let second = service
            .mark_lesson_completed(&student(), CourseId::new(1), LessonId::new(10))
            .await
            .unwrap();
        assert_eq!(first.progress_percentage, 50.0);
        assert_eq!(second.progress_percentage, 50.0);

        let stored = repo
            .get_completion(UserId::new(1), LessonId::new(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.completed_at(), Some(fixed_now()));

        let revisit = service
            .record_lesson_access(&student(), CourseId::new(1), LessonId::new(10))
            .await
            .unwrap();
        assert!(revisit.completed);
        assert_eq!(revisit.lesson_id, LessonId::new(10));
    }

    #[tokio::test]
    async fn available_courses_exclude_enrolled_and_unapproved() {
        let (service, _) = service_with(&[
            course(1, &[10], true),
            course(2, &[20], true),
            course(3, &[30], false),
        ])
        .await;

        let all = service.available_courses(&student()).await.unwrap();
        assert_eq!(
            all.iter().map(|c| c.id.value()).collect::<Vec<_>>(),
            vec![1, 2]
        );

        service.enroll(&student(), CourseId::new(1)).await.unwrap();
        let rest = service.available_courses(&student()).await.unwrap();
        assert_eq!(rest.iter().map(|c| c.id.value()).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn zero_lesson_course_reports_zero_progress() {
        let (service, _) = service_with(&[course(1, &[], true)]).await;
        service.enroll(&student(), CourseId::new(1)).await.unwrap();
        let view = service
            .course_progress(&student(), CourseId::new(1))
            .await
            .unwrap();
        assert_eq!(view.total_lessons, 0);
        assert_eq!(view.progress_percentage, 0.0);
        assert!(view.lessons.is_empty());
    }

    #[tokio::test]
    async fn unenroll_requires_enrollment() {
        let (service, _) = service_with(&[course(1, &[10], true)]).await;
        let err = service
            .unenroll(&student(), CourseId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentServiceError::NotEnrolled(_)));

        service.enroll(&student(), CourseId::new(1)).await.unwrap();
        let out = service.unenroll(&student(), CourseId::new(1)).await.unwrap();
        assert!(!out.enrolled);
        assert!(service.enrolled_courses(&student()).await.unwrap().is_empty());
    }
}
