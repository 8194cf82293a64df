use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    Course, CourseId, Enrollment, EnrollmentKey, Lesson, LessonCompletion, LessonId, UserId,
};
use lms_core::progress::{self, ProgressSummary};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// What happened to a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonEventKind {
    /// The student finished the lesson.
    Completed,
    /// The student opened the lesson; completion state is left untouched.
    Accessed,
}

/// A lesson interaction to be applied to the completion store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonEvent {
    pub student_id: UserId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub kind: LessonEventKind,
    pub at: DateTime<Utc>,
}

impl LessonEvent {
    #[must_use]
    pub fn key(&self) -> EnrollmentKey {
        EnrollmentKey::new(self.student_id, self.course_id)
    }

    /// Fold this event into the existing completion row, if any.
    #[must_use]
    pub fn apply_to(&self, existing: Option<LessonCompletion>) -> LessonCompletion {
        match (existing, self.kind) {
            (Some(mut completion), LessonEventKind::Completed) => {
                completion.mark_completed(self.at);
                completion
            }
            (Some(mut completion), LessonEventKind::Accessed) => {
                completion.touch(self.at);
                completion
            }
            (None, LessonEventKind::Completed) => LessonCompletion::completed_now(
                self.student_id,
                self.lesson_id,
                self.course_id,
                self.at,
            ),
            (None, LessonEventKind::Accessed) => LessonCompletion::opened(
                self.student_id,
                self.lesson_id,
                self.course_id,
                self.at,
            ),
        }
    }
}

/// State of one enrollment right after its progress was recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub enrollment: Enrollment,
    pub summary: ProgressSummary,
    /// The student's completion rows for the course, in no particular order.
    pub completions: Vec<LessonCompletion>,
}

/// Result of applying one lesson event: the row as written plus the
/// recomputed progress of the enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonEventOutcome {
    pub completion: LessonCompletion,
    pub snapshot: ProgressSnapshot,
}

/// Rows removed by a purge routine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub enrollments: u64,
    pub completions: u64,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read side of the course catalog.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Fetch a course with its ordered lessons.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// Fetch a single lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError>;

    /// All approved courses, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn list_approved_courses(&self) -> Result<Vec<Course>, StorageError>;
}

/// Write side of the catalog, used for seeding and by the catalog owner.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    /// Insert or replace a course together with its full lesson list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Remove a lesson from its course. Completion rows are left in place.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson does not exist.
    async fn remove_lesson(&self, id: LessonId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Insert a new enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the (student, course) pair is
    /// already enrolled. This is enforced by the store itself, not by a
    /// preceding lookup.
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_enrollment(&self, key: EnrollmentKey) -> Result<Option<Enrollment>, StorageError>;

    /// A student's enrollments ordered by enrollment time, then course ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn list_for_student(&self, student_id: UserId) -> Result<Vec<Enrollment>, StorageError>;

    /// A course's enrollments ordered by enrollment time, then student ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn list_for_course(&self, course_id: CourseId) -> Result<Vec<Enrollment>, StorageError>;

    /// Delete an enrollment. Returns `false` when nothing was deleted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn delete_enrollment(&self, key: EnrollmentKey) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_completion(
        &self,
        student_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError>;

    /// Every completion row of a student, across all courses.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn completions_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<LessonCompletion>, StorageError>;
}

/// Atomic completion writes and progress recomputation.
///
/// Each call is one unit: the enrollment is checked, the completion row (if
/// any) is written, progress is recomputed from every completion visible at
/// that moment and stored back on the enrollment. Calls for the same
/// enrollment are serialized.
#[async_trait]
pub trait ProgressPersistence: Send + Sync {
    /// Apply a lesson event and recompute progress against `lessons`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the student is not enrolled; in that
    /// case nothing is written.
    async fn record_lesson_event(
        &self,
        event: LessonEvent,
        lessons: &[LessonId],
    ) -> Result<LessonEventOutcome, StorageError>;

    /// Recompute and store progress against the current `lessons`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the student is not enrolled.
    async fn refresh_progress(
        &self,
        key: EnrollmentKey,
        lessons: &[LessonId],
    ) -> Result<ProgressSnapshot, StorageError>;
}

/// Explicit deletion routines replacing implicit cascades.
#[async_trait]
pub trait PurgeRepository: Send + Sync {
    /// Delete a course's completions, then its enrollments, then the course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is deleted then.
    async fn purge_course(&self, course_id: CourseId) -> Result<PurgeReport, StorageError>;

    /// Delete a student's completions, then their enrollments.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is deleted then.
    async fn purge_student(&self, student_id: UserId) -> Result<PurgeReport, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    courses: HashMap<CourseId, Course>,
    enrollments: HashMap<EnrollmentKey, Enrollment>,
    completions: HashMap<(UserId, LessonId), LessonCompletion>,
}

impl MemoryState {
    /// Completions of the student for the given lessons, wherever the rows
    /// were first recorded.
    fn course_completions(
        &self,
        student_id: UserId,
        lessons: &[LessonId],
    ) -> Vec<LessonCompletion> {
        lessons
            .iter()
            .filter_map(|lesson| self.completions.get(&(student_id, *lesson)))
            .cloned()
            .collect()
    }

    fn recompute(
        &mut self,
        key: EnrollmentKey,
        lessons: &[LessonId],
    ) -> Result<ProgressSnapshot, StorageError> {
        let completions = self.course_completions(key.student_id, lessons);
        let summary = progress::aggregate(lessons, &completions);
        let enrollment = self
            .enrollments
            .get_mut(&key)
            .ok_or(StorageError::NotFound)?;
        enrollment.apply_progress(&summary);
        Ok(ProgressSnapshot {
            enrollment: enrollment.clone(),
            summary,
            completions,
        })
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All maps live behind one mutex so that a completion write and the
/// progress recompute that follows it are observed as a single step.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CourseCatalog for InMemoryRepository {
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        Ok(self.lock()?.courses.get(&id).cloned())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .courses
            .values()
            .find_map(|course| course.lesson(id))
            .cloned())
    }

    async fn list_approved_courses(&self) -> Result<Vec<Course>, StorageError> {
        let guard = self.lock()?;
        let mut courses: Vec<Course> = guard
            .courses
            .values()
            .filter(|c| c.is_approved())
            .cloned()
            .collect();
        courses.sort_by_key(Course::id);
        Ok(courses)
    }
}

#[async_trait]
impl CatalogWriter for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let claimed_elsewhere = course.lessons().iter().any(|lesson| {
            guard
                .courses
                .values()
                .any(|other| other.id() != course.id() && other.lesson(lesson.id()).is_some())
        });
        if claimed_elsewhere {
            return Err(StorageError::Conflict);
        }
        guard.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn remove_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let owner = guard
            .courses
            .values()
            .find(|c| c.lesson(id).is_some())
            .map(Course::id)
            .ok_or(StorageError::NotFound)?;
        if let Some(course) = guard.courses.get_mut(&owner) {
            *course = course.without_lesson(id);
        }
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        match guard.enrollments.entry(enrollment.key()) {
            std::collections::hash_map::Entry::Occupied(_) => Err(StorageError::Conflict),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(enrollment.clone());
                Ok(())
            }
        }
    }

    async fn get_enrollment(&self, key: EnrollmentKey) -> Result<Option<Enrollment>, StorageError> {
        Ok(self.lock()?.enrollments.get(&key).cloned())
    }

    async fn list_for_student(&self, student_id: UserId) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<Enrollment> = guard
            .enrollments
            .values()
            .filter(|e| e.student_id() == student_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.enrolled_at(), e.course_id()));
        Ok(found)
    }

    async fn list_for_course(&self, course_id: CourseId) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<Enrollment> = guard
            .enrollments
            .values()
            .filter(|e| e.course_id() == course_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.enrolled_at(), e.student_id()));
        Ok(found)
    }

    async fn delete_enrollment(&self, key: EnrollmentKey) -> Result<bool, StorageError> {
        Ok(self.lock()?.enrollments.remove(&key).is_some())
    }
}

#[async_trait]
impl CompletionRepository for InMemoryRepository {
    async fn get_completion(
        &self,
        student_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError> {
        Ok(self
            .lock()?
            .completions
            .get(&(student_id, lesson_id))
            .cloned())
    }

    async fn completions_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<LessonCompletion>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .completions
            .values()
            .filter(|c| c.student_id() == student_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProgressPersistence for InMemoryRepository {
    async fn record_lesson_event(
        &self,
        event: LessonEvent,
        lessons: &[LessonId],
    ) -> Result<LessonEventOutcome, StorageError> {
        let mut guard = self.lock()?;
        if !guard.enrollments.contains_key(&event.key()) {
            return Err(StorageError::NotFound);
        }

        let slot = (event.student_id, event.lesson_id);
        let existing = guard.completions.remove(&slot);
        let completion = event.apply_to(existing);
        guard.completions.insert(slot, completion.clone());

        let snapshot = guard.recompute(event.key(), lessons)?;
        Ok(LessonEventOutcome {
            completion,
            snapshot,
        })
    }

    async fn refresh_progress(
        &self,
        key: EnrollmentKey,
        lessons: &[LessonId],
    ) -> Result<ProgressSnapshot, StorageError> {
        self.lock()?.recompute(key, lessons)
    }
}

#[async_trait]
impl PurgeRepository for InMemoryRepository {
    async fn purge_course(&self, course_id: CourseId) -> Result<PurgeReport, StorageError> {
        let mut guard = self.lock()?;
        let before_completions = guard.completions.len();
        guard.completions.retain(|_, c| c.course_id() != course_id);
        let before_enrollments = guard.enrollments.len();
        guard.enrollments.retain(|k, _| k.course_id != course_id);
        guard.courses.remove(&course_id);

        Ok(PurgeReport {
            enrollments: (before_enrollments - guard.enrollments.len()) as u64,
            completions: (before_completions - guard.completions.len()) as u64,
        })
    }

    async fn purge_student(&self, student_id: UserId) -> Result<PurgeReport, StorageError> {
        let mut guard = self.lock()?;
        let before_completions = guard.completions.len();
        guard.completions.retain(|(s, _), _| *s != student_id);
        let before_enrollments = guard.enrollments.len();
        guard.enrollments.retain(|k, _| k.student_id != student_id);

        Ok(PurgeReport {
            enrollments: (before_enrollments - guard.enrollments.len()) as u64,
            completions: (before_completions - guard.completions.len()) as u64,
        })
    }
}

/// Repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CourseCatalog>,
    pub catalog_writer: Arc<dyn CatalogWriter>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub completions: Arc<dyn CompletionRepository>,
    pub progress: Arc<dyn ProgressPersistence>,
    pub purge: Arc<dyn PurgeRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repo(InMemoryRepository::new())
    }

    /// Wire every repository slot to the same backend.
    #[must_use]
    pub fn from_repo<R>(repo: R) -> Self
    where
        R: CourseCatalog
            + CatalogWriter
            + EnrollmentRepository
            + CompletionRepository
            + ProgressPersistence
            + PurgeRepository
            + Clone
            + 'static,
    {
        Self {
            catalog: Arc::new(repo.clone()),
            catalog_writer: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            completions: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            purge: Arc::new(repo),
        }
    }
}
