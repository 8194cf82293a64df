use std::collections::HashSet;

use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("lesson title cannot be empty")]
    EmptyLessonTitle,

    #[error("lesson {lesson_id} belongs to course {actual}, not {expected}")]
    ForeignLesson {
        lesson_id: LessonId,
        expected: CourseId,
        actual: CourseId,
    },

    #[error("lesson {0} appears more than once")]
    DuplicateLesson(LessonId),
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// Read model of a lesson as published by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    course_id: CourseId,
    title: String,
    position: u32,
    duration_secs: Option<u32>,
}

impl Lesson {
    /// Creates a lesson read model.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyLessonTitle` if the title is blank.
    pub fn new(
        id: LessonId,
        course_id: CourseId,
        title: impl Into<String>,
        position: u32,
        duration_secs: Option<u32>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyLessonTitle);
        }
        Ok(Self {
            id,
            course_id,
            title: title.trim().to_string(),
            position,
            duration_secs,
        })
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Length of the lesson's media in seconds, when known.
    #[must_use]
    pub fn duration_secs(&self) -> Option<u32> {
        self.duration_secs
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// Read model of a course: approval flag plus its ordered lesson list.
///
/// Lessons are kept sorted by `position`, ties broken by lesson id, so every
/// consumer sees the same order regardless of how the catalog returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    title: String,
    description: Option<String>,
    instructor_id: UserId,
    approved: bool,
    lessons: Vec<Lesson>,
}

impl Course {
    /// Creates a course read model.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title,
    /// `CourseError::ForeignLesson` if a lesson points at another course and
    /// `CourseError::DuplicateLesson` if a lesson id repeats.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        description: Option<String>,
        instructor_id: UserId,
        approved: bool,
        mut lessons: Vec<Lesson>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }

        let mut seen = HashSet::with_capacity(lessons.len());
        for lesson in &lessons {
            if lesson.course_id != id {
                return Err(CourseError::ForeignLesson {
                    lesson_id: lesson.id,
                    expected: id,
                    actual: lesson.course_id,
                });
            }
            if !seen.insert(lesson.id) {
                return Err(CourseError::DuplicateLesson(lesson.id));
            }
        }
        lessons.sort_by_key(|l| (l.position, l.id));

        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            title: title.trim().to_string(),
            description,
            instructor_id,
            approved,
            lessons,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn instructor_id(&self) -> UserId {
        self.instructor_id
    }

    /// Whether the course passed the catalog's approval workflow.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.approved
    }

    /// Lessons in presentation order.
    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    #[must_use]
    pub fn lesson_ids(&self) -> Vec<LessonId> {
        self.lessons.iter().map(Lesson::id).collect()
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == id)
    }

    /// Returns a copy of the course without the given lesson.
    #[must_use]
    pub fn without_lesson(&self, id: LessonId) -> Self {
        let mut course = self.clone();
        course.lessons.retain(|l| l.id != id);
        course
    }
}
