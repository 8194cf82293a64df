//! JSON-facing view models. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::Serialize;

use lms_core::model::{Course, CourseId, Enrollment, Lesson, LessonId, UserId};
use lms_core::progress::{ProgressSummary, round_percentage};
use lms_core::stats::LearningStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    pub id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub instructor_id: UserId,
    pub approved: bool,
    pub total_lessons: usize,
}

impl From<&Course> for CourseView {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id(),
            title: course.title().to_owned(),
            description: course.description().map(str::to_owned),
            instructor_id: course.instructor_id(),
            approved: course.is_approved(),
            total_lessons: course.lessons().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    pub student_id: UserId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
    pub progress_percentage: f64,
}

impl From<&Enrollment> for EnrollmentView {
    fn from(enrollment: &Enrollment) -> Self {
        Self {
            student_id: enrollment.student_id(),
            course_id: enrollment.course_id(),
            enrolled_at: enrollment.enrolled_at(),
            progress_percentage: round_percentage(enrollment.progress()),
        }
    }
}

/// An enrolled course together with the stored progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledCourseView {
    pub course: CourseView,
    pub enrolled_at: DateTime<Utc>,
    pub progress_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub enrolled: bool,
    pub course_id: CourseId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLessonResponse {
    pub completed: bool,
    pub lesson_id: LessonId,
    pub progress_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonAccessResponse {
    pub lesson_id: LessonId,
    pub completed: bool,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressView {
    pub lesson_id: LessonId,
    pub title: String,
    pub position: u32,
    pub completed: bool,
}

impl LessonProgressView {
    pub(crate) fn new(lesson: &Lesson, completed: bool) -> Self {
        Self {
            lesson_id: lesson.id(),
            title: lesson.title().to_owned(),
            position: lesson.position(),
            completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressView {
    pub course: CourseView,
    pub enrollment: EnrollmentView,
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub progress_percentage: f64,
    pub lessons: Vec<LessonProgressView>,
}

impl CourseProgressView {
    pub(crate) fn new(
        course: &Course,
        enrollment: &Enrollment,
        summary: &ProgressSummary,
        lessons: Vec<LessonProgressView>,
    ) -> Self {
        Self {
            course: CourseView::from(course),
            enrollment: EnrollmentView::from(enrollment),
            total_lessons: summary.total_lessons(),
            completed_lessons: summary.completed_lessons(),
            progress_percentage: summary.display_percentage(),
            lessons,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStatsView {
    pub total_courses: usize,
    pub completed_courses: usize,
    pub in_progress_courses: usize,
    pub total_learning_hours: f64,
    pub learning_streak: u32,
}

impl From<LearningStats> for LearningStatsView {
    fn from(stats: LearningStats) -> Self {
        Self {
            total_courses: stats.total_courses,
            completed_courses: stats.completed_courses,
            in_progress_courses: stats.in_progress_courses,
            total_learning_hours: stats.total_learning_hours,
            learning_streak: stats.learning_streak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntryView {
    pub student_id: UserId,
    pub enrolled_at: DateTime<Utc>,
    pub progress_percentage: f64,
    pub completed: bool,
}

impl From<&Enrollment> for RosterEntryView {
    fn from(enrollment: &Enrollment) -> Self {
        Self {
            student_id: enrollment.student_id(),
            enrolled_at: enrollment.enrolled_at(),
            progress_percentage: round_percentage(enrollment.progress()),
            completed: enrollment.is_completed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReportView {
    pub enrollments_removed: u64,
    pub completions_removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::time::fixed_now;

    #[test]
    fn responses_use_camel_case_keys() {
        let json = serde_json::to_value(CompleteLessonResponse {
            completed: true,
            lesson_id: LessonId::new(4),
            progress_percentage: 66.67,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "completed": true, "lessonId": 4, "progressPercentage": 66.67 })
        );
    }

    #[test]
    fn enrollment_view_rounds_progress() {
        let enrollment =
            Enrollment::from_persisted(UserId::new(1), CourseId::new(2), fixed_now(), 200.0 / 3.0)
                .unwrap();
        assert_eq!(EnrollmentView::from(&enrollment).progress_percentage, 66.67);
    }

    #[test]
    fn empty_stats_serialize_as_zeros() {
        let json = serde_json::to_value(LearningStatsView::default()).unwrap();
        assert_eq!(json["totalCourses"], 0);
        assert_eq!(json["learningStreak"], 0);
        assert_eq!(json["totalLearningHours"], 0.0);
    }
}
