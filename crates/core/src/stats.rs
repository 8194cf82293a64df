use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{Course, LessonCompletion};
use crate::progress::{self, ProgressSummary};

/// One enrolled course as seen by the stats computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseActivity {
    pub summary: ProgressSummary,
    /// Seconds of lesson material the student has completed in this course.
    pub completed_secs: u64,
}

impl CourseActivity {
    /// Aggregates a course's progress and the completed lesson time.
    ///
    /// Only lessons still in the course count, and lessons without a known
    /// duration contribute nothing to the time total.
    #[must_use]
    pub fn from_course(course: &Course, completions: &[LessonCompletion]) -> Self {
        let lesson_ids = course.lesson_ids();
        let done = progress::completed_lessons(&lesson_ids, completions);
        let completed_secs = course
            .lessons()
            .iter()
            .filter(|l| done.contains(&l.id()))
            .filter_map(|l| l.duration_secs())
            .map(u64::from)
            .sum();
        Self {
            summary: progress::aggregate(&lesson_ids, completions),
            completed_secs,
        }
    }
}

/// Learning statistics across all of a student's enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LearningStats {
    pub total_courses: usize,
    pub completed_courses: usize,
    pub in_progress_courses: usize,
    pub total_learning_hours: f64,
    pub learning_streak: u32,
}

impl LearningStats {
    /// Computes stats from per-course activity and the timestamps of every
    /// lesson interaction.
    ///
    /// An empty history yields all zeros.
    #[must_use]
    pub fn compute<I>(courses: &[CourseActivity], activity: I, today: NaiveDate) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let completed_courses = courses.iter().filter(|c| c.summary.is_complete()).count();
        let in_progress_courses = courses
            .iter()
            .filter(|c| c.summary.is_in_progress())
            .count();
        let total_secs: u64 = courses.iter().map(|c| c.completed_secs).sum();

        Self {
            total_courses: courses.len(),
            completed_courses,
            in_progress_courses,
            total_learning_hours: learning_hours(total_secs),
            learning_streak: learning_streak(activity, today),
        }
    }
}

/// Converts seconds to hours, rounded to one decimal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn learning_hours(total_secs: u64) -> f64 {
    let hours = total_secs as f64 / 3600.0;
    (hours * 10.0).round() / 10.0
}

/// Consecutive UTC days with activity, counted back from `today`.
///
/// A day without activity yet does not break the streak: when `today` is
/// empty the count starts from yesterday.
#[must_use]
pub fn learning_streak<I>(activity: I, today: NaiveDate) -> u32
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let days: BTreeSet<NaiveDate> = activity.into_iter().map(|at| at.date_naive()).collect();

    let mut cursor = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0_u32;
    while days.contains(&cursor) {
        streak = streak.saturating_add(1);
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CourseId, Lesson, LessonId, UserId};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn course(durations: &[Option<u32>]) -> Course {
        let lessons = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let id = u64::try_from(i).unwrap() + 1;
                Lesson::new(
                    LessonId::new(id),
                    CourseId::new(1),
                    format!("L{id}"),
                    u32::try_from(i).unwrap(),
                    *d,
                )
                .unwrap()
            })
            .collect();
        Course::new(CourseId::new(1), "C", None, UserId::new(9), true, lessons).unwrap()
    }

    fn done(lesson: u64) -> LessonCompletion {
        LessonCompletion::completed_now(
            UserId::new(1),
            LessonId::new(lesson),
            CourseId::new(1),
            fixed_now(),
        )
    }

    #[test]
    fn empty_history_is_all_zero() {
        let stats = LearningStats::compute(&[], std::iter::empty(), fixed_now().date_naive());
        assert_eq!(stats, LearningStats::default());
    }

    #[test]
    fn counts_completed_and_in_progress_courses() {
        let c = course(&[Some(1800), Some(1800)]);
        let finished = CourseActivity::from_course(&c, &[done(1), done(2)]);
        let halfway = CourseActivity::from_course(&c, &[done(1)]);
        let untouched = CourseActivity::from_course(&c, &[]);

        let stats = LearningStats::compute(
            &[finished, halfway, untouched],
            std::iter::empty(),
            fixed_now().date_naive(),
        );
        assert_eq!(stats.total_courses, 3);
        assert_eq!(stats.completed_courses, 1);
        assert_eq!(stats.in_progress_courses, 1);
        assert_eq!(stats.total_learning_hours, 1.5);
    }

    #[test]
    fn lessons_without_duration_add_no_time() {
        let c = course(&[None, Some(900)]);
        let activity = CourseActivity::from_course(&c, &[done(1), done(2)]);
        assert_eq!(activity.completed_secs, 900);
        assert_eq!(learning_hours(activity.completed_secs), 0.3);
    }

    #[test]
    fn streak_counts_back_from_today() {
        let now = fixed_now();
        let activity = vec![now, now - Duration::days(1), now - Duration::days(2)];
        assert_eq!(learning_streak(activity, now.date_naive()), 3);
    }

    #[test]
    fn streak_survives_a_quiet_today() {
        let now = fixed_now();
        let activity = vec![now - Duration::days(1), now - Duration::days(2)];
        assert_eq!(learning_streak(activity, now.date_naive()), 2);
    }

    #[test]
    fn gap_resets_streak() {
        let now = fixed_now();
        let activity = vec![now - Duration::days(2), now - Duration::days(3)];
        assert_eq!(learning_streak(activity, now.date_naive()), 0);

        let activity = vec![now, now - Duration::days(2)];
        assert_eq!(learning_streak(activity, now.date_naive()), 1);
    }

    #[test]
    fn several_events_on_one_day_count_once() {
        let now = fixed_now();
        let activity = vec![now, now, now - Duration::minutes(5)];
        assert_eq!(learning_streak(activity, now.date_naive()), 1);
    }
}
