use std::collections::HashSet;

use crate::model::{LessonCompletion, LessonId};

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Result of aggregating a student's completions against a course's lessons.
///
/// Always built from the full set of facts; there is no incremental update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSummary {
    total_lessons: usize,
    completed_lessons: usize,
    percentage: f64,
}

impl ProgressSummary {
    /// Builds a summary from raw counts.
    ///
    /// A course without lessons is 0% complete. `completed` is capped at
    /// `total` so the percentage never leaves `[0, 100]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(completed: usize, total: usize) -> Self {
        let completed = completed.min(total);
        let percentage = if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64) * 100.0
        };
        Self {
            total_lessons: total,
            completed_lessons: completed,
            percentage: percentage.clamp(0.0, 100.0),
        }
    }

    #[must_use]
    pub fn total_lessons(&self) -> usize {
        self.total_lessons
    }

    #[must_use]
    pub fn completed_lessons(&self) -> usize {
        self.completed_lessons
    }

    /// Unrounded percentage; this is the value that gets persisted.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Percentage rounded to two decimals for presentation.
    #[must_use]
    pub fn display_percentage(&self) -> f64 {
        round_percentage(self.percentage)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_lessons > 0 && self.completed_lessons == self.total_lessons
    }

    /// Started but not finished.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.completed_lessons > 0 && !self.is_complete()
    }
}

/// Rounds a stored percentage to two decimals.
#[must_use]
pub fn round_percentage(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

//
// ─── AGGREGATION ───────────────────────────────────────────────────────────────
//

/// Lessons from `lessons` that the student has completed.
///
/// Completions for lessons outside the current lesson set (removed lessons,
/// lessons of other courses) are ignored.
#[must_use]
pub fn completed_lessons<'a, I>(lessons: &[LessonId], completions: I) -> HashSet<LessonId>
where
    I: IntoIterator<Item = &'a LessonCompletion>,
{
    let current: HashSet<LessonId> = lessons.iter().copied().collect();
    completions
        .into_iter()
        .filter(|c| c.is_completed() && current.contains(&c.lesson_id()))
        .map(LessonCompletion::lesson_id)
        .collect()
}

/// Recomputes progress as `|C ∩ L| / |L| * 100`.
///
/// The result depends only on the sets involved, so replaying the same
/// completions in any order or any number of times yields the same summary.
#[must_use]
pub fn aggregate<'a, I>(lessons: &[LessonId], completions: I) -> ProgressSummary
where
    I: IntoIterator<Item = &'a LessonCompletion>,
{
    let distinct: HashSet<LessonId> = lessons.iter().copied().collect();
    let done = completed_lessons(lessons, completions);
    ProgressSummary::from_counts(done.len(), distinct.len())
}
