use chrono::{DateTime, Utc};
use lms_core::model::{
    Course, CourseId, Enrollment, Lesson, LessonCompletion, LessonId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn db<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    let position: i64 = row.try_get("position").map_err(ser)?;
    let position = u32::try_from(position)
        .map_err(|_| StorageError::Serialization(format!("invalid position: {position}")))?;
    let duration = row
        .try_get::<Option<i64>, _>("duration_seconds")
        .map_err(ser)?
        .map(|secs| {
            u32::try_from(secs)
                .map_err(|_| StorageError::Serialization(format!("invalid duration: {secs}")))
        })
        .transpose()?;

    Lesson::new(
        lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        position,
        duration,
    )
    .map_err(ser)
}

/// Build a course from its row plus the lesson rows that belong to it.
pub(crate) fn map_course_row(row: &SqliteRow, lessons: Vec<Lesson>) -> Result<Course, StorageError> {
    Course::new(
        course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        user_id_from_i64(row.try_get::<i64, _>("instructor_id").map_err(ser)?)?,
        row.try_get::<bool, _>("approved").map_err(ser)?,
        lessons,
    )
    .map_err(ser)
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    let enrolled_at: DateTime<Utc> = row.try_get("enrolled_at").map_err(ser)?;
    Enrollment::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        enrolled_at,
        row.try_get::<f64, _>("progress").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_completion_row(row: &SqliteRow) -> Result<LessonCompletion, StorageError> {
    LessonCompletion::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<bool, _>("completed").map_err(ser)?,
        row.try_get::<Option<DateTime<Utc>>, _>("completed_at")
            .map_err(ser)?,
        row.try_get("last_accessed_at").map_err(ser)?,
    )
    .map_err(ser)
}

/// Unique-constraint violations become `Conflict`; everything else is a
/// connection-level failure.
pub(crate) fn conflict_or_db(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(inner) if inner.is_unique_violation() => StorageError::Conflict,
        _ => db(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_rejected() {
        assert!(matches!(
            course_id_from_i64(-1),
            Err(StorageError::Serialization(_))
        ));
        assert_eq!(lesson_id_from_i64(7).unwrap(), LessonId::new(7));
    }

    #[test]
    fn oversized_ids_do_not_wrap() {
        assert!(id_i64("course_id", u64::MAX).is_err());
        assert_eq!(id_i64("course_id", 42).unwrap(), 42);
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(matches!(
            conflict_or_db(sqlx::Error::RowNotFound),
            StorageError::Connection(_)
        ));
    }
}
