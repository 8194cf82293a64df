use lms_core::model::{CourseId, Enrollment, EnrollmentKey, LessonCompletion, LessonId, UserId};
use lms_core::progress;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{db, id_i64, map_completion_row, map_enrollment_row};
use crate::repository::{
    CompletionRepository, LessonEvent, LessonEventOutcome, ProgressPersistence, ProgressSnapshot,
    PurgeReport, PurgeRepository, StorageError,
};

/// Takes the write lock by touching the enrollment row, then loads it.
///
/// Because the first statement of the transaction is a write, SQLite hands
/// out the database write lock here; a second writer for the same
/// enrollment waits (busy timeout) until this transaction commits and then
/// sees every completion row it wrote.
async fn lock_enrollment(
    conn: &mut SqliteConnection,
    key: EnrollmentKey,
) -> Result<Enrollment, StorageError> {
    let student = id_i64("student_id", key.student_id.value())?;
    let course = id_i64("course_id", key.course_id.value())?;

    let touched = sqlx::query(
        "UPDATE enrollments SET progress = progress WHERE student_id = ?1 AND course_id = ?2",
    )
    .bind(student)
    .bind(course)
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    if touched.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }

    let row = sqlx::query(
        r"
        SELECT student_id, course_id, enrolled_at, progress
        FROM enrollments
        WHERE student_id = ?1 AND course_id = ?2
        ",
    )
    .bind(student)
    .bind(course)
    .fetch_one(&mut *conn)
    .await
    .map_err(db)?;
    map_enrollment_row(&row)
}

/// The student's completion rows for the lessons currently in the course.
///
/// Rows are matched by lesson, not by the `course_id` stored on the row, so a
/// lesson the catalog moved between courses keeps counting where it lives now.
async fn course_completions(
    conn: &mut SqliteConnection,
    student_id: UserId,
    lessons: &[LessonId],
) -> Result<Vec<LessonCompletion>, StorageError> {
    if lessons.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT student_id, lesson_id, course_id, completed, completed_at, last_accessed_at \
         FROM lesson_completions WHERE student_id = ",
    );
    query.push_bind(id_i64("student_id", student_id.value())?);
    query.push(" AND lesson_id IN (");
    let mut ids = query.separated(", ");
    for lesson in lessons {
        ids.push_bind(id_i64("lesson_id", lesson.value())?);
    }
    ids.push_unseparated(")");

    let rows = query.build().fetch_all(&mut *conn).await.map_err(db)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        out.push(map_completion_row(row)?);
    }
    Ok(out)
}

async fn store_completion(
    conn: &mut SqliteConnection,
    completion: &LessonCompletion,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO lesson_completions (
            student_id, lesson_id, course_id, completed, completed_at, last_accessed_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(student_id, lesson_id) DO UPDATE SET
            course_id = excluded.course_id,
            completed = excluded.completed,
            completed_at = excluded.completed_at,
            last_accessed_at = excluded.last_accessed_at
        ",
    )
    .bind(id_i64("student_id", completion.student_id().value())?)
    .bind(id_i64("lesson_id", completion.lesson_id().value())?)
    .bind(id_i64("course_id", completion.course_id().value())?)
    .bind(completion.is_completed())
    .bind(completion.completed_at())
    .bind(completion.last_accessed_at())
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

/// Recomputes progress from every visible completion and writes it back.
async fn recompute(
    conn: &mut SqliteConnection,
    mut enrollment: Enrollment,
    lessons: &[LessonId],
) -> Result<ProgressSnapshot, StorageError> {
    let completions = course_completions(conn, enrollment.student_id(), lessons).await?;
    let summary = progress::aggregate(lessons, &completions);

    sqlx::query("UPDATE enrollments SET progress = ?1 WHERE student_id = ?2 AND course_id = ?3")
        .bind(summary.percentage())
        .bind(id_i64("student_id", enrollment.student_id().value())?)
        .bind(id_i64("course_id", enrollment.course_id().value())?)
        .execute(&mut *conn)
        .await
        .map_err(db)?;

    enrollment.apply_progress(&summary);
    tracing::debug!(
        student_id = %enrollment.student_id(),
        course_id = %enrollment.course_id(),
        completed = summary.completed_lessons(),
        total = summary.total_lessons(),
        progress = summary.percentage(),
        "recomputed course progress"
    );

    Ok(ProgressSnapshot {
        enrollment,
        summary,
        completions,
    })
}

#[async_trait::async_trait]
impl CompletionRepository for SqliteRepository {
    async fn get_completion(
        &self,
        student_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, lesson_id, course_id, completed, completed_at, last_accessed_at
            FROM lesson_completions
            WHERE student_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_completion_row).transpose()
    }

    async fn completions_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<LessonCompletion>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, lesson_id, course_id, completed, completed_at, last_accessed_at
            FROM lesson_completions
            WHERE student_id = ?1
            ORDER BY course_id ASC, lesson_id ASC
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_completion_row(row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ProgressPersistence for SqliteRepository {
    async fn record_lesson_event(
        &self,
        event: LessonEvent,
        lessons: &[LessonId],
    ) -> Result<LessonEventOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        // Dropping `tx` on any early return rolls back, so a missing
        // enrollment leaves no completion row behind.
        let enrollment = lock_enrollment(&mut tx, event.key()).await?;

        let existing = sqlx::query(
            r"
            SELECT student_id, lesson_id, course_id, completed, completed_at, last_accessed_at
            FROM lesson_completions
            WHERE student_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(id_i64("student_id", event.student_id.value())?)
        .bind(id_i64("lesson_id", event.lesson_id.value())?)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?
        .as_ref()
        .map(map_completion_row)
        .transpose()?;

        let completion = event.apply_to(existing);
        store_completion(&mut tx, &completion).await?;

        let snapshot = recompute(&mut tx, enrollment, lessons).await?;
        tx.commit().await.map_err(db)?;
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
        let mut tx = self.pool.begin().await.map_err(db)?;
        let enrollment = lock_enrollment(&mut tx, key).await?;
        let snapshot = recompute(&mut tx, enrollment, lessons).await?;
        tx.commit().await.map_err(db)?;
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl PurgeRepository for SqliteRepository {
    async fn purge_course(&self, course_id: CourseId) -> Result<PurgeReport, StorageError> {
        let course = id_i64("course_id", course_id.value())?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        let completions = sqlx::query("DELETE FROM lesson_completions WHERE course_id = ?1")
            .bind(course)
            .execute(&mut *tx)
            .await
            .map_err(db)?
            .rows_affected();
        let enrollments = sqlx::query("DELETE FROM enrollments WHERE course_id = ?1")
            .bind(course)
            .execute(&mut *tx)
            .await
            .map_err(db)?
            .rows_affected();
        sqlx::query("DELETE FROM lessons WHERE course_id = ?1")
            .bind(course)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        sqlx::query("DELETE FROM courses WHERE id = ?1")
            .bind(course)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(PurgeReport {
            enrollments,
            completions,
        })
    }

    async fn purge_student(&self, student_id: UserId) -> Result<PurgeReport, StorageError> {
        let student = id_i64("student_id", student_id.value())?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        let completions = sqlx::query("DELETE FROM lesson_completions WHERE student_id = ?1")
            .bind(student)
            .execute(&mut *tx)
            .await
            .map_err(db)?
            .rows_affected();
        let enrollments = sqlx::query("DELETE FROM enrollments WHERE student_id = ?1")
            .bind(student)
            .execute(&mut *tx)
            .await
            .map_err(db)?
            .rows_affected();

        tx.commit().await.map_err(db)?;
        Ok(PurgeReport {
            enrollments,
            completions,
        })
    }
}
