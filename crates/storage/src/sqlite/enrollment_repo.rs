use lms_core::model::{CourseId, Enrollment, EnrollmentKey, UserId};

use super::SqliteRepository;
use super::mapping::{conflict_or_db, db, id_i64, map_enrollment_row};
use crate::repository::{EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (student_id, course_id, enrolled_at, progress)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_i64("student_id", enrollment.student_id().value())?)
        .bind(id_i64("course_id", enrollment.course_id().value())?)
        .bind(enrollment.enrolled_at())
        .bind(enrollment.progress())
        .execute(&self.pool)
        .await
        .map_err(conflict_or_db)?;

        Ok(())
    }

    async fn get_enrollment(&self, key: EnrollmentKey) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, course_id, enrolled_at, progress
            FROM enrollments
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("student_id", key.student_id.value())?)
        .bind(id_i64("course_id", key.course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn list_for_student(&self, student_id: UserId) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, course_id, enrolled_at, progress
            FROM enrollments
            WHERE student_id = ?1
            ORDER BY enrolled_at ASC, course_id ASC
            ",
        )
        .bind(id_i64("student_id", student_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_enrollment_row(row)?);
        }
        Ok(out)
    }

    async fn list_for_course(&self, course_id: CourseId) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, course_id, enrolled_at, progress
            FROM enrollments
            WHERE course_id = ?1
            ORDER BY enrolled_at ASC, student_id ASC
            ",
        )
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_enrollment_row(row)?);
        }
        Ok(out)
    }

    async fn delete_enrollment(&self, key: EnrollmentKey) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM enrollments WHERE student_id = ?1 AND course_id = ?2")
            .bind(id_i64("student_id", key.student_id.value())?)
            .bind(id_i64("course_id", key.course_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db)?;

        Ok(res.rows_affected() > 0)
    }
}
