use std::collections::HashMap;

use lms_core::model::{Course, CourseId, Lesson, LessonId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conflict_or_db, course_id_from_i64, db, id_i64, map_course_row, map_lesson_row, ser,
};
use crate::repository::{CatalogWriter, CourseCatalog, StorageError};

#[async_trait::async_trait]
impl CourseCatalog for SqliteRepository {
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let course_id = id_i64("course_id", id.value())?;

        let Some(row) = sqlx::query(
            r"
            SELECT id, title, description, instructor_id, approved
            FROM courses WHERE id = ?1
            ",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        else {
            return Ok(None);
        };

        let lesson_rows = sqlx::query(
            r"
            SELECT id, course_id, title, position, duration_seconds
            FROM lessons
            WHERE course_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut lessons = Vec::with_capacity(lesson_rows.len());
        for lesson in &lesson_rows {
            lessons.push(map_lesson_row(lesson)?);
        }
        map_course_row(&row, lessons).map(Some)
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, title, position, duration_seconds
            FROM lessons WHERE id = ?1
            ",
        )
        .bind(id_i64("lesson_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_lesson_row).transpose()
    }

    async fn list_approved_courses(&self) -> Result<Vec<Course>, StorageError> {
        let course_rows = sqlx::query(
            r"
            SELECT id, title, description, instructor_id, approved
            FROM courses
            WHERE approved = 1
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let lesson_rows = sqlx::query(
            r"
            SELECT l.id, l.course_id, l.title, l.position, l.duration_seconds
            FROM lessons l
            JOIN courses c ON c.id = l.course_id
            WHERE c.approved = 1
            ORDER BY l.course_id ASC, l.position ASC, l.id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut by_course: HashMap<CourseId, Vec<Lesson>> = HashMap::new();
        for row in &lesson_rows {
            let lesson = map_lesson_row(row)?;
            by_course.entry(lesson.course_id()).or_default().push(lesson);
        }

        let mut courses = Vec::with_capacity(course_rows.len());
        for row in &course_rows {
            let id = course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            let lessons = by_course.remove(&id).unwrap_or_default();
            courses.push(map_course_row(row, lessons)?);
        }
        Ok(courses)
    }
}

#[async_trait::async_trait]
impl CatalogWriter for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let course_id = id_i64("course_id", course.id().value())?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        sqlx::query(
            r"
            INSERT INTO courses (id, title, description, instructor_id, approved)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                instructor_id = excluded.instructor_id,
                approved = excluded.approved
            ",
        )
        .bind(course_id)
        .bind(course.title())
        .bind(course.description())
        .bind(id_i64("instructor_id", course.instructor_id().value())?)
        .bind(course.is_approved())
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query("DELETE FROM lessons WHERE course_id = ?1")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        for lesson in course.lessons() {
            sqlx::query(
                r"
                INSERT INTO lessons (id, course_id, title, position, duration_seconds)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(id_i64("lesson_id", lesson.id().value())?)
            .bind(course_id)
            .bind(lesson.title())
            .bind(i64::from(lesson.position()))
            .bind(lesson.duration_secs().map(i64::from))
            .execute(&mut *tx)
            .await
            .map_err(conflict_or_db)?;
        }

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn remove_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM lessons WHERE id = ?1")
            .bind(id_i64("lesson_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
