use std::sync::Arc;

use tracing::info;

use lms_core::model::{CourseId, Principal, Role, UserId};
use storage::repository::{CourseCatalog, EnrollmentRepository, PurgeRepository};

use crate::error::EnrollmentServiceError;
use crate::principal::require_admin;
use crate::views::{PurgeReportView, RosterEntryView};

/// Instructor and admin views over a course's enrollments.
#[derive(Clone)]
pub struct CourseRosterService {
    catalog: Arc<dyn CourseCatalog>,
    enrollments: Arc<dyn EnrollmentRepository>,
    purge: Arc<dyn PurgeRepository>,
}

impl CourseRosterService {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CourseCatalog>,
        enrollments: Arc<dyn EnrollmentRepository>,
        purge: Arc<dyn PurgeRepository>,
    ) -> Self {
        Self {
            catalog,
            enrollments,
            purge,
        }
    }

    /// Students enrolled in a course with their stored progress.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` if the course is missing and `Forbidden` unless
    /// the caller is an admin or the course's instructor.
    pub async fn course_roster(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<Vec<RosterEntryView>, EnrollmentServiceError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(EnrollmentServiceError::CourseNotFound(course_id))?;

        let allowed = match principal.role() {
            Role::Admin => true,
            Role::Instructor => course.instructor_id() == principal.user_id(),
            Role::Student => false,
        };
        if !allowed {
            return Err(EnrollmentServiceError::Forbidden(principal.role()));
        }

        let enrollments = self.enrollments.list_for_course(course_id).await?;
        Ok(enrollments.iter().map(RosterEntryView::from).collect())
    }

    /// Delete every enrollment and completion of a course, then the course.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins and `Storage` if deletion fails.
    pub async fn purge_course(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<PurgeReportView, EnrollmentServiceError> {
        let admin = require_admin(principal)?;
        let report = self.purge.purge_course(course_id).await?;
        info!(
            %admin,
            %course_id,
            enrollments = report.enrollments,
            completions = report.completions,
            "course purged"
        );
        Ok(PurgeReportView {
            enrollments_removed: report.enrollments,
            completions_removed: report.completions,
        })
    }

    /// Delete every enrollment and completion of a student.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins and `Storage` if deletion fails.
    pub async fn purge_student(
        &self,
        principal: &Principal,
        student_id: UserId,
    ) -> Result<PurgeReportView, EnrollmentServiceError> {
        let admin = require_admin(principal)?;
        let report = self.purge.purge_student(student_id).await?;
        info!(%admin, %student_id, enrollments = report.enrollments, "student purged");
        Ok(PurgeReportView {
            enrollments_removed: report.enrollments,
            completions_removed: report.completions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{Course, Enrollment};
    use lms_core::time::fixed_now;
    use storage::repository::{CatalogWriter, InMemoryRepository, Storage};

    async fn seeded() -> CourseRosterService {
        let repo = InMemoryRepository::new();
        let course =
            Course::new(CourseId::new(1), "Rust", None, UserId::new(50), true, Vec::new()).unwrap();
        repo.upsert_course(&course).await.unwrap();
        for student in [1, 2] {
            repo.insert_enrollment(&Enrollment::new(
                UserId::new(student),
                CourseId::new(1),
                fixed_now(),
            ))
            .await
            .unwrap();
        }
        let storage = Storage::from_repo(repo);
        CourseRosterService::new(storage.catalog, storage.enrollments, storage.purge)
    }

    #[tokio::test]
    async fn owning_instructor_and_admin_see_roster() {
        let service = seeded().await;
        let owner = Principal::new(UserId::new(50), Role::Instructor);
        let roster = service.course_roster(&owner, CourseId::new(1)).await.unwrap();
        assert_eq!(roster.len(), 2);

        let admin = Principal::new(UserId::new(1), Role::Admin);
        assert_eq!(
            service.course_roster(&admin, CourseId::new(1)).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn other_instructors_and_students_are_forbidden() {
        let service = seeded().await;
        let stranger = Principal::new(UserId::new(51), Role::Instructor);
        assert!(matches!(
            service.course_roster(&stranger, CourseId::new(1)).await,
            Err(EnrollmentServiceError::Forbidden(Role::Instructor))
        ));
        let student = Principal::student(UserId::new(1));
        assert!(service.course_roster(&student, CourseId::new(1)).await.is_err());
    }

    #[tokio::test]
    async fn purge_requires_admin() {
        let service = seeded().await;
        let owner = Principal::new(UserId::new(50), Role::Instructor);
        assert!(service.purge_course(&owner, CourseId::new(1)).await.is_err());

        let admin = Principal::new(UserId::new(1), Role::Admin);
        let report = service.purge_course(&admin, CourseId::new(1)).await.unwrap();
        assert_eq!(report.enrollments_removed, 2);
        assert!(matches!(
            service.course_roster(&admin, CourseId::new(1)).await,
            Err(EnrollmentServiceError::CourseNotFound(_))
        ));
    }
}
