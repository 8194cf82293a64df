#![forbid(unsafe_code)]

pub mod app_services;
pub mod enrollment_service;
pub mod error;
pub mod principal;
pub mod roster_service;
pub mod stats_service;
pub mod views;

pub use lms_core::Clock;

pub use app_services::AppServices;
pub use enrollment_service::EnrollmentService;
pub use error::{AppServicesError, AuthError, EnrollmentServiceError};
pub use principal::{PrincipalSource, StaticPrincipalSource};
pub use roster_service::CourseRosterService;
pub use stats_service::LearningStatsService;
pub use views::{
    CompleteLessonResponse, CourseProgressView, CourseView, EnrollResponse, EnrolledCourseView,
    EnrollmentView, LearningStatsView, LessonAccessResponse, LessonProgressView, PurgeReportView,
    RosterEntryView,
};
