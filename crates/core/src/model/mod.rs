mod completion;
mod course;
mod enrollment;
mod ids;
mod principal;

pub use ids::{CourseId, LessonId, ParseIdError, UserId};

pub use completion::{CompletionError, LessonCompletion};
pub use course::{Course, CourseError, Lesson};
pub use enrollment::{Enrollment, EnrollmentError, EnrollmentKey};
pub use principal::{ParseRoleError, Principal, Role};
