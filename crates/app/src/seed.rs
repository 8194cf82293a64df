use anyhow::Context;
use tracing::info;

use lms_core::model::{Course, CourseId, Lesson, LessonId, UserId};
use storage::repository::CatalogWriter;

/// Instructor that owns every demo course.
pub const DEMO_INSTRUCTOR_ID: u64 = 900;

struct DemoLesson {
    id: u64,
    title: &'static str,
    minutes: Option<u32>,
}

struct DemoCourse {
    id: u64,
    title: &'static str,
    description: &'static str,
    approved: bool,
    lessons: &'static [DemoLesson],
}

const CATALOG: &[DemoCourse] = &[
    DemoCourse {
        id: 1,
        title: "Rust Fundamentals",
        description: "Ownership, borrowing and the type system.",
        approved: true,
        lessons: &[
            DemoLesson { id: 101, title: "Hello, Cargo", minutes: Some(15) },
            DemoLesson { id: 102, title: "Ownership", minutes: Some(45) },
            DemoLesson { id: 103, title: "Borrowing", minutes: Some(40) },
            DemoLesson { id: 104, title: "Traits", minutes: Some(50) },
        ],
    },
    DemoCourse {
        id: 2,
        title: "Async Rust",
        description: "Futures, executors and tokio.",
        approved: true,
        lessons: &[
            DemoLesson { id: 201, title: "Futures", minutes: Some(30) },
            DemoLesson { id: 202, title: "Tokio runtime", minutes: Some(35) },
            DemoLesson { id: 203, title: "Cancellation", minutes: None },
        ],
    },
    DemoCourse {
        id: 3,
        title: "Unsafe Rust",
        description: "Not yet reviewed.",
        approved: false,
        lessons: &[DemoLesson { id: 301, title: "Raw pointers", minutes: Some(60) }],
    },
];

fn build(demo: &DemoCourse) -> anyhow::Result<Course> {
    let course_id = CourseId::new(demo.id);
    let lessons = demo
        .lessons
        .iter()
        .zip(0_u32..)
        .map(|(lesson, position)| {
            Lesson::new(
                LessonId::new(lesson.id),
                course_id,
                lesson.title,
                position,
                lesson.minutes.map(|m| m * 60),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Course::new(
        course_id,
        demo.title,
        Some(demo.description.to_string()),
        UserId::new(DEMO_INSTRUCTOR_ID),
        demo.approved,
        lessons,
    )?)
}

/// Write the demo catalog. Re-running replaces the same courses.
pub async fn seed_demo_catalog(catalog: &dyn CatalogWriter) -> anyhow::Result<Vec<CourseId>> {
    let mut seeded = Vec::with_capacity(CATALOG.len());
    for demo in CATALOG {
        let course = build(demo)?;
        catalog
            .upsert_course(&course)
            .await
            .with_context(|| format!("seeding course {}", demo.id))?;
        info!(course_id = %course.id(), lessons = course.lessons().len(), "seeded course");
        seeded.push(course.id());
    }
    Ok(seeded)
}
