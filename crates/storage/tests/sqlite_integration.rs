use chrono::Duration;
use lms_core::model::{Course, CourseId, Enrollment, EnrollmentKey, Lesson, LessonId, UserId};
use lms_core::time::fixed_now;
use storage::repository::{
    CatalogWriter, CompletionRepository, CourseCatalog, EnrollmentRepository, LessonEvent,
    LessonEventKind, ProgressPersistence, PurgeReport, PurgeRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_course(id: u64, lessons: &[(u64, u32)], approved: bool) -> Course {
    let lessons = lessons
        .iter()
        .map(|(lid, pos)| {
            Lesson::new(
                LessonId::new(*lid),
                CourseId::new(id),
                format!("Lesson {lid}"),
                *pos,
                Some(1200),
            )
            .unwrap()
        })
        .collect();
    Course::new(
        CourseId::new(id),
        format!("Course {id}"),
        Some("desc".into()),
        UserId::new(500),
        approved,
        lessons,
    )
    .unwrap()
}

fn complete(student: u64, course: u64, lesson: u64) -> LessonEvent {
    LessonEvent {
        student_id: UserId::new(student),
        course_id: CourseId::new(course),
        lesson_id: LessonId::new(lesson),
        kind: LessonEventKind::Completed,
        at: fixed_now(),
    }
}

async fn memory_repo(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_catalog_roundtrip_keeps_lesson_order() {
    let repo = memory_repo("memdb_catalog").await;
    repo.upsert_course(&build_course(1, &[(12, 2), (10, 0), (11, 1)], true))
        .await
        .unwrap();
    repo.upsert_course(&build_course(2, &[], false)).await.unwrap();

    let course = repo.get_course(CourseId::new(1)).await.unwrap().unwrap();
    assert_eq!(
        course.lesson_ids(),
        vec![LessonId::new(10), LessonId::new(11), LessonId::new(12)]
    );
    assert_eq!(course.description(), Some("desc"));

    let lesson = repo.get_lesson(LessonId::new(11)).await.unwrap().unwrap();
    assert_eq!(lesson.course_id(), CourseId::new(1));
    assert_eq!(lesson.duration_secs(), Some(1200));

    let approved = repo.list_approved_courses().await.unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].lessons().len(), 3);

    // Re-upserting replaces the lesson list.
    repo.upsert_course(&build_course(1, &[(10, 0)], true))
        .await
        .unwrap();
    assert!(repo.get_lesson(LessonId::new(12)).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_rejects_duplicate_enrollment_with_conflict() {
    let repo = memory_repo("memdb_duplicate").await;
    let enrollment = Enrollment::new(UserId::new(1), CourseId::new(1), fixed_now());
    repo.insert_enrollment(&enrollment).await.unwrap();

    let err = repo.insert_enrollment(&enrollment).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let stored = repo
        .get_enrollment(EnrollmentKey::new(UserId::new(1), CourseId::new(1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.enrolled_at(), fixed_now());
    assert_eq!(stored.progress(), 0.0);
}

#[tokio::test]
async fn sqlite_lesson_events_recompute_and_keep_first_completion_time() {
    let repo = memory_repo("memdb_events").await;
    repo.upsert_course(&build_course(1, &[(10, 0), (11, 1), (12, 2)], true))
        .await
        .unwrap();
    repo.insert_enrollment(&Enrollment::new(UserId::new(1), CourseId::new(1), fixed_now()))
        .await
        .unwrap();
    let lessons = [LessonId::new(10), LessonId::new(11), LessonId::new(12)];

    repo.record_lesson_event(complete(1, 1, 11), &lessons)
        .await
        .unwrap();
    let snap = repo
        .record_lesson_event(complete(1, 1, 10), &lessons)
        .await
        .unwrap()
        .snapshot;
    assert_eq!(snap.summary.completed_lessons(), 2);
    assert_eq!(snap.summary.display_percentage(), 66.67);

    let mut again = complete(1, 1, 10);
    again.at = fixed_now() + Duration::days(1);
    repo.record_lesson_event(again, &lessons).await.unwrap();

    let stored = repo
        .get_completion(UserId::new(1), LessonId::new(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.completed_at(), Some(fixed_now()));
    assert_eq!(stored.last_accessed_at(), fixed_now() + Duration::days(1));

    let enrollment = repo
        .get_enrollment(EnrollmentKey::new(UserId::new(1), CourseId::new(1)))
        .await
        .unwrap()
        .unwrap();
    assert!((enrollment.progress() - 200.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn sqlite_lesson_event_without_enrollment_writes_nothing() {
    let repo = memory_repo("memdb_not_enrolled").await;
    repo.upsert_course(&build_course(1, &[(10, 0)], true))
        .await
        .unwrap();

    let err = repo
        .record_lesson_event(complete(1, 1, 10), &[LessonId::new(10)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    assert!(
        repo.completions_for_student(UserId::new(1))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_refresh_excludes_removed_lessons() {
    let repo = memory_repo("memdb_drift").await;
    repo.upsert_course(&build_course(1, &[(10, 0), (11, 1), (12, 2), (13, 3)], true))
        .await
        .unwrap();
    repo.insert_enrollment(&Enrollment::new(UserId::new(1), CourseId::new(1), fixed_now()))
        .await
        .unwrap();
    let all = [
        LessonId::new(10),
        LessonId::new(11),
        LessonId::new(12),
        LessonId::new(13),
    ];
    repo.record_lesson_event(complete(1, 1, 10), &all).await.unwrap();
    let snap = repo
        .record_lesson_event(complete(1, 1, 13), &all)
        .await
        .unwrap()
        .snapshot;
    assert_eq!(snap.enrollment.progress(), 50.0);

    repo.remove_lesson(LessonId::new(13)).await.unwrap();
    repo.remove_lesson(LessonId::new(12)).await.unwrap();
    let course = repo.get_course(CourseId::new(1)).await.unwrap().unwrap();

    let snap = repo
        .refresh_progress(
            EnrollmentKey::new(UserId::new(1), CourseId::new(1)),
            &course.lesson_ids(),
        )
        .await
        .unwrap();
    assert_eq!(snap.summary.total_lessons(), 2);
    assert_eq!(snap.summary.completed_lessons(), 1);
    assert_eq!(snap.enrollment.progress(), 50.0);
}

#[tokio::test]
async fn sqlite_lesson_moved_between_courses_counts_where_it_lives() {
    let repo = memory_repo("memdb_moved_lesson").await;
    repo.upsert_course(&build_course(1, &[(10, 0), (11, 1)], true))
        .await
        .unwrap();
    repo.upsert_course(&build_course(2, &[(20, 0)], true))
        .await
        .unwrap();
    for course in [1, 2] {
        repo.insert_enrollment(&Enrollment::new(
            UserId::new(1),
            CourseId::new(course),
            fixed_now(),
        ))
        .await
        .unwrap();
    }
    repo.record_lesson_event(
        complete(1, 1, 10),
        &[LessonId::new(10), LessonId::new(11)],
    )
    .await
    .unwrap();

    repo.upsert_course(&build_course(1, &[(11, 0)], true))
        .await
        .unwrap();
    repo.upsert_course(&build_course(2, &[(20, 0), (10, 1)], true))
        .await
        .unwrap();

    let moved_to = repo.get_course(CourseId::new(2)).await.unwrap().unwrap();
    let snap = repo
        .refresh_progress(
            EnrollmentKey::new(UserId::new(1), CourseId::new(2)),
            &moved_to.lesson_ids(),
        )
        .await
        .unwrap();
    assert_eq!(snap.summary.total_lessons(), 2);
    assert_eq!(snap.summary.completed_lessons(), 1);
    assert_eq!(snap.enrollment.progress(), 50.0);

    let moved_from = repo.get_course(CourseId::new(1)).await.unwrap().unwrap();
    let snap = repo
        .refresh_progress(
            EnrollmentKey::new(UserId::new(1), CourseId::new(1)),
            &moved_from.lesson_ids(),
        )
        .await
        .unwrap();
    assert_eq!(snap.enrollment.progress(), 0.0);
}

#[tokio::test]
async fn sqlite_purge_course_removes_dependent_rows_first() {
    let repo = memory_repo("memdb_purge").await;
    repo.upsert_course(&build_course(1, &[(10, 0)], true))
        .await
        .unwrap();
    repo.upsert_course(&build_course(2, &[(20, 0)], true))
        .await
        .unwrap();
    for course in [1, 2] {
        repo.insert_enrollment(&Enrollment::new(
            UserId::new(1),
            CourseId::new(course),
            fixed_now(),
        ))
        .await
        .unwrap();
    }
    repo.record_lesson_event(complete(1, 1, 10), &[LessonId::new(10)])
        .await
        .unwrap();
    repo.record_lesson_event(complete(1, 2, 20), &[LessonId::new(20)])
        .await
        .unwrap();

    let report = repo.purge_course(CourseId::new(1)).await.unwrap();
    assert_eq!(
        report,
        PurgeReport {
            enrollments: 1,
            completions: 1
        }
    );
    assert!(repo.get_course(CourseId::new(1)).await.unwrap().is_none());
    assert!(repo.get_lesson(LessonId::new(10)).await.unwrap().is_none());

    let remaining = repo.list_for_student(UserId::new(1)).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].course_id(), CourseId::new(2));

    let report = repo.purge_student(UserId::new(1)).await.unwrap();
    assert_eq!(report.enrollments, 1);
    assert_eq!(report.completions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_concurrent_completions_both_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.sqlite3").display());
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");

    let lessons: Vec<LessonId> = (1..=8).map(LessonId::new).collect();
    let course = build_course(
        1,
        &(1..=8).map(|l| (l, u32::try_from(l).unwrap())).collect::<Vec<_>>(),
        true,
    );
    repo.upsert_course(&course).await.unwrap();
    repo.insert_enrollment(&Enrollment::new(UserId::new(1), CourseId::new(1), fixed_now()))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for lesson in 1..=8 {
        let repo = repo.clone();
        let lessons = lessons.clone();
        handles.push(tokio::spawn(async move {
            repo.record_lesson_event(complete(1, 1, lesson), &lessons)
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("record");
    }

    let enrollment = repo
        .get_enrollment(EnrollmentKey::new(UserId::new(1), CourseId::new(1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment.progress(), 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_concurrent_enrollments_yield_one_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("enroll.sqlite3").display());
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.insert_enrollment(&Enrollment::new(
                UserId::new(1),
                CourseId::new(1),
                fixed_now(),
            ))
            .await
        }));
    }

    let mut ok = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(()) => ok += 1,
            Err(StorageError::Conflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(repo.list_for_student(UserId::new(1)).await.unwrap().len(), 1);
}
