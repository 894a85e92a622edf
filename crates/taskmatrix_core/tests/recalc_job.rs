use rusqlite::params;
use std::path::Path;
use std::time::{Duration, Instant};
use taskmatrix_core::db::{open_db, open_db_in_memory, StoreOptions};
use taskmatrix_core::{
    now_epoch_ms, JobError, Quadrant, RecalcJob, RecalcScheduler, Schedule, SchedulerConfig,
    SqliteTaskRepository, Task, TaskRepository, TickSummary, UrgencyPolicy,
};
use uuid::Uuid;

const NOW: i64 = 1_760_000_000_000;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn stored(repo: &SqliteTaskRepository<'_>, task: &Task) -> Task {
    repo.get_task(task.id).unwrap().unwrap()
}

fn insert_raw(conn: &rusqlite::Connection, quadrant: &str, completed_at: Option<i64>) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO tasks (
            uuid, title, is_important, is_urgent, quadrant, completed, created_at, completed_at
         ) VALUES (?1, 'raw', 0, 0, ?2, 0, ?3, ?4);",
        params![id.to_string(), quadrant, NOW, completed_at],
    )
    .unwrap();
    id
}

fn scheduler_config(db_path: &Path, schedule: Schedule) -> SchedulerConfig {
    SchedulerConfig {
        db_path: db_path.to_path_buf(),
        store: StoreOptions::default(),
        policy: UrgencyPolicy::default(),
        schedule,
        poll_interval: Duration::from_millis(10),
    }
}

fn wait_for_ticks(scheduler: &RecalcScheduler, at_least: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while scheduler.status().ticks_attempted < at_least && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn crossing_deadline_changes_only_derived_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let policy = UrgencyPolicy::default();

    let mut crossing = Task::new("crossing", false, Some(NOW + 3 * DAY_MS), &policy, NOW);
    crossing.description = Some("kept verbatim".to_string());
    let far = Task::new("far", true, Some(NOW + 30 * DAY_MS), &policy, NOW);
    let undated = Task::new("undated", true, None, &policy, NOW);
    for task in [&crossing, &far, &undated] {
        repo.create_task(task).unwrap();
    }
    assert_eq!(crossing.quadrant, Quadrant::Q4);

    let summary = RecalcJob::new(SqliteTaskRepository::new(&conn))
        .run_tick(NOW + 2 * DAY_MS + 1)
        .unwrap();
    assert_eq!(
        summary,
        TickSummary {
            inspected: 3,
            updated: 1,
            skipped: 0,
        }
    );

    let mut expected = crossing.clone();
    expected.is_urgent = true;
    expected.quadrant = Quadrant::Q3;
    assert_eq!(stored(&repo, &crossing), expected);
    assert_eq!(stored(&repo, &far), far);
    assert_eq!(stored(&repo, &undated), undated);
}

#[test]
fn second_tick_at_same_instant_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let policy = UrgencyPolicy::default();

    repo.create_task(&Task::new("a", true, Some(NOW + 2 * DAY_MS), &policy, NOW))
        .unwrap();
    repo.create_task(&Task::new("b", false, Some(NOW + 2 * DAY_MS), &policy, NOW))
        .unwrap();

    let job = RecalcJob::new(SqliteTaskRepository::new(&conn));
    let later = NOW + 2 * DAY_MS;
    assert_eq!(job.run_tick(later).unwrap().updated, 2);
    assert_eq!(
        job.run_tick(later).unwrap(),
        TickSummary {
            inspected: 2,
            updated: 0,
            skipped: 0,
        }
    );
}

#[test]
fn completed_tasks_are_left_alone() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let policy = UrgencyPolicy::default();

    let mut done = Task::new("done", true, Some(NOW + 3 * DAY_MS), &policy, NOW);
    done.complete(NOW + 1);
    repo.create_task(&done).unwrap();

    let summary = RecalcJob::new(SqliteTaskRepository::new(&conn))
        .run_tick(NOW + 10 * DAY_MS)
        .unwrap();
    assert_eq!(summary, TickSummary::default());
    assert_eq!(stored(&repo, &done).quadrant, Quadrant::Q2);
}

#[test]
fn failed_write_leaves_every_task_untouched() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let policy = UrgencyPolicy::default();

    let first = Task::new("first", true, Some(NOW + 2 * DAY_MS), &policy, NOW);
    let second = Task::new("second", false, Some(NOW + 2 * DAY_MS), &policy, NOW);
    repo.create_task(&first).unwrap();
    repo.create_task(&second).unwrap();

    conn.execute_batch(
        "CREATE TRIGGER freeze_tasks BEFORE UPDATE ON tasks
         BEGIN SELECT RAISE(ABORT, 'simulated store failure'); END;",
    )
    .unwrap();

    let err = RecalcJob::new(SqliteTaskRepository::new(&conn))
        .run_tick(NOW + 2 * DAY_MS)
        .unwrap_err();
    assert!(matches!(err, JobError::Store(_)));
    assert!(!err.is_transient());

    assert_eq!(stored(&repo, &first), first);
    assert_eq!(stored(&repo, &second), second);
}

#[test]
fn scheduler_thread_reclassifies_stale_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tasks.sqlite3");
    let policy = UrgencyPolicy::default();

    let created_at = now_epoch_ms() - 10 * DAY_MS;
    let stale = Task::new("stale", false, Some(created_at + 5 * DAY_MS), &policy, created_at);
    assert_eq!(stale.quadrant, Quadrant::Q4);
    {
        let conn = open_db(&db_path).unwrap();
        SqliteTaskRepository::new(&conn).create_task(&stale).unwrap();
    }

    let scheduler = RecalcScheduler::start(SchedulerConfig {
        db_path: db_path.clone(),
        store: StoreOptions::default(),
        policy,
        schedule: Schedule::Interval { secs: 1 },
        poll_interval: Duration::from_millis(20),
    })
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while scheduler.status().ticks_attempted == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let status = scheduler.status();
    assert!(status.ticks_attempted >= 1);
    assert!(status.last_error.is_none());
    assert!(status.last_run.is_some());

    // Manual run shares the tick lock and finds nothing left to change.
    let manual = scheduler.run_now().unwrap();
    assert_eq!(manual.updated, 0);
    assert_eq!(manual.inspected, 1);
    scheduler.stop();

    let conn = open_db(&db_path).unwrap();
    let reloaded = SqliteTaskRepository::new(&conn)
        .get_task(stale.id)
        .unwrap()
        .unwrap();
    assert!(reloaded.is_urgent);
    assert_eq!(reloaded.quadrant, Quadrant::Q3);
    assert_eq!(reloaded.title, stale.title);
    assert_eq!(reloaded.deadline_at, stale.deadline_at);
}

#[test]
fn scheduler_records_open_failures_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("missing").join("tasks.sqlite3");

    let scheduler = RecalcScheduler::start(SchedulerConfig {
        db_path,
        store: StoreOptions::default(),
        policy: UrgencyPolicy::default(),
        schedule: Schedule::Interval { secs: 1 },
        poll_interval: Duration::from_millis(20),
    })
    .unwrap();

    let err = scheduler.run_now().unwrap_err();
    assert!(matches!(err, JobError::Open(_)));

    let status = scheduler.status();
    assert!(status.ticks_attempted >= 1);
    assert!(status.last_run.is_some());
    assert!(status.last_error.is_some());
    assert!(status.last_summary.is_none());
    scheduler.stop();
}

#[test]
fn stale_quadrant_row_is_repaired_and_broken_row_is_skipped() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let policy = UrgencyPolicy::default();

    let valid = Task::new("valid", true, Some(NOW + 2 * DAY_MS), &policy, NOW);
    repo.create_task(&valid).unwrap();
    assert_eq!(valid.quadrant, Quadrant::Q2);
    let mislabeled = insert_raw(&conn, "Q1", None);
    let stamped_open = insert_raw(&conn, "Q4", Some(NOW));

    let job = RecalcJob::new(SqliteTaskRepository::new(&conn));
    let later = NOW + 2 * DAY_MS;
    assert_eq!(
        job.run_tick(later).unwrap(),
        TickSummary {
            inspected: 2,
            updated: 2,
            skipped: 1,
        }
    );
    assert_eq!(stored(&repo, &valid).quadrant, Quadrant::Q1);
    let repaired = repo.get_task(mislabeled).unwrap().unwrap();
    assert_eq!(repaired.quadrant, Quadrant::Q4);

    let second = job.run_tick(later).unwrap();
    assert_eq!((second.updated, second.skipped), (0, 1));
    assert!(repo.get_task(stamped_open).is_err());
}

#[test]
fn failed_tick_consumes_its_schedule_slot() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("missing").join("tasks.sqlite3");

    let scheduler =
        RecalcScheduler::start(scheduler_config(&db_path, Schedule::Interval { secs: 3_600 }))
            .unwrap();
    wait_for_ticks(&scheduler, 1);
    std::thread::sleep(Duration::from_millis(150));

    let status = scheduler.status();
    assert_eq!(status.ticks_attempted, 1);
    assert!(status.last_run.is_some());
    assert!(status.last_error.is_some());
    scheduler.stop();
}

#[test]
fn concurrent_manual_runs_never_overlap_with_scheduled_tick() {
    const STALE_TASKS: u64 = 20;
    const MANUAL_RUNS: u64 = 4;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tasks.sqlite3");
    let policy = UrgencyPolicy::default();
    let created_at = now_epoch_ms() - 10 * DAY_MS;
    {
        let conn = open_db(&db_path).unwrap();
        let repo = SqliteTaskRepository::new(&conn);
        for index in 0..STALE_TASKS {
            let deadline = created_at + 5 * DAY_MS;
            let title = format!("stale {index}");
            let task = Task::new(title, false, Some(deadline), &policy, created_at);
            repo.create_task(&task).unwrap();
        }
    }

    let scheduler =
        RecalcScheduler::start(scheduler_config(&db_path, Schedule::Interval { secs: 3_600 }))
            .unwrap();
    let manual_updated: u64 = std::thread::scope(|scope| {
        let runs: Vec<_> = (0..MANUAL_RUNS)
            .map(|_| scope.spawn(|| scheduler.run_now().unwrap()))
            .collect();
        runs.into_iter()
            .map(|run| run.join().unwrap().updated as u64)
            .sum()
    });

    // Let a scheduled tick that was already waiting on the lock finish.
    let mut ticks = scheduler.status().ticks_attempted;
    loop {
        std::thread::sleep(Duration::from_millis(100));
        let current = scheduler.status().ticks_attempted;
        if current == ticks {
            break;
        }
        ticks = current;
    }

    let status = scheduler.status();
    let scheduled_ticks = status.ticks_attempted - MANUAL_RUNS;
    assert!(scheduled_ticks <= 1, "unexpected scheduled ticks: {scheduled_ticks}");
    assert!(status.last_error.is_none());
    assert_eq!(status.tasks_updated, STALE_TASKS);
    assert!(manual_updated <= STALE_TASKS);
    if scheduled_ticks == 0 {
        assert_eq!(manual_updated, STALE_TASKS);
    }
    scheduler.stop();
}
