use rusqlite::Connection;
use std::collections::HashSet;
use taskmatrix_core::db::open_db_in_memory;
use taskmatrix_core::repo::task_repo::TaskOrder;
use taskmatrix_core::{
    AccessScope, ClassificationUpdate, Quadrant, RepoError, Role, SqliteTaskRepository,
    SqliteUserRepository, Task, TaskListQuery, TaskRepository, UrgencyPolicy, User,
    UserRepository,
};

const NOW: i64 = 1_760_000_000_000;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn seed_user(conn: &Connection, nickname: &str, role: Role) -> User {
    let user = User::new(nickname, role).unwrap();
    SqliteUserRepository::new(conn).create_user(&user).unwrap();
    user
}

fn owned_task(owner: &User, title: &str, important: bool, deadline: Option<i64>) -> Task {
    let mut task = Task::new(title, important, deadline, &UrgencyPolicy::default(), NOW);
    task.owner_id = Some(owner.id);
    task
}

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let owner = seed_user(&conn, "alice", Role::User);

    let mut task = owned_task(&owner, "write report", true, Some(NOW - DAY_MS));
    task.description = Some("quarterly numbers".to_string());
    let id = repo.create_task(&task).unwrap();

    let loaded = repo.get_task(id).unwrap().unwrap();
    assert_eq!(loaded, task);
    assert_eq!(loaded.quadrant, Quadrant::Q1);
    assert!(loaded.is_urgent);
}

#[test]
fn update_not_found_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);

    let task = Task::new("missing", false, None, &UrgencyPolicy::default(), NOW);
    let err = repo.update_task(&task).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == task.id));
}

#[test]
fn validation_failure_blocks_create_and_update() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);

    let mut forged = Task::new("forged", false, None, &UrgencyPolicy::default(), NOW);
    forged.quadrant = Quadrant::Q1;
    let create_err = repo.create_task(&forged).unwrap_err();
    assert!(matches!(create_err, RepoError::Validation(_)));

    let mut valid = Task::new("valid", false, None, &UrgencyPolicy::default(), NOW);
    repo.create_task(&valid).unwrap();
    valid.title = " ".to_string();
    let update_err = repo.update_task(&valid).unwrap_err();
    assert!(matches!(update_err, RepoError::Validation(_)));
}

#[test]
fn user_scope_lists_only_owned_tasks() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let alice = seed_user(&conn, "alice", Role::User);
    let bob = seed_user(&conn, "bob", Role::User);

    repo.create_task(&owned_task(&alice, "a1", true, None)).unwrap();
    repo.create_task(&owned_task(&alice, "a2", false, None)).unwrap();
    repo.create_task(&owned_task(&bob, "b1", true, None)).unwrap();
    repo.create_task(&Task::new("orphan", false, None, &UrgencyPolicy::default(), NOW))
        .unwrap();

    let scoped = repo
        .list_tasks(&TaskListQuery::scoped(AccessScope::resolve(Role::User, alice.id)))
        .unwrap();
    assert_eq!(scoped.len(), 2);
    assert!(scoped.iter().all(|task| task.owner_id == Some(alice.id)));

    let all = repo
        .list_tasks(&TaskListQuery::scoped(AccessScope::resolve(Role::Admin, bob.id)))
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[test]
fn list_filters_by_quadrant_status_and_deadline_window() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let owner = seed_user(&conn, "carol", Role::User);

    let urgent = owned_task(&owner, "urgent", true, Some(NOW + DAY_MS / 2));
    let later = owned_task(&owner, "later", true, Some(NOW + 5 * DAY_MS));
    let mut done = owned_task(&owner, "done", false, Some(NOW + DAY_MS / 4));
    done.complete(NOW);
    for task in [&urgent, &later, &done] {
        repo.create_task(task).unwrap();
    }

    let q1 = TaskListQuery {
        quadrant: Some(Quadrant::Q1),
        ..TaskListQuery::scoped(AccessScope::All)
    };
    let q1_ids: Vec<_> = repo.list_tasks(&q1).unwrap().into_iter().map(|t| t.id).collect();
    assert_eq!(q1_ids, vec![urgent.id]);

    let pending_window = TaskListQuery {
        completed: Some(false),
        deadline_between: Some((NOW, NOW + DAY_MS)),
        order: TaskOrder::DeadlineAsc,
        ..TaskListQuery::scoped(AccessScope::All)
    };
    let hits = repo.list_tasks(&pending_window).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, urgent.id);
}

#[test]
fn list_supports_limit_and_offset() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);

    for index in 0..5 {
        let task = Task::new(
            format!("task {index}"),
            false,
            None,
            &UrgencyPolicy::default(),
            NOW + index,
        );
        repo.create_task(&task).unwrap();
    }

    let page = TaskListQuery {
        limit: Some(2),
        offset: 1,
        ..TaskListQuery::scoped(AccessScope::All)
    };
    let titles: Vec<_> = repo
        .list_tasks(&page)
        .unwrap()
        .into_iter()
        .map(|task| task.title)
        .collect();
    assert_eq!(titles, vec!["task 3", "task 2"]);
}

#[test]
fn search_is_case_insensitive_and_scoped() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let alice = seed_user(&conn, "alice", Role::User);
    let bob = seed_user(&conn, "bob", Role::User);

    let mut described = owned_task(&alice, "Read docs", false, None);
    described.description = Some("Study the SQLite manual".to_string());
    repo.create_task(&described).unwrap();
    repo.create_task(&owned_task(&alice, "Лекция по SQLite", true, None))
        .unwrap();
    repo.create_task(&owned_task(&bob, "sqlite tuning", true, None))
        .unwrap();

    let mine = repo
        .search_tasks(AccessScope::Owner(alice.id), "sqlite")
        .unwrap();
    assert_eq!(mine.len(), 2);

    let cyrillic = repo.search_tasks(AccessScope::All, "ЛЕКЦИЯ").unwrap();
    assert_eq!(cyrillic.len(), 1);

    assert!(repo.search_tasks(AccessScope::All, "   ").unwrap().is_empty());
}

#[test]
fn delete_removes_row_and_reports_missing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);

    let task = Task::new("temp", false, None, &UrgencyPolicy::default(), NOW);
    repo.create_task(&task).unwrap();
    repo.delete_task(task.id).unwrap();

    assert!(repo.get_task(task.id).unwrap().is_none());
    let err = repo.delete_task(task.id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn deleting_user_cascades_to_owned_tasks() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let users = SqliteUserRepository::new(&conn);
    let owner = seed_user(&conn, "dave", Role::User);

    let task = owned_task(&owner, "owned", false, None);
    repo.create_task(&task).unwrap();
    users.delete_user(owner.id).unwrap();

    assert!(repo.get_task(task.id).unwrap().is_none());
}

#[test]
fn duplicate_nickname_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let users = SqliteUserRepository::new(&conn);
    seed_user(&conn, "erin", Role::Admin);

    let twin = User::new("erin", Role::User).unwrap();
    let err = users.create_user(&twin).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    let found = users.find_by_nickname("erin").unwrap().unwrap();
    assert_eq!(found.role, Role::Admin);
}

#[test]
fn list_open_tasks_excludes_completed_and_ignores_owner() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let owner = seed_user(&conn, "frank", Role::User);

    let open = owned_task(&owner, "open", false, None);
    let orphan = Task::new("orphan", false, None, &UrgencyPolicy::default(), NOW);
    let mut done = owned_task(&owner, "done", false, None);
    done.complete(NOW);
    for task in [&open, &orphan, &done] {
        repo.create_task(task).unwrap();
    }

    let open_tasks = repo.list_open_tasks().unwrap();
    assert_eq!(open_tasks.skipped, 0);
    let ids: HashSet<_> = open_tasks
        .tasks
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(ids, HashSet::from([open.id, orphan.id]));
}

#[test]
fn classification_batch_is_all_or_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);

    let policy = UrgencyPolicy::default();
    let mut first = Task::new("first", true, Some(NOW + 3 * DAY_MS), &policy, NOW);
    let mut second = Task::new("second", false, Some(NOW + 3 * DAY_MS), &policy, NOW);
    repo.create_task(&first).unwrap();
    repo.create_task(&second).unwrap();

    conn.execute_batch(&format!(
        "CREATE TRIGGER reject_second BEFORE UPDATE OF quadrant ON tasks
         WHEN NEW.uuid = '{}'
         BEGIN SELECT RAISE(ABORT, 'simulated store failure'); END;",
        second.id
    ))
    .unwrap();

    let later = NOW + 3 * DAY_MS;
    assert!(first.reclassify(&policy, later));
    assert!(second.reclassify(&policy, later));
    let updates = [
        ClassificationUpdate::from_task(&first),
        ClassificationUpdate::from_task(&second),
    ];

    assert!(repo.apply_classification(&updates).is_err());
    let stored_first = repo.get_task(first.id).unwrap().unwrap();
    assert_eq!(stored_first.quadrant, Quadrant::Q2);
    assert!(!stored_first.is_urgent);

    conn.execute_batch("DROP TRIGGER reject_second;").unwrap();
    assert_eq!(repo.apply_classification(&updates).unwrap(), 2);
    assert_eq!(
        repo.get_task(second.id).unwrap().unwrap().quadrant,
        Quadrant::Q3
    );
}

#[test]
fn classification_skips_rows_whose_importance_changed() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(&conn);
    let policy = UrgencyPolicy::default();

    let mut task = Task::new("race", false, Some(NOW + 3 * DAY_MS), &policy, NOW);
    repo.create_task(&task).unwrap();

    let mut edited = task.clone();
    edited.is_important = true;
    edited.reclassify(&policy, NOW);
    repo.update_task(&edited).unwrap();

    task.reclassify(&policy, NOW + 3 * DAY_MS);
    let changed = repo
        .apply_classification(&[ClassificationUpdate::from_task(&task)])
        .unwrap();
    assert_eq!(changed, 0);
    assert_eq!(repo.get_task(task.id).unwrap().unwrap().quadrant, Quadrant::Q2);
}
