//! Integration tests for the task scheduler tick.

mod common;

use common::{CHANNEL, GUILD, RecordingNotifier, T0, invocation, scheduler, setup_db};
use sprint_scheduler::scheduler::RECURRING_TASKS;
use sprint_scheduler::types::{GoalKind, ObjectKind, TaskKind};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::test]
async fn bootstrap_inserts_recurring_tasks_once() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);

    scheduler.bootstrap(T0).unwrap();
    scheduler.bootstrap(T0 + 10).unwrap();

    let tasks = db.list_tasks().unwrap();
    assert_eq!(tasks.len(), RECURRING_TASKS.len());
    assert!(tasks.iter().all(|t| t.recurring && t.due_time == T0 + 10));
}

#[tokio::test]
async fn bootstrap_releases_leftover_claims() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let id = db.schedule_task(TaskKind::SprintEnd, T0, Some(1)).unwrap();
    db.try_claim(id).unwrap();

    scheduler(&db, &notifier).bootstrap(T0).unwrap();

    assert!(!db.get_task(id).unwrap().unwrap().processing);
}

#[tokio::test]
async fn recurring_tasks_are_rescheduled_and_released() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);
    scheduler.bootstrap(T0).unwrap();

    let report = scheduler.tick(T0).await.unwrap();
    assert_eq!(report.claimed, 2);
    assert_eq!(report.succeeded, 2);

    for task in db.list_tasks().unwrap() {
        let every = task.run_every_seconds.unwrap();
        assert_eq!(task.due_time, T0 + every, "{}", task.object);
        assert!(!task.processing);
    }
}

#[tokio::test]
async fn one_shot_tasks_are_deleted_after_success() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);
    // A start task for a sprint that no longer exists is a successful no-op.
    db.schedule_task(TaskKind::SprintStart, T0, Some(999)).unwrap();

    let report = scheduler.tick(T0).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(db.list_tasks().unwrap().is_empty());
}

#[tokio::test]
async fn failing_task_stays_claimed_and_others_still_run() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);
    let broken = db.schedule_task(TaskKind::SprintEnd, T0, None).unwrap();
    db.schedule_task(TaskKind::SprintComplete, T0, Some(999)).unwrap();

    let report = scheduler.tick(T0).await.unwrap();
    assert_eq!(report.claimed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);

    let remaining = db.list_tasks().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, broken);
    assert!(remaining[0].processing);

    // Nothing more to claim until the stale sweep releases it.
    assert_eq!(scheduler.tick(T0 + 1).await.unwrap().claimed, 0);
    assert_eq!(scheduler.sweep(T0 + 7_200).unwrap(), 1);
}

#[tokio::test]
async fn unknown_task_types_are_counted_and_left_claimed() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tasks (object, type, reference_id, due_time) VALUES ('poll', 'close', 3, ?1)",
            [T0],
        )?;
        Ok(())
    })
    .unwrap();

    let report = scheduler.tick(T0).await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.unknown, 1);
    assert_eq!(report.succeeded, 0);
    assert!(db.list_tasks().unwrap()[0].processing);
}

#[tokio::test]
async fn sprint_runs_end_to_end_through_ticks() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);
    let lifecycle = scheduler.lifecycle();

    let sprint = lifecycle
        .create(&invocation(1), Some(10), Some(5), T0)
        .await
        .unwrap();
    assert_eq!(sprint.start_time, T0 + 300);

    // Start fires and schedules the end.
    scheduler.tick(sprint.start_time).await.unwrap();
    let pending = db.pending_tasks_for(ObjectKind::Sprint, sprint.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind(), Some(TaskKind::SprintEnd));
    assert_eq!(pending[0].due_time, sprint.end_time);

    // End fires and schedules completion after the grace window.
    scheduler.tick(sprint.end_time).await.unwrap();
    let pending = db.pending_tasks_for(ObjectKind::Sprint, sprint.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind(), Some(TaskKind::SprintComplete));
    assert_eq!(pending[0].due_time, sprint.end_time + 120);

    scheduler.tick(sprint.end_time + 120).await.unwrap();
    assert!(db.pending_tasks_for(ObjectKind::Sprint, sprint.id).unwrap().is_empty());
    let stored = db.get_sprint(sprint.id).unwrap().unwrap();
    assert_eq!(stored.completed_at, sprint.end_time + 120);
    assert!(db.active_sprint(GUILD).unwrap().is_none());
    assert_eq!(notifier.count_containing("no results"), 1);
}

#[tokio::test]
async fn goal_reset_runs_from_the_recurring_task() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);
    db.set_goal(1, GoalKind::Daily, 500, T0 - 1).unwrap();
    db.add_goal_progress(1, GoalKind::Daily, 200).unwrap();

    scheduler.bootstrap(T0).unwrap();
    scheduler.tick(T0).await.unwrap();

    let goal = db.get_goal(1, GoalKind::Daily).unwrap().unwrap();
    assert_eq!(goal.current, 0);
    assert!(goal.reset > T0);
    assert_eq!(db.goal_history(1, GoalKind::Daily).unwrap().len(), 1);
}

#[tokio::test]
async fn reminders_are_delivered_from_the_recurring_task() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, &notifier);
    db.create_reminder(7, GUILD, CHANNEL, "drink water", T0 - 5, None)
        .unwrap();

    scheduler.bootstrap(T0).unwrap();
    scheduler.tick(T0).await.unwrap();

    assert_eq!(notifier.count_containing("drink water"), 1);
    assert!(db.due_reminders(T0 + 1_000).unwrap().is_empty());
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = Arc::new(scheduler(&db, &notifier));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&scheduler).run(rx));
    tx.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
