//! Integration tests for the shared task table.

mod common;

use common::{T0, setup_db};
use sprint_scheduler::db::Database;
use sprint_scheduler::types::{ObjectKind, TaskKind};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

mod claim_tests {
    use super::*;

    #[test]
    fn a_task_can_only_be_claimed_once() {
        let db = setup_db();
        let id = db.schedule_task(TaskKind::SprintEnd, T0, Some(1)).unwrap();

        assert!(db.try_claim(id).unwrap());
        assert!(!db.try_claim(id).unwrap());
        assert!(db.claim_due(T0).unwrap().is_empty());
    }

    #[test]
    fn zero_due_time_is_never_claimed() {
        let db = setup_db();
        db.schedule_task(TaskKind::SprintEnd, 0, Some(1)).unwrap();
        let due = db.schedule_task(TaskKind::SprintEnd, T0, Some(2)).unwrap();

        let claimed = db.claim_due(T0 + 10_000).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, due);
        assert!(claimed[0].processing);
    }

    #[test]
    fn future_tasks_are_not_due() {
        let db = setup_db();
        db.schedule_task(TaskKind::SprintStart, T0 + 60, Some(1)).unwrap();

        assert!(db.claim_due(T0).unwrap().is_empty());
        assert_eq!(db.claim_due(T0 + 60).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_shards_never_claim_the_same_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let first = Arc::new(Database::open(&path).unwrap());
        let second = Arc::new(Database::open(&path).unwrap());

        let mut ids = HashSet::new();
        for i in 0..50 {
            ids.insert(first.schedule_task(TaskKind::SprintEnd, T0, Some(i)).unwrap());
        }

        let handles: Vec<_> = [first, second]
            .into_iter()
            .map(|db| thread::spawn(move || db.claim_due(T0).unwrap()))
            .collect();

        let mut claimed = Vec::new();
        for handle in handles {
            claimed.extend(handle.join().unwrap().into_iter().map(|t| t.id));
        }

        let unique: HashSet<_> = claimed.iter().copied().collect();
        assert_eq!(claimed.len(), unique.len(), "a task was claimed twice");
        assert_eq!(unique, ids);
    }
}

mod sweep_tests {
    use super::*;

    #[test]
    fn stale_claims_are_released() {
        let db = setup_db();
        let id = db.schedule_task(TaskKind::SprintEnd, T0, Some(1)).unwrap();
        assert!(db.try_claim(id).unwrap());

        let released = db.sweep_stale(T0 + 7_200, 3_600).unwrap();
        assert_eq!(released, 1);
        assert!(!db.get_task(id).unwrap().unwrap().processing);
    }

    #[test]
    fn fresh_claims_are_left_alone() {
        let db = setup_db();
        let id = db.schedule_task(TaskKind::SprintEnd, T0, Some(1)).unwrap();
        assert!(db.try_claim(id).unwrap());

        assert_eq!(db.sweep_stale(T0 + 60, 3_600).unwrap(), 0);
        assert!(db.get_task(id).unwrap().unwrap().processing);
    }

    #[test]
    fn unclaimed_and_zero_due_rows_are_untouched() {
        let db = setup_db();
        let zero = db.schedule_task(TaskKind::SprintEnd, 0, Some(1)).unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE tasks SET processing = 1 WHERE id = ?1", [zero])?;
            Ok(())
        })
        .unwrap();
        db.schedule_task(TaskKind::SprintEnd, T0, Some(2)).unwrap();

        assert_eq!(db.sweep_stale(T0 + 100_000, 3_600).unwrap(), 0);
        assert!(db.get_task(zero).unwrap().unwrap().processing);
    }

    #[test]
    fn release_all_claims_clears_everything() {
        let db = setup_db();
        let a = db.schedule_task(TaskKind::SprintEnd, T0, Some(1)).unwrap();
        let b = db.schedule_task(TaskKind::SprintStart, T0, Some(2)).unwrap();
        db.try_claim(a).unwrap();
        db.try_claim(b).unwrap();

        assert_eq!(db.release_all_claims().unwrap(), 2);
        assert_eq!(db.claim_due(T0).unwrap().len(), 2);
    }
}

mod recurring_tests {
    use super::*;

    #[test]
    fn replace_recurring_keeps_a_single_row() {
        let db = setup_db();
        db.schedule_recurring(TaskKind::GoalReset, T0, 900).unwrap();
        db.schedule_recurring(TaskKind::GoalReset, T0, 900).unwrap();
        db.schedule_recurring(TaskKind::ReminderSend, T0, 30).unwrap();

        let id = db.replace_recurring(TaskKind::GoalReset, T0 + 5, 900).unwrap();

        let goal_rows: Vec<_> = db
            .list_tasks()
            .unwrap()
            .into_iter()
            .filter(|t| t.kind() == Some(TaskKind::GoalReset))
            .collect();
        assert_eq!(goal_rows.len(), 1);
        assert_eq!(goal_rows[0].id, id);
        assert_eq!(goal_rows[0].due_time, T0 + 5);
        assert_eq!(goal_rows[0].run_every_seconds, Some(900));
        assert!(goal_rows[0].recurring);
        assert_eq!(db.list_tasks().unwrap().len(), 2);
    }

    #[test]
    fn delete_all_removes_only_that_kind() {
        let db = setup_db();
        db.schedule_recurring(TaskKind::GoalReset, T0, 900).unwrap();
        db.schedule_recurring(TaskKind::GoalReset, T0, 900).unwrap();
        db.schedule_recurring(TaskKind::ReminderSend, T0, 30).unwrap();

        assert_eq!(db.delete_all(TaskKind::GoalReset).unwrap(), 2);
        let left = db.list_tasks().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].kind(), Some(TaskKind::ReminderSend));
    }

    #[test]
    fn reschedule_moves_due_time_and_releases() {
        let db = setup_db();
        let id = db.schedule_recurring(TaskKind::ReminderSend, T0, 30).unwrap();
        let task = db.claim_due(T0).unwrap().remove(0);

        db.reschedule(&task, T0 + 30).unwrap();

        let task = db.get_task(id).unwrap().unwrap();
        assert_eq!(task.due_time, T0 + 30);
        assert!(!task.processing);
    }
}

mod reference_tests {
    use super::*;

    #[test]
    fn delete_by_reference_only_touches_that_object() {
        let db = setup_db();
        db.schedule_task(TaskKind::SprintStart, T0, Some(7)).unwrap();
        db.schedule_task(TaskKind::SprintEnd, T0 + 60, Some(7)).unwrap();
        let other = db.schedule_task(TaskKind::SprintEnd, T0, Some(8)).unwrap();

        assert_eq!(db.delete_by_reference(ObjectKind::Sprint, 7).unwrap(), 2);
        assert!(db.pending_tasks_for(ObjectKind::Sprint, 7).unwrap().is_empty());
        assert!(db.get_task(other).unwrap().is_some());
    }
}
