//! Scheduled task storage and the atomic claim protocol.
//!
//! A task is claimed by flipping `processing` from 0 to 1 with a conditional
//! update. Whichever shard's update changes the row owns the task; every other
//! shard sees zero changed rows and skips it.

use super::Database;
use crate::types::{ObjectKind, Task, TaskId, TaskKind};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

const TASK_COLUMNS: &str =
    "id, object, type, reference_id, due_time, recurring, run_every_seconds, processing";

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        object: row.get("object")?,
        action: row.get("type")?,
        reference_id: row.get("reference_id")?,
        due_time: row.get("due_time")?,
        recurring: row.get::<_, i64>("recurring")? != 0,
        run_every_seconds: row.get("run_every_seconds")?,
        processing: row.get::<_, i64>("processing")? != 0,
    })
}

/// Delete every pending task tied to one object instance, using an existing
/// connection so callers can run it inside their own transaction.
pub(crate) fn delete_by_reference_internal(
    conn: &Connection,
    object: ObjectKind,
    reference_id: i64,
) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM tasks WHERE object = ?1 AND reference_id = ?2",
        params![object.as_str(), reference_id],
    )?;
    Ok(deleted)
}

impl Database {
    /// Schedule a one-shot task.
    pub fn schedule_task(
        &self,
        kind: TaskKind,
        due_time: i64,
        reference_id: Option<i64>,
    ) -> Result<TaskId> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (object, type, reference_id, due_time, recurring, processing)
                 VALUES (?1, ?2, ?3, ?4, 0, 0)",
                params![kind.object().as_str(), kind.action(), reference_id, due_time],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Schedule a recurring, unreferenced system task.
    pub fn schedule_recurring(
        &self,
        kind: TaskKind,
        due_time: i64,
        run_every_seconds: i64,
    ) -> Result<TaskId> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (object, type, reference_id, due_time, recurring, run_every_seconds, processing)
                 VALUES (?1, ?2, NULL, ?3, 1, ?4, 0)",
                params![
                    kind.object().as_str(),
                    kind.action(),
                    due_time,
                    run_every_seconds
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Replace every task of a recurring kind with a single fresh row.
    pub fn replace_recurring(
        &self,
        kind: TaskKind,
        due_time: i64,
        run_every_seconds: i64,
    ) -> Result<TaskId> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM tasks WHERE object = ?1 AND type = ?2",
                params![kind.object().as_str(), kind.action()],
            )?;
            tx.execute(
                "INSERT INTO tasks (object, type, reference_id, due_time, recurring, run_every_seconds, processing)
                 VALUES (?1, ?2, NULL, ?3, 1, ?4, 0)",
                params![
                    kind.object().as_str(),
                    kind.action(),
                    due_time,
                    run_every_seconds
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
    }

    /// Get a task by id.
    pub fn get_task(&self, task_id: TaskId) -> Result<Option<Task>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))?;
            let mut rows = stmt.query_map(params![task_id], parse_task_row)?;
            let task = rows.next().transpose()?;
            Ok(task)
        })
    }

    /// List every task row, soonest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks ORDER BY due_time, id",
                TASK_COLUMNS
            ))?;
            let tasks = stmt
                .query_map([], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Pending tasks attached to one object instance.
    pub fn pending_tasks_for(&self, object: ObjectKind, reference_id: i64) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE object = ?1 AND reference_id = ?2 ORDER BY due_time, id",
                TASK_COLUMNS
            ))?;
            let tasks = stmt
                .query_map(params![object.as_str(), reference_id], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Unclaimed tasks whose due time has arrived. `due_time = 0` is never due.
    pub fn due_candidates(&self, now: i64) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks
                 WHERE due_time != 0 AND due_time <= ?1 AND processing = 0
                 ORDER BY due_time, id",
                TASK_COLUMNS
            ))?;
            let tasks = stmt
                .query_map(params![now], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Try to take exclusive ownership of one task.
    ///
    /// Returns `false` when another claimant got there first (or the row is
    /// gone). That is a normal outcome under concurrent polling, not an error.
    pub fn try_claim(&self, task_id: TaskId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET processing = 1 WHERE id = ?1 AND processing = 0",
                params![task_id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Claim every task that is due, returning only the ones this caller won.
    pub fn claim_due(&self, now: i64) -> Result<Vec<Task>> {
        let mut claimed = Vec::new();
        for task in self.due_candidates(now)? {
            if self.try_claim(task.id)? {
                claimed.push(Task {
                    processing: true,
                    ..task
                });
            } else {
                tracing::debug!(task_id = task.id, "task claimed elsewhere, skipping");
            }
        }
        Ok(claimed)
    }

    /// Move a recurring task forward and release its claim.
    pub fn reschedule(&self, task: &Task, next_due_time: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET due_time = ?1, processing = 0 WHERE id = ?2",
                params![next_due_time, task.id],
            )?;
            Ok(())
        })
    }

    /// Delete one task row.
    pub fn delete_task(&self, task_id: TaskId) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            Ok(deleted > 0)
        })
    }

    /// Delete every task of one kind, e.g. before re-inserting a recurring task.
    pub fn delete_all(&self, kind: TaskKind) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM tasks WHERE object = ?1 AND type = ?2",
                params![kind.object().as_str(), kind.action()],
            )?;
            Ok(deleted)
        })
    }

    /// Cancel every pending task tied to one object instance.
    pub fn delete_by_reference(&self, object: ObjectKind, reference_id: i64) -> Result<usize> {
        self.with_conn(|conn| delete_by_reference_internal(conn, object, reference_id))
    }

    /// Release claims left behind by a crashed or killed claimant.
    ///
    /// Only rows with a non-zero due time older than `older_than_seconds` are
    /// touched; a fresh claim belongs to a handler that may still be running.
    pub fn sweep_stale(&self, now: i64, older_than_seconds: i64) -> Result<usize> {
        let cutoff = now - older_than_seconds;
        self.with_conn(|conn| {
            let released = conn.execute(
                "UPDATE tasks SET processing = 0
                 WHERE processing = 1 AND due_time != 0 AND due_time < ?1",
                params![cutoff],
            )?;
            Ok(released)
        })
    }

    /// Release every claim. Used at boot to recover from an unclean shutdown.
    pub fn release_all_claims(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let released = conn.execute("UPDATE tasks SET processing = 0 WHERE processing = 1", [])?;
            Ok(released)
        })
    }
}
