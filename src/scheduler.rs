//! The task scheduler: claims due tasks from the shared store and runs them.
//!
//! Several shards may tick against the same database. Ownership of a task is
//! decided only by the conditional claim in [`Database::try_claim`]; every
//! handler re-checks its own guards, so a task that runs again after a crash
//! and a stale sweep does no harm.

use crate::config::SchedulerConfig;
use crate::db::{Database, now_secs};
use crate::goals::GoalResetHandler;
use crate::reminders::ReminderSweep;
use crate::sprint::SprintLifecycle;
use crate::types::{Task, TaskKind};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Recurring system tasks and their periods in seconds.
pub const RECURRING_TASKS: &[(TaskKind, i64)] = &[
    (TaskKind::GoalReset, 900),
    (TaskKind::ReminderSend, 30),
];

/// Outcome of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unknown: usize,
}

/// Claims and executes due tasks.
pub struct TaskScheduler {
    db: Arc<Database>,
    lifecycle: SprintLifecycle,
    goals: GoalResetHandler,
    reminders: ReminderSweep,
    config: SchedulerConfig,
    shard_id: u32,
}

impl TaskScheduler {
    pub fn new(
        db: Arc<Database>,
        lifecycle: SprintLifecycle,
        config: SchedulerConfig,
        shard_id: u32,
    ) -> Self {
        let goals = GoalResetHandler::new(Arc::clone(&db), lifecycle.directory().clone());
        let reminders = ReminderSweep::new(Arc::clone(&db), lifecycle.notifier());
        Self {
            db,
            lifecycle,
            goals,
            reminders,
            config,
            shard_id,
        }
    }

    pub fn lifecycle(&self) -> &SprintLifecycle {
        &self.lifecycle
    }

    /// Prepare the store for polling: optionally release leftover claims and
    /// (re)insert the recurring system tasks, due immediately.
    pub fn bootstrap(&self, now: i64) -> Result<()> {
        if self.config.release_claims_on_start {
            let released = self.db.release_all_claims()?;
            if released > 0 {
                warn!(shard = self.shard_id, released, "released claims left from a previous run");
            }
        }
        for (kind, every) in RECURRING_TASKS {
            self.db.replace_recurring(*kind, now, *every)?;
            debug!(shard = self.shard_id, task = %kind, every, "recurring task scheduled");
        }
        Ok(())
    }

    /// Claim every due task and run it. A failing task is logged and left
    /// claimed; it never stops the rest of the tick.
    pub async fn tick(&self, now: i64) -> Result<TickReport> {
        let claimed = self.db.claim_due(now)?;
        let mut report = TickReport {
            claimed: claimed.len(),
            ..TickReport::default()
        };
        if !claimed.is_empty() {
            debug!(shard = self.shard_id, count = claimed.len(), "claimed due tasks");
        }

        for task in claimed {
            let Some(kind) = task.kind() else {
                warn!(
                    shard = self.shard_id,
                    task_id = task.id,
                    object = %task.object,
                    action = %task.action,
                    "unknown task type, leaving it claimed"
                );
                report.unknown += 1;
                continue;
            };

            match self.dispatch(&task, kind, now).await {
                Ok(()) => match self.finish(&task, now) {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        error!(shard = self.shard_id, task_id = task.id, task = %kind, error = %e, "failed to release task");
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    error!(shard = self.shard_id, task_id = task.id, task = %kind, error = %e, "task failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn dispatch(&self, task: &Task, kind: TaskKind, now: i64) -> Result<()> {
        match kind {
            TaskKind::SprintStart => {
                self.lifecycle
                    .task_start(sprint_reference(task)?, now)
                    .await
            }
            TaskKind::SprintEnd => self.lifecycle.task_end(sprint_reference(task)?, now).await,
            TaskKind::SprintComplete => {
                self.lifecycle
                    .task_complete(sprint_reference(task)?, now)
                    .await
            }
            TaskKind::GoalReset => {
                let reset = self.goals.run(now)?;
                if reset > 0 {
                    info!(shard = self.shard_id, reset, "goals reset");
                }
                Ok(())
            }
            TaskKind::ReminderSend => {
                let sent = self.reminders.run(now).await?;
                if sent > 0 {
                    debug!(shard = self.shard_id, sent, "reminders sent");
                }
                Ok(())
            }
        }
    }

    /// Reschedule a recurring task or delete a one-shot one.
    fn finish(&self, task: &Task, now: i64) -> Result<()> {
        match task.run_every_seconds.filter(|every| *every > 0) {
            Some(every) if task.recurring => self.db.reschedule(task, now + every),
            _ => {
                if task.recurring {
                    warn!(task_id = task.id, "recurring task without a period, deleting");
                }
                self.db.delete_task(task.id).map(|_| ())
            }
        }
    }

    /// Release claims abandoned by crashed shards.
    pub fn sweep(&self, now: i64) -> Result<usize> {
        let released = self
            .db
            .sweep_stale(now, self.config.stale_after_seconds)?;
        if released > 0 {
            warn!(shard = self.shard_id, released, "released stale task claims");
        }
        Ok(released)
    }

    /// Poll until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            shard = self.shard_id,
            poll = self.config.poll_interval_seconds,
            "scheduler started"
        );

        let mut poll = tokio::time::interval(Duration::from_secs(
            self.config.poll_interval_seconds.max(1),
        ));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = tokio::time::interval(Duration::from_secs(
            self.config.sweep_interval_seconds.max(1),
        ));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.tick(now_secs()).await {
                        Ok(report) if report.claimed > 0 => {
                            debug!(shard = self.shard_id, ?report, "tick finished");
                        }
                        Ok(_) => {}
                        Err(e) => error!(shard = self.shard_id, error = %e, "scheduler tick error"),
                    }
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep(now_secs()) {
                        error!(shard = self.shard_id, error = %e, "stale sweep error");
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender also means shut down.
                    if changed.is_err() || *shutdown.borrow() {
                        info!(shard = self.shard_id, "scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }
}

fn sprint_reference(task: &Task) -> Result<i64> {
    task.reference_id
        .with_context(|| format!("sprint task {} has no reference id", task.id))
}
