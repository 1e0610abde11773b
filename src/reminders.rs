//! Reminder delivery.

use crate::db::Database;
use crate::directory::mention;
use crate::notifier::{Notifier, Target, say_or_log};
use crate::types::Reminder;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Next due time for a repeating reminder, skipping any intervals missed
/// while no shard was running.
pub fn next_due(reminder: &Reminder, interval: i64, now: i64) -> i64 {
    let mut next = reminder.due_time + interval;
    if next <= now {
        let missed = (now - reminder.due_time) / interval;
        next = reminder.due_time + (missed + 1) * interval;
    }
    next
}

/// Sends reminders whose time has come.
#[derive(Clone)]
pub struct ReminderSweep {
    db: Arc<Database>,
    notifier: Arc<dyn Notifier>,
}

impl ReminderSweep {
    pub fn new(db: Arc<Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Deliver every due reminder. Returns how many were sent.
    pub async fn run(&self, now: i64) -> Result<usize> {
        let mut sent = 0;
        for reminder in self.db.due_reminders(now)? {
            // Update the row first so a failed send is not repeated forever.
            let owned = match reminder.interval_seconds {
                Some(interval) if interval > 0 => self
                    .db
                    .advance_reminder(&reminder, next_due(&reminder, interval, now))?,
                _ => self.db.delete_reminder(reminder.id)?,
            };
            if !owned {
                debug!(reminder_id = reminder.id, "reminder handled elsewhere");
                continue;
            }

            let text = format!("{}, you asked me to remind you: {}", mention(reminder.user_id), reminder.message);
            say_or_log(self.notifier.as_ref(), &Target::Channel(reminder.channel), &text).await;
            sent += 1;
        }
        Ok(sent)
    }
}
