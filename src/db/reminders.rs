//! Reminder storage.

use super::Database;
use crate::types::{ChannelId, GuildId, Reminder, UserId};
use anyhow::Result;
use rusqlite::{Row, params};

fn parse_reminder_row(row: &Row) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        guild: row.get("guild")?,
        channel: row.get("channel")?,
        message: row.get("message")?,
        due_time: row.get("due_time")?,
        interval_seconds: row.get("interval_seconds")?,
    })
}

impl Database {
    pub fn create_reminder(
        &self,
        user_id: UserId,
        guild: GuildId,
        channel: ChannelId,
        message: &str,
        due_time: i64,
        interval_seconds: Option<i64>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reminders (user_id, guild, channel, message, due_time, interval_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user_id, guild, channel, message, due_time, interval_seconds],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Reminders due at or before `now`, oldest first.
    pub fn due_reminders(&self, now: i64) -> Result<Vec<Reminder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, guild, channel, message, due_time, interval_seconds
                 FROM reminders WHERE due_time <= ?1 ORDER BY due_time, id",
            )?;
            let reminders = stmt
                .query_map(params![now], parse_reminder_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(reminders)
        })
    }

    /// Move a repeating reminder to its next due time. Guarded on the old due
    /// time so two shards cannot both advance it.
    pub fn advance_reminder(&self, reminder: &Reminder, next_due_time: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE reminders SET due_time = ?1 WHERE id = ?2 AND due_time = ?3",
                params![next_due_time, reminder.id, reminder.due_time],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn delete_reminder(&self, reminder_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM reminders WHERE id = ?1", params![reminder_id])?;
            Ok(deleted > 0)
        })
    }
}
