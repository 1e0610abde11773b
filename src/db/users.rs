//! Per-user directory data: XP, stats, records, settings and goals.

use super::Database;
use crate::types::{Goal, GoalKind, GuildId, UserId};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

const GOAL_COLUMNS: &str = "id, user_id, type, goal, current, completed, reset";

fn parse_goal_row(row: &Row) -> rusqlite::Result<Option<Goal>> {
    let kind: String = row.get("type")?;
    let Some(kind) = GoalKind::from_str(&kind) else {
        return Ok(None);
    };
    Ok(Some(Goal {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        kind,
        goal: row.get("goal")?,
        current: row.get("current")?,
        completed: row.get::<_, i64>("completed")? != 0,
        reset: row.get("reset")?,
    }))
}

/// One archived goal period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalHistoryEntry {
    pub user_id: UserId,
    pub kind: GoalKind,
    pub date: String,
    pub goal: i64,
    pub result: i64,
    pub completed: bool,
}

impl Database {
    // XP

    /// Total XP for a user; `0` when no row exists.
    pub fn get_xp(&self, user_id: UserId) -> Result<i64> {
        self.with_conn(|conn| {
            let xp = conn
                .query_row(
                    "SELECT xp FROM user_xp WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(xp.unwrap_or(0))
        })
    }

    /// Add XP in one statement and return the new total.
    pub fn add_xp(&self, user_id: UserId, amount: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let xp = conn.query_row(
                "INSERT INTO user_xp (user_id, xp) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET xp = xp + excluded.xp
                 RETURNING xp",
                params![user_id, amount],
                |row| row.get(0),
            )?;
            Ok(xp)
        })
    }

    // Stats

    pub fn get_stat(&self, user_id: UserId, name: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM user_stats WHERE user_id = ?1 AND name = ?2",
                    params![user_id, name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    /// Add `amount` (may be negative) to a stat, creating it at `amount`.
    pub fn add_stat(&self, user_id: UserId, name: &str, amount: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_stats (user_id, name, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, name) DO UPDATE SET value = value + excluded.value",
                params![user_id, name, amount],
            )?;
            let value = conn.query_row(
                "SELECT value FROM user_stats WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                |row| row.get(0),
            )?;
            Ok(value)
        })
    }

    // Records

    pub fn get_record(&self, user_id: UserId, record: &str) -> Result<Option<f64>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM user_records WHERE user_id = ?1 AND record = ?2",
                    params![user_id, record],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_record(&self, user_id: UserId, record: &str, value: f64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_records (user_id, record, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, record) DO UPDATE SET value = excluded.value",
                params![user_id, record, value],
            )?;
            Ok(())
        })
    }

    pub fn delete_record(&self, user_id: UserId, record: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM user_records WHERE user_id = ?1 AND record = ?2",
                params![user_id, record],
            )?;
            Ok(deleted > 0)
        })
    }

    // Settings. `guild = None` addresses the global (unscoped) setting.

    pub fn get_user_setting(
        &self,
        user_id: UserId,
        guild: Option<GuildId>,
        setting: &str,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM user_settings
                     WHERE user_id = ?1 AND guild = ?2 AND setting = ?3",
                    params![user_id, guild.unwrap_or(0), setting],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_user_setting(
        &self,
        user_id: UserId,
        guild: Option<GuildId>,
        setting: &str,
        value: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_settings (user_id, guild, setting, value) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, guild, setting) DO UPDATE SET value = excluded.value",
                params![user_id, guild.unwrap_or(0), setting, value],
            )?;
            Ok(())
        })
    }

    pub fn delete_user_setting(
        &self,
        user_id: UserId,
        guild: Option<GuildId>,
        setting: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM user_settings WHERE user_id = ?1 AND guild = ?2 AND setting = ?3",
                params![user_id, guild.unwrap_or(0), setting],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Users in a guild whose guild-scoped `setting` equals `value`.
    pub fn users_with_setting(
        &self,
        guild: GuildId,
        setting: &str,
        value: &str,
    ) -> Result<Vec<UserId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM user_settings
                 WHERE guild = ?1 AND setting = ?2 AND value = ?3
                 ORDER BY user_id",
            )?;
            let users = stmt
                .query_map(params![guild, setting, value], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    // Goals

    pub fn get_goal(&self, user_id: UserId, kind: GoalKind) -> Result<Option<Goal>> {
        self.with_conn(|conn| {
            let goal = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM user_goals WHERE user_id = ?1 AND type = ?2",
                        GOAL_COLUMNS
                    ),
                    params![user_id, kind.as_str()],
                    parse_goal_row,
                )
                .optional()?;
            Ok(goal.flatten())
        })
    }

    /// Create or update a goal target. Progress is kept on update.
    pub fn set_goal(&self, user_id: UserId, kind: GoalKind, goal: i64, reset: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_goals (user_id, type, goal, current, completed, reset)
                 VALUES (?1, ?2, ?3, 0, 0, ?4)
                 ON CONFLICT(user_id, type) DO UPDATE SET goal = excluded.goal, reset = excluded.reset",
                params![user_id, kind.as_str(), goal, reset],
            )?;
            Ok(())
        })
    }

    /// Add to a goal's progress, clamped at zero, and return the updated goal.
    pub fn add_goal_progress(&self, user_id: UserId, kind: GoalKind, amount: i64) -> Result<Option<Goal>> {
        self.with_conn(|conn| {
            let goal = conn
                .query_row(
                    &format!(
                        "UPDATE user_goals SET current = MAX(current + ?3, 0)
                         WHERE user_id = ?1 AND type = ?2
                         RETURNING {}",
                        GOAL_COLUMNS
                    ),
                    params![user_id, kind.as_str(), amount],
                    parse_goal_row,
                )
                .optional()?;
            Ok(goal.flatten())
        })
    }

    /// Flag a goal as met once its progress reaches the target. Returns
    /// `true` only for the caller that flipped it.
    pub fn mark_goal_completed(&self, goal_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_goals SET completed = 1
                 WHERE id = ?1 AND completed = 0 AND current >= goal",
                params![goal_id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Goals whose reset time has passed.
    pub fn goals_due_for_reset(&self, now: i64) -> Result<Vec<Goal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_goals WHERE reset <= ?1 ORDER BY id",
                GOAL_COLUMNS
            ))?;
            let goals = stmt
                .query_map(params![now], parse_goal_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(goals.into_iter().flatten().collect())
        })
    }

    /// Archive a goal's period into history and start the next one, atomically.
    pub fn archive_goal(&self, goal: &Goal, date: &str, next_reset: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO user_goals_history (user_id, type, date, goal, result, completed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    goal.user_id,
                    goal.kind.as_str(),
                    date,
                    goal.goal,
                    goal.current,
                    goal.completed as i64
                ],
            )?;
            tx.execute(
                "UPDATE user_goals SET current = 0, completed = 0, reset = ?1 WHERE id = ?2",
                params![next_reset, goal.id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Archived periods for one goal type, newest first.
    pub fn goal_history(&self, user_id: UserId, kind: GoalKind) -> Result<Vec<GoalHistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, date, goal, result, completed FROM user_goals_history
                 WHERE user_id = ?1 AND type = ?2 ORDER BY id DESC",
            )?;
            let entries = stmt
                .query_map(params![user_id, kind.as_str()], |row| {
                    Ok(GoalHistoryEntry {
                        user_id: row.get(0)?,
                        kind,
                        date: row.get(1)?,
                        goal: row.get(2)?,
                        result: row.get(3)?,
                        completed: row.get::<_, i64>(4)? != 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().expect("Failed to create in-memory database")
    }

    #[test]
    fn add_stat_creates_then_accumulates() {
        let db = setup_db();
        assert_eq!(db.get_stat(1, "sprints_started").unwrap(), None);
        assert_eq!(db.add_stat(1, "sprints_started", 1).unwrap(), 1);
        assert_eq!(db.add_stat(1, "sprints_started", 2).unwrap(), 3);
        assert_eq!(db.add_stat(1, "sprints_started", -1).unwrap(), 2);
    }

    #[test]
    fn add_xp_accumulates() {
        let db = setup_db();
        assert_eq!(db.get_xp(1).unwrap(), 0);
        assert_eq!(db.add_xp(1, 25).unwrap(), 25);
        assert_eq!(db.add_xp(1, 100).unwrap(), 125);
        assert_eq!(db.get_xp(1).unwrap(), 125);
    }

    #[test]
    fn goal_progress_clamps_and_completes_once() {
        let db = setup_db();
        assert!(db.add_goal_progress(1, GoalKind::Daily, 10).unwrap().is_none());
        db.set_goal(1, GoalKind::Daily, 500, 100).unwrap();

        let goal = db.add_goal_progress(1, GoalKind::Daily, -50).unwrap().unwrap();
        assert_eq!(goal.current, 0);
        assert!(!db.mark_goal_completed(goal.id).unwrap());

        let goal = db.add_goal_progress(1, GoalKind::Daily, 500).unwrap().unwrap();
        assert_eq!(goal.current, 500);
        assert!(db.mark_goal_completed(goal.id).unwrap());
        assert!(!db.mark_goal_completed(goal.id).unwrap());
    }

    #[test]
    fn guild_and_global_settings_are_separate() {
        let db = setup_db();
        db.set_user_setting(1, None, "maxwpm", "200").unwrap();
        db.set_user_setting(1, Some(5), "sprint_notify", "1").unwrap();

        assert_eq!(
            db.get_user_setting(1, None, "maxwpm").unwrap().as_deref(),
            Some("200")
        );
        assert_eq!(db.get_user_setting(1, Some(5), "maxwpm").unwrap(), None);
        assert_eq!(db.users_with_setting(5, "sprint_notify", "1").unwrap(), vec![1]);
        assert!(db.users_with_setting(6, "sprint_notify", "1").unwrap().is_empty());
    }

    #[test]
    fn archive_goal_moves_progress_to_history() {
        let db = setup_db();
        db.set_goal(1, GoalKind::Daily, 500, 100).unwrap();
        let goal = db.add_goal_progress(1, GoalKind::Daily, 600).unwrap().unwrap();
        assert!(db.mark_goal_completed(goal.id).unwrap());

        let due = db.goals_due_for_reset(100).unwrap();
        assert_eq!(due.len(), 1);
        db.archive_goal(&due[0], "2026-01-01", 86_500).unwrap();

        let goal = db.get_goal(1, GoalKind::Daily).unwrap().unwrap();
        assert_eq!(goal.current, 0);
        assert!(!goal.completed);
        assert_eq!(goal.reset, 86_500);

        let history = db.goal_history(1, GoalKind::Daily).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result, 600);
        assert!(history[0].completed);
    }
}
