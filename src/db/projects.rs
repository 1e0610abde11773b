//! Writing projects and guild events.

use super::Database;
use crate::types::{GuildId, Project, UserId};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        shortname: row.get("shortname")?,
        title: row.get("title")?,
        words: row.get("words")?,
    })
}

impl Database {
    pub fn create_project(&self, user_id: UserId, shortname: &str, title: &str) -> Result<Project> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (user_id, shortname, title, words) VALUES (?1, ?2, ?3, 0)",
                params![user_id, shortname, title],
            )?;
            Ok(Project {
                id: conn.last_insert_rowid(),
                user_id,
                shortname: shortname.to_string(),
                title: title.to_string(),
                words: 0,
            })
        })
    }

    /// Look up a user's project by shortname (case-insensitive).
    pub fn get_project(&self, user_id: UserId, shortname: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| {
            let project = conn
                .query_row(
                    "SELECT id, user_id, shortname, title, words FROM projects
                     WHERE user_id = ?1 AND LOWER(shortname) = LOWER(?2)",
                    params![user_id, shortname],
                    parse_project_row,
                )
                .optional()?;
            Ok(project)
        })
    }

    pub fn get_project_by_id(&self, project_id: i64) -> Result<Option<Project>> {
        self.with_conn(|conn| {
            let project = conn
                .query_row(
                    "SELECT id, user_id, shortname, title, words FROM projects WHERE id = ?1",
                    params![project_id],
                    parse_project_row,
                )
                .optional()?;
            Ok(project)
        })
    }

    /// Add words to a project's running total.
    pub fn add_project_words(&self, project_id: i64, amount: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE projects SET words = words + ?1 WHERE id = ?2",
                params![amount, project_id],
            )?;
            Ok(())
        })
    }

    // Events

    pub fn create_event(&self, guild: GuildId, title: &str, starts: i64, ends: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (guild, title, starts, ends) VALUES (?1, ?2, ?3, ?4)",
                params![guild, title, starts, ends],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The event running in a guild at `now`, if any.
    pub fn running_event(&self, guild: GuildId, now: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT id FROM events WHERE guild = ?1 AND starts <= ?2 AND ends > ?2
                     ORDER BY id DESC LIMIT 1",
                    params![guild, now],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
    }

    pub fn add_event_words(&self, event_id: i64, user_id: UserId, amount: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO event_words (event_id, user_id, words) VALUES (?1, ?2, ?3)
                 ON CONFLICT(event_id, user_id) DO UPDATE SET words = words + excluded.words",
                params![event_id, user_id, amount],
            )?;
            Ok(())
        })
    }

    pub fn get_event_words(&self, event_id: i64, user_id: UserId) -> Result<i64> {
        self.with_conn(|conn| {
            let words = conn
                .query_row(
                    "SELECT words FROM event_words WHERE event_id = ?1 AND user_id = ?2",
                    params![event_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(words.unwrap_or(0))
        })
    }
}
