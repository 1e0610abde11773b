//! Sprint and participant storage.

use super::Database;
use super::tasks::delete_by_reference_internal;
use crate::types::{
    ChannelId, GuildId, ObjectKind, Participant, Sprint, SprintId, SprintType, UserId,
};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

const SPRINT_COLUMNS: &str = "id, guild, channel, start_time, end_time, end_reference, length, created_by, created_at, completed_at";

const PARTICIPANT_COLUMNS: &str =
    "sprint_id, user_id, starting_wc, current_wc, ending_wc, time_joined, sprint_type, project_id";

fn parse_sprint_row(row: &Row) -> rusqlite::Result<Sprint> {
    Ok(Sprint {
        id: row.get("id")?,
        guild: row.get("guild")?,
        channel: row.get("channel")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        end_reference: row.get("end_reference")?,
        length: row.get("length")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
    })
}

fn parse_participant_row(row: &Row) -> rusqlite::Result<Participant> {
    let sprint_type: String = row.get("sprint_type")?;
    Ok(Participant {
        sprint_id: row.get("sprint_id")?,
        user_id: row.get("user_id")?,
        starting_wc: row.get("starting_wc")?,
        current_wc: row.get("current_wc")?,
        ending_wc: row.get("ending_wc")?,
        time_joined: row.get("time_joined")?,
        sprint_type: SprintType::from_str(&sprint_type),
        project_id: row.get("project_id")?,
    })
}

/// Values for a new sprint row.
#[derive(Debug, Clone)]
pub struct NewSprint {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub start_time: i64,
    pub end_time: i64,
    pub length: i64,
    pub created_by: UserId,
    pub created_at: i64,
}

impl Database {
    /// Insert a sprint. `end_reference` starts equal to `end_time`.
    ///
    /// Returns `None` when the guild already has a live sprint.
    pub fn create_sprint(&self, new: &NewSprint) -> Result<Option<Sprint>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO sprints (guild, channel, start_time, end_time, end_reference, length, created_by, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, 0)",
                params![
                    new.guild,
                    new.channel,
                    new.start_time,
                    new.end_time,
                    new.length,
                    new.created_by,
                    new.created_at
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
            Ok(Some(Sprint {
                id: conn.last_insert_rowid(),
                guild: new.guild,
                channel: new.channel,
                start_time: new.start_time,
                end_time: new.end_time,
                end_reference: new.end_time,
                length: new.length,
                created_by: new.created_by,
                created_at: new.created_at,
                completed_at: 0,
            }))
        })
    }

    /// Get a sprint by id, completed or not.
    pub fn get_sprint(&self, sprint_id: SprintId) -> Result<Option<Sprint>> {
        self.with_conn(|conn| {
            let sprint = conn
                .query_row(
                    &format!("SELECT {} FROM sprints WHERE id = ?1", SPRINT_COLUMNS),
                    params![sprint_id],
                    parse_sprint_row,
                )
                .optional()?;
            Ok(sprint)
        })
    }

    /// The guild's non-completed sprint, if there is one.
    pub fn active_sprint(&self, guild: GuildId) -> Result<Option<Sprint>> {
        self.with_conn(|conn| {
            let sprint = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM sprints WHERE guild = ?1 AND completed_at = 0
                         ORDER BY id DESC LIMIT 1",
                        SPRINT_COLUMNS
                    ),
                    params![guild],
                    parse_sprint_row,
                )
                .optional()?;
            Ok(sprint)
        })
    }

    /// Write the "ended now" marker, moving the WPM reference point to
    /// `end_reference` when one is given. Returns `false` if the marker was
    /// already set or the sprint is completed, so a duplicate end is a no-op
    /// and leaves the reference point alone.
    pub fn mark_sprint_ended(&self, sprint_id: SprintId, end_reference: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sprints SET end_time = 0, end_reference = COALESCE(?2, end_reference)
                 WHERE id = ?1 AND end_time != 0 AND completed_at = 0",
                params![sprint_id, end_reference],
            )?;
            Ok(changed == 1)
        })
    }

    /// Mark the sprint completed. Returns `false` if another caller already did.
    pub fn mark_sprint_completed(&self, sprint_id: SprintId, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sprints SET completed_at = ?1 WHERE id = ?2 AND completed_at = 0",
                params![now, sprint_id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Delete a sprint, its participants and its pending tasks in one transaction.
    pub fn delete_sprint(&self, sprint_id: SprintId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM sprint_users WHERE sprint_id = ?1",
                params![sprint_id],
            )?;
            let deleted = tx.execute("DELETE FROM sprints WHERE id = ?1", params![sprint_id])?;
            delete_by_reference_internal(&tx, ObjectKind::Sprint, sprint_id)?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    /// Every participant of a sprint, in join order.
    pub fn sprint_participants(&self, sprint_id: SprintId) -> Result<Vec<Participant>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sprint_users WHERE sprint_id = ?1 ORDER BY id",
                PARTICIPANT_COLUMNS
            ))?;
            let participants = stmt
                .query_map(params![sprint_id], parse_participant_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(participants)
        })
    }

    /// One user's participation in a sprint.
    pub fn get_participant(&self, sprint_id: SprintId, user_id: UserId) -> Result<Option<Participant>> {
        self.with_conn(|conn| {
            let participant = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM sprint_users WHERE sprint_id = ?1 AND user_id = ?2",
                        PARTICIPANT_COLUMNS
                    ),
                    params![sprint_id, user_id],
                    parse_participant_row,
                )
                .optional()?;
            Ok(participant)
        })
    }

    /// Insert a participant row. Current count starts at the starting count.
    pub fn add_participant(
        &self,
        sprint_id: SprintId,
        user_id: UserId,
        starting_wc: i64,
        time_joined: i64,
        sprint_type: SprintType,
    ) -> Result<Participant> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sprint_users (sprint_id, user_id, starting_wc, current_wc, ending_wc, time_joined, sprint_type)
                 VALUES (?1, ?2, ?3, ?3, 0, ?4, ?5)",
                params![sprint_id, user_id, starting_wc, time_joined, sprint_type.as_str()],
            )?;
            Ok(Participant {
                sprint_id,
                user_id,
                starting_wc,
                current_wc: starting_wc,
                ending_wc: 0,
                time_joined,
                sprint_type,
                project_id: None,
            })
        })
    }

    /// Reset an existing participant's counts for a re-join.
    pub fn rejoin_participant(
        &self,
        sprint_id: SprintId,
        user_id: UserId,
        starting_wc: i64,
        time_joined: Option<i64>,
        sprint_type: SprintType,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sprint_users
                 SET starting_wc = ?1, current_wc = ?1, sprint_type = ?2,
                     time_joined = COALESCE(?3, time_joined)
                 WHERE sprint_id = ?4 AND user_id = ?5",
                params![starting_wc, sprint_type.as_str(), time_joined, sprint_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Record a running word count.
    pub fn set_current_wc(&self, sprint_id: SprintId, user_id: UserId, words: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sprint_users SET current_wc = ?1 WHERE sprint_id = ?2 AND user_id = ?3",
                params![words, sprint_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Record a final word count.
    pub fn set_ending_wc(&self, sprint_id: SprintId, user_id: UserId, words: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sprint_users SET ending_wc = ?1 WHERE sprint_id = ?2 AND user_id = ?3",
                params![words, sprint_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Attach a project to a participant.
    pub fn set_participant_project(
        &self,
        sprint_id: SprintId,
        user_id: UserId,
        project_id: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sprint_users SET project_id = ?1 WHERE sprint_id = ?2 AND user_id = ?3",
                params![project_id, sprint_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Remove a participant. Returns the number of participants left.
    pub fn remove_participant(&self, sprint_id: SprintId, user_id: UserId) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sprint_users WHERE sprint_id = ?1 AND user_id = ?2",
                params![sprint_id, user_id],
            )?;
            let left: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sprint_users WHERE sprint_id = ?1",
                params![sprint_id],
                |row| row.get(0),
            )?;
            Ok(left)
        })
    }

    /// Word-count participants who have not declared a final count yet.
    pub fn undeclared_count(&self, sprint_id: SprintId) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM sprint_users
                 WHERE sprint_id = ?1 AND ending_wc = 0 AND sprint_type != ?2",
                params![sprint_id, SprintType::NoWordcount.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// The user's latest participation in any other sprint.
    pub fn most_recent_participation(
        &self,
        user_id: UserId,
        excluding: SprintId,
    ) -> Result<Option<Participant>> {
        self.with_conn(|conn| {
            let participant = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM sprint_users WHERE user_id = ?1 AND sprint_id != ?2
                         ORDER BY id DESC LIMIT 1",
                        PARTICIPANT_COLUMNS
                    ),
                    params![user_id, excluding],
                    parse_participant_row,
                )
                .optional()?;
            Ok(participant)
        })
    }
}
