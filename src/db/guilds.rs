//! Guild-level settings.

use super::Database;
use crate::types::GuildId;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

impl Database {
    pub fn get_guild_setting(&self, guild: GuildId, setting: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM guild_settings WHERE guild = ?1 AND setting = ?2",
                    params![guild, setting],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_guild_setting(&self, guild: GuildId, setting: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO guild_settings (guild, setting, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(guild, setting) DO UPDATE SET value = excluded.value",
                params![guild, setting, value],
            )?;
            Ok(())
        })
    }
}
