//! Per-user bookkeeping used by the sprint lifecycle: XP and levels, stats,
//! records, goal progress and settings.

use crate::db::Database;
use crate::notifier::{Notifier, Target, say_or_log};
use crate::types::{GoalKind, GuildId, UserId};
use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::info;

/// XP needed per level.
pub const XP_PER_LEVEL: i64 = 100;

/// Level for a total XP amount.
pub fn level_for(xp: i64) -> i64 {
    xp.max(0) / XP_PER_LEVEL + 1
}

/// Chat mention for a user.
pub fn mention(user_id: UserId) -> String {
    format!("<@{}>", user_id)
}

/// A user's timezone: an IANA name such as `Asia/Kolkata`, or a fixed
/// offset such as `+05:30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTimezone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl UserTimezone {
    pub const UTC: UserTimezone = UserTimezone::Named(Tz::UTC);

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        value
            .parse::<Tz>()
            .ok()
            .map(Self::Named)
            .or_else(|| parse_utc_offset(value).map(Self::Fixed))
    }

    /// Wall-clock time at `now`.
    pub fn local(&self, now: i64) -> Option<NaiveDateTime> {
        let utc = DateTime::from_timestamp(now, 0)?;
        Some(match self {
            Self::Named(tz) => utc.with_timezone(tz).naive_local(),
            Self::Fixed(offset) => utc.with_timezone(offset).naive_local(),
        })
    }

    /// Epoch seconds of a wall-clock time. A time skipped by a DST jump
    /// resolves to the first whole hour after it that exists.
    pub fn timestamp(&self, local: NaiveDateTime) -> Option<i64> {
        match self {
            Self::Named(tz) => earliest_instant(tz, local),
            Self::Fixed(offset) => earliest_instant(offset, local),
        }
    }
}

fn earliest_instant<Z: TimeZone>(tz: &Z, local: NaiveDateTime) -> Option<i64> {
    (0..=3).find_map(|hours| {
        tz.from_local_datetime(&(local + Duration::hours(hours)))
            .earliest()
            .map(|t| t.timestamp())
    })
}

/// Parse a fixed UTC offset such as `+05:30`, `-0800`, `+5` or `UTC`.
fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let value = value
        .strip_prefix("UTC")
        .or_else(|| value.strip_prefix("utc"))
        .unwrap_or(value);

    let (sign, rest) = match value.chars().next()? {
        '+' => (1, &value[1..]),
        '-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Stat and setting names.
pub mod keys {
    pub const SPRINTS_STARTED: &str = "sprints_started";
    pub const SPRINTS_COMPLETED: &str = "sprints_completed";
    pub const SPRINTS_WON: &str = "sprints_won";
    pub const SPRINTS_WORDS_WRITTEN: &str = "sprints_words_written";
    pub const TOTAL_WORDS_WRITTEN: &str = "total_words_written";
    pub const WPM_RECORD: &str = "wpm";
    pub const SPRINT_NOTIFY: &str = "sprint_notify";
    pub const MAX_WPM: &str = "maxwpm";
    pub const TIMEZONE: &str = "timezone";
    pub const SPRINT_DELAY_END: &str = "sprint_delay_end";
}

/// Directory of participant data backed by the store.
#[derive(Clone)]
pub struct ParticipantDirectory {
    db: Arc<Database>,
    notifier: Arc<dyn Notifier>,
}

impl ParticipantDirectory {
    pub fn new(db: Arc<Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Grant XP and announce a level-up in `channel`. Returns the new total.
    pub async fn add_xp(&self, user_id: UserId, amount: i64, target: &Target) -> Result<i64> {
        let after = self.db.add_xp(user_id, amount)?;
        let before = after - amount;

        let level = level_for(after);
        if level > level_for(before) {
            info!(user_id, level, "level up");
            let text = format!(
                "Congratulations {}, you are now level **{}**!",
                mention(user_id),
                level
            );
            say_or_log(self.notifier.as_ref(), target, &text).await;
        }
        Ok(after)
    }

    pub fn add_stat(&self, user_id: UserId, name: &str, amount: i64) -> Result<i64> {
        self.db.add_stat(user_id, name, amount)
    }

    pub fn get_record(&self, user_id: UserId, name: &str) -> Result<Option<f64>> {
        self.db.get_record(user_id, name)
    }

    pub fn set_record(&self, user_id: UserId, name: &str, value: f64) -> Result<()> {
        self.db.set_record(user_id, name, value)
    }

    pub fn reset_record(&self, user_id: UserId, name: &str) -> Result<bool> {
        self.db.delete_record(user_id, name)
    }

    /// Add written words to every goal the user has. Progress is clamped at
    /// zero. A newly met goal grants XP, bumps `<type>_goals_completed` and
    /// is announced, once, by whichever caller flags it.
    pub async fn add_to_goals(&self, user_id: UserId, amount: i64, target: &Target) -> Result<()> {
        for kind in GoalKind::ALL {
            let Some(goal) = self.db.add_goal_progress(user_id, kind, amount)? else {
                continue;
            };

            if !goal.completed && self.db.mark_goal_completed(goal.id)? {
                let xp = kind.completion_xp();
                self.add_stat(user_id, &format!("{}_goals_completed", kind.as_str()), 1)?;
                self.add_xp(user_id, xp, target).await?;
                let text = format!(
                    "Way to go {}! You have met your {} goal of {} words (+{} xp).",
                    mention(user_id),
                    kind.as_str(),
                    goal.goal,
                    xp
                );
                say_or_log(self.notifier.as_ref(), target, &text).await;
            }
        }
        Ok(())
    }

    /// A global user setting.
    pub fn setting(&self, user_id: UserId, name: &str) -> Result<Option<String>> {
        self.db.get_user_setting(user_id, None, name)
    }

    pub fn guild_setting(&self, guild: GuildId, name: &str) -> Result<Option<String>> {
        self.db.get_guild_setting(guild, name)
    }

    /// The user's timezone, if they have set a valid one.
    pub fn timezone(&self, user_id: UserId) -> Result<Option<UserTimezone>> {
        Ok(self
            .setting(user_id, keys::TIMEZONE)?
            .and_then(|tz| UserTimezone::parse(&tz)))
    }

    /// WPM above which a declaration needs confirmation.
    pub fn wpm_limit(&self, user_id: UserId, default: i64) -> Result<i64> {
        Ok(self
            .setting(user_id, keys::MAX_WPM)?
            .and_then(|v| v.trim().parse().ok())
            .filter(|v: &i64| *v > 0)
            .unwrap_or(default))
    }

    /// Grace window in minutes before a sprint completes.
    pub fn end_delay_minutes(&self, guild: GuildId, default: i64) -> Result<i64> {
        Ok(self
            .guild_setting(guild, keys::SPRINT_DELAY_END)?
            .and_then(|v| v.trim().parse().ok())
            .filter(|v: &i64| *v >= 0)
            .unwrap_or(default))
    }

    /// Users in the guild who asked to be told about new sprints.
    pub fn notify_subscribers(&self, guild: GuildId) -> Result<Vec<UserId>> {
        self.db.users_with_setting(guild, keys::SPRINT_NOTIFY, "1")
    }

    pub fn set_notify(&self, user_id: UserId, guild: GuildId, on: bool) -> Result<()> {
        self.db.set_user_setting(
            user_id,
            Some(guild),
            keys::SPRINT_NOTIFY,
            if on { "1" } else { "0" },
        )
    }
}
