//! Periodic goal reset.
//!
//! Goals run for a day, week (Monday to Sunday), month or year in the owner's
//! timezone (UTC when unset). When a goal's `reset` time passes, its progress is copied
//! into history and the next boundary is computed.

use crate::db::Database;
use crate::directory::{ParticipantDirectory, UserTimezone};
use crate::types::GoalKind;
use anyhow::{Context, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use std::sync::Arc;
use tracing::debug;

fn local_date(now: i64, tz: &UserTimezone) -> Result<NaiveDate> {
    Ok(tz.local(now).context("timestamp out of range")?.date())
}

/// First day of the period containing `date`.
fn period_start(kind: GoalKind, date: NaiveDate) -> Result<NaiveDate> {
    let start = match kind {
        GoalKind::Daily => Some(date),
        GoalKind::Weekly => date.checked_sub_days(Days::new(date.weekday().num_days_from_monday() as u64)),
        GoalKind::Monthly => date.with_day(1),
        GoalKind::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1),
    };
    start.context("date out of range")
}

fn shift_period(kind: GoalKind, start: NaiveDate, forward: bool) -> Result<NaiveDate> {
    let shifted = match (kind, forward) {
        (GoalKind::Daily, true) => start.checked_add_days(Days::new(1)),
        (GoalKind::Daily, false) => start.checked_sub_days(Days::new(1)),
        (GoalKind::Weekly, true) => start.checked_add_days(Days::new(7)),
        (GoalKind::Weekly, false) => start.checked_sub_days(Days::new(7)),
        (GoalKind::Monthly, true) => start.checked_add_months(Months::new(1)),
        (GoalKind::Monthly, false) => start.checked_sub_months(Months::new(1)),
        (GoalKind::Yearly, true) => start.checked_add_months(Months::new(12)),
        (GoalKind::Yearly, false) => start.checked_sub_months(Months::new(12)),
    };
    shifted.context("date out of range")
}

/// Epoch seconds of the next period boundary after `now`, at local midnight.
pub fn next_reset(kind: GoalKind, now: i64, tz: &UserTimezone) -> Result<i64> {
    let start = period_start(kind, local_date(now, tz)?)?;
    let next = shift_period(kind, start, true)?;
    let midnight = next.and_hms_opt(0, 0, 0).context("invalid midnight")?;
    tz.timestamp(midnight).context("local midnight does not exist")
}

/// History label for the period that just finished, as `YYYY-MM-DD` of its
/// first day.
pub fn previous_period_date(kind: GoalKind, now: i64, tz: &UserTimezone) -> Result<String> {
    let start = period_start(kind, local_date(now, tz)?)?;
    let previous = shift_period(kind, start, false)?;
    Ok(previous.format("%Y-%m-%d").to_string())
}

/// Archives and resets goals whose period has ended.
#[derive(Clone)]
pub struct GoalResetHandler {
    db: Arc<Database>,
    directory: ParticipantDirectory,
}

impl GoalResetHandler {
    pub fn new(db: Arc<Database>, directory: ParticipantDirectory) -> Self {
        Self { db, directory }
    }

    /// Reset every goal due at `now`. Returns how many were reset.
    pub fn run(&self, now: i64) -> Result<usize> {
        let due = self.db.goals_due_for_reset(now)?;
        for goal in &due {
            let tz = self
                .directory
                .timezone(goal.user_id)?
                .unwrap_or(UserTimezone::UTC);
            let date = previous_period_date(goal.kind, now, &tz)?;
            let next = next_reset(goal.kind, now, &tz)?;
            debug!(user_id = goal.user_id, kind = goal.kind.as_str(), next, "resetting goal");
            self.db.archive_goal(goal, &date, next)?;
        }
        Ok(due.len())
    }
}
