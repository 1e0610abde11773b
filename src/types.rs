//! Core types for the sprint scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat-platform snowflake ids. SQLite stores them as signed 64-bit integers.
pub type UserId = i64;
pub type GuildId = i64;
pub type ChannelId = i64;
pub type SprintId = i64;
pub type TaskId = i64;

/// Category of object a task acts upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Sprint,
    Goal,
    Reminder,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Sprint => "sprint",
            ObjectKind::Goal => "goal",
            ObjectKind::Reminder => "reminder",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every action the scheduler knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Start a sprint that was scheduled with a delay.
    SprintStart,
    /// End the writing phase and ask for final word counts.
    SprintEnd,
    /// Score the sprint and post results.
    SprintComplete,
    /// Archive and reset user goals whose reset time has passed.
    GoalReset,
    /// Deliver due reminders.
    ReminderSend,
}

/// Registration table mapping each kind to its stored `(object, type)` pair.
pub const TASK_KINDS: &[(TaskKind, ObjectKind, &str)] = &[
    (TaskKind::SprintStart, ObjectKind::Sprint, "start"),
    (TaskKind::SprintEnd, ObjectKind::Sprint, "end"),
    (TaskKind::SprintComplete, ObjectKind::Sprint, "complete"),
    (TaskKind::GoalReset, ObjectKind::Goal, "reset"),
    (TaskKind::ReminderSend, ObjectKind::Reminder, "send"),
];

impl TaskKind {
    /// Resolve a stored `(object, type)` pair.
    pub fn from_parts(object: &str, action: &str) -> Option<Self> {
        TASK_KINDS
            .iter()
            .find(|(_, o, a)| o.as_str() == object && *a == action)
            .map(|(kind, _, _)| *kind)
    }

    fn entry(&self) -> &'static (TaskKind, ObjectKind, &'static str) {
        // Every variant has exactly one row in TASK_KINDS.
        match TASK_KINDS.iter().find(|(kind, _, _)| kind == self) {
            Some(entry) => entry,
            None => unreachable!("task kind missing from registration table"),
        }
    }

    pub fn object(&self) -> ObjectKind {
        self.entry().1
    }

    pub fn action(&self) -> &'static str {
        self.entry().2
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object(), self.action())
    }
}

/// A row of the `tasks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub object: String,
    #[serde(rename = "type")]
    pub action: String,
    pub reference_id: Option<i64>,
    pub due_time: i64,
    pub recurring: bool,
    pub run_every_seconds: Option<i64>,
    pub processing: bool,
}

impl Task {
    /// The typed kind, or `None` for rows written by an unknown subsystem.
    pub fn kind(&self) -> Option<TaskKind> {
        TaskKind::from_parts(&self.object, &self.action)
    }
}

/// A writing sprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprint {
    pub id: SprintId,
    pub guild: GuildId,
    pub channel: ChannelId,
    pub start_time: i64,
    /// Scheduled end; `0` once the sprint has been ended.
    pub end_time: i64,
    /// End time used for WPM math. Moves to "now" on a forced end.
    pub end_reference: i64,
    /// Length in minutes.
    pub length: i64,
    pub created_by: UserId,
    pub created_at: i64,
    /// `0` until completed.
    pub completed_at: i64,
}

impl Sprint {
    pub fn state(&self, now: i64) -> SprintState {
        SprintState::at(self, now)
    }
}

/// Lifecycle state derived from the stored timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintState {
    Scheduled,
    Running,
    Ended,
    Completed,
}

impl SprintState {
    /// The single source of truth for where a sprint is in its lifecycle.
    pub fn at(sprint: &Sprint, now: i64) -> Self {
        if sprint.completed_at > 0 {
            SprintState::Completed
        } else if sprint.end_time == 0 || sprint.end_time <= now {
            SprintState::Ended
        } else if sprint.start_time > now {
            SprintState::Scheduled
        } else {
            SprintState::Running
        }
    }

    pub fn has_started(&self) -> bool {
        !matches!(self, SprintState::Scheduled)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SprintState::Ended | SprintState::Completed)
    }
}

/// How a participant takes part in a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintType {
    #[default]
    Normal,
    /// Joined for the company; no word counts, no ranking.
    NoWordcount,
}

impl SprintType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintType::Normal => "normal",
            SprintType::NoWordcount => "no_wordcount",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "no_wordcount" => SprintType::NoWordcount,
            _ => SprintType::Normal,
        }
    }
}

/// A user's membership in one sprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub sprint_id: SprintId,
    pub user_id: UserId,
    pub starting_wc: i64,
    pub current_wc: i64,
    /// `0` until declared after the sprint ended.
    pub ending_wc: i64,
    pub time_joined: i64,
    pub sprint_type: SprintType,
    pub project_id: Option<i64>,
}

impl Participant {
    /// The most recent count the participant has reported.
    pub fn latest_wc(&self) -> i64 {
        if self.ending_wc > 0 {
            self.ending_wc
        } else {
            self.current_wc
        }
    }
}

/// A user's writing project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub user_id: UserId,
    pub shortname: String,
    pub title: String,
    pub words: i64,
}

/// Goal periods, in reset order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl GoalKind {
    pub const ALL: [GoalKind; 4] = [
        GoalKind::Daily,
        GoalKind::Weekly,
        GoalKind::Monthly,
        GoalKind::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalKind::Daily => "daily",
            GoalKind::Weekly => "weekly",
            GoalKind::Monthly => "monthly",
            GoalKind::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(GoalKind::Daily),
            "weekly" => Some(GoalKind::Weekly),
            "monthly" => Some(GoalKind::Monthly),
            "yearly" => Some(GoalKind::Yearly),
            _ => None,
        }
    }

    /// XP granted when the goal is met.
    pub fn completion_xp(&self) -> i64 {
        match self {
            GoalKind::Daily => 100,
            GoalKind::Weekly => 250,
            GoalKind::Monthly => 500,
            GoalKind::Yearly => 1000,
        }
    }
}

/// A row of `user_goals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: UserId,
    pub kind: GoalKind,
    pub goal: i64,
    pub current: i64,
    pub completed: bool,
    pub reset: i64,
}

/// A row of `reminders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub user_id: UserId,
    pub guild: GuildId,
    pub channel: ChannelId,
    pub message: String,
    pub due_time: i64,
    /// Repeat interval; `None` for one-shot reminders.
    pub interval_seconds: Option<i64>,
}
