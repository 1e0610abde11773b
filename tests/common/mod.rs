//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sprint_scheduler::config::{SchedulerConfig, SprintConfig};
use sprint_scheduler::db::Database;
use sprint_scheduler::notifier::{Interaction, Invocation, Notifier, NotifyError, Target};
use sprint_scheduler::scheduler::TaskScheduler;
use sprint_scheduler::sprint::SprintLifecycle;
use sprint_scheduler::types::{GuildId, UserId};
use std::sync::{Arc, Mutex};

pub const GUILD: GuildId = 100;
pub const CHANNEL: i64 = 200;
pub const T0: i64 = 1_700_000_000;

/// Fresh in-memory database.
pub fn setup_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().expect("Failed to create in-memory database"))
}

/// Notifier that keeps every message for inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Target, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn say(&self, target: &Target, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((*target, text.to_string()));
        Ok(())
    }
}

/// Interaction with a fixed confirmation answer and a fixed member list.
pub struct ScriptedInteraction {
    pub confirm: bool,
    pub members: Vec<UserId>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedInteraction {
    pub fn answering(confirm: bool) -> Self {
        Self {
            confirm,
            members: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_members(members: Vec<UserId>) -> Self {
        Self {
            confirm: true,
            members,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Interaction for ScriptedInteraction {
    async fn confirm(&self, _invocation: &Invocation, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.confirm
    }

    async fn members_present(&self, _guild: GuildId, users: &[UserId]) -> Vec<UserId> {
        users
            .iter()
            .copied()
            .filter(|u| self.members.contains(u))
            .collect()
    }
}

pub fn invocation(user: UserId) -> Invocation {
    Invocation {
        guild: GUILD,
        channel: CHANNEL,
        user,
        can_manage_messages: false,
    }
}

pub fn moderator(user: UserId) -> Invocation {
    Invocation {
        can_manage_messages: true,
        ..invocation(user)
    }
}

pub fn lifecycle(db: &Arc<Database>, notifier: &Arc<RecordingNotifier>) -> SprintLifecycle {
    SprintLifecycle::new(
        Arc::clone(db),
        Arc::clone(notifier) as Arc<dyn Notifier>,
        SprintConfig::default(),
    )
}

pub fn scheduler(db: &Arc<Database>, notifier: &Arc<RecordingNotifier>) -> TaskScheduler {
    TaskScheduler::new(
        Arc::clone(db),
        lifecycle(db, notifier),
        SchedulerConfig::default(),
        0,
    )
}
