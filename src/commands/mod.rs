//! The `sprint` command surface.

pub mod parse;

pub use parse::{SprintCommand, StartAt, parse};

use crate::directory::{keys, mention};
use crate::error::{SprintError, SprintResult, correlation_code};
use crate::notifier::{Interaction, Invocation, Target, say_or_log};
use crate::sprint::SprintLifecycle;
use crate::sprint::messages;
use chrono::Timelike;
use std::sync::Arc;
use tracing::{error, info};

/// Runs parsed commands and sends exactly one reply on failure.
pub struct CommandHandler {
    lifecycle: SprintLifecycle,
    interaction: Arc<dyn Interaction>,
}

impl CommandHandler {
    pub fn new(lifecycle: SprintLifecycle, interaction: Arc<dyn Interaction>) -> Self {
        Self {
            lifecycle,
            interaction,
        }
    }

    /// Parse and run a command, replying with the failure if there is one.
    /// The error is returned as well, after the reply has been sent.
    pub async fn dispatch<S: AsRef<str>>(
        &self,
        invocation: &Invocation,
        args: &[S],
        now: i64,
    ) -> SprintResult<()> {
        let result = match parse(args) {
            Ok(command) => self.execute(invocation, command, now).await,
            Err(e) => Err(e),
        };

        let Err(err) = result else {
            return Ok(());
        };
        let err = if err.code.is_internal() {
            let code = correlation_code();
            error!(
                correlation = %code,
                guild = invocation.guild,
                user_id = invocation.user,
                error = %err.message,
                "sprint command failed"
            );
            err.with_correlation(code)
        } else {
            err
        };

        let text = match &err.correlation {
            Some(code) => format!(
                "{}, something went wrong. Please report error code `{}`.",
                mention(invocation.user),
                code
            ),
            None => format!("{}, {}", mention(invocation.user), err.message),
        };
        say_or_log(
            self.lifecycle.notifier().as_ref(),
            &Target::Context(*invocation),
            &text,
        )
        .await;
        Err(err)
    }

    /// Run an already parsed command.
    pub async fn execute(
        &self,
        invocation: &Invocation,
        command: SprintCommand,
        now: i64,
    ) -> SprintResult<()> {
        let lifecycle = &self.lifecycle;
        match command {
            SprintCommand::Start => {
                lifecycle.create(invocation, None, None, now).await?;
            }
            SprintCommand::For { length, start } => {
                let delay = match start {
                    StartAt::Now => Some(0),
                    StartAt::In(delay) => delay,
                    StartAt::Minute(minute) => Some(self.minutes_until(invocation, minute, now)?),
                };
                lifecycle.create(invocation, length, delay, now).await?;
            }
            SprintCommand::In { delay, length } => {
                lifecycle.create(invocation, length, delay, now).await?;
            }
            SprintCommand::Cancel => lifecycle.cancel(invocation).await?,
            SprintCommand::End => lifecycle.force_end(invocation, now).await?,
            SprintCommand::Join { mode, project } => {
                lifecycle
                    .join(invocation, mode, project.as_deref(), now)
                    .await?;
            }
            SprintCommand::Leave => lifecycle.leave(invocation).await?,
            SprintCommand::Declare(declaration) => {
                lifecycle
                    .declare(invocation, declaration, self.interaction.as_ref(), now)
                    .await?;
            }
            SprintCommand::Time => lifecycle.time(invocation, now).await?,
            SprintCommand::Status => lifecycle.status(invocation, now).await?,
            SprintCommand::PersonalBest { reset } => self.personal_best(invocation, reset).await?,
            SprintCommand::Notify => self.set_notify(invocation, true).await?,
            SprintCommand::Forget => self.set_notify(invocation, false).await?,
            SprintCommand::Project(shortname) => lifecycle.set_project(invocation, &shortname).await?,
            SprintCommand::Purge => {
                self.purge(invocation).await?;
            }
        }
        Ok(())
    }

    /// Minutes from `now` until `minute` past the hour in the user's timezone.
    fn minutes_until(&self, invocation: &Invocation, minute: u32, now: i64) -> SprintResult<i64> {
        let tz = self
            .lifecycle
            .directory()
            .timezone(invocation.user)?
            .ok_or_else(SprintError::no_timezone)?;
        let local = tz
            .local(now)
            .ok_or_else(|| SprintError::internal("timestamp out of range"))?;
        Ok((60 + minute as i64 - local.minute() as i64) % 60)
    }

    async fn reply(&self, invocation: &Invocation, text: &str) {
        say_or_log(
            self.lifecycle.notifier().as_ref(),
            &Target::Context(*invocation),
            text,
        )
        .await;
    }

    async fn personal_best(&self, invocation: &Invocation, reset: bool) -> SprintResult<()> {
        let directory = self.lifecycle.directory();
        if reset {
            directory.reset_record(invocation.user, keys::WPM_RECORD)?;
            self.reply(invocation, &messages::personal_best_reset(invocation.user))
                .await;
        } else {
            let record = directory.get_record(invocation.user, keys::WPM_RECORD)?;
            self.reply(invocation, &messages::personal_best(invocation.user, record))
                .await;
        }
        Ok(())
    }

    async fn set_notify(&self, invocation: &Invocation, on: bool) -> SprintResult<()> {
        self.lifecycle
            .directory()
            .set_notify(invocation.user, invocation.guild, on)?;
        let text = if on {
            messages::notify_on(invocation.user)
        } else {
            messages::notify_off(invocation.user)
        };
        self.reply(invocation, &text).await;
        Ok(())
    }

    /// Drop `sprint_notify` subscriptions of users who left the guild.
    pub async fn purge(&self, invocation: &Invocation) -> SprintResult<usize> {
        let directory = self.lifecycle.directory();
        let subscribers = directory.notify_subscribers(invocation.guild)?;
        let present = if subscribers.is_empty() {
            Vec::new()
        } else {
            self.interaction
                .members_present(invocation.guild, &subscribers)
                .await
        };

        let mut purged = 0;
        for user in subscribers.iter().filter(|u| !present.contains(u)) {
            if directory
                .db()
                .delete_user_setting(*user, Some(invocation.guild), keys::SPRINT_NOTIFY)?
            {
                purged += 1;
            }
        }
        if purged > 0 {
            info!(guild = invocation.guild, purged, "purged sprint notifications");
        }
        self.reply(invocation, &messages::purged(purged)).await;
        Ok(purged)
    }
}
