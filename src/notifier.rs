//! Outbound messaging and chat interaction capabilities.
//!
//! Scheduled handlers fire outside any command invocation, so a message
//! target is either the invocation that triggered it or a bare channel.

use crate::types::{ChannelId, GuildId, UserId};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised by a notifier transport.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The channel could not be resolved (deleted, or not visible to this shard).
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(ChannelId),

    /// The transport refused or dropped the message.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// The context of one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub user: UserId,
    /// Whether the invoking user has the manage-messages permission.
    pub can_manage_messages: bool,
}

/// Where a message should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Context(Invocation),
    Channel(ChannelId),
}

impl Target {
    pub fn channel(&self) -> ChannelId {
        match self {
            Target::Context(invocation) => invocation.channel,
            Target::Channel(channel) => *channel,
        }
    }
}

/// Sends text to a chat target.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn say(&self, target: &Target, text: &str) -> Result<(), NotifyError>;
}

/// Interactive parts of the chat layer used by commands.
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Ask the invoking user a yes/no question.
    async fn confirm(&self, invocation: &Invocation, prompt: &str) -> bool;

    /// The subset of `users` that are still members of `guild`.
    async fn members_present(&self, guild: GuildId, users: &[UserId]) -> Vec<UserId>;
}

/// Send a message, logging instead of failing when the transport errors.
pub async fn say_or_log(notifier: &dyn Notifier, target: &Target, text: &str) {
    if let Err(e) = notifier.say(target, text).await {
        warn!(channel = target.channel(), error = %e, "failed to deliver message");
    }
}

/// Notifier that writes every message to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn say(&self, target: &Target, text: &str) -> Result<(), NotifyError> {
        info!(channel = target.channel(), "{}", text);
        Ok(())
    }
}

/// Notifier that prints messages to stdout, one block per message.
#[derive(Debug, Default, Clone)]
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn say(&self, target: &Target, text: &str) -> Result<(), NotifyError> {
        println!("[#{}] {}", target.channel(), text);
        Ok(())
    }
}
