//! Structured errors for sprint commands.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingArgument,
    InvalidArgument,
    UnknownCommand,
    WordCountTooLow,

    // Precondition errors
    NoActiveSprint,
    AlreadyExists,
    NotJoined,
    NotStarted,
    AlreadyEnded,
    NoWordcountParticipant,
    PermissionDenied,
    ProjectNotFound,
    NoTimezone,
    Declined,

    // Internal errors
    Internal,
}

impl ErrorCode {
    pub fn is_internal(&self) -> bool {
        matches!(self, ErrorCode::Internal)
    }
}

/// A user-facing command failure.
#[derive(Debug, Serialize)]
pub struct SprintError {
    pub code: ErrorCode,
    pub message: String,
    /// Correlation code shown to the user and logged for internal errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
}

impl SprintError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            correlation: None,
        }
    }

    pub fn with_correlation(mut self, code: impl Into<String>) -> Self {
        self.correlation = Some(code.into());
        self
    }

    // Convenience constructors

    pub fn missing_argument(what: &str) -> Self {
        Self::new(ErrorCode::MissingArgument, format!("Please specify {}.", what))
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, reason)
    }

    pub fn unknown_command(name: &str) -> Self {
        Self::new(
            ErrorCode::UnknownCommand,
            format!("Unknown sprint command: {}", name),
        )
    }

    pub fn no_active_sprint() -> Self {
        Self::new(
            ErrorCode::NoActiveSprint,
            "There is no sprint running on this server.",
        )
    }

    pub fn already_exists() -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            "A sprint is already running. Wait for it to finish before starting another.",
        )
    }

    pub fn not_joined() -> Self {
        Self::new(ErrorCode::NotJoined, "You are not taking part in this sprint.")
    }

    pub fn not_started() -> Self {
        Self::new(ErrorCode::NotStarted, "The sprint has not started yet.")
    }

    pub fn already_ended() -> Self {
        Self::new(ErrorCode::AlreadyEnded, "The sprint has already ended.")
    }

    pub fn no_wordcount() -> Self {
        Self::new(
            ErrorCode::NoWordcountParticipant,
            "You joined this sprint without a word count.",
        )
    }

    pub fn permission_denied(action: &str) -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            format!(
                "Only the sprint creator or a moderator can {} the sprint.",
                action
            ),
        )
    }

    pub fn project_not_found(shortname: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("You do not have a project called `{}`.", shortname),
        )
    }

    pub fn no_timezone() -> Self {
        Self::new(
            ErrorCode::NoTimezone,
            "Please set your timezone before starting a sprint at a given minute.",
        )
    }

    pub fn word_count_too_low(starting: i64) -> Self {
        Self::new(
            ErrorCode::WordCountTooLow,
            format!(
                "Your word count cannot be lower than the one you started with ({}).",
                starting
            ),
        )
    }

    pub fn declined() -> Self {
        Self::new(ErrorCode::Declined, "Cancelled.")
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Internal, err.to_string())
    }
}

impl fmt::Display for SprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SprintError {}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for SprintError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<SprintError>() {
            Ok(sprint_err) => sprint_err,
            Err(err) => SprintError::internal(err),
        }
    }
}

/// Result type for sprint operations.
pub type SprintResult<T> = std::result::Result<T, SprintError>;

/// Short code tying a user-visible failure to its log line.
pub fn correlation_code() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_wrapping_a_sprint_error_keeps_its_code() {
        let err: anyhow::Error = SprintError::not_joined().into();
        let back: SprintError = err.into();
        assert_eq!(back.code, ErrorCode::NotJoined);
    }

    #[test]
    fn other_anyhow_errors_become_internal() {
        let back: SprintError = anyhow::anyhow!("disk on fire").into();
        assert!(back.code.is_internal());
        assert_eq!(back.message, "disk on fire");
    }

    #[test]
    fn correlation_code_is_eight_hex_chars() {
        let code = correlation_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
