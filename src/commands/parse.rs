//! Argument parsing for `sprint` commands.
//!
//! Parsing is synchronous and touches no state, so a malformed command is
//! rejected before anything is mutated.

use crate::error::{SprintError, SprintResult};
use crate::sprint::{Declaration, JoinMode};

/// When a `sprint for` should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    Now,
    /// Minutes from now; `None` when the value was missing or not a number.
    In(Option<i64>),
    /// Minute past the hour, in the user's timezone.
    Minute(u32),
}

/// A parsed `sprint` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SprintCommand {
    Start,
    For { length: Option<i64>, start: StartAt },
    In { delay: Option<i64>, length: Option<i64> },
    Cancel,
    End,
    Join { mode: JoinMode, project: Option<String> },
    Leave,
    Declare(Declaration),
    Time,
    Status,
    PersonalBest { reset: bool },
    Notify,
    Forget,
    Project(String),
    Purge,
}

/// Lenient number parsing: integers, or decimals truncated toward zero.
/// Values that do not fit an `i64` are not numbers.
fn number(arg: Option<&str>) -> Option<i64> {
    let arg = arg?.trim();
    arg.parse::<i64>().ok().or_else(|| {
        arg.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Parse `:mm`, `.mm` or `mm` into a minute past the hour.
fn minute(arg: Option<&str>) -> SprintResult<u32> {
    let invalid =
        || SprintError::invalid_argument("Please give a minute past the hour, like `:15` or `.45`.");
    let arg = arg.ok_or_else(invalid)?;
    let digits = arg
        .strip_prefix(':')
        .or_else(|| arg.strip_prefix('.'))
        .unwrap_or(arg);
    match digits.parse::<u32>() {
        Ok(m) if m < 60 => Ok(m),
        _ => Err(invalid()),
    }
}

fn declaration(arg: Option<&str>) -> SprintResult<Declaration> {
    let arg = arg.ok_or_else(|| SprintError::missing_argument("a word count"))?;
    let invalid = || SprintError::invalid_argument(format!("`{}` is not a valid word count.", arg));
    if arg.starts_with('+') || arg.starts_with('-') {
        arg.parse::<i64>()
            .map(Declaration::Delta)
            .map_err(|_| invalid())
    } else {
        arg.parse::<i64>()
            .map(Declaration::Absolute)
            .map_err(|_| invalid())
    }
}

/// Parse the words following `sprint`.
pub fn parse<S: AsRef<str>>(args: &[S]) -> SprintResult<SprintCommand> {
    let arg = |i: usize| args.get(i).map(|s| s.as_ref());
    let cmd = arg(0)
        .ok_or_else(|| SprintError::missing_argument("a sprint command"))?
        .to_lowercase();

    let command = match cmd.as_str() {
        "start" => SprintCommand::Start,
        "for" => {
            let length = number(arg(1));
            let start = match arg(2).map(str::to_lowercase).as_deref() {
                None | Some("now") => StartAt::Now,
                Some("in") => StartAt::In(number(arg(3))),
                Some("at") => StartAt::Minute(minute(arg(3))?),
                Some(_) => {
                    return Err(SprintError::invalid_argument(
                        "Use `sprint for <length> now`, `in <minutes>` or `at <:mm>`.",
                    ));
                }
            };
            SprintCommand::For { length, start }
        }
        "in" => {
            let delay = number(arg(1));
            let length = match arg(2).map(str::to_lowercase).as_deref() {
                None => None,
                Some("for") => number(arg(3)),
                Some(_) => {
                    return Err(SprintError::invalid_argument(
                        "Use `sprint in <minutes> for <length>`.",
                    ));
                }
            };
            SprintCommand::In { delay, length }
        }
        "cancel" => SprintCommand::Cancel,
        "end" => SprintCommand::End,
        "join" => {
            let first = arg(1).map(str::to_lowercase);
            match first.as_deref() {
                None => SprintCommand::Join {
                    mode: JoinMode::Fresh,
                    project: None,
                },
                Some("same") => SprintCommand::Join {
                    mode: JoinMode::Same,
                    project: None,
                },
                Some("edit") | Some("non-wc") => SprintCommand::Join {
                    mode: JoinMode::NoWordcount,
                    project: None,
                },
                Some(other) => {
                    let mode = match number(Some(other)) {
                        Some(n) => JoinMode::Count(n),
                        None if other.parse::<f64>().is_ok() => {
                            return Err(SprintError::invalid_argument(format!(
                                "`{}` is not a valid word count.",
                                other
                            )));
                        }
                        None => JoinMode::Fresh,
                    };
                    SprintCommand::Join {
                        mode,
                        project: arg(2).map(str::to_lowercase),
                    }
                }
            }
        }
        "leave" => SprintCommand::Leave,
        "wc" | "declare" => SprintCommand::Declare(declaration(arg(1))?),
        "time" => SprintCommand::Time,
        "status" => SprintCommand::Status,
        "pb" => SprintCommand::PersonalBest {
            reset: arg(1).is_some_and(|a| a.eq_ignore_ascii_case("reset")),
        },
        "notify" => SprintCommand::Notify,
        "forget" => SprintCommand::Forget,
        "project" => SprintCommand::Project(
            arg(1)
                .ok_or_else(|| SprintError::missing_argument("a project shortname"))?
                .to_lowercase(),
        ),
        "purge" => SprintCommand::Purge,
        other => return Err(SprintError::unknown_command(other)),
    };
    Ok(command)
}
