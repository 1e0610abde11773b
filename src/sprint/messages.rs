//! Plain-text renderings of sprint announcements and replies.

use crate::directory::mention;
use crate::types::UserId;

fn mentions(users: &[UserId]) -> String {
    users
        .iter()
        .map(|u| mention(*u))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split seconds into whole minutes and remaining seconds.
pub fn minutes_seconds(seconds: i64) -> (i64, i64) {
    let seconds = seconds.max(0);
    (seconds / 60, seconds % 60)
}

pub fn started(length: i64, participants: &[UserId], subscribers: &[UserId]) -> String {
    let mut text = format!(
        "**Sprint has started!** Get writing, you have {} minute(s).\nSprinting: {}",
        length,
        mentions(participants)
    );
    if !subscribers.is_empty() {
        text.push_str(&format!("\nNotifying: {}", mentions(subscribers)));
    }
    text
}

pub fn scheduled(delay_minutes: i64, length: i64, subscribers: &[UserId]) -> String {
    let mut text = format!(
        "**A new sprint will start in {} minute(s)** and will last for {} minute(s). Use `sprint join` to take part.",
        delay_minutes, length
    );
    if !subscribers.is_empty() {
        text.push_str(&format!("\nNotifying: {}", mentions(subscribers)));
    }
    text
}

pub fn ended(delay_minutes: i64, participants: &[UserId]) -> String {
    format!(
        "**Time is up!** Pens down. You have {} minute(s) to declare your final word count with `sprint wc <amount>`.\n{}",
        delay_minutes,
        mentions(participants)
    )
}

pub fn results_coming() -> String {
    "The word counts are in. Results coming up shortly...".to_string()
}

pub fn no_wordcounts() -> String {
    "No word counts were declared, so there are no results for this sprint.".to_string()
}

/// One line of the results table.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultLine {
    Scored {
        user_id: UserId,
        written: i64,
        wpm: f64,
        xp: i64,
        personal_best: bool,
    },
    NoWordcount {
        user_id: UserId,
        xp: i64,
    },
}

pub fn results(lines: &[ResultLine]) -> String {
    let mut text = String::from("**Results:**\n");
    for (index, line) in lines.iter().enumerate() {
        match line {
            ResultLine::Scored {
                user_id,
                written,
                wpm,
                xp,
                personal_best,
            } => {
                text.push_str(&format!(
                    "`{}`. {} - **{}** words ({} wpm) (+{} xp)",
                    index + 1,
                    mention(*user_id),
                    written,
                    wpm,
                    xp
                ));
                if *personal_best {
                    text.push_str(" **NEW PB**");
                }
            }
            ResultLine::NoWordcount { user_id, xp } => {
                text.push_str(&format!("{} - sprinted without a word count (+{} xp)", mention(*user_id), xp));
            }
        }
        text.push('\n');
    }
    text
}

pub fn cancelled(participants: &[UserId]) -> String {
    format!("**Sprint has been cancelled.** {}", mentions(participants))
}

pub fn left(user: UserId) -> String {
    format!("{}, you have left the sprint.", mention(user))
}

pub fn left_cancelled() -> String {
    "There is nobody left in the sprint, so it has been cancelled.".to_string()
}

pub fn joined(user: UserId, starting_wc: i64) -> String {
    format!(
        "{}, you have joined the sprint with a starting word count of **{}**.",
        mention(user),
        starting_wc
    )
}

pub fn join_updated(user: UserId, starting_wc: i64) -> String {
    format!(
        "{}, your starting word count has been set to **{}**.",
        mention(user),
        starting_wc
    )
}

pub fn joined_no_wordcount(user: UserId) -> String {
    format!(
        "{}, you have joined the sprint without a word count. You will not be ranked.",
        mention(user)
    )
}

pub fn project_set(user: UserId, title: &str) -> String {
    format!("{}, you are now sprinting for **{}**.", mention(user), title)
}

pub fn declared(user: UserId, word_count: i64, written: i64) -> String {
    format!(
        "{}, your word count is now **{}** ({} written this sprint).",
        mention(user),
        word_count,
        written
    )
}

pub fn wpm_confirm(written: i64, wpm: f64) -> String {
    format!(
        "That would mean you wrote {} words at {} words per minute. Is that right? (y/n)",
        written, wpm
    )
}

pub fn status(
    user: UserId,
    current: i64,
    written: i64,
    elapsed_minutes: f64,
    wpm: f64,
    left_minutes: f64,
) -> String {
    format!(
        "{}, your current word count is **{}** ({} written in {} minute(s), {} wpm). {} minute(s) left.",
        mention(user),
        current,
        written,
        elapsed_minutes,
        wpm,
        left_minutes
    )
}

pub fn starts_in(user: UserId, seconds: i64) -> String {
    let (m, s) = minutes_seconds(seconds);
    format!("{}, the sprint starts in {} minute(s) {} second(s).", mention(user), m, s)
}

pub fn time_left(user: UserId, seconds: i64) -> String {
    let (m, s) = minutes_seconds(seconds);
    format!("{}, there are {} minute(s) {} second(s) left in the sprint.", mention(user), m, s)
}

pub fn waiting_for_wordcounts(user: UserId) -> String {
    format!(
        "{}, the sprint is over. Waiting for final word counts.",
        mention(user)
    )
}

pub fn personal_best(user: UserId, record: Option<f64>) -> String {
    match record {
        Some(wpm) => format!(
            "{}, your personal best is **{}** wpm.",
            mention(user),
            wpm.round() as i64
        ),
        None => format!("{}, you do not have a personal best yet.", mention(user)),
    }
}

pub fn personal_best_reset(user: UserId) -> String {
    format!("{}, your personal best has been reset.", mention(user))
}

pub fn notify_on(user: UserId) -> String {
    format!("{}, you will be notified when a sprint starts.", mention(user))
}

pub fn notify_off(user: UserId) -> String {
    format!("{}, you will no longer be notified about sprints.", mention(user))
}

pub fn purged(count: usize) -> String {
    if count == 0 {
        "No notification subscriptions needed purging.".to_string()
    } else {
        format!("Purged {} notification subscription(s) for users no longer in the server.", count)
    }
}
