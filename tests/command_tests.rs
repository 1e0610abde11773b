//! Integration tests for the `sprint` command surface.

mod common;

use common::{GUILD, RecordingNotifier, ScriptedInteraction, T0, invocation, lifecycle, setup_db};
use sprint_scheduler::commands::CommandHandler;
use sprint_scheduler::directory::keys;
use sprint_scheduler::error::ErrorCode;
use sprint_scheduler::notifier::Interaction;
use std::sync::Arc;

fn handler_with(
    interaction: ScriptedInteraction,
) -> (Arc<sprint_scheduler::db::Database>, Arc<RecordingNotifier>, CommandHandler) {
    let db = setup_db();
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = CommandHandler::new(
        lifecycle(&db, &notifier),
        Arc::new(interaction) as Arc<dyn Interaction>,
    );
    (db, notifier, handler)
}

fn handler() -> (Arc<sprint_scheduler::db::Database>, Arc<RecordingNotifier>, CommandHandler) {
    handler_with(ScriptedInteraction::answering(true))
}

#[tokio::test]
async fn user_errors_reply_once_with_the_message() {
    let (_db, notifier, handler) = handler();

    let err = handler
        .dispatch(&invocation(5), &["leave"], T0)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NoActiveSprint);
    assert!(err.correlation.is_none());
    assert_eq!(
        notifier.messages(),
        vec!["<@5>, There is no sprint running on this server.".to_string()]
    );
}

#[tokio::test]
async fn parse_errors_reply_once() {
    let (_db, notifier, handler) = handler();

    let err = handler
        .dispatch(&invocation(5), &["dance"], T0)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::UnknownCommand);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn internal_errors_carry_a_correlation_code() {
    let (db, notifier, handler) = handler();
    // Break the store underneath the handler.
    db.with_conn(|conn| {
        conn.execute_batch("DROP TABLE sprint_users;")?;
        Ok(())
    })
    .unwrap();
    handler
        .dispatch(&invocation(1), &["start"], T0)
        .await
        .unwrap_err();
    let messages = notifier.messages();
    let failure = messages.last().unwrap();

    assert!(failure.contains("Please report error code"));
    let code: String = failure
        .split('`')
        .nth(1)
        .unwrap()
        .to_string();
    assert_eq!(code.len(), 8);
    assert_eq!(
        messages
            .iter()
            .filter(|m| m.contains("error code"))
            .count(),
        1
    );
}

#[tokio::test]
async fn start_and_join_through_commands() {
    let (db, _notifier, handler) = handler();

    handler.dispatch(&invocation(1), &["for", "15", "in", "3"], T0).await.unwrap();
    let sprint = db.active_sprint(GUILD).unwrap().unwrap();
    assert_eq!(sprint.length, 15);
    assert_eq!(sprint.start_time, T0 + 180);

    handler.dispatch(&invocation(2), &["join", "250"], T0 + 10).await.unwrap();
    let p = db.get_participant(sprint.id, 2).unwrap().unwrap();
    assert_eq!(p.starting_wc, 250);
}

#[tokio::test]
async fn for_without_start_begins_now() {
    let (db, _notifier, handler) = handler();
    handler.dispatch(&invocation(1), &["for", "10"], T0).await.unwrap();
    let sprint = db.active_sprint(GUILD).unwrap().unwrap();
    assert_eq!(sprint.start_time, T0);
}

#[tokio::test]
async fn for_at_uses_the_user_timezone() {
    let (db, _notifier, handler) = handler();
    // T0 is 22:13:20 UTC; at +05:30 it is 03:43:20 local.
    db.set_user_setting(1, None, keys::TIMEZONE, "+05:30").unwrap();

    handler
        .dispatch(&invocation(1), &["for", "10", "at", ":50"], T0)
        .await
        .unwrap();

    let sprint = db.active_sprint(GUILD).unwrap().unwrap();
    assert_eq!(sprint.start_time, T0 + 7 * 60);
}

#[tokio::test]
async fn for_at_understands_named_timezones() {
    let (db, _notifier, handler) = handler();
    // 03:43:20 in Kolkata.
    db.set_user_setting(1, None, keys::TIMEZONE, "Asia/Kolkata").unwrap();

    handler
        .dispatch(&invocation(1), &["for", "10", "at", ":50"], T0)
        .await
        .unwrap();

    let sprint = db.active_sprint(GUILD).unwrap().unwrap();
    assert_eq!(sprint.start_time, T0 + 7 * 60);
}

#[tokio::test]
async fn for_at_in_utc() {
    let (db, _notifier, handler) = handler();
    db.set_user_setting(1, None, keys::TIMEZONE, "UTC").unwrap();

    handler
        .dispatch(&invocation(1), &["for", "10", "at", ":15"], T0)
        .await
        .unwrap();

    let sprint = db.active_sprint(GUILD).unwrap().unwrap();
    assert_eq!(sprint.start_time, T0 + 2 * 60);
}

#[tokio::test]
async fn for_at_needs_a_valid_timezone() {
    let (db, notifier, handler) = handler();

    let err = handler
        .dispatch(&invocation(1), &["for", "10", "at", ":15"], T0)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NoTimezone);

    db.set_user_setting(1, None, keys::TIMEZONE, "Mars/Olympus").unwrap();
    let err = handler
        .dispatch(&invocation(1), &["for", "10", "at", ":15"], T0)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NoTimezone);

    assert!(db.active_sprint(GUILD).unwrap().is_none());
    assert_eq!(notifier.count_containing("set your timezone"), 2);
}

#[tokio::test]
async fn oversized_counts_are_rejected_without_panicking() {
    let (db, _notifier, handler) = handler();
    handler.dispatch(&invocation(1), &["start"], T0).await.unwrap();
    let sprint = db.active_sprint(GUILD).unwrap().unwrap();

    let err = handler
        .dispatch(&invocation(2), &["join", "1e30"], T0)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgument);

    handler
        .dispatch(&invocation(2), &["join", "9223372036854775807"], T0)
        .await
        .unwrap();
    let err = handler
        .dispatch(&invocation(2), &["wc", "+1"], sprint.start_time + 60)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn declaring_through_commands() {
    let (db, notifier, handler) = handler();
    handler.dispatch(&invocation(1), &["start"], T0).await.unwrap();
    let sprint = db.active_sprint(GUILD).unwrap().unwrap();
    let now = sprint.start_time + 600;

    handler.dispatch(&invocation(1), &["wc", "400"], now).await.unwrap();
    handler.dispatch(&invocation(1), &["wc", "-50"], now).await.unwrap();

    let p = db.get_participant(sprint.id, 1).unwrap().unwrap();
    assert_eq!(p.current_wc, 350);
    assert_eq!(notifier.count_containing("your word count is now **350**"), 1);
}

#[tokio::test]
async fn personal_best_show_and_reset() {
    let (db, notifier, handler) = handler();
    db.set_record(3, keys::WPM_RECORD, 42.4).unwrap();

    handler.dispatch(&invocation(3), &["pb"], T0).await.unwrap();
    assert_eq!(notifier.count_containing("personal best is **42** wpm"), 1);

    handler.dispatch(&invocation(3), &["pb", "reset"], T0).await.unwrap();
    assert!(db.get_record(3, keys::WPM_RECORD).unwrap().is_none());

    handler.dispatch(&invocation(3), &["pb"], T0).await.unwrap();
    assert_eq!(notifier.count_containing("do not have a personal best"), 1);
}

#[tokio::test]
async fn notify_and_forget_toggle_the_subscription() {
    let (db, notifier, handler) = handler();

    handler.dispatch(&invocation(4), &["notify"], T0).await.unwrap();
    assert_eq!(
        db.users_with_setting(GUILD, keys::SPRINT_NOTIFY, "1").unwrap(),
        vec![4]
    );

    handler.dispatch(&invocation(1), &["start"], T0).await.unwrap();
    assert_eq!(notifier.count_containing("Notifying: <@4>"), 1);

    handler.dispatch(&invocation(4), &["forget"], T0).await.unwrap();
    assert!(db
        .users_with_setting(GUILD, keys::SPRINT_NOTIFY, "1")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn purge_drops_subscribers_who_left() {
    let (db, notifier, handler) = handler_with(ScriptedInteraction::with_members(vec![1]));
    for user in [1, 2, 3] {
        db.set_user_setting(user, Some(GUILD), keys::SPRINT_NOTIFY, "1")
            .unwrap();
    }

    let purged = handler.purge(&invocation(1)).await.unwrap();

    assert_eq!(purged, 2);
    assert_eq!(
        db.users_with_setting(GUILD, keys::SPRINT_NOTIFY, "1").unwrap(),
        vec![1]
    );
    assert_eq!(notifier.count_containing("Purged 2"), 1);
}
