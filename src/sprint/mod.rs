//! Sprint lifecycle: create, start, end, complete, and the participant
//! operations in between.
//!
//! Every transition re-reads the sprint from the store and goes through a
//! conditional update (`end_time != 0`, `completed_at = 0`), so a handler that
//! runs twice, or races a command on another shard, becomes a no-op instead of
//! double-counting XP or posting results twice.

pub mod messages;
pub mod scoring;

use crate::config::SprintConfig;
use crate::db::Database;
use crate::db::sprints::NewSprint;
use crate::directory::{ParticipantDirectory, keys};
use crate::error::{SprintError, SprintResult};
use crate::notifier::{Interaction, Invocation, Notifier, Target, say_or_log};
use crate::types::{
    ObjectKind, Participant, Sprint, SprintId, SprintState, SprintType, TaskKind, UserId,
};
use anyhow::Result;
use messages::ResultLine;
use scoring::{XP_COMPLETE_SPRINT, calculate_wpm, elapsed_seconds, rank};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a user joins a sprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinMode {
    /// Start from zero words.
    Fresh,
    /// Start from the given word count.
    Count(i64),
    /// Re-use the count, project and type of the user's previous sprint.
    Same,
    /// Take part without tracking words.
    NoWordcount,
}

/// A word-count submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration {
    /// The total word count.
    Absolute(i64),
    /// A signed change to the latest count.
    Delta(i64),
}

/// Drives sprints through their lifecycle.
#[derive(Clone)]
pub struct SprintLifecycle {
    db: Arc<Database>,
    directory: ParticipantDirectory,
    notifier: Arc<dyn Notifier>,
    config: SprintConfig,
}

impl SprintLifecycle {
    pub fn new(db: Arc<Database>, notifier: Arc<dyn Notifier>, config: SprintConfig) -> Self {
        let directory = ParticipantDirectory::new(Arc::clone(&db), Arc::clone(&notifier));
        Self {
            db,
            directory,
            notifier,
            config,
        }
    }

    pub fn directory(&self) -> &ParticipantDirectory {
        &self.directory
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    pub fn config(&self) -> &SprintConfig {
        &self.config
    }

    async fn say(&self, target: &Target, text: &str) {
        say_or_log(self.notifier.as_ref(), target, text).await;
    }

    fn participant_ids(&self, sprint_id: SprintId) -> Result<Vec<UserId>> {
        Ok(self
            .db
            .sprint_participants(sprint_id)?
            .into_iter()
            .map(|p| p.user_id)
            .collect())
    }

    /// `sprint_notify` subscribers who are not already in the sprint.
    fn subscribers_outside(&self, sprint: &Sprint) -> Result<Vec<UserId>> {
        let participants = self.participant_ids(sprint.id)?;
        Ok(self
            .directory
            .notify_subscribers(sprint.guild)?
            .into_iter()
            .filter(|u| !participants.contains(u))
            .collect())
    }

    fn active_sprint(&self, invocation: &Invocation) -> SprintResult<Sprint> {
        self.db
            .active_sprint(invocation.guild)?
            .ok_or_else(SprintError::no_active_sprint)
    }

    fn joined_participant(&self, sprint: &Sprint, user: UserId) -> SprintResult<Participant> {
        self.db
            .get_participant(sprint.id, user)?
            .ok_or_else(SprintError::not_joined)
    }

    fn can_manage(sprint: &Sprint, invocation: &Invocation) -> bool {
        sprint.created_by == invocation.user || invocation.can_manage_messages
    }

    // Scheduled task handlers

    /// Announce a delayed sprint's start and schedule its end.
    pub async fn task_start(&self, sprint_id: SprintId, now: i64) -> Result<()> {
        let Some(sprint) = self.db.get_sprint(sprint_id)? else {
            debug!(sprint_id, "start task for a sprint that no longer exists");
            return Ok(());
        };
        if sprint.state(now).is_finished() {
            debug!(sprint_id, "sprint already finished, skipping start");
            return Ok(());
        }
        let already_started = self
            .db
            .pending_tasks_for(ObjectKind::Sprint, sprint_id)?
            .iter()
            .any(|t| t.kind() == Some(TaskKind::SprintEnd));
        if already_started {
            debug!(sprint_id, "end task already scheduled, skipping duplicate start");
            return Ok(());
        }

        self.db
            .schedule_task(TaskKind::SprintEnd, sprint.end_time, Some(sprint_id))?;
        info!(sprint_id, guild = sprint.guild, "sprint started");

        let participants = self.participant_ids(sprint_id)?;
        let subscribers = self.subscribers_outside(&sprint)?;
        let text = messages::started(sprint.length, &participants, &subscribers);
        self.say(&Target::Channel(sprint.channel), &text).await;
        Ok(())
    }

    /// End the writing phase when the scheduled end arrives.
    pub async fn task_end(&self, sprint_id: SprintId, now: i64) -> Result<()> {
        let Some(sprint) = self.db.get_sprint(sprint_id)? else {
            debug!(sprint_id, "end task for a sprint that no longer exists");
            return Ok(());
        };
        if sprint.completed_at > 0 {
            return Ok(());
        }
        self.end(&sprint, &Target::Channel(sprint.channel), now, None)
            .await?;
        Ok(())
    }

    /// Score and close a sprint once the grace window is over.
    pub async fn task_complete(&self, sprint_id: SprintId, now: i64) -> Result<()> {
        let Some(sprint) = self.db.get_sprint(sprint_id)? else {
            debug!(sprint_id, "complete task for a sprint that no longer exists");
            return Ok(());
        };
        self.complete(&sprint, &Target::Channel(sprint.channel), now)
            .await?;
        Ok(())
    }

    // Transitions

    /// Write the end marker, ask for final counts and schedule completion.
    /// `end_reference` replaces the WPM window end when the sprint is ended
    /// early. Returns `false` when the sprint was already ended or completed.
    /// An ended sprint still waiting for completion gets its completion task
    /// back if it was lost.
    pub async fn end(
        &self,
        sprint: &Sprint,
        target: &Target,
        now: i64,
        end_reference: Option<i64>,
    ) -> Result<bool> {
        if !self.db.mark_sprint_ended(sprint.id, end_reference)? {
            debug!(sprint_id = sprint.id, "sprint already ended");
            if let Some(current) = self.db.get_sprint(sprint.id)? {
                if current.completed_at == 0 {
                    self.ensure_completion_scheduled(&current, now)?;
                }
            }
            return Ok(false);
        }

        let delay = self
            .directory
            .end_delay_minutes(sprint.guild, self.config.end_delay_minutes)?;
        self.db
            .schedule_task(TaskKind::SprintComplete, now + delay * 60, Some(sprint.id))?;
        info!(sprint_id = sprint.id, guild = sprint.guild, delay, "sprint ended");

        let participants = self.participant_ids(sprint.id)?;
        self.say(target, &messages::ended(delay, &participants)).await;
        Ok(true)
    }

    /// Mark the sprint completed, score it and post results. Returns `false`
    /// when another caller completed it first; nothing is scored twice.
    pub async fn complete(&self, sprint: &Sprint, target: &Target, now: i64) -> Result<bool> {
        if !self.db.mark_sprint_completed(sprint.id, now)? {
            debug!(sprint_id = sprint.id, "sprint already completed");
            return Ok(false);
        }
        info!(sprint_id = sprint.id, guild = sprint.guild, "sprint completed");
        self.say(target, &messages::results_coming()).await;

        let lines = self.score(sprint, target).await?;
        let text = if lines.is_empty() {
            messages::no_wordcounts()
        } else {
            messages::results(&lines)
        };
        self.say(target, &text).await;
        Ok(true)
    }

    async fn score(&self, sprint: &Sprint, target: &Target) -> Result<Vec<ResultLine>> {
        let mut scored: Vec<(UserId, i64)> = Vec::new();
        let mut wpm_by_user: Vec<(UserId, f64, bool)> = Vec::new();
        let mut no_wordcount: Vec<ResultLine> = Vec::new();
        let event = self.db.running_event(sprint.guild, sprint.end_reference)?;

        for p in self.db.sprint_participants(sprint.id)? {
            if p.sprint_type == SprintType::NoWordcount {
                self.directory
                    .add_xp(p.user_id, XP_COMPLETE_SPRINT, target)
                    .await?;
                self.directory
                    .add_stat(p.user_id, keys::SPRINTS_COMPLETED, 1)?;
                no_wordcount.push(ResultLine::NoWordcount {
                    user_id: p.user_id,
                    xp: XP_COMPLETE_SPRINT,
                });
                continue;
            }

            let ending = if p.ending_wc == 0 {
                p.current_wc
            } else {
                p.ending_wc
            };
            let written = ending - p.starting_wc;
            if ending <= 0 || written <= 0 {
                continue;
            }

            let seconds = elapsed_seconds(sprint.end_reference, p.time_joined, sprint.length);
            let wpm = calculate_wpm(written, seconds);
            let personal_best = match self.directory.get_record(p.user_id, keys::WPM_RECORD)? {
                Some(record) => wpm > record,
                None => true,
            };
            if personal_best {
                self.directory
                    .set_record(p.user_id, keys::WPM_RECORD, wpm)?;
            }

            self.directory
                .add_xp(p.user_id, XP_COMPLETE_SPRINT, target)
                .await?;
            self.directory
                .add_stat(p.user_id, keys::SPRINTS_COMPLETED, 1)?;
            self.directory
                .add_stat(p.user_id, keys::SPRINTS_WORDS_WRITTEN, written)?;
            self.directory
                .add_stat(p.user_id, keys::TOTAL_WORDS_WRITTEN, written)?;
            self.directory
                .add_to_goals(p.user_id, written, target)
                .await?;
            if let Some(project_id) = p.project_id {
                self.db.add_project_words(project_id, written)?;
            }
            if let Some(event_id) = event {
                self.db.add_event_words(event_id, p.user_id, written)?;
            }

            scored.push((p.user_id, written));
            wpm_by_user.push((p.user_id, wpm, personal_best));
        }

        let mut lines = Vec::with_capacity(scored.len() + no_wordcount.len());
        for placement in rank(&scored) {
            if placement.bonus_xp > 0 {
                self.directory
                    .add_xp(placement.user_id, placement.bonus_xp, target)
                    .await?;
            }
            if placement.won {
                self.directory
                    .add_stat(placement.user_id, keys::SPRINTS_WON, 1)?;
            }
            let (wpm, personal_best) = wpm_by_user
                .iter()
                .find(|(u, _, _)| *u == placement.user_id)
                .map(|(_, wpm, pb)| (*wpm, *pb))
                .unwrap_or((0.0, false));
            lines.push(ResultLine::Scored {
                user_id: placement.user_id,
                written: placement.written,
                wpm,
                xp: XP_COMPLETE_SPRINT + placement.bonus_xp,
                personal_best,
            });
        }
        lines.extend(no_wordcount);
        Ok(lines)
    }

    // Commands

    /// Create a sprint for the invoking guild. `length` and `delay` are in
    /// minutes; out-of-range values fall back to the defaults.
    pub async fn create(
        &self,
        invocation: &Invocation,
        length: Option<i64>,
        delay: Option<i64>,
        now: i64,
    ) -> SprintResult<Sprint> {
        let target = Target::Context(*invocation);

        // An ended sprint that was never completed would block the guild.
        if let Some(stale) = self.db.active_sprint(invocation.guild)? {
            if stale.state(now) == SprintState::Ended {
                self.db.delete_by_reference(ObjectKind::Sprint, stale.id)?;
                self.complete(&stale, &Target::Channel(stale.channel), now)
                    .await?;
            }
        }
        if self.db.active_sprint(invocation.guild)?.is_some() {
            return Err(SprintError::already_exists());
        }

        let length = match length {
            Some(l) if l > 0 && l <= self.config.max_length => l,
            _ => self.config.default_length,
        };
        let delay = match delay {
            Some(d) if d >= 0 && d <= self.config.max_delay => d,
            _ => self.config.default_delay,
        };

        let start_time = now + delay * 60;
        let end_time = start_time + length * 60;
        let sprint = self
            .db
            .create_sprint(&NewSprint {
                guild: invocation.guild,
                channel: invocation.channel,
                start_time,
                end_time,
                length,
                created_by: invocation.user,
                created_at: now,
            })?
            .ok_or_else(SprintError::already_exists)?;

        self.db
            .add_participant(sprint.id, invocation.user, 0, start_time, SprintType::Normal)?;
        self.directory
            .add_stat(invocation.user, keys::SPRINTS_STARTED, 1)?;
        info!(sprint_id = sprint.id, guild = sprint.guild, length, delay, "sprint created");

        let subscribers = self.subscribers_outside(&sprint)?;
        if delay == 0 {
            self.db
                .schedule_task(TaskKind::SprintEnd, end_time, Some(sprint.id))?;
            let text = messages::started(length, &[invocation.user], &subscribers);
            self.say(&target, &text).await;
        } else {
            self.db
                .schedule_task(TaskKind::SprintStart, start_time, Some(sprint.id))?;
            self.say(&target, &messages::scheduled(delay, length, &subscribers))
                .await;
        }
        Ok(sprint)
    }

    /// Join the guild's sprint, or reset the counts of an existing membership.
    pub async fn join(
        &self,
        invocation: &Invocation,
        mode: JoinMode,
        project: Option<&str>,
        now: i64,
    ) -> SprintResult<Participant> {
        let target = Target::Context(*invocation);
        let sprint = self.active_sprint(invocation)?;
        let state = sprint.state(now);
        if state.is_finished() {
            return Err(SprintError::already_ended());
        }

        let (starting_wc, sprint_type, project_id) = match mode {
            JoinMode::Fresh => (0, SprintType::Normal, None),
            JoinMode::Count(n) if n < 0 => {
                return Err(SprintError::invalid_argument(
                    "Your starting word count cannot be negative.",
                ));
            }
            JoinMode::Count(n) => (n, SprintType::Normal, None),
            JoinMode::NoWordcount => (0, SprintType::NoWordcount, None),
            JoinMode::Same => match self
                .db
                .most_recent_participation(invocation.user, sprint.id)?
            {
                Some(previous) => (
                    previous.latest_wc(),
                    previous.sprint_type,
                    previous.project_id,
                ),
                None => (0, SprintType::Normal, None),
            },
        };

        // Resolve the project before touching the sprint.
        let project = match project {
            Some(shortname) => Some(
                self.db
                    .get_project(invocation.user, shortname)?
                    .ok_or_else(|| SprintError::project_not_found(shortname))?,
            ),
            None => match project_id {
                Some(id) => self.db.get_project_by_id(id)?,
                None => None,
            },
        };

        let time_joined = now.max(sprint.start_time);
        let existing = self.db.get_participant(sprint.id, invocation.user)?;
        let reply = if existing.is_some() {
            let rejoin_time = (!state.has_started()).then_some(sprint.start_time);
            self.db.rejoin_participant(
                sprint.id,
                invocation.user,
                starting_wc,
                rejoin_time,
                sprint_type,
            )?;
            match sprint_type {
                SprintType::NoWordcount => messages::joined_no_wordcount(invocation.user),
                SprintType::Normal => messages::join_updated(invocation.user, starting_wc),
            }
        } else {
            self.db.add_participant(
                sprint.id,
                invocation.user,
                starting_wc,
                time_joined,
                sprint_type,
            )?;
            match sprint_type {
                SprintType::NoWordcount => messages::joined_no_wordcount(invocation.user),
                SprintType::Normal => messages::joined(invocation.user, starting_wc),
            }
        };
        debug!(sprint_id = sprint.id, user_id = invocation.user, starting_wc, "joined sprint");
        self.say(&target, &reply).await;

        if let Some(project) = project {
            self.db
                .set_participant_project(sprint.id, invocation.user, project.id)?;
            self.say(&target, &messages::project_set(invocation.user, &project.title))
                .await;
        }

        self.joined_participant(&sprint, invocation.user)
    }

    /// Leave the sprint. The last participant leaving cancels it.
    pub async fn leave(&self, invocation: &Invocation) -> SprintResult<()> {
        let target = Target::Context(*invocation);
        let sprint = self.active_sprint(invocation)?;
        self.joined_participant(&sprint, invocation.user)?;

        let remaining = self.db.remove_participant(sprint.id, invocation.user)?;
        self.say(&target, &messages::left(invocation.user)).await;

        if remaining == 0 {
            self.db.delete_sprint(sprint.id)?;
            self.directory
                .add_stat(sprint.created_by, keys::SPRINTS_STARTED, -1)?;
            info!(sprint_id = sprint.id, guild = sprint.guild, "sprint cancelled, no participants left");
            self.say(&target, &messages::left_cancelled()).await;
        }
        Ok(())
    }

    /// Delete the sprint, its participants and its pending tasks.
    pub async fn cancel(&self, invocation: &Invocation) -> SprintResult<()> {
        let sprint = self.active_sprint(invocation)?;
        if !Self::can_manage(&sprint, invocation) {
            return Err(SprintError::permission_denied("cancel"));
        }

        let participants = self.participant_ids(sprint.id)?;
        self.db.delete_sprint(sprint.id)?;
        if invocation.user == sprint.created_by {
            self.directory
                .add_stat(sprint.created_by, keys::SPRINTS_STARTED, -1)?;
        }
        info!(sprint_id = sprint.id, guild = sprint.guild, user_id = invocation.user, "sprint cancelled");
        self.say(&Target::Context(*invocation), &messages::cancelled(&participants))
            .await;
        Ok(())
    }

    /// End a running sprint now instead of at its scheduled end.
    pub async fn force_end(&self, invocation: &Invocation, now: i64) -> SprintResult<()> {
        let sprint = self.active_sprint(invocation)?;
        if !Self::can_manage(&sprint, invocation) {
            return Err(SprintError::permission_denied("end"));
        }
        match sprint.state(now) {
            SprintState::Scheduled => return Err(SprintError::not_started()),
            SprintState::Ended | SprintState::Completed => {
                return Err(SprintError::already_ended());
            }
            SprintState::Running => {}
        }

        self.db.delete_by_reference(ObjectKind::Sprint, sprint.id)?;

        if !self
            .end(&sprint, &Target::Context(*invocation), now, Some(now))
            .await?
        {
            return Err(SprintError::already_ended());
        }
        Ok(())
    }

    fn ensure_completion_scheduled(&self, sprint: &Sprint, now: i64) -> Result<()> {
        let pending = self.db.pending_tasks_for(ObjectKind::Sprint, sprint.id)?;
        if !pending
            .iter()
            .any(|t| t.kind() == Some(TaskKind::SprintComplete))
        {
            let delay = self
                .directory
                .end_delay_minutes(sprint.guild, self.config.end_delay_minutes)?;
            warn!(sprint_id = sprint.id, "rescheduling lost completion task");
            self.db
                .schedule_task(TaskKind::SprintComplete, now + delay * 60, Some(sprint.id))?;
        }
        Ok(())
    }

    /// Record a word count. Declarations after the end are final counts; once
    /// every word-count participant has one, the sprint completes immediately.
    pub async fn declare(
        &self,
        invocation: &Invocation,
        declaration: Declaration,
        interaction: &dyn Interaction,
        now: i64,
    ) -> SprintResult<i64> {
        let target = Target::Context(*invocation);
        let sprint = self.active_sprint(invocation)?;
        let participant = self.joined_participant(&sprint, invocation.user)?;
        let state = sprint.state(now);
        if !state.has_started() {
            return Err(SprintError::not_started());
        }
        if participant.sprint_type == SprintType::NoWordcount {
            return Err(SprintError::no_wordcount());
        }

        let new_count = match declaration {
            Declaration::Absolute(n) => {
                if n < participant.starting_wc {
                    return Err(SprintError::word_count_too_low(participant.starting_wc));
                }
                n
            }
            Declaration::Delta(d) => participant.latest_wc().checked_add(d).ok_or_else(|| {
                SprintError::invalid_argument("That word count is too large.")
            })?,
        };
        if new_count < 0 {
            return Err(SprintError::invalid_argument(
                "Your word count cannot go below zero.",
            ));
        }

        let written = new_count - participant.starting_wc;
        let reference = sprint.end_reference.min(now);
        let wpm = calculate_wpm(
            written,
            elapsed_seconds(reference, participant.time_joined, sprint.length),
        );
        let limit = self
            .directory
            .wpm_limit(invocation.user, self.config.wpm_check)?;
        if wpm > limit as f64
            && !interaction
                .confirm(invocation, &messages::wpm_confirm(written, wpm))
                .await
        {
            return Err(SprintError::declined());
        }

        let ended = state.is_finished();
        if ended {
            self.db
                .set_ending_wc(sprint.id, invocation.user, new_count)?;
        } else {
            self.db
                .set_current_wc(sprint.id, invocation.user, new_count)?;
        }
        self.say(&target, &messages::declared(invocation.user, new_count, written))
            .await;

        if ended && self.db.undeclared_count(sprint.id)? == 0 {
            debug!(sprint_id = sprint.id, "all participants declared, completing early");
            self.db.delete_by_reference(ObjectKind::Sprint, sprint.id)?;
            self.complete(&sprint, &target, now).await?;
        }
        Ok(new_count)
    }

    /// Attach one of the user's projects to their participation.
    pub async fn set_project(&self, invocation: &Invocation, shortname: &str) -> SprintResult<()> {
        let sprint = self.active_sprint(invocation)?;
        self.joined_participant(&sprint, invocation.user)?;
        let project = self
            .db
            .get_project(invocation.user, shortname)?
            .ok_or_else(|| SprintError::project_not_found(shortname))?;
        self.db
            .set_participant_project(sprint.id, invocation.user, project.id)?;
        self.say(
            &Target::Context(*invocation),
            &messages::project_set(invocation.user, &project.title),
        )
        .await;
        Ok(())
    }

    /// Report the user's progress in the running sprint.
    pub async fn status(&self, invocation: &Invocation, now: i64) -> SprintResult<()> {
        let sprint = self.active_sprint(invocation)?;
        let participant = self.joined_participant(&sprint, invocation.user)?;
        if !sprint.state(now).has_started() {
            return Err(SprintError::not_started());
        }

        let current = participant.latest_wc();
        let written = current - participant.starting_wc;
        let seconds = now - participant.time_joined;
        let elapsed = round1(seconds as f64 / 60.0);
        let wpm = calculate_wpm(written, seconds);
        let left = round1(((sprint.end_time - now).max(0)) as f64 / 60.0);
        let text = messages::status(invocation.user, current, written, elapsed, wpm, left);
        self.say(&Target::Context(*invocation), &text).await;
        Ok(())
    }

    /// Report time until the start, time left, or that counts are awaited.
    pub async fn time(&self, invocation: &Invocation, now: i64) -> SprintResult<()> {
        let sprint = self.active_sprint(invocation)?;
        let text = match sprint.state(now) {
            SprintState::Scheduled => messages::starts_in(invocation.user, sprint.start_time - now),
            SprintState::Running => messages::time_left(invocation.user, sprint.end_time - now),
            SprintState::Ended | SprintState::Completed => {
                messages::waiting_for_wordcounts(invocation.user)
            }
        };
        self.say(&Target::Context(*invocation), &text).await;
        Ok(())
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
