use std::sync::Arc;
use std::time::Duration;
use crate::answer::{self, SkipRule, Submission, SubmissionOutcome};
use crate::error::HuntError;
use crate::journal::Journal;
use crate::progression::{
    self, FinishedSummary, HuntStatus, Notice, QuestStatusSnapshot, QuestView, RefreshedTimers, ViewContext,
};
use crate::quest::{Quest, QuestId};
use crate::store::QuestStore;
use crate::team::{TeamRegistry, TeamSnapshot};
use crate::timer::epoch_ms_now;
use crate::upload::UploadStore;

/// Game-wide rules that are not per-quest.
#[derive(Debug, Clone)]
pub struct HuntRules {
    pub game_duration: Duration,
    pub skip: SkipRule,
}

impl Default for HuntRules {
    fn default() -> Self {
        HuntRules { game_duration: Duration::from_secs(2 * 60 * 60), skip: SkipRule::default() }
    }
}

/// The session-state service shared by every request handler and the sweeper.
///
/// Cheap to clone: the registry, store, upload sink and journal are shared.
/// The `*_at` methods take an explicit "now" in epoch milliseconds; the plain
/// methods read the system clock.
#[derive(Clone)]
pub struct HuntManager {
    registry: TeamRegistry,
    store: Arc<dyn QuestStore>,
    uploads: Option<Arc<dyn UploadStore>>,
    journal: Journal,
    rules: HuntRules,
}

/// A team's current quest after its timers were brought up to date and persisted.
enum Position {
    NoSession,
    Finished,
    Current { team: TeamSnapshot, quest: Quest, timers: RefreshedTimers },
}

impl HuntManager {
    pub fn new(registry: TeamRegistry, store: Arc<dyn QuestStore>, rules: HuntRules) -> Self {
        HuntManager { registry, store, uploads: None, journal: Journal::disabled(), rules }
    }

    pub fn with_uploads(mut self, uploads: Arc<dyn UploadStore>) -> Self {
        self.uploads = Some(uploads);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn registry(&self) -> &TeamRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &HuntRules {
        &self.rules
    }

    /// Authenticate and start the team's stopwatch on first login.
    pub fn login(&self, username: &str, password: &str) -> Result<TeamSnapshot, HuntError> {
        self.login_at(username, password, epoch_ms_now())
    }

    pub fn login_at(&self, username: &str, password: &str, now_ms: u64) -> Result<TeamSnapshot, HuntError> {
        let team = self.registry.login(username, password, now_ms).inspect_err(|_| {
            tracing::warn!(username, "Failed login attempt");
        })?;
        self.journal.record_action(&team.name, "logged in", now_ms);
        Ok(team)
    }

    /// The session's team must be the team being asked about.
    pub fn authorize(&self, session_team: Option<&str>, requested_team: &str) -> Result<TeamSnapshot, HuntError> {
        match session_team {
            Some(team) if team == requested_team => self.registry.snapshot(team),
            _ => Err(HuntError::Unauthorized(requested_team.to_string())),
        }
    }

    /// Bring the current quest's timers up to date and persist any transition.
    /// Also ends the game for a team that has run out of quests.
    fn position(&self, team_name: &str, now_ms: u64) -> Result<Position, HuntError> {
        let team = self.registry.snapshot(team_name)?;
        if !team.session_active {
            return Ok(Position::NoSession);
        }
        if team.finished {
            return Ok(Position::Finished);
        }

        let Some(mut quest) = self.store.current_quest(team_name)? else {
            if self.registry.mark_finished(team_name)? {
                self.journal.record_action(team_name, "completed all quests", now_ms);
            }
            return Ok(Position::Finished);
        };

        let timers = progression::refresh_timers(&mut quest, now_ms);
        if timers.changed {
            tracing::debug!(
                team = %team_name,
                quest_number = quest.quest_number,
                quest_timer = ?quest.quest_timer.phase(),
                hint_timer = ?quest.hint_timer.phase(),
                "Quest timers advanced"
            );
            self.store.save_quest(&quest)?;
        }
        Ok(Position::Current { team, quest, timers })
    }

    pub fn status(&self, team: &str, notice: Option<Notice>) -> Result<HuntStatus, HuntError> {
        self.status_at(team, notice, epoch_ms_now())
    }

    /// What the team should see now: its current quest, or the finished summary.
    pub fn status_at(&self, team_name: &str, notice: Option<Notice>, now_ms: u64) -> Result<HuntStatus, HuntError> {
        match self.position(team_name, now_ms)? {
            Position::NoSession => Ok(HuntStatus::NoSession),
            Position::Finished => Ok(HuntStatus::Finished(self.finished_summary(team_name)?)),
            Position::Current { team, mut quest, timers } => {
                let timer_popup = progression::take_expiry_notice(&mut quest);
                if timer_popup {
                    self.store.save_quest(&quest)?;
                }
                let total_quests = self.store.totals(team_name)?.total;
                let view = QuestView::build(&quest, &timers, ViewContext {
                    team: &team,
                    total_quests,
                    game_duration: self.rules.game_duration,
                    now_ms,
                    timer_popup,
                    notice,
                });
                Ok(HuntStatus::InProgress(Box::new(view)))
            }
        }
    }

    pub fn quest_status(&self, team: &str) -> Result<QuestStatusSnapshot, HuntError> {
        self.quest_status_at(team, epoch_ms_now())
    }

    /// Polling snapshot. A team without a session, or with no quests left, reads as finished.
    pub fn quest_status_at(&self, team_name: &str, now_ms: u64) -> Result<QuestStatusSnapshot, HuntError> {
        Ok(match self.position(team_name, now_ms)? {
            Position::Current { quest, timers, .. } => QuestStatusSnapshot::current(&quest, &timers),
            Position::NoSession | Position::Finished => QuestStatusSnapshot::finished(),
        })
    }

    pub fn submit(&self, team: &str, submission: Submission) -> Result<SubmissionOutcome, HuntError> {
        self.submit_at(team, submission, epoch_ms_now())
    }

    /// Apply an answer submission to the team's current quest.
    pub fn submit_at(&self, team_name: &str, submission: Submission, now_ms: u64) -> Result<SubmissionOutcome, HuntError> {
        let (mut quest, timers) = match self.position(team_name, now_ms)? {
            Position::NoSession => return Err(HuntError::Unauthorized(team_name.to_string())),
            Position::Finished => return Err(HuntError::GameFinished),
            Position::Current { quest, timers, .. } => (quest, timers),
        };

        if quest.id != submission.quest_id {
            let requested = self
                .store
                .quest_by_id(team_name, submission.quest_id)?
                .ok_or(HuntError::QuestNotFound(submission.quest_id))?;
            if requested.completed {
                return Ok(SubmissionOutcome::AlreadyCompleted { quest_number: requested.quest_number });
            }
            return Err(HuntError::QuestNotCurrent { requested: submission.quest_id });
        }

        let uploads = self.uploads.as_deref();
        let outcome = answer::judge(&mut quest, &timers, &submission, &self.rules.skip, uploads)
            .inspect_err(|e| {
                tracing::info!(team = %team_name, quest_number = quest.quest_number, error = %e, "Submission rejected");
            })?;

        match &outcome {
            SubmissionOutcome::Completed { quest_number } => {
                self.store.save_quest(&quest)?;
                self.journal.record_action(team_name, &format!("completed quest {}", quest_number), now_ms);
            }
            SubmissionOutcome::Skipped { quest_number } => {
                self.store.save_quest(&quest)?;
                self.journal.record_action(team_name, &format!("skipped quest {}", quest_number), now_ms);
            }
            SubmissionOutcome::Incorrect { quest_number } => {
                tracing::info!(team = %team_name, quest_number, "Incorrect answer");
            }
            SubmissionOutcome::AlreadyCompleted { .. } => {}
        }
        Ok(outcome)
    }

    pub fn request_hint(&self, team: &str, quest_id: QuestId) -> Result<u32, HuntError> {
        self.request_hint_at(team, quest_id, epoch_ms_now())
    }

    /// Count a hint against the quest. Returns the quest's new hint count.
    pub fn request_hint_at(&self, team_name: &str, quest_id: QuestId, now_ms: u64) -> Result<u32, HuntError> {
        let mut quest = self
            .store
            .quest_by_id(team_name, quest_id)?
            .ok_or(HuntError::QuestNotFound(quest_id))?;
        quest.hints_used += 1;
        self.store.save_quest(&quest)?;
        self.journal.record_action(team_name, &format!("used hint on quest {}", quest.quest_number), now_ms);
        Ok(quest.hints_used)
    }

    /// Aggregate tallies over the team's quests.
    pub fn finished_summary(&self, team_name: &str) -> Result<FinishedSummary, HuntError> {
        Ok(FinishedSummary::from_totals(team_name, self.store.totals(team_name)?))
    }

    pub fn record_result(&self, team: &str) -> Result<FinishedSummary, HuntError> {
        self.record_result_at(team, epoch_ms_now())
    }

    /// Summary for the finished page. Appended to the results log the first time only.
    pub fn record_result_at(&self, team_name: &str, now_ms: u64) -> Result<FinishedSummary, HuntError> {
        let summary = self.finished_summary(team_name)?;
        if self.registry.claim_result_record(team_name)? {
            self.journal.record_result(&summary, now_ms);
        }
        Ok(summary)
    }

    pub fn sweep(&self) -> Result<Vec<String>, HuntError> {
        self.sweep_at(epoch_ms_now())
    }

    /// End the game for every team whose session has outlasted the game duration.
    pub fn sweep_at(&self, now_ms: u64) -> Result<Vec<String>, HuntError> {
        let ended = self.registry.sweep_expired(now_ms, self.rules.game_duration)?;
        for team in &ended {
            self.journal.record_action(team, "game ended by timer", now_ms);
        }
        Ok(ended)
    }
}
