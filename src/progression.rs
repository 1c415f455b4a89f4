//! Which quest a team is on, and what the team sees.
//!
//! Every read path goes through [`refresh_timers`], which advances both timers
//! of the current quest to "now". The caller persists the quest whenever the
//! refresh reports a change, before acting on the timer state.

use std::time::Duration;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Deserialize};
use crate::quest::{Quest, QuestId, QuestMedia, QuestTotals};
use crate::team::TeamSnapshot;
use crate::timer::{QuestTimer, Remaining, evaluate_timer, format_clock};

/// Result of advancing both timers of a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshedTimers {
    pub quest_remaining: Remaining,
    pub hint_remaining: Remaining,
    /// True when either timer changed and the quest must be persisted.
    pub changed: bool,
}

/// Advance both timers of `quest` to `now_ms` in place.
pub fn refresh_timers(quest: &mut Quest, now_ms: u64) -> RefreshedTimers {
    let (quest_timer, quest_remaining) = evaluate_timer(&quest.quest_timer, now_ms);
    let (hint_timer, hint_remaining) = evaluate_timer(&quest.hint_timer, now_ms);
    let changed = quest_timer != quest.quest_timer || hint_timer != quest.hint_timer;
    quest.quest_timer = quest_timer;
    quest.hint_timer = hint_timer;
    RefreshedTimers { quest_remaining, hint_remaining, changed }
}

/// Acknowledge a freshly expired quest-timer. Returns true exactly once per
/// quest, the first time the expiry is displayed.
pub fn take_expiry_notice(quest: &mut Quest) -> bool {
    let timer = &mut quest.quest_timer;
    if timer.required && timer.finished && !timer.expiry_acknowledged {
        timer.expiry_acknowledged = true;
        return true;
    }
    false
}

fn rfc3339(ms: u64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms as i64).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Message carried over from the previous submission via the redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Success(String),
    Skipped,
    Error(String),
}

/// Display state of one timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerView {
    pub required: bool,
    pub running: bool,
    pub finished: bool,
    /// `HH:MM:SS`, empty once finished or when not running.
    pub remaining: String,
    pub end_time: Option<String>,
}

impl TimerView {
    pub fn new(timer: &QuestTimer, remaining: Remaining) -> TimerView {
        TimerView {
            required: timer.required,
            running: timer.running,
            finished: timer.finished,
            remaining: remaining.to_string(),
            end_time: timer.end_time_ms.and_then(rfc3339),
        }
    }
}

/// The team's stopwatch, as shown alongside every quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClock {
    pub started_at: Option<String>,
    pub elapsed: String,
    pub game_remaining: String,
}

impl SessionClock {
    pub fn new(team: &TeamSnapshot, game_duration: Duration, now_ms: u64) -> SessionClock {
        let elapsed = team.elapsed(now_ms);
        SessionClock {
            started_at: team.session_started_ms.and_then(rfc3339),
            elapsed: format_clock(elapsed),
            game_remaining: format_clock(game_duration.saturating_sub(elapsed)),
        }
    }
}

/// Everything the hunt page needs to render the current quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestView {
    pub team: String,
    pub quest_id: QuestId,
    pub quest_number: u32,
    pub total_quests: u32,
    pub text: String,
    pub hint: Option<String>,
    /// False while a required hint-timer is still counting down.
    pub hint_available: bool,
    pub hints_used: u32,
    pub media: QuestMedia,
    pub file_required: bool,
    pub quest_timer: TimerView,
    pub hint_timer: TimerView,
    /// Show the "time's up" notice for the quest-timer.
    pub timer_popup: bool,
    pub clock: SessionClock,
    pub notice: Option<Notice>,
}

/// Inputs to [`QuestView::build`] besides the quest itself.
#[derive(Debug, Clone)]
pub struct ViewContext<'a> {
    pub team: &'a TeamSnapshot,
    pub total_quests: u32,
    pub game_duration: Duration,
    pub now_ms: u64,
    pub timer_popup: bool,
    pub notice: Option<Notice>,
}

impl QuestView {
    /// The single place a display payload is assembled, for every success and error path.
    pub fn build(quest: &Quest, timers: &RefreshedTimers, ctx: ViewContext<'_>) -> QuestView {
        let hint_available = quest.hint.is_some() && !quest.hint_timer.is_blocking();
        QuestView {
            team: ctx.team.name.clone(),
            quest_id: quest.id,
            quest_number: quest.quest_number,
            total_quests: ctx.total_quests,
            text: quest.text.clone(),
            hint: quest.hint.clone(),
            hint_available,
            hints_used: quest.hints_used,
            media: quest.media.clone(),
            file_required: quest.file_required,
            quest_timer: TimerView::new(&quest.quest_timer, timers.quest_remaining),
            hint_timer: TimerView::new(&quest.hint_timer, timers.hint_remaining),
            timer_popup: ctx.timer_popup,
            clock: SessionClock::new(ctx.team, ctx.game_duration, ctx.now_ms),
            notice: ctx.notice,
        }
    }
}

/// End-of-game tallies for one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedSummary {
    pub team: String,
    pub hint_count: u32,
    pub skip_count: u32,
    /// Completed quests that were not skipped.
    pub quests_completed: u32,
    pub total_quests: u32,
}

impl FinishedSummary {
    pub fn from_totals(team: &str, totals: QuestTotals) -> FinishedSummary {
        FinishedSummary {
            team: team.to_string(),
            hint_count: totals.hints_used,
            skip_count: totals.skipped,
            quests_completed: totals.solved(),
            total_quests: totals.total,
        }
    }
}

/// Where a team stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum HuntStatus {
    NoSession,
    InProgress(Box<QuestView>),
    Finished(FinishedSummary),
}

/// Lightweight snapshot for client-side polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestStatusSnapshot {
    pub quest_number: Option<u32>,
    pub quest_id: Option<QuestId>,
    pub quest_timer: Option<TimerView>,
    pub hint_timer: Option<TimerView>,
    pub finished: bool,
}

impl QuestStatusSnapshot {
    pub fn finished() -> Self {
        QuestStatusSnapshot { quest_number: None, quest_id: None, quest_timer: None, hint_timer: None, finished: true }
    }

    pub fn current(quest: &Quest, timers: &RefreshedTimers) -> Self {
        QuestStatusSnapshot {
            quest_number: Some(quest.quest_number),
            quest_id: Some(quest.id),
            quest_timer: Some(TimerView::new(&quest.quest_timer, timers.quest_remaining)),
            hint_timer: Some(TimerView::new(&quest.hint_timer, timers.hint_remaining)),
            finished: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::{AcceptedAnswers, NewQuest};

    fn quest(quest_timer: QuestTimer, hint_timer: QuestTimer) -> Quest {
        Quest::from_new(7, NewQuest {
            team_name: "TEAM1".into(),
            quest_number: 2,
            text: "Solve the ancient puzzle.".into(),
            answers: AcceptedAnswers::new("puzzle"),
            hint: Some("Look under the bench.".into()),
            media: QuestMedia { image: Some("/media/puzzle.png".into()), audio: None },
            file_required: false,
            quest_timer,
            hint_timer,
        })
    }

    fn team() -> TeamSnapshot {
        TeamSnapshot {
            name: "TEAM1".into(),
            username: "red".into(),
            session_started_ms: Some(0),
            session_active: true,
            finished: false,
        }
    }

    #[test]
    fn test_refresh_reports_changes_only_on_transition() {
        let mut q = quest(QuestTimer::required(Duration::from_secs(60)), QuestTimer::not_required());
        assert!(refresh_timers(&mut q, 1_000).changed);
        let again = refresh_timers(&mut q, 2_000);
        assert!(!again.changed);
        assert_eq!(again.quest_remaining.duration(), Some(Duration::from_secs(59)));
        assert!(refresh_timers(&mut q, 61_000).changed);
        assert!(q.quest_timer.finished);
    }

    #[test]
    fn test_refresh_is_idempotent_for_untimed_quest() {
        let mut q = quest(QuestTimer::not_required(), QuestTimer::not_required());
        let before = q.clone();
        assert!(!refresh_timers(&mut q, 5_000).changed);
        assert_eq!(q, before);
    }

    #[test]
    fn test_timers_evaluate_independently() {
        let mut q = quest(
            QuestTimer::required(Duration::from_secs(10)),
            QuestTimer::required(Duration::from_secs(30)),
        );
        refresh_timers(&mut q, 0);
        let t = refresh_timers(&mut q, 15_000);
        assert!(q.quest_timer.finished);
        assert!(q.hint_timer.running);
        assert!(t.quest_remaining.is_empty());
        assert_eq!(t.hint_remaining.to_string(), "00:00:15");
    }

    #[test]
    fn test_expiry_notice_shown_once() {
        let mut q = quest(QuestTimer::required(Duration::from_secs(1)), QuestTimer::not_required());
        refresh_timers(&mut q, 0);
        assert!(!take_expiry_notice(&mut q));
        refresh_timers(&mut q, 2_000);
        assert!(take_expiry_notice(&mut q));
        assert!(!take_expiry_notice(&mut q));
    }

    #[test]
    fn test_view_hides_hint_until_hint_timer_finishes() {
        let mut q = quest(QuestTimer::not_required(), QuestTimer::required(Duration::from_secs(30)));
        let t = refresh_timers(&mut q, 0);
        let snapshot = team();
        let ctx = ViewContext {
            team: &snapshot,
            total_quests: 3,
            game_duration: Duration::from_secs(7200),
            now_ms: 0,
            timer_popup: false,
            notice: None,
        };
        let view = QuestView::build(&q, &t, ctx.clone());
        assert!(!view.hint_available);
        assert_eq!(view.hint_timer.remaining, "00:00:30");
        assert_eq!(view.hint_timer.end_time.as_deref(), Some("1970-01-01T00:00:30.000Z"));

        let t = refresh_timers(&mut q, 30_000);
        let view = QuestView::build(&q, &t, ViewContext { now_ms: 30_000, ..ctx });
        assert!(view.hint_available);
        assert!(view.hint_timer.finished);
        assert_eq!(view.hint_timer.remaining, "");
        assert_eq!(view.clock.elapsed, "00:00:30");
        assert_eq!(view.clock.game_remaining, "01:59:30");
    }

    #[test]
    fn test_view_carries_quest_payload() {
        let mut q = quest(QuestTimer::not_required(), QuestTimer::not_required());
        q.hints_used = 2;
        let t = refresh_timers(&mut q, 0);
        let snapshot = team();
        let view = QuestView::build(&q, &t, ViewContext {
            team: &snapshot,
            total_quests: 3,
            game_duration: Duration::from_secs(60),
            now_ms: 90_000,
            timer_popup: false,
            notice: Some(Notice::Skipped),
        });
        assert_eq!(view.quest_id, 7);
        assert_eq!(view.quest_number, 2);
        assert_eq!(view.hints_used, 2);
        assert!(view.hint_available);
        assert_eq!(view.media.image.as_deref(), Some("/media/puzzle.png"));
        assert_eq!(view.clock.started_at.as_deref(), Some("1970-01-01T00:00:00.000Z"));
        assert_eq!(view.clock.game_remaining, "00:00:00");
        assert_eq!(view.notice, Some(Notice::Skipped));
    }

    #[test]
    fn test_summary_subtracts_skips() {
        let summary = FinishedSummary::from_totals("TEAM1", QuestTotals { total: 3, completed: 3, skipped: 1, hints_used: 0 });
        assert_eq!(summary.quests_completed, 2);
        assert_eq!(summary.skip_count, 1);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["questsCompleted"], 2);
        assert_eq!(json["hintCount"], 0);
    }

    #[test]
    fn test_status_snapshot_uses_camel_case() {
        let mut q = quest(QuestTimer::required(Duration::from_secs(5)), QuestTimer::not_required());
        let t = refresh_timers(&mut q, 0);
        let json = serde_json::to_value(QuestStatusSnapshot::current(&q, &t)).unwrap();
        assert_eq!(json["questNumber"], 2);
        assert_eq!(json["questTimer"]["running"], true);
        assert_eq!(json["questTimer"]["remaining"], "00:00:05");
        assert_eq!(json["finished"], false);
    }
}
