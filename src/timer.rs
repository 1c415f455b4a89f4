use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use serde::{Serialize, Deserialize};

/// Milliseconds since the unix epoch, the clock every timer and stopwatch is measured on.
pub fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A countdown attached to a quest. Used for both the quest-timer (gates answer
/// submission) and the hint-timer (gates when the hint is offered).
///
/// Timers are never scheduled. They are advanced lazily by [`evaluate_timer`]
/// whenever the owning quest is read, and the caller persists the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestTimer {
    pub required: bool,
    pub duration_secs: u64,
    pub end_time_ms: Option<u64>,
    pub running: bool,
    pub finished: bool,
    /// Set once the expiry has been reported to the team, so the "time's up"
    /// notice appears exactly once for this timer.
    #[serde(default)]
    pub expiry_acknowledged: bool,
}

/// Derived lifecycle phase of a [`QuestTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    NotRequired,
    Pending,
    Running,
    Finished,
}

impl QuestTimer {
    pub fn not_required() -> Self {
        QuestTimer::default()
    }

    pub fn required(duration: Duration) -> Self {
        QuestTimer {
            required: true,
            duration_secs: duration.as_secs(),
            ..QuestTimer::default()
        }
    }

    /// Builds a timer from an optional duration in seconds, as found in seed data.
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            Some(secs) => QuestTimer::required(Duration::from_secs(secs)),
            None => QuestTimer::not_required(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn phase(&self) -> TimerPhase {
        match (self.required, self.running, self.finished) {
            (false, _, _) => TimerPhase::NotRequired,
            (true, _, true) => TimerPhase::Finished,
            (true, true, false) => TimerPhase::Running,
            (true, false, false) => TimerPhase::Pending,
        }
    }

    /// True while a required timer has not yet run out. Pending counts as
    /// blocking, since the next evaluation will start it.
    pub fn is_blocking(&self) -> bool {
        matches!(self.phase(), TimerPhase::Pending | TimerPhase::Running)
    }
}

/// Time left on a running timer. Empty when the timer is finished, pending or not required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Remaining(Option<Duration>);

impl Remaining {
    pub fn none() -> Self {
        Remaining(None)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Remaining {
    /// Renders as `HH:MM:SS`, or as an empty string when nothing remains.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            None => Ok(()),
            Some(d) => write!(f, "{}", format_clock(d)),
        }
    }
}

/// Formats a duration as `HH:MM:SS`, truncating sub-second precision.
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Advance a timer to `now_ms` and report what is left on it.
///
/// * pending → running: `end_time = now + duration`
/// * running → finished: once `now >= end_time`
///
/// Both transitions may happen in a single call for a zero-length timer.
/// Finished and not-required timers are returned unchanged.
pub fn evaluate_timer(timer: &QuestTimer, now_ms: u64) -> (QuestTimer, Remaining) {
    let mut next = *timer;

    match timer.phase() {
        TimerPhase::NotRequired | TimerPhase::Finished => return (next, Remaining::none()),
        TimerPhase::Pending => {
            next.end_time_ms = Some(now_ms.saturating_add(timer.duration_secs.saturating_mul(1000)));
            next.running = true;
        }
        TimerPhase::Running => {
            // A running timer that lost its deadline is restarted from now.
            if next.end_time_ms.is_none() {
                next.end_time_ms = Some(now_ms.saturating_add(timer.duration_secs.saturating_mul(1000)));
            }
        }
    }

    let end = next.end_time_ms.unwrap_or(now_ms);
    if now_ms >= end {
        next.running = false;
        next.finished = true;
        return (next, Remaining::none());
    }

    (next, Remaining(Some(Duration::from_millis(end - now_ms))))
}
