use serde::{Serialize, Deserialize};
use crate::error::HuntError;
use crate::progression::RefreshedTimers;
use crate::quest::{Quest, QuestId, normalize_answer};
use crate::upload::{Upload, UploadError, UploadStore};

/// Default answer that skips the current quest.
pub const DEFAULT_SKIP_ANSWER: &str = "skip";

/// An answer submitted for one quest.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub quest_id: QuestId,
    pub answer: String,
    pub upload: Option<Upload>,
}

/// What a submission did to the quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Completed { quest_number: u32 },
    Skipped { quest_number: u32 },
    /// Wrong answer. The quest stays current.
    Incorrect { quest_number: u32 },
    /// The quest was already done; nothing changed.
    AlreadyCompleted { quest_number: u32 },
}

/// The skip sentinel, compared after normalization. `None` disables skipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipRule(Option<String>);

impl SkipRule {
    pub fn new(sentinel: Option<&str>) -> Self {
        SkipRule(sentinel.map(normalize_answer).filter(|s| !s.is_empty()))
    }

    pub fn disabled() -> Self {
        SkipRule(None)
    }

    pub fn is_skip(&self, answer: &str) -> bool {
        self.0.as_deref().is_some_and(|sentinel| normalize_answer(answer) == sentinel)
    }
}

impl Default for SkipRule {
    fn default() -> Self {
        SkipRule::new(Some(DEFAULT_SKIP_ANSWER))
    }
}

/// Judge a submission against the current quest, whose timers have already
/// been refreshed to "now". Mutates `quest` only when the outcome is
/// `Completed` or `Skipped`; every error leaves it untouched.
///
/// Order of checks: quest-timer gate, skip sentinel, required upload, answer.
pub fn judge(
    quest: &mut Quest,
    timers: &RefreshedTimers,
    submission: &Submission,
    skip: &SkipRule,
    uploads: Option<&dyn UploadStore>,
) -> Result<SubmissionOutcome, HuntError> {
    let quest_number = quest.quest_number;
    if quest.completed {
        return Ok(SubmissionOutcome::AlreadyCompleted { quest_number });
    }

    if quest.quest_timer.is_blocking() {
        return Err(HuntError::TimerNotElapsed { remaining: timers.quest_remaining.to_string() });
    }

    if skip.is_skip(&submission.answer) {
        quest.mark_skipped();
        return Ok(SubmissionOutcome::Skipped { quest_number });
    }

    if quest.file_required {
        let upload = submission.upload.as_ref().ok_or(UploadError::Missing)?;
        let sink = uploads.ok_or_else(|| {
            UploadError::Io(std::io::Error::other("no upload storage configured"))
        })?;
        sink.store(&quest.team_name, quest_number, upload)?;
    } else if let (Some(upload), Some(sink)) = (submission.upload.as_ref(), uploads) {
        // Optional photo: keep it if we can, never block the answer on it.
        if !upload.bytes.is_empty() {
            if let Err(e) = sink.store(&quest.team_name, quest_number, upload) {
                tracing::warn!(team = %quest.team_name, quest_number, error = %e, "Optional upload not stored");
            }
        }
    }

    if quest.answers.matches(&submission.answer) {
        quest.mark_completed();
        Ok(SubmissionOutcome::Completed { quest_number })
    } else {
        Ok(SubmissionOutcome::Incorrect { quest_number })
    }
}
