use serde::{Serialize, Deserialize};
use crate::timer::QuestTimer;

/// Row id of a quest record in the store.
pub type QuestId = i64;

/// Separator between alternatives in an accepted-answer set.
pub const ANSWER_SEPARATOR: char = '|';

/// Trim surrounding whitespace and case-fold. Applied to both sides of every comparison.
pub fn normalize_answer(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The alternatives a quest accepts, kept in their pipe-delimited form, e.g. `"key|KEY "`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcceptedAnswers(String);

impl AcceptedAnswers {
    pub fn new(raw: impl Into<String>) -> Self {
        AcceptedAnswers(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized, non-empty alternatives.
    pub fn alternatives(&self) -> impl Iterator<Item = String> + '_ {
        self.0
            .split(ANSWER_SEPARATOR)
            .map(normalize_answer)
            .filter(|alt| !alt.is_empty())
    }

    /// True when `submitted` equals any alternative after normalization. A blank
    /// submission never matches.
    pub fn matches(&self, submitted: &str) -> bool {
        let submitted = normalize_answer(submitted);
        if submitted.is_empty() {
            return false;
        }
        self.alternatives().any(|alt| alt == submitted)
    }
}

/// Optional clue media. Stored as references (paths or URLs), never as blobs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

/// A quest record as it is about to be inserted, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuest {
    pub team_name: String,
    pub quest_number: u32,
    pub text: String,
    pub answers: AcceptedAnswers,
    pub hint: Option<String>,
    pub media: QuestMedia,
    pub file_required: bool,
    pub quest_timer: QuestTimer,
    pub hint_timer: QuestTimer,
}

/// One step of the hunt for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub team_name: String,
    pub quest_number: u32,
    pub text: String,
    pub answers: AcceptedAnswers,
    pub hint: Option<String>,
    pub media: QuestMedia,
    pub file_required: bool,
    pub completed: bool,
    pub skipped: bool,
    pub hints_used: u32,
    pub quest_timer: QuestTimer,
    pub hint_timer: QuestTimer,
}

impl Quest {
    pub fn from_new(id: QuestId, new: NewQuest) -> Quest {
        Quest {
            id,
            team_name: new.team_name,
            quest_number: new.quest_number,
            text: new.text,
            answers: new.answers,
            hint: new.hint,
            media: new.media,
            file_required: new.file_required,
            completed: false,
            skipped: false,
            hints_used: 0,
            quest_timer: new.quest_timer,
            hint_timer: new.hint_timer,
        }
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Skipping also completes the quest.
    pub fn mark_skipped(&mut self) {
        self.skipped = true;
        self.completed = true;
    }
}

/// Aggregate counters over one team's quests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestTotals {
    pub total: u32,
    pub completed: u32,
    pub skipped: u32,
    pub hints_used: u32,
}

impl QuestTotals {
    pub fn tally<'a>(quests: impl IntoIterator<Item = &'a Quest>) -> QuestTotals {
        quests.into_iter().fold(QuestTotals::default(), |mut acc, q| {
            acc.total += 1;
            acc.completed += q.completed as u32;
            acc.skipped += q.skipped as u32;
            acc.hints_used += q.hints_used;
            acc
        })
    }

    /// Quests solved by answering rather than skipping.
    pub fn solved(&self) -> u32 {
        self.completed.saturating_sub(self.skipped)
    }
}
