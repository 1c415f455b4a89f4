use std::collections::BTreeMap;
use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::quest::{AcceptedAnswers, NewQuest, QuestMedia};
use crate::store::{QuestStore, StoreError};
use crate::timer::QuestTimer;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Error: Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error: Failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Error: Team {team} quests must be numbered 1..{count} without gaps, found {found:?}.")]
    NotDense { team: String, count: usize, found: Vec<u32> },
    #[error("Error: Quest {quest_number} for team {team} has no accepted answer.")]
    NoAnswer { team: String, quest_number: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One quest as written in the seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestSeed {
    pub team: String,
    pub quest_number: u32,
    pub text: String,
    /// Pipe-delimited alternatives, e.g. `"key|old key"`.
    pub answer: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub file_required: bool,
    #[serde(default)]
    pub quest_timer_secs: Option<u64>,
    #[serde(default)]
    pub hint_timer_secs: Option<u64>,
}

impl From<QuestSeed> for NewQuest {
    fn from(seed: QuestSeed) -> NewQuest {
        NewQuest {
            team_name: seed.team,
            quest_number: seed.quest_number,
            text: seed.text,
            answers: AcceptedAnswers::new(seed.answer),
            hint: seed.hint,
            media: QuestMedia { image: seed.image, audio: seed.audio },
            file_required: seed.file_required,
            quest_timer: QuestTimer::from_secs(seed.quest_timer_secs),
            hint_timer: QuestTimer::from_secs(seed.hint_timer_secs),
        }
    }
}

fn simple(team: &str, quest_number: u32, text: &str, answer: &str) -> QuestSeed {
    QuestSeed {
        team: team.to_string(),
        quest_number,
        text: text.to_string(),
        answer: answer.to_string(),
        hint: None,
        image: None,
        audio: None,
        file_required: false,
        quest_timer_secs: None,
        hint_timer_secs: None,
    }
}

/// Built-in roster used when no seed file is configured.
pub fn default_seed() -> Vec<QuestSeed> {
    vec![
        simple("TEAM1", 1, "Find the hidden key.", "key"),
        simple("TEAM1", 2, "Solve the ancient puzzle.", "puzzle"),
        simple("TEAM1", 3, "Navigate the maze to the treasure.", "maze"),
        simple("TEAM2", 1, "Find the lost artifact.", "artifact"),
        simple("TEAM2", 2, "Decode the ancient script.", "decode"),
        simple("TEAM2", 3, "Escape the labyrinth.", "escape"),
        simple("TEAM3", 1, "Discover the secret map.", "map"),
        simple("TEAM3", 2, "Unlock the treasure chest.", "chest"),
        simple("TEAM3", 3, "Defeat the guardian.", "guardian"),
    ]
}

/// Reads a JSON array of [`QuestSeed`]s.
pub fn load_seed_file(path: impl AsRef<Path>) -> Result<Vec<QuestSeed>, SeedError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Checks that every team's quests are numbered densely from 1 and that every
/// quest accepts at least one answer.
pub fn validate_seed(seeds: &[QuestSeed]) -> Result<(), SeedError> {
    let mut by_team: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for seed in seeds {
        if AcceptedAnswers::new(seed.answer.as_str()).alternatives().next().is_none() {
            return Err(SeedError::NoAnswer { team: seed.team.clone(), quest_number: seed.quest_number });
        }
        by_team.entry(seed.team.as_str()).or_default().push(seed.quest_number);
    }
    for (team, mut numbers) in by_team {
        numbers.sort_unstable();
        let dense = numbers.iter().enumerate().all(|(i, n)| *n as usize == i + 1);
        if !dense {
            return Err(SeedError::NotDense { team: team.to_string(), count: numbers.len(), found: numbers });
        }
    }
    Ok(())
}

/// Inserts `seeds` unless the store already holds quests. Returns how many were inserted.
pub fn seed_if_empty(store: &dyn QuestStore, seeds: Vec<QuestSeed>) -> Result<usize, SeedError> {
    if store.count_quests()? > 0 {
        tracing::info!("Quest store already seeded");
        return Ok(0);
    }
    validate_seed(&seeds)?;
    let count = store.insert_batch(seeds.into_iter().map(NewQuest::from).collect())?.len();
    tracing::info!(count, "Quest store seeded");
    Ok(count)
}
