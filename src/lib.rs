//! A multi-team treasure hunt: each team works through its own ordered list of
//! quests, answering riddles, optionally uploading a photo, asking for hints or
//! skipping. Quests may carry a quest-timer, which must run out before an answer
//! is accepted, and a hint-timer, which holds the hint back.
//!
//! ## Example usage
//! ```
//! use std::sync::Arc;
//! use treasure_hunt::{
//!     HuntManager, HuntRules, HuntStatus, MemoryQuestStore, Submission, SubmissionOutcome,
//!     TeamCredentials, TeamRegistry, default_seed, seed_if_empty,
//! };
//!
//! let store = Arc::new(MemoryQuestStore::new());
//! seed_if_empty(store.as_ref(), default_seed()).unwrap();
//!
//! let registry = TeamRegistry::new(vec![TeamCredentials {
//!     name: "TEAM1".into(),
//!     username: "red".into(),
//!     password: "ruby".into(),
//! }]);
//! let manager = HuntManager::new(registry, store, HuntRules::default());
//! manager.login("red", "ruby").unwrap();
//!
//! for answer in ["key", "skip", "maze"] {
//!     let HuntStatus::InProgress(view) = manager.status("TEAM1", None).unwrap() else {
//!         panic!("game ended early");
//!     };
//!     let submission = Submission { quest_id: view.quest_id, answer: answer.into(), upload: None };
//!     let outcome = manager.submit("TEAM1", submission).unwrap();
//!     assert!(!matches!(outcome, SubmissionOutcome::Incorrect { .. }));
//! }
//!
//! let HuntStatus::Finished(summary) = manager.status("TEAM1", None).unwrap() else {
//!     panic!("expected the game to be over");
//! };
//! assert_eq!((summary.quests_completed, summary.skip_count, summary.hint_count), (2, 1, 0));
//! ```

pub mod answer;
pub mod config;
pub mod error;
pub mod hunt_manager;
pub mod journal;
pub mod progression;
pub mod quest;
pub mod seed;
pub mod store;
pub mod team;
pub mod timer;
pub mod upload;

#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "server")]
pub mod sqlite_store;
#[cfg(feature = "server")]
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use answer::{SkipRule, Submission, SubmissionOutcome};
pub use config::{ConfigError, HuntConfig};
pub use error::{ErrorKind, HuntError};
pub use hunt_manager::{HuntManager, HuntRules};
pub use journal::Journal;
pub use progression::{FinishedSummary, HuntStatus, Notice, QuestStatusSnapshot, QuestView};
pub use quest::{AcceptedAnswers, NewQuest, Quest, QuestId, QuestMedia};
pub use seed::{QuestSeed, SeedError, default_seed, load_seed_file, seed_if_empty};
pub use store::{MemoryQuestStore, QuestStore, StoreError};
pub use team::{TeamCredentials, TeamRegistry, TeamSnapshot};
pub use timer::{QuestTimer, Remaining, TimerPhase};
pub use upload::{DiskUploadStore, Upload, UploadError, UploadStore};
