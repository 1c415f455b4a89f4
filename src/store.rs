use std::sync::Mutex;
use crate::quest::{NewQuest, Quest, QuestId, QuestTotals};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Error: Database error: {0}")]
    Database(String),
    #[error("Error: Serialization error: {0}")]
    Serialization(String),
    #[error("Error: Quest {0} does not exist.")]
    QuestNotFound(QuestId),
    #[error("Error: Team {team} already has a quest numbered {quest_number}.")]
    DuplicateQuest { team: String, quest_number: u32 },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Durable collection of quest records, keyed by team and quest number.
///
/// Each method is an atomic read or write on its own. Read-then-write
/// sequences spanning several calls are last-write-wins.
pub trait QuestStore: Send + Sync {
    fn insert_quest(&self, quest: NewQuest) -> Result<QuestId, StoreError>;

    /// Insert every quest or none of them. Ids come back in input order.
    fn insert_batch(&self, quests: Vec<NewQuest>) -> Result<Vec<QuestId>, StoreError>;

    fn count_quests(&self) -> Result<usize, StoreError>;

    /// The lowest-numbered incomplete quest for `team`, if any remain.
    fn current_quest(&self, team: &str) -> Result<Option<Quest>, StoreError>;

    /// A quest by id, only if it belongs to `team`.
    fn quest_by_id(&self, team: &str, id: QuestId) -> Result<Option<Quest>, StoreError>;

    /// Overwrite a previously inserted quest.
    fn save_quest(&self, quest: &Quest) -> Result<(), StoreError>;

    /// All of a team's quests ordered by quest number.
    fn team_quests(&self, team: &str) -> Result<Vec<Quest>, StoreError>;

    fn totals(&self, team: &str) -> Result<QuestTotals, StoreError> {
        Ok(QuestTotals::tally(&self.team_quests(team)?))
    }
}

/// Volatile [`QuestStore`] backed by a vector. Useful for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryQuestStore {
    quests: Mutex<Vec<Quest>>,
}

impl MemoryQuestStore {
    pub fn new() -> Self {
        MemoryQuestStore::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Quest>>, StoreError> {
        self.quests.lock().map_err(|_| StoreError::Database("quest store lock poisoned".into()))
    }
}

impl QuestStore for MemoryQuestStore {
    fn insert_quest(&self, quest: NewQuest) -> Result<QuestId, StoreError> {
        let mut quests = self.lock()?;
        if quests.iter().any(|q| q.team_name == quest.team_name && q.quest_number == quest.quest_number) {
            return Err(StoreError::DuplicateQuest { team: quest.team_name, quest_number: quest.quest_number });
        }
        let id = quests.iter().map(|q| q.id).max().unwrap_or(0) + 1;
        quests.push(Quest::from_new(id, quest));
        Ok(id)
    }

    fn insert_batch(&self, batch: Vec<NewQuest>) -> Result<Vec<QuestId>, StoreError> {
        let mut quests = self.lock()?;
        for (i, quest) in batch.iter().enumerate() {
            let clash = quests
                .iter()
                .map(|q| (q.team_name.as_str(), q.quest_number))
                .chain(batch[..i].iter().map(|q| (q.team_name.as_str(), q.quest_number)))
                .any(|(team, number)| team == quest.team_name && number == quest.quest_number);
            if clash {
                return Err(StoreError::DuplicateQuest { team: quest.team_name.clone(), quest_number: quest.quest_number });
            }
        }
        let first = quests.iter().map(|q| q.id).max().unwrap_or(0) + 1;
        let mut ids = Vec::with_capacity(batch.len());
        for (offset, quest) in batch.into_iter().enumerate() {
            let id = first + offset as QuestId;
            quests.push(Quest::from_new(id, quest));
            ids.push(id);
        }
        Ok(ids)
    }

    fn count_quests(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    fn current_quest(&self, team: &str) -> Result<Option<Quest>, StoreError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|q| q.team_name == team && !q.completed)
            .min_by_key(|q| q.quest_number)
            .cloned())
    }

    fn quest_by_id(&self, team: &str, id: QuestId) -> Result<Option<Quest>, StoreError> {
        Ok(self.lock()?.iter().find(|q| q.id == id && q.team_name == team).cloned())
    }

    fn save_quest(&self, quest: &Quest) -> Result<(), StoreError> {
        let mut quests = self.lock()?;
        let slot = quests
            .iter_mut()
            .find(|q| q.id == quest.id)
            .ok_or(StoreError::QuestNotFound(quest.id))?;
        *slot = quest.clone();
        Ok(())
    }

    fn team_quests(&self, team: &str) -> Result<Vec<Quest>, StoreError> {
        let mut quests: Vec<Quest> = self.lock()?.iter().filter(|q| q.team_name == team).cloned().collect();
        quests.sort_by_key(|q| q.quest_number);
        Ok(quests)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::quest::{AcceptedAnswers, QuestMedia};
    use crate::timer::QuestTimer;

    pub(crate) fn new_quest(team: &str, number: u32, answer: &str) -> NewQuest {
        NewQuest {
            team_name: team.to_string(),
            quest_number: number,
            text: format!("Quest {} for {}", number, team),
            answers: AcceptedAnswers::new(answer),
            hint: Some(format!("Hint for quest {}", number)),
            media: QuestMedia::default(),
            file_required: false,
            quest_timer: QuestTimer::not_required(),
            hint_timer: QuestTimer::not_required(),
        }
    }

    /// Behaviour every [`QuestStore`] implementation must share.
    pub(crate) fn exercise_store(store: &dyn QuestStore) {
        assert_eq!(store.count_quests().unwrap(), 0);
        assert!(store.current_quest("TEAM1").unwrap().is_none());

        // Inserted out of order on purpose.
        let q2 = store.insert_quest(new_quest("TEAM1", 2, "puzzle")).unwrap();
        let q1 = store.insert_quest(new_quest("TEAM1", 1, "key")).unwrap();
        let other = store.insert_quest(new_quest("TEAM2", 1, "artifact")).unwrap();
        assert_eq!(store.count_quests().unwrap(), 3);

        let dup = store.insert_quest(new_quest("TEAM1", 2, "again"));
        assert!(matches!(dup, Err(StoreError::DuplicateQuest { .. })));

        let current = store.current_quest("TEAM1").unwrap().unwrap();
        assert_eq!(current.id, q1);
        assert_eq!(current.quest_number, 1);

        assert!(store.quest_by_id("TEAM1", other).unwrap().is_none());
        assert_eq!(store.quest_by_id("TEAM2", other).unwrap().unwrap().quest_number, 1);

        let mut first = store.quest_by_id("TEAM1", q1).unwrap().unwrap();
        first.mark_completed();
        first.hints_used = 2;
        store.save_quest(&first).unwrap();
        assert_eq!(store.current_quest("TEAM1").unwrap().unwrap().id, q2);

        let mut second = store.quest_by_id("TEAM1", q2).unwrap().unwrap();
        second.mark_skipped();
        store.save_quest(&second).unwrap();
        assert!(store.current_quest("TEAM1").unwrap().is_none());

        let ordered: Vec<u32> = store.team_quests("TEAM1").unwrap().iter().map(|q| q.quest_number).collect();
        assert_eq!(ordered, vec![1, 2]);

        let totals = store.totals("TEAM1").unwrap();
        assert_eq!(totals, QuestTotals { total: 2, completed: 2, skipped: 1, hints_used: 2 });
        assert_eq!(totals.solved(), 1);
        assert_eq!(store.totals("TEAM2").unwrap().completed, 0);

        let mut ghost = first.clone();
        ghost.id = 9_999;
        assert!(matches!(store.save_quest(&ghost), Err(StoreError::QuestNotFound(9_999))));

        let ids = store
            .insert_batch(vec![new_quest("TEAM3", 1, "map"), new_quest("TEAM3", 2, "chest")])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.current_quest("TEAM3").unwrap().unwrap().id, ids[0]);

        // A clash anywhere in the batch leaves nothing behind.
        let before = store.count_quests().unwrap();
        let clash_inside = store.insert_batch(vec![new_quest("TEAM4", 1, "a"), new_quest("TEAM4", 1, "b")]);
        assert!(matches!(clash_inside, Err(StoreError::DuplicateQuest { ref team, quest_number: 1 }) if team == "TEAM4"));
        let clash_stored = store.insert_batch(vec![new_quest("TEAM4", 1, "a"), new_quest("TEAM3", 2, "again")]);
        assert!(matches!(clash_stored, Err(StoreError::DuplicateQuest { quest_number: 2, .. })));
        assert_eq!(store.count_quests().unwrap(), before);
        assert!(store.team_quests("TEAM4").unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_contract() {
        exercise_store(&MemoryQuestStore::new());
    }

    #[test]
    fn test_timers_survive_save() {
        let store = MemoryQuestStore::new();
        let mut q = new_quest("TEAM1", 1, "key");
        q.quest_timer = QuestTimer::required(std::time::Duration::from_secs(30));
        let id = store.insert_quest(q).unwrap();

        let mut quest = store.quest_by_id("TEAM1", id).unwrap().unwrap();
        quest.quest_timer.running = true;
        quest.quest_timer.end_time_ms = Some(42);
        store.save_quest(&quest).unwrap();
        assert_eq!(store.quest_by_id("TEAM1", id).unwrap().unwrap().quest_timer, quest.quest_timer);
    }
}
