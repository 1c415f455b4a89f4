use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use crate::quest::{AcceptedAnswers, NewQuest, Quest, QuestId, QuestMedia, QuestTotals};
use crate::store::{QuestStore, StoreError};
use crate::timer::QuestTimer;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS quests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    team_name TEXT NOT NULL,
    quest_number INTEGER NOT NULL,
    text TEXT NOT NULL,
    answers TEXT NOT NULL,
    hint TEXT,
    image TEXT,
    audio TEXT,
    file_required INTEGER NOT NULL DEFAULT 0,
    completed INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    hints_used INTEGER NOT NULL DEFAULT 0,
    quest_timer TEXT NOT NULL,
    hint_timer TEXT NOT NULL,
    UNIQUE (team_name, quest_number)
);
CREATE INDEX IF NOT EXISTS quests_by_team ON quests (team_name, completed, quest_number);";

const COLUMNS: &str = "id, team_name, quest_number, text, answers, hint, image, audio, \
    file_required, completed, skipped, hints_used, quest_timer, hint_timer";

/// SQLite-backed [`QuestStore`]. Timers are stored as JSON text columns.
pub struct SqliteQuestStore {
    conn: Mutex<Connection>,
}

impl SqliteQuestStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        tracing::info!(path = ?path.as_ref(), "Opening quest store");
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteQuestStore { conn: Mutex::new(conn) })
    }

    /// Create an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        tracing::debug!("Creating in-memory quest store");
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteQuestStore { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }
}

/// Raw column values; timers are decoded outside the rusqlite row closure so
/// JSON errors surface as [`StoreError::Serialization`].
struct QuestRow {
    id: QuestId,
    team_name: String,
    quest_number: u32,
    text: String,
    answers: String,
    hint: Option<String>,
    image: Option<String>,
    audio: Option<String>,
    file_required: bool,
    completed: bool,
    skipped: bool,
    hints_used: u32,
    quest_timer: String,
    hint_timer: String,
}

impl QuestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<QuestRow> {
        Ok(QuestRow {
            id: row.get(0)?,
            team_name: row.get(1)?,
            quest_number: row.get(2)?,
            text: row.get(3)?,
            answers: row.get(4)?,
            hint: row.get(5)?,
            image: row.get(6)?,
            audio: row.get(7)?,
            file_required: row.get(8)?,
            completed: row.get(9)?,
            skipped: row.get(10)?,
            hints_used: row.get(11)?,
            quest_timer: row.get(12)?,
            hint_timer: row.get(13)?,
        })
    }

    fn into_quest(self) -> Result<Quest, StoreError> {
        Ok(Quest {
            id: self.id,
            team_name: self.team_name,
            quest_number: self.quest_number,
            text: self.text,
            answers: AcceptedAnswers::new(self.answers),
            hint: self.hint,
            media: QuestMedia { image: self.image, audio: self.audio },
            file_required: self.file_required,
            completed: self.completed,
            skipped: self.skipped,
            hints_used: self.hints_used,
            quest_timer: serde_json::from_str::<QuestTimer>(&self.quest_timer)?,
            hint_timer: serde_json::from_str::<QuestTimer>(&self.hint_timer)?,
        })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn insert_row(conn: &Connection, quest: &NewQuest) -> Result<QuestId, StoreError> {
    let quest_timer = serde_json::to_string(&quest.quest_timer)?;
    let hint_timer = serde_json::to_string(&quest.hint_timer)?;
    conn.execute(
        "INSERT INTO quests (team_name, quest_number, text, answers, hint, image, audio, \
         file_required, quest_timer, hint_timer) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            quest.team_name,
            quest.quest_number,
            quest.text,
            quest.answers.as_str(),
            quest.hint,
            quest.media.image,
            quest.media.audio,
            quest.file_required,
            quest_timer,
            hint_timer,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::DuplicateQuest { team: quest.team_name.clone(), quest_number: quest.quest_number }
        } else {
            StoreError::from(e)
        }
    })?;
    Ok(conn.last_insert_rowid())
}

impl QuestStore for SqliteQuestStore {
    fn insert_quest(&self, quest: NewQuest) -> Result<QuestId, StoreError> {
        let conn = self.lock()?;
        let id = insert_row(&conn, &quest)?;
        tracing::debug!(team = %quest.team_name, quest_number = quest.quest_number, id, "Quest inserted");
        Ok(id)
    }

    fn insert_batch(&self, quests: Vec<NewQuest>) -> Result<Vec<QuestId>, StoreError> {
        let mut conn = self.lock()?;
        // Dropping the transaction on an early return rolls it back.
        let tx = conn.transaction()?;
        let ids = quests.iter().map(|quest| insert_row(&tx, quest)).collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        tracing::debug!(count = ids.len(), "Quest batch inserted");
        Ok(ids)
    }

    fn count_quests(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM quests", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn current_quest(&self, team: &str) -> Result<Option<Quest>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM quests WHERE team_name = ?1 AND completed = 0 \
                     ORDER BY quest_number ASC LIMIT 1"
                ),
                params![team],
                QuestRow::from_row,
            )
            .optional()?;
        row.map(QuestRow::into_quest).transpose()
    }

    fn quest_by_id(&self, team: &str, id: QuestId) -> Result<Option<Quest>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM quests WHERE id = ?1 AND team_name = ?2"),
                params![id, team],
                QuestRow::from_row,
            )
            .optional()?;
        row.map(QuestRow::into_quest).transpose()
    }

    fn save_quest(&self, quest: &Quest) -> Result<(), StoreError> {
        let quest_timer = serde_json::to_string(&quest.quest_timer)?;
        let hint_timer = serde_json::to_string(&quest.hint_timer)?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE quests SET text = ?2, answers = ?3, hint = ?4, image = ?5, audio = ?6, \
             file_required = ?7, completed = ?8, skipped = ?9, hints_used = ?10, \
             quest_timer = ?11, hint_timer = ?12 WHERE id = ?1",
            params![
                quest.id,
                quest.text,
                quest.answers.as_str(),
                quest.hint,
                quest.media.image,
                quest.media.audio,
                quest.file_required,
                quest.completed,
                quest.skipped,
                quest.hints_used,
                quest_timer,
                hint_timer,
            ],
        )?;
        if updated == 0 {
            tracing::warn!(id = quest.id, "Attempted to save a quest that does not exist");
            return Err(StoreError::QuestNotFound(quest.id));
        }
        Ok(())
    }

    fn team_quests(&self, team: &str) -> Result<Vec<Quest>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM quests WHERE team_name = ?1 ORDER BY quest_number ASC"
        ))?;
        let rows = stmt
            .query_map(params![team], QuestRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(QuestRow::into_quest).collect()
    }

    fn totals(&self, team: &str) -> Result<QuestTotals, StoreError> {
        let conn = self.lock()?;
        let (total, completed, skipped, hints_used): (i64, i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(completed), 0), COALESCE(SUM(skipped), 0), \
             COALESCE(SUM(hints_used), 0) FROM quests WHERE team_name = ?1",
            params![team],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        Ok(QuestTotals {
            total: total as u32,
            completed: completed as u32,
            skipped: skipped as u32,
            hints_used: hints_used as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{exercise_store, new_quest};

    #[test]
    fn test_open_creates_table() {
        let store = SqliteQuestStore::open_in_memory().unwrap();
        assert_eq!(store.count_quests().unwrap(), 0);
    }

    #[test]
    fn test_sqlite_store_contract() {
        exercise_store(&SqliteQuestStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_round_trips_media_and_timers() {
        let store = SqliteQuestStore::open_in_memory().unwrap();
        let mut q = new_quest("TEAM3", 1, "map|chart");
        q.media = QuestMedia { image: Some("/media/map.png".into()), audio: Some("/media/wind.mp3".into()) };
        q.file_required = true;
        q.hint_timer = QuestTimer::required(std::time::Duration::from_secs(120));
        let id = store.insert_quest(q).unwrap();

        let mut quest = store.quest_by_id("TEAM3", id).unwrap().unwrap();
        assert_eq!(quest.media.image.as_deref(), Some("/media/map.png"));
        assert!(quest.file_required);
        assert!(quest.answers.matches("CHART"));

        quest.hint_timer.running = true;
        quest.hint_timer.end_time_ms = Some(1_234);
        store.save_quest(&quest).unwrap();
        let reloaded = store.quest_by_id("TEAM3", id).unwrap().unwrap();
        assert_eq!(reloaded, quest);
    }

    #[test]
    fn test_reopen_file_keeps_progress() {
        let path = std::env::temp_dir().join(format!("hunt-{}.db", uuid::Uuid::new_v4()));
        {
            let store = SqliteQuestStore::open(&path).unwrap();
            let id = store.insert_quest(new_quest("TEAM1", 1, "key")).unwrap();
            let mut quest = store.quest_by_id("TEAM1", id).unwrap().unwrap();
            quest.mark_completed();
            store.save_quest(&quest).unwrap();
        }
        let store = SqliteQuestStore::open(&path).unwrap();
        assert_eq!(store.count_quests().unwrap(), 1);
        assert!(store.current_quest("TEAM1").unwrap().is_none());
        let _ = std::fs::remove_file(&path);
    }
}
