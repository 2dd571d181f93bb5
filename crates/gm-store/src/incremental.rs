//! Incremental SQLite backend: records are cached in memory while dirty and
//! flushed to the database per-row, so `store` cost tracks the training
//! delta instead of the database size.
//!
//! Singleton records (total count of one) are written through and evicted
//! from the cache immediately. Most tokens are hapaxes, and keeping them
//! cached would grow memory with every message trained.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{Connection, params};
use tracing::debug;

use gm_core::{
    ClassifierError, FORMAT_VERSION, Result, STATE_KEY, Token, TrainingCounts, WordRecord,
    WordStore,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS words (
    token BLOB PRIMARY KEY,
    spam  INTEGER NOT NULL,
    ham   INTEGER NOT NULL
) WITHOUT ROWID;
";

#[derive(Debug)]
pub struct IncrementalStore {
    conn: Option<Connection>,
    cache: HashMap<Token, WordRecord>,
    changed: HashSet<Token>,
    deleted: HashSet<Token>,
}

impl IncrementalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_conn(Connection::open(path).map_err(sql)?)
    }

    /// Private throwaway database, handy in tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_conn(Connection::open_in_memory().map_err(sql)?)
    }

    fn from_conn(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(sql)?;

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(sql)?;
        match version {
            0 => {
                // Fresh database: stamp it.
                conn.pragma_update(None, "user_version", FORMAT_VERSION)
                    .map_err(sql)?;
            }
            v if v == FORMAT_VERSION => {}
            v => {
                return Err(ClassifierError::Corrupt(format!(
                    "database version {v} but this build reads {FORMAT_VERSION}"
                )));
            }
        }

        Ok(Self {
            conn: Some(conn),
            cache: HashMap::new(),
            changed: HashSet::new(),
            deleted: HashSet::new(),
        })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| ClassifierError::Backend("store is closed".into()))
    }

    fn write_state(conn: &Connection, counts: &TrainingCounts) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO words (token, spam, ham) VALUES (?1, ?2, ?3)",
            params![STATE_KEY, counts.nspam, counts.nham],
        )
        .map_err(sql)?;
        Ok(())
    }
}

impl WordStore for IncrementalStore {
    fn load(&mut self) -> Result<TrainingCounts> {
        self.cache.clear();
        self.changed.clear();
        self.deleted.clear();

        let conn = self.conn()?;
        let counts = conn
            .query_row(
                "SELECT spam, ham FROM words WHERE token = ?1",
                params![STATE_KEY],
                |row| Ok(TrainingCounts::new(row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(sql(e)),
            })?;
        Ok(counts.unwrap_or_default())
    }

    /// Flush the training delta: queued deletions, then dirty records, then
    /// the aggregate state row, all in one transaction.
    fn store(&mut self, counts: &TrainingCounts) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(sql)?;

        for token in &self.deleted {
            tx.execute("DELETE FROM words WHERE token = ?1", params![token])
                .map_err(sql)?;
        }
        for token in &self.changed {
            if let Some(record) = self.cache.get(token) {
                tx.execute(
                    "INSERT OR REPLACE INTO words (token, spam, ham) VALUES (?1, ?2, ?3)",
                    params![token, record.spam_count, record.ham_count],
                )
                .map_err(sql)?;
            }
        }
        Self::write_state(&tx, counts)?;
        tx.commit().map_err(sql)?;

        debug!(
            flushed = self.changed.len(),
            deleted = self.deleted.len(),
            "flushed training delta"
        );
        self.changed.clear();
        self.deleted.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.cache.clear();
        self.changed.clear();
        self.deleted.clear();
        self.conn = None;
        Ok(())
    }

    fn get(&mut self, token: &[u8]) -> Result<Option<WordRecord>> {
        if self.deleted.contains(token) {
            return Ok(None);
        }
        if let Some(record) = self.cache.get(token) {
            return Ok(Some(*record));
        }

        let found = self
            .conn()?
            .query_row(
                "SELECT spam, ham FROM words WHERE token = ?1",
                params![token],
                |row| Ok(WordRecord::new(row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(sql(e)),
            })?;
        if let Some(record) = found {
            self.cache.insert(token.to_vec(), record);
        }
        Ok(found)
    }

    fn set(&mut self, token: &[u8], record: WordRecord) -> Result<()> {
        self.deleted.remove(token);
        if record.total() <= 1 {
            // Write singletons straight through and drop them from the
            // cache; they only return if trained again.
            self.conn()?
                .execute(
                    "INSERT OR REPLACE INTO words (token, spam, ham) VALUES (?1, ?2, ?3)",
                    params![token, record.spam_count, record.ham_count],
                )
                .map_err(sql)?;
            self.cache.remove(token);
            self.changed.remove(token);
        } else {
            self.cache.insert(token.to_vec(), record);
            self.changed.insert(token.to_vec());
        }
        Ok(())
    }

    fn delete(&mut self, token: &[u8]) -> Result<()> {
        self.cache.remove(token);
        self.changed.remove(token);
        self.deleted.insert(token.to_vec());
        Ok(())
    }

    fn keys(&mut self) -> Result<Vec<Token>> {
        let mut seen: HashSet<Token> = HashSet::new();
        {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare("SELECT token FROM words WHERE token != ?1")
                .map_err(sql)?;
            let rows = stmt
                .query_map(params![STATE_KEY], |row| row.get::<_, Token>(0))
                .map_err(sql)?;
            for row in rows {
                seen.insert(row.map_err(sql)?);
            }
        }
        seen.extend(self.changed.iter().cloned());
        for token in &self.deleted {
            seen.remove(token);
        }
        Ok(seen.into_iter().collect())
    }

    /// Keep the aggregate counts durable even before the next full flush.
    fn post_training(&mut self, counts: &TrainingCounts) -> Result<()> {
        Self::write_state(self.conn()?, counts)
    }
}

fn sql(e: rusqlite::Error) -> ClassifierError {
    ClassifierError::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_database_is_empty() {
        let mut store = IncrementalStore::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), TrainingCounts::default());
        assert_eq!(store.get(b"dog").unwrap(), None);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_store_then_reopen_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("words.sqlite");

        let mut store = IncrementalStore::open(&path).unwrap();
        store.load().unwrap();
        store.set(b"dog", WordRecord::new(0, 3)).unwrap();
        store.set(b"shark", WordRecord::new(5, 1)).unwrap();
        store.store(&TrainingCounts::new(5, 3)).unwrap();
        store.close().unwrap();

        let mut reopened = IncrementalStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), TrainingCounts::new(5, 3));
        assert_eq!(reopened.get(b"dog").unwrap(), Some(WordRecord::new(0, 3)));
        assert_eq!(
            reopened.get(b"shark").unwrap(),
            Some(WordRecord::new(5, 1))
        );
    }

    #[test]
    fn test_singleton_is_written_through_and_evicted() {
        let mut store = IncrementalStore::open_in_memory().unwrap();
        store.load().unwrap();

        store.set(b"once", WordRecord::new(1, 0)).unwrap();
        assert!(store.cache.is_empty());
        assert!(store.changed.is_empty());
        // Durable without a flush.
        assert_eq!(store.get(b"once").unwrap(), Some(WordRecord::new(1, 0)));
    }

    #[test]
    fn test_repeat_token_stays_cached_until_store() {
        let mut store = IncrementalStore::open_in_memory().unwrap();
        store.load().unwrap();

        store.set(b"twice", WordRecord::new(1, 1)).unwrap();
        assert!(store.changed.contains(b"twice".as_slice()));
        assert_eq!(store.get(b"twice").unwrap(), Some(WordRecord::new(1, 1)));

        store.store(&TrainingCounts::new(1, 1)).unwrap();
        assert!(store.changed.is_empty());
        assert_eq!(store.get(b"twice").unwrap(), Some(WordRecord::new(1, 1)));
    }

    #[test]
    fn test_delete_is_queued_until_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("words.sqlite");

        let mut store = IncrementalStore::open(&path).unwrap();
        store.load().unwrap();
        store.set(b"gone", WordRecord::new(1, 0)).unwrap();
        store.store(&TrainingCounts::new(1, 0)).unwrap();

        store.delete(b"gone").unwrap();
        // Masked immediately, removed durably at the next flush.
        assert_eq!(store.get(b"gone").unwrap(), None);
        assert!(!store.keys().unwrap().contains(&b"gone".to_vec()));
        store.store(&TrainingCounts::new(0, 0)).unwrap();
        store.close().unwrap();

        let mut reopened = IncrementalStore::open(&path).unwrap();
        reopened.load().unwrap();
        assert_eq!(reopened.get(b"gone").unwrap(), None);
    }

    #[test]
    fn test_post_training_persists_counts_without_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("words.sqlite");

        let mut store = IncrementalStore::open(&path).unwrap();
        store.load().unwrap();
        store.post_training(&TrainingCounts::new(7, 2)).unwrap();
        store.close().unwrap();

        let mut reopened = IncrementalStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), TrainingCounts::new(7, 2));
    }

    #[test]
    fn test_state_row_is_not_a_key() {
        let mut store = IncrementalStore::open_in_memory().unwrap();
        store.load().unwrap();
        store.post_training(&TrainingCounts::new(1, 1)).unwrap();
        store.set(b"dog", WordRecord::new(1, 1)).unwrap();

        let keys = store.keys().unwrap();
        assert_eq!(keys, vec![b"dog".to_vec()]);
    }

    #[test]
    fn test_version_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("words.sqlite");

        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        drop(conn);

        let err = IncrementalStore::open(&path).unwrap_err();
        assert!(matches!(err, ClassifierError::Corrupt(_)), "{err}");
    }

    #[test]
    fn test_closed_store_reports_backend_error() {
        let mut store = IncrementalStore::open_in_memory().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.get(b"dog").unwrap_err(),
            ClassifierError::Backend(_)
        ));
    }
}
