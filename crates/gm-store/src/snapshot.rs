//! Whole-state snapshot backend: every record lives in memory, and `store`
//! rewrites a single versioned JSON file.
//!
//! Suited to small databases and batch training, where loading everything up
//! front is cheaper than per-record I/O.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use gm_core::{ClassifierError, FORMAT_VERSION, Result, Token, TrainingCounts, WordRecord, WordStore};

use crate::lock::{DEFAULT_LOCK_TIMEOUT, FileLock, replace_file};

/// On-disk layout. The version field is checked on load, never migrated.
#[derive(Serialize, Deserialize)]
struct SnapshotWire {
    version: u32,
    nspam: u32,
    nham: u32,
    words: Vec<WordWire>,
}

#[derive(Serialize, Deserialize)]
struct WordWire {
    token: Token,
    spam: u32,
    ham: u32,
}

pub struct SnapshotStore {
    path: PathBuf,
    records: HashMap<Token, WordRecord>,
    lock_timeout: Duration,
}

impl SnapshotStore {
    /// A missing file is a new, empty database; it is only created on the
    /// first `store`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: HashMap::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl WordStore for SnapshotStore {
    fn load(&mut self) -> Result<TrainingCounts> {
        self.records.clear();
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no snapshot file, starting empty");
            return Ok(TrainingCounts::default());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let wire: SnapshotWire = serde_json::from_reader(reader)
            .map_err(|e| ClassifierError::Corrupt(format!("snapshot decode: {e}")))?;
        if wire.version != FORMAT_VERSION {
            return Err(ClassifierError::Corrupt(format!(
                "snapshot version {} but this build reads {}",
                wire.version, FORMAT_VERSION
            )));
        }

        for w in wire.words {
            self.records.insert(w.token, WordRecord::new(w.spam, w.ham));
        }
        debug!(
            path = %self.path.display(),
            words = self.records.len(),
            "loaded snapshot"
        );
        Ok(TrainingCounts::new(wire.nspam, wire.nham))
    }

    fn store(&mut self, counts: &TrainingCounts) -> Result<()> {
        // Deterministic order makes snapshots diffable.
        let mut words: Vec<WordWire> = self
            .records
            .iter()
            .map(|(token, r)| WordWire {
                token: token.clone(),
                spam: r.spam_count,
                ham: r.ham_count,
            })
            .collect();
        words.sort_by(|a, b| a.token.cmp(&b.token));

        let wire = SnapshotWire {
            version: FORMAT_VERSION,
            nspam: counts.nspam,
            nham: counts.nham,
            words,
        };

        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        replace_file(&self.path, |file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &wire)
                .map_err(|e| ClassifierError::Backend(format!("snapshot encode: {e}")))?;
            writer.flush()?;
            Ok(())
        })?;
        debug!(path = %self.path.display(), words = wire.words.len(), "wrote snapshot");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    fn get(&mut self, token: &[u8]) -> Result<Option<WordRecord>> {
        Ok(self.records.get(token).copied())
    }

    fn set(&mut self, token: &[u8], record: WordRecord) -> Result<()> {
        self.records.insert(token.to_vec(), record);
        Ok(())
    }

    fn delete(&mut self, token: &[u8]) -> Result<()> {
        self.records.remove(token);
        Ok(())
    }

    fn keys(&mut self) -> Result<Vec<Token>> {
        Ok(self.records.keys().cloned().collect())
    }
}
