//! Immutable-hash backend: the whole database is one constant-database file.
//!
//! Loads pull every record into memory; `store` rebuilds the file from
//! scratch and swaps it in by rename. Record values are ASCII
//! `"spam,ham"`; the aggregate counts live in a reserved record as
//! `"version,nspam,nham"`.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use gm_core::{
    ClassifierError, FORMAT_VERSION, Result, STATE_KEY, Token, TrainingCounts, WordRecord,
    WordStore,
};

use crate::cdb::{Cdb, CdbWriter};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, FileLock, replace_file};

pub struct ImmutableHashStore {
    path: PathBuf,
    reader: Option<Cdb>,
    records: HashMap<Token, WordRecord>,
    lock_timeout: Duration,
}

impl ImmutableHashStore {
    /// A missing file is a new, empty database; it is only created on the
    /// first `store`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
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
}

impl WordStore for ImmutableHashStore {
    fn load(&mut self) -> Result<TrainingCounts> {
        self.records.clear();
        self.reader = None;
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        // A missing or zero-length file is a new database, not corruption.
        match std::fs::metadata(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no database file, starting empty");
                return Ok(TrainingCounts::default());
            }
            Err(e) => return Err(e.into()),
            Ok(meta) if meta.len() == 0 => {
                debug!(path = %self.path.display(), "empty database file, starting empty");
                return Ok(TrainingCounts::default());
            }
            Ok(_) => {}
        }

        let db = Cdb::open(&self.path)?;
        let state = db
            .get(STATE_KEY)
            .ok_or_else(|| ClassifierError::Corrupt("missing state record".into()))?;
        let [version, nspam, nham] = parse_fields::<3>(state)?;
        if version != FORMAT_VERSION {
            return Err(ClassifierError::Corrupt(format!(
                "database version {version} but this build reads {FORMAT_VERSION}"
            )));
        }

        for (key, value) in db.iter() {
            if key == STATE_KEY {
                continue;
            }
            let [spam, ham] = parse_fields::<2>(value)?;
            self.records
                .insert(key.to_vec(), WordRecord::new(spam, ham));
        }
        debug!(
            path = %self.path.display(),
            words = self.records.len(),
            "loaded constant database"
        );

        // Hold the mapping open for the lifetime of the store.
        self.reader = Some(db);
        Ok(TrainingCounts::new(nspam, nham))
    }

    /// Rebuild the whole file and rename it into place, then remap it.
    fn store(&mut self, counts: &TrainingCounts) -> Result<()> {
        let mut words: Vec<(&Token, &WordRecord)> = self.records.iter().collect();
        words.sort_by(|a, b| a.0.cmp(b.0));

        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        replace_file(&self.path, |file| {
            let mut writer = CdbWriter::new(&mut *file)?;
            let state = format!("{},{},{}", FORMAT_VERSION, counts.nspam, counts.nham);
            writer.put(STATE_KEY, state.as_bytes())?;
            for (token, record) in &words {
                let value = format!("{},{}", record.spam_count, record.ham_count);
                writer.put(token, value.as_bytes())?;
            }
            writer.finish()?.flush()?;
            Ok(())
        })?;

        self.reader = Some(Cdb::open(&self.path)?);
        debug!(path = %self.path.display(), words = words.len(), "rebuilt constant database");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
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

/// Parse `N` comma-separated ASCII integers.
fn parse_fields<const N: usize>(value: &[u8]) -> Result<[u32; N]> {
    let text = std::str::from_utf8(value)
        .map_err(|_| ClassifierError::Corrupt("record value is not ASCII".into()))?;
    let mut out = [0u32; N];
    let mut parts = text.split(',');
    for slot in &mut out {
        *slot = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| {
                ClassifierError::Corrupt(format!("malformed record value {text:?}"))
            })?;
    }
    if parts.next().is_some() {
        return Err(ClassifierError::Corrupt(format!(
            "malformed record value {text:?}"
        )));
    }
    Ok(out)
}
