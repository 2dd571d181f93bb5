//! The storage capability consumed by the classifier, and the trivial
//! in-memory implementation of it.

use std::collections::HashMap;

use crate::error::Result;
use crate::record::{TrainingCounts, WordRecord};
use crate::token::Token;

/// Uniform persistence capability for per-token records plus the aggregate
/// training counts. The classifier core depends only on this trait, never on
/// a concrete backend.
///
/// `get`/`set`/`delete` operate on individual records. `load`/`store` move
/// whole-classifier state; the aggregate counts travel with them because the
/// classifier owns the counters but only a backend can make them durable.
/// `post_training` runs after every learn/unlearn so a backend can keep its
/// aggregate row fresh even when record flushes are deferred to `store`.
pub trait WordStore {
    /// Read persisted state, returning the aggregate counts.
    fn load(&mut self) -> Result<TrainingCounts>;

    /// Persist all state, including the aggregate counts.
    fn store(&mut self, counts: &TrainingCounts) -> Result<()>;

    /// Release held resources (file mappings, handles). Unpersisted state is
    /// discarded; call `store` first if it matters.
    fn close(&mut self) -> Result<()>;

    fn get(&mut self, token: &[u8]) -> Result<Option<WordRecord>>;

    fn set(&mut self, token: &[u8], record: WordRecord) -> Result<()>;

    /// Remove a record. Deleting an absent token is not an error.
    fn delete(&mut self, token: &[u8]) -> Result<()>;

    /// All trained tokens visible in the backing store.
    fn keys(&mut self) -> Result<Vec<Token>>;

    /// Called after every learn/unlearn. Default: nothing.
    fn post_training(&mut self, counts: &TrainingCounts) -> Result<()> {
        let _ = counts;
        Ok(())
    }
}

impl<S: WordStore + ?Sized> WordStore for Box<S> {
    fn load(&mut self) -> Result<TrainingCounts> {
        (**self).load()
    }

    fn store(&mut self, counts: &TrainingCounts) -> Result<()> {
        (**self).store(counts)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn get(&mut self, token: &[u8]) -> Result<Option<WordRecord>> {
        (**self).get(token)
    }

    fn set(&mut self, token: &[u8], record: WordRecord) -> Result<()> {
        (**self).set(token, record)
    }

    fn delete(&mut self, token: &[u8]) -> Result<()> {
        (**self).delete(token)
    }

    fn keys(&mut self) -> Result<Vec<Token>> {
        (**self).keys()
    }

    fn post_training(&mut self, counts: &TrainingCounts) -> Result<()> {
        (**self).post_training(counts)
    }
}

/// Volatile adapter holding everything in a map. Nothing survives the
/// process; useful as the zero-I/O default and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<Token, WordRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl WordStore for MemoryStore {
    fn load(&mut self) -> Result<TrainingCounts> {
        Ok(TrainingCounts::default())
    }

    fn store(&mut self, _counts: &TrainingCounts) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get(b"dog").unwrap(), None);

        store.set(b"dog", WordRecord::new(1, 2)).unwrap();
        assert_eq!(store.get(b"dog").unwrap(), Some(WordRecord::new(1, 2)));
        assert_eq!(store.keys().unwrap(), vec![b"dog".to_vec()]);

        store.delete(b"dog").unwrap();
        assert_eq!(store.get(b"dog").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_absent_is_ok() {
        let mut store = MemoryStore::new();
        store.delete(b"never seen").unwrap();
    }

    #[test]
    fn test_boxed_store_delegates() {
        let mut store: Box<dyn WordStore> = Box::new(MemoryStore::new());
        store.set(b"cat", WordRecord::new(0, 1)).unwrap();
        assert_eq!(store.get(b"cat").unwrap(), Some(WordRecord::new(0, 1)));
        assert_eq!(store.load().unwrap(), TrainingCounts::default());
    }
}
