use serde::{Deserialize, Serialize};

/// Per-token training tallies: how many trained spam and ham messages the
/// token appeared in.
///
/// While a record is present in a store, `spam_count + ham_count > 0`; a
/// record whose counts both reach zero is deleted rather than retained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRecord {
    pub spam_count: u32,
    pub ham_count: u32,
}

impl WordRecord {
    pub fn new(spam_count: u32, ham_count: u32) -> Self {
        Self {
            spam_count,
            ham_count,
        }
    }

    /// Combined message count. Records at 1 or below are "singletons" and
    /// eligible for write-through storage.
    pub fn total(&self) -> u32 {
        self.spam_count + self.ham_count
    }

    /// True once both counts have been unlearned back to zero.
    pub fn is_empty(&self) -> bool {
        self.spam_count == 0 && self.ham_count == 0
    }
}

/// Aggregate message counts: how many spam and ham messages have been
/// learned in total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCounts {
    pub nspam: u32,
    pub nham: u32,
}

impl TrainingCounts {
    pub fn new(nspam: u32, nham: u32) -> Self {
        Self { nspam, nham }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_threshold() {
        assert_eq!(WordRecord::new(1, 0).total(), 1);
        assert_eq!(WordRecord::new(1, 1).total(), 2);
    }

    #[test]
    fn test_is_empty() {
        assert!(WordRecord::default().is_empty());
        assert!(!WordRecord::new(0, 1).is_empty());
        assert!(!WordRecord::new(1, 0).is_empty());
    }
}
