//! Chi-squared token classifier core.
//!
//! Scores a stream of opaque byte tokens as spam or ham by combining
//! per-token probabilities through the chi-squared distribution's tail.
//! Per-token statistics live behind the [`WordStore`] capability trait, so
//! the same classifier runs over an in-memory map or any persistent backend.
//!
//! Tokenization is somebody else's problem: callers hand in an ordered token
//! sequence, and order only matters in bigram mode.

pub mod chi2;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod error;
pub mod record;
pub mod store;
pub mod token;

pub use chi2::chi2q;
pub use classifier::{Classifier, Clue};
pub use config::ClassifierConfig;
pub use constants::{FORMAT_VERSION, HAM_CUTOFF, SPAM_CUTOFF};
pub use error::{ClassifierError, Result};
pub use record::{TrainingCounts, WordRecord};
pub use store::{MemoryStore, WordStore};
pub use token::{EVIDENCE_HAM, EVIDENCE_SPAM, STATE_KEY, Token, bigram};
