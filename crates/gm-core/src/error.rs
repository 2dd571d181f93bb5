use std::path::PathBuf;
use std::{fmt, io};

#[derive(Debug)]
pub enum ClassifierError {
    /// An unlearn would drive an aggregate message count below zero.
    NegativeCount { is_spam: bool },
    /// `chi2q` called with an odd number of degrees of freedom.
    InvalidDegreesOfFreedom(u32),
    /// The durable-write lock on a backing file was not acquired in time.
    LockTimeout(PathBuf),
    /// Version mismatch or malformed persisted state.
    Corrupt(String),
    Io(io::Error),
    Backend(String),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierError::NegativeCount { is_spam } => {
                let class = if *is_spam { "spam" } else { "ham" };
                write!(f, "{class} message count would go negative")
            }
            ClassifierError::InvalidDegreesOfFreedom(v) => {
                write!(f, "chi-squared degrees of freedom must be even, got {v}")
            }
            ClassifierError::LockTimeout(path) => {
                write!(f, "timed out waiting for lock on {}", path.display())
            }
            ClassifierError::Corrupt(msg) => write!(f, "corrupt persisted state: {msg}"),
            ClassifierError::Io(e) => write!(f, "I/O error: {e}"),
            ClassifierError::Backend(msg) => write!(f, "storage backend error: {msg}"),
        }
    }
}

impl std::error::Error for ClassifierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClassifierError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClassifierError {
    fn from(e: io::Error) -> Self {
        ClassifierError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
