/// Scores at or below this are confidently ham.
pub const HAM_CUTOFF: f64 = 0.2;

/// Scores at or above this are confidently spam.
pub const SPAM_CUTOFF: f64 = 0.9;

/// Version tag written into every persisted form of classifier state.
/// A mismatch on load is a `Corrupt` error, never a silent migration.
pub const FORMAT_VERSION: u32 = 5;
