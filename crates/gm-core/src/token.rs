//! Canonical token representation and the reserved token space.
//!
//! Tokens are opaque byte sequences supplied by an external producer. A few
//! values are reserved and never produced by tokenization: the two evidence
//! sentinels and the aggregate-state key, all star-delimited.

/// An opaque byte-sequence token.
pub type Token = Vec<u8>;

/// Evidence sentinel carrying the aggregate H' (ham) measure.
pub const EVIDENCE_HAM: &[u8] = b"*H*";

/// Evidence sentinel carrying the aggregate S' (spam) measure.
pub const EVIDENCE_SPAM: &[u8] = b"*S*";

/// Reserved key under which adapters persist `(format_version, nspam, nham)`.
/// Guaranteed not to collide with a trainable token.
pub const STATE_KEY: &[u8] = b"*state*";

/// Synthesize the bigram token for two adjacent stream tokens.
///
/// The `bi:` prefix keeps bigrams out of the unigram namespace, and the
/// space separator keeps `bigram(a, bc)` distinct from `bigram(ab, c)`.
pub fn bigram(first: &[u8], second: &[u8]) -> Token {
    let mut out = Vec::with_capacity(3 + first.len() + 1 + second.len());
    out.extend_from_slice(b"bi:");
    out.extend_from_slice(first);
    out.push(b' ');
    out.extend_from_slice(second);
    out
}
