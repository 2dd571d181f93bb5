use serde::{Deserialize, Serialize};

/// Classifier tuning, fixed at construction.
///
/// Defaults are the values that tested well across corpora in the original
/// chi-combining scheme; none of them are corpus-sensitive enough to need
/// per-deployment tuning in practice.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Tile the stream into non-overlapping unigrams and bigrams instead of
    /// scoring unigrams only. Training data must have been learned with the
    /// same setting for bigram records to exist.
    pub use_bigrams: bool,
    /// Maximum number of extreme tokens ("clues") scored per message.
    /// 150 also keeps the chi-squared math comfortably inside f64 range.
    pub max_discriminators: usize,
    /// Tokens with `|prob - 0.5|` below this are ignored as evidence.
    pub minimum_prob_strength: f64,
    /// Probability assumed for a never-seen token.
    pub unknown_token_prob: f64,
    /// Weight of the unknown-token prior relative to counted evidence in the
    /// Bayesian adjustment. 0 trusts raw counts completely (and will assign
    /// certainty to hapaxes); larger values pull every token toward the prior.
    pub unknown_token_strength: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            use_bigrams: false,
            max_discriminators: 150,
            minimum_prob_strength: 0.1,
            unknown_token_prob: 0.5,
            unknown_token_strength: 0.45,
        }
    }
}

impl ClassifierConfig {
    /// Default configuration with bigram tiling enabled.
    pub fn with_bigrams() -> Self {
        Self {
            use_bigrams: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClassifierConfig::default();
        assert!(!config.use_bigrams);
        assert_eq!(config.max_discriminators, 150);
        assert!((config.minimum_prob_strength - 0.1).abs() < 1e-12);
        assert!((config.unknown_token_prob - 0.5).abs() < 1e-12);
        assert!((config.unknown_token_strength - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_with_bigrams() {
        let config = ClassifierConfig::with_bigrams();
        assert!(config.use_bigrams);
        assert_eq!(config.max_discriminators, 150);
    }
}
