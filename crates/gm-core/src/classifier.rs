//! The classifier: incremental learn/unlearn of per-token counts and
//! chi-squared combining of per-token probabilities into one score.
//!
//! Across vectors of n uniformly-distributed probabilities, -2*Σ ln(p_i)
//! follows the chi-squared distribution with 2n degrees of freedom. Two such
//! statistics are computed, one sensitive to spammy clues and one to hammy
//! clues, and combined as (S - H + 1) / 2 so that conflicting strong evidence
//! lands near 0.5 instead of at a confident extreme.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::f64::consts::LN_2;

use crate::chi2::{chi2q, frexp};
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::record::{TrainingCounts, WordRecord};
use crate::store::WordStore;
use crate::token::{self, EVIDENCE_HAM, EVIDENCE_SPAM, Token};

/// Running products this close to zero are split with frexp before the next
/// multiply so they never silently underflow.
const RESCALE_FLOOR: f64 = 1e-200;

/// A token whose probability sat far enough from neutral to be used as
/// evidence, paired with that probability.
#[derive(Clone, Debug, PartialEq)]
pub struct Clue {
    pub token: Token,
    pub prob: f64,
}

/// A clue candidate before overlap resolution. `span` is the inclusive range
/// of stream indices the token covers (i..i for a unigram, i-1..i for a
/// bigram); `ord` is its generation position, used as the tie-break.
struct Candidate {
    distance: f64,
    prob: f64,
    token: Token,
    span: (usize, usize),
    ord: usize,
}

pub struct Classifier<S> {
    config: ClassifierConfig,
    store: S,
    counts: TrainingCounts,
    // memoized probability() keyed by (spam_count, ham_count); the formula
    // depends on nspam/nham, so every learn/unlearn clears it
    probcache: HashMap<(u32, u32), f64>,
}

impl<S: WordStore> Classifier<S> {
    /// Open a classifier over `store` with default configuration, loading
    /// whatever aggregate state the backend has persisted.
    pub fn new(store: S) -> Result<Self> {
        Self::with_config(store, ClassifierConfig::default())
    }

    pub fn with_config(mut store: S, config: ClassifierConfig) -> Result<Self> {
        let counts = store.load()?;
        Ok(Self {
            config,
            store,
            counts,
            probcache: HashMap::new(),
        })
    }

    pub fn nspam(&self) -> u32 {
        self.counts.nspam
    }

    pub fn nham(&self) -> u32 {
        self.counts.nham
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Persist all classifier state through the backend.
    pub fn store(&mut self) -> Result<()> {
        self.store.store(&self.counts)
    }

    /// Release backend resources. Unpersisted state is discarded.
    pub fn close(&mut self) -> Result<()> {
        self.store.close()
    }

    /// All trained tokens visible in the backing store.
    pub fn keys(&mut self) -> Result<Vec<Token>> {
        self.store.keys()
    }

    // --- Training ---

    /// Teach the classifier that this token stream is definitely spam or
    /// definitely ham. Repeats of a token within one message count once.
    pub fn learn<T: AsRef<[u8]>>(&mut self, tokens: &[T], is_spam: bool) -> Result<()> {
        let stream = self.expand(tokens);
        self.add_message(&stream, is_spam)
    }

    /// Reverse a mistaken `learn`. Must be called with the same tokens and
    /// class as the original call.
    pub fn unlearn<T: AsRef<[u8]>>(&mut self, tokens: &[T], is_spam: bool) -> Result<()> {
        let stream = self.expand(tokens);
        self.remove_message(&stream, is_spam)
    }

    pub fn learn_spam<T: AsRef<[u8]>>(&mut self, tokens: &[T]) -> Result<()> {
        self.learn(tokens, true)
    }

    pub fn learn_ham<T: AsRef<[u8]>>(&mut self, tokens: &[T]) -> Result<()> {
        self.learn(tokens, false)
    }

    pub fn unlearn_spam<T: AsRef<[u8]>>(&mut self, tokens: &[T]) -> Result<()> {
        self.unlearn(tokens, true)
    }

    pub fn unlearn_ham<T: AsRef<[u8]>>(&mut self, tokens: &[T]) -> Result<()> {
        self.unlearn(tokens, false)
    }

    /// In bigram mode the trained stream contains every unigram plus every
    /// adjacent-pair token; otherwise it is the unigrams as supplied.
    fn expand<T: AsRef<[u8]>>(&self, tokens: &[T]) -> Vec<Token> {
        if !self.config.use_bigrams {
            return tokens.iter().map(|t| t.as_ref().to_vec()).collect();
        }
        let mut out = Vec::with_capacity(tokens.len().saturating_mul(2));
        for (i, tok) in tokens.iter().enumerate() {
            out.push(tok.as_ref().to_vec());
            if i > 0 {
                out.push(token::bigram(tokens[i - 1].as_ref(), tok.as_ref()));
            }
        }
        out
    }

    fn add_message(&mut self, stream: &[Token], is_spam: bool) -> Result<()> {
        self.probcache.clear();
        if is_spam {
            self.counts.nspam += 1;
        } else {
            self.counts.nham += 1;
        }

        let mut seen: HashSet<&[u8]> = HashSet::new();
        for tok in stream {
            if !seen.insert(tok) {
                continue;
            }
            let mut record = self.store.get(tok)?.unwrap_or_default();
            if is_spam {
                record.spam_count += 1;
            } else {
                record.ham_count += 1;
            }
            self.store.set(tok, record)?;
        }

        self.store.post_training(&self.counts)
    }

    fn remove_message(&mut self, stream: &[Token], is_spam: bool) -> Result<()> {
        self.probcache.clear();
        if is_spam {
            if self.counts.nspam == 0 {
                return Err(ClassifierError::NegativeCount { is_spam: true });
            }
            self.counts.nspam -= 1;
        } else {
            if self.counts.nham == 0 {
                return Err(ClassifierError::NegativeCount { is_spam: false });
            }
            self.counts.nham -= 1;
        }

        let mut seen: HashSet<&[u8]> = HashSet::new();
        for tok in stream {
            if !seen.insert(tok) {
                continue;
            }
            let Some(mut record) = self.store.get(tok)? else {
                continue;
            };
            // Token-level counts floor at zero even if the caller's
            // book-keeping is inconsistent; only the aggregate check above
            // is fatal.
            if is_spam {
                record.spam_count = record.spam_count.saturating_sub(1);
            } else {
                record.ham_count = record.ham_count.saturating_sub(1);
            }
            if record.is_empty() {
                self.store.delete(tok)?;
            } else {
                self.store.set(tok, record)?;
            }
        }

        self.store.post_training(&self.counts)
    }

    // --- Scoring ---

    /// Spam probability of `record`'s token: the spam/ham count ratio pulled
    /// toward the unknown-token prior in proportion to how little evidence
    /// the counts represent. Memoized per (spam_count, ham_count) pair.
    pub fn probability(&mut self, record: &WordRecord) -> f64 {
        debug_assert!(record.total() > 0, "stored records always have a count");
        let key = (record.spam_count, record.ham_count);
        if let Some(&prob) = self.probcache.get(&key) {
            return prob;
        }

        let nham = self.counts.nham.max(1) as f64;
        let nspam = self.counts.nspam.max(1) as f64;
        debug_assert!(record.ham_count as f64 <= nham);
        debug_assert!(record.spam_count as f64 <= nspam);

        let ham_ratio = record.ham_count as f64 / nham;
        let spam_ratio = record.spam_count as f64 / nspam;
        let raw = spam_ratio / (ham_ratio + spam_ratio);

        let s = self.config.unknown_token_strength;
        let n = record.total() as f64;
        let prob = (s * self.config.unknown_token_prob + n * raw) / (s + n);

        self.probcache.insert(key, prob);
        prob
    }

    /// Best-guess probability that the stream is spam, in [0, 1].
    pub fn spamprob<T: AsRef<[u8]>>(&mut self, tokens: &[T]) -> Result<f64> {
        Ok(self.combine(tokens)?.0)
    }

    /// Like `spamprob`, but also returns the clues (ascending by
    /// probability), with the `*H*`/`*S*` sentinel entries carrying the
    /// aggregate ham and spam measures prepended.
    pub fn spamprob_with_evidence<T: AsRef<[u8]>>(
        &mut self,
        tokens: &[T],
    ) -> Result<(f64, Vec<Clue>)> {
        let (score, h_measure, s_measure, clues) = self.combine(tokens)?;
        let mut evidence = Vec::with_capacity(clues.len() + 2);
        evidence.push(Clue {
            token: EVIDENCE_HAM.to_vec(),
            prob: h_measure,
        });
        evidence.push(Clue {
            token: EVIDENCE_SPAM.to_vec(),
            prob: s_measure,
        });
        evidence.extend(clues);
        Ok((score, evidence))
    }

    fn combine<T: AsRef<[u8]>>(&mut self, tokens: &[T]) -> Result<(f64, f64, f64, Vec<Clue>)> {
        let clues = self.select_clues(tokens)?;

        // The sum-of-logs business is more sensitive to probabilities near 0
        // than near 1, so the spam measure multiplies 1-p (high-spamprob
        // clues dominate) and the ham measure multiplies p directly. The
        // products are tracked as mantissa * 2^exp to get unbounded dynamic
        // range out of f64.
        let mut h = 1.0f64;
        let mut s = 1.0f64;
        let mut h_exp = 0i64;
        let mut s_exp = 0i64;
        for clue in &clues {
            s *= 1.0 - clue.prob;
            h *= clue.prob;
            if s < RESCALE_FLOOR {
                let (m, e) = frexp(s);
                s = m;
                s_exp += i64::from(e);
            }
            if h < RESCALE_FLOOR {
                let (m, e) = frexp(h);
                h = m;
                h_exp += i64::from(e);
            }
        }

        let n = clues.len();
        if n == 0 {
            return Ok((0.5, 0.0, 0.0, clues));
        }

        // ln(x * 2^i) = ln(x) + i * ln(2)
        let ln_s = s.ln() + s_exp as f64 * LN_2;
        let ln_h = h.ln() + h_exp as f64 * LN_2;
        let dof = 2 * n as u32;
        let s_measure = 1.0 - chi2q(-2.0 * ln_s, dof)?;
        let h_measure = 1.0 - chi2q(-2.0 * ln_h, dof)?;

        // S/(S+H) could be near-certain even when S itself is tiny; Rob
        // Hooft's (S - H + 1)/2 doesn't have that failure mode.
        let score = (s_measure - h_measure + 1.0) / 2.0;
        Ok((score, h_measure, s_measure, clues))
    }

    /// Select the strongest clues from the stream: every candidate at least
    /// `minimum_prob_strength` from neutral, strongest first, capped at
    /// `max_discriminators`, and (in bigram mode) tiled so that no stream
    /// index contributes to more than one chosen clue. Returned ascending by
    /// probability.
    fn select_clues<T: AsRef<[u8]>>(&mut self, tokens: &[T]) -> Result<Vec<Clue>> {
        let mut raw: Vec<Candidate> = Vec::new();
        let mut seen: HashSet<Token> = HashSet::new();

        for (i, tok) in tokens.iter().enumerate() {
            self.push_candidate(tok.as_ref().to_vec(), (i, i), &mut seen, &mut raw)?;
            if self.config.use_bigrams && i > 0 {
                let pair = token::bigram(tokens[i - 1].as_ref(), tok.as_ref());
                self.push_candidate(pair, (i - 1, i), &mut seen, &mut raw)?;
            }
        }

        // Strongest first; generation order breaks ties deterministically.
        raw.sort_by(|a, b| {
            b.distance
                .partial_cmp(&a.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.ord.cmp(&b.ord))
        });

        let mut used: HashSet<usize> = HashSet::new();
        let mut clues: Vec<Clue> = Vec::new();
        for cand in raw {
            if clues.len() == self.config.max_discriminators {
                break;
            }
            let (lo, hi) = cand.span;
            if (lo..=hi).any(|i| used.contains(&i)) {
                continue;
            }
            used.extend(lo..=hi);
            clues.push(Clue {
                token: cand.token,
                prob: cand.prob,
            });
        }

        clues.sort_by(|a, b| a.prob.partial_cmp(&b.prob).unwrap_or(Ordering::Equal));
        Ok(clues)
    }

    fn push_candidate(
        &mut self,
        tok: Token,
        span: (usize, usize),
        seen: &mut HashSet<Token>,
        raw: &mut Vec<Candidate>,
    ) -> Result<()> {
        if seen.contains(&tok) {
            return Ok(());
        }
        let prob = match self.store.get(&tok)? {
            Some(record) => self.probability(&record),
            None => self.config.unknown_token_prob,
        };
        let distance = (prob - 0.5).abs();
        let ord = seen.len();
        seen.insert(tok.clone());
        if distance >= self.config.minimum_prob_strength {
            raw.push(Candidate {
                distance,
                prob,
                token: tok,
                span,
                ord,
            });
        }
        Ok(())
    }
}
