//! Integration tests exercising the full train → score pipeline over the
//! in-memory store, in both unigram and bigram modes.

use gm_core::{Classifier, ClassifierConfig, HAM_CUTOFF, MemoryStore, SPAM_CUTOFF};
use proptest::prelude::*;

fn toks(words: &[&str]) -> Vec<Vec<u8>> {
    words.iter().map(|w| w.as_bytes().to_vec()).collect()
}

const HAM_WORDS: [&str; 5] = ["dog", "cat", "horse", "sloth", "koala"];
const SPAM_WORDS: [&str; 5] = ["shark", "raptor", "bear", "spider", "cockroach"];

#[test]
fn trained_animals_score_past_the_cutoffs() {
    let mut c = Classifier::new(MemoryStore::new()).unwrap();
    c.learn_ham(&toks(&HAM_WORDS)).unwrap();
    c.learn_spam(&toks(&SPAM_WORDS)).unwrap();

    let spammy = c.spamprob(&toks(&["shark", "bear", "spider"])).unwrap();
    assert!(spammy >= SPAM_CUTOFF, "spam score too low: {spammy}");

    let hammy = c.spamprob(&toks(&["dog", "sloth", "koala"])).unwrap();
    assert!(hammy <= HAM_CUTOFF, "ham score too high: {hammy}");
}

#[test]
fn trained_animals_score_past_the_cutoffs_with_bigrams() {
    let mut c =
        Classifier::with_config(MemoryStore::new(), ClassifierConfig::with_bigrams()).unwrap();
    c.learn_ham(&toks(&HAM_WORDS)).unwrap();
    c.learn_spam(&toks(&SPAM_WORDS)).unwrap();

    let spammy = c.spamprob(&toks(&["shark", "bear", "spider"])).unwrap();
    assert!(spammy >= SPAM_CUTOFF, "spam score too low: {spammy}");

    let hammy = c.spamprob(&toks(&["dog", "sloth", "koala"])).unwrap();
    assert!(hammy <= HAM_CUTOFF, "ham score too high: {hammy}");
}

#[test]
fn mixed_evidence_lands_in_the_middle_ground() {
    let mut c = Classifier::new(MemoryStore::new()).unwrap();
    c.learn_ham(&toks(&HAM_WORDS)).unwrap();
    c.learn_spam(&toks(&SPAM_WORDS)).unwrap();

    // Strong ham and strong spam clues together: chi-combining is immune to
    // cancellation disease and reliably scores near 0.5.
    let p = c
        .spamprob(&toks(&["shark", "dog", "bear", "cat"]))
        .unwrap();
    assert!(
        (0.3..=0.7).contains(&p),
        "conflicting evidence should stay mid-range: {p}"
    );
}

#[test]
fn unlearn_restores_every_record_and_the_keyspace() {
    let mut c = Classifier::new(MemoryStore::new()).unwrap();
    c.learn_ham(&toks(&HAM_WORDS)).unwrap();

    let mut keys_before = c.keys().unwrap();
    keys_before.sort();
    let nham_before = c.nham();

    c.learn_spam(&toks(&["shark", "dog", "dog"])).unwrap();
    c.unlearn_spam(&toks(&["shark", "dog", "dog"])).unwrap();

    let mut keys_after = c.keys().unwrap();
    keys_after.sort();
    assert_eq!(keys_before, keys_after);
    assert_eq!(c.nham(), nham_before);
    assert_eq!(c.nspam(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_scores_stay_in_unit_interval(
        ham in proptest::collection::vec("[a-z]{1,8}", 0..20),
        spam in proptest::collection::vec("[a-z]{1,8}", 0..20),
        query in proptest::collection::vec("[a-z]{1,8}", 0..20),
    ) {
        let mut c = Classifier::new(MemoryStore::new()).unwrap();
        let ham: Vec<Vec<u8>> = ham.iter().map(|w| w.as_bytes().to_vec()).collect();
        let spam: Vec<Vec<u8>> = spam.iter().map(|w| w.as_bytes().to_vec()).collect();
        let query: Vec<Vec<u8>> = query.iter().map(|w| w.as_bytes().to_vec()).collect();
        if !ham.is_empty() {
            c.learn_ham(&ham).unwrap();
        }
        if !spam.is_empty() {
            c.learn_spam(&spam).unwrap();
        }

        let p = c.spamprob(&query).unwrap();
        prop_assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn prop_learn_unlearn_is_identity(
        base in proptest::collection::vec("[a-z]{1,6}", 1..15),
        message in proptest::collection::vec("[a-z]{1,6}", 1..15),
        is_spam in any::<bool>(),
    ) {
        let mut c = Classifier::new(MemoryStore::new()).unwrap();
        let base: Vec<Vec<u8>> = base.iter().map(|w| w.as_bytes().to_vec()).collect();
        let message: Vec<Vec<u8>> = message.iter().map(|w| w.as_bytes().to_vec()).collect();
        c.learn_ham(&base).unwrap();
        c.learn_spam(&base).unwrap();

        let nspam = c.nspam();
        let nham = c.nham();
        let mut keys = c.keys().unwrap();
        keys.sort();

        c.learn(&message, is_spam).unwrap();
        c.unlearn(&message, is_spam).unwrap();

        let mut keys_after = c.keys().unwrap();
        keys_after.sort();
        prop_assert_eq!(c.nspam(), nspam);
        prop_assert_eq!(c.nham(), nham);
        prop_assert_eq!(keys, keys_after);
    }
}
