//! Property-based tests for retrieval, parsing, prompt assembly and scoring.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;

use raglab::answer::clean;
use raglab::core::config::LabConfig;
use raglab::corpus::{Corpus, Record, Split};
use raglab::eval::{accuracy, keystroke_reduction};
use raglab::prompt::PromptBuilder;
use raglab::retrieval::{RetrievalMode, Retriever};

// ============================================================================
// Strategies
// ============================================================================

fn arb_concepts() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(
        prop_oneof![
            Just("diabetes".to_string()),
            Just("insulin".to_string()),
            Just("cancer".to_string()),
            Just("stroke".to_string()),
            Just("aspirin".to_string()),
        ],
        0..4,
    )
}

fn arb_label() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("yes".to_string()),
        Just("no".to_string()),
        Just("maybe".to_string()),
    ]
}

fn arb_corpus() -> impl Strategy<Value = Corpus> {
    prop::collection::vec((arb_concepts(), arb_label()), 2..12).prop_map(|entries| {
        let total = entries.len();
        let records: Vec<Record> = entries
            .into_iter()
            .enumerate()
            .map(|(i, (concepts, label))| {
                Record::new(format!("r{:02}", i), format!("question {}", i), label)
                    .with_concepts(concepts)
                    .with_long_answer(format!("because {}", i))
            })
            .collect();
        let train_end = total - 1;
        Corpus::new(records, Split::new(0, train_end), Split::new(train_end, total))
            .expect("generated corpus is valid")
    })
}

fn arb_symbols() -> impl Strategy<Value = BTreeMap<String, char>> {
    prop::collection::btree_map("[a-z]{1,4}", prop::char::range('A', 'C'), 0..20)
}

// ============================================================================
// Retrieval
// ============================================================================

proptest! {
    #[test]
    fn prop_tag_overlap_never_returns_disjoint_neighbors(corpus in arb_corpus(), k in prop::option::of(1usize..6)) {
        let corpus = Arc::new(corpus);
        let retriever = Retriever::new(Arc::clone(&corpus));
        for query in corpus.records() {
            let neighbors = retriever
                .find_neighbors(&query.id, corpus.train_split(), RetrievalMode::TagOverlap, k)
                .expect("neighbors");
            for id in &neighbors {
                prop_assert_ne!(id, &query.id);
                let neighbor = corpus.get(id).expect("neighbor exists");
                prop_assert!(!neighbor.concepts.is_disjoint(&query.concepts));
            }
            if let Some(k) = k {
                prop_assert!(neighbors.len() <= k);
            }
        }
    }
}

// ============================================================================
// Answer cleaning
// ============================================================================

proptest! {
    #[test]
    fn prop_clean_is_idempotent(text in ".{0,64}") {
        let once = clean(&text);
        prop_assert_eq!(clean(&once), once.clone());
    }

    #[test]
    fn prop_clean_keeps_only_letters_periods_and_single_spaces(text in ".{0,64}") {
        let cleaned = clean(&text);
        prop_assert!(cleaned.chars().all(|c| c.is_alphabetic() || c == '.' || c == ' '));
        prop_assert!(!cleaned.contains("  "));
        prop_assert_eq!(cleaned.trim(), cleaned.as_str());
    }
}

// ============================================================================
// Prompt assembly
// ============================================================================

proptest! {
    #[test]
    fn prop_prompt_assembly_is_deterministic(corpus in arb_corpus(), shots in 0usize..3) {
        let builder = PromptBuilder::from_config(&LabConfig::default());
        let query = &corpus.test()[0];
        let neighbors: Vec<&Record> = corpus.train().iter().collect();
        prop_assume!(shots <= neighbors.len());

        let first = builder.build_prompt(query, &neighbors, shots).expect("prompt");
        let second = builder.build_prompt(query, &neighbors, shots).expect("prompt");
        prop_assert_eq!(first.render(), second.render());
        prop_assert_eq!(first.fingerprint(), second.fingerprint());
        prop_assert_eq!(first.shot_count(), shots);
    }
}

// ============================================================================
// Scoring
// ============================================================================

proptest! {
    #[test]
    fn prop_accuracy_is_bounded(predictions in arb_symbols(), gold in arb_symbols()) {
        let score = accuracy(&predictions, &gold);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn prop_accuracy_of_gold_against_itself_is_one(gold in arb_symbols()) {
        prop_assume!(!gold.is_empty());
        prop_assert_eq!(accuracy(&gold, &gold), 1.0);
    }

    #[test]
    fn prop_keystroke_reduction_is_bounded(pairs in prop::collection::vec(("[a-z ]{0,20}", "[a-z ]{0,20}"), 0..8)) {
        let score = keystroke_reduction(pairs.iter().map(|(h, r)| (h.as_str(), r.as_str())));
        prop_assert!((0.0..=1.0).contains(&score));
    }
}
