//! End-to-end runs over a small in-memory corpus with stub generators.

use std::sync::Arc;

use raglab::core::config::LabConfig;
use raglab::core::errors::LabError;
use raglab::corpus::{Corpus, Record, Split};
use raglab::eval::{Evaluator, Method};
use raglab::export::{export_answers, export_report, load_answers, load_report};
use raglab::llm::{FnGenerator, RawGeneration, StaticGenerator};
use raglab::prompt::{PromptBuilder, PromptSpec};
use raglab::retrieval::{HashingEmbedder, RetrievalMode, Retriever};

const ANSWER_A: &str = r#"{"step_by_step_thinking": "ok","answer_choice": "A"}"#;
const ANSWER_B: &str = r#"{"step_by_step_thinking": "ok","answer_choice": "B"}"#;

fn records() -> Vec<Record> {
    vec![
        Record::new("A", "Does insulin reduce HbA1c in type 2 diabetes?", "yes")
            .with_concepts(["diabetes", "insulin"])
            .with_long_answer("Insulin reduces HbA1c.")
            .with_contexts(["Insulin therapy reduced HbA1c in adults with type 2 diabetes."]),
        Record::new("B", "Does radiotherapy improve survival in lung cancer?", "no")
            .with_concepts(["cancer"])
            .with_long_answer("No survival benefit was observed.")
            .with_contexts(["Radiotherapy showed no survival benefit in the cohort."]),
        Record::new("C", "Is aspirin useful after stroke?", "maybe")
            .with_concepts(["stroke"])
            .with_long_answer("Evidence is mixed.")
            .with_contexts(["Aspirin after stroke shows mixed results."]),
        Record::new("Q", "Should diabetes patients start insulin early?", "yes")
            .with_concepts(["diabetes"])
            .with_long_answer("ok"),
    ]
}

fn corpus() -> Arc<Corpus> {
    Arc::new(Corpus::new(records(), Split::new(0, 3), Split::new(3, 4)).expect("corpus"))
}

fn config() -> Arc<LabConfig> {
    let mut config = LabConfig::default();
    config.splits.train = Split::new(0, 3);
    config.splits.test = Split::new(3, 4);
    config.retrieval.num_shots = 1;
    config.rag.similarity_threshold = 0.0;
    Arc::new(config)
}

#[tokio::test]
async fn stub_answering_gold_scores_full_accuracy() {
    let evaluator = Evaluator::new(corpus(), config(), Arc::new(StaticGenerator::new(ANSWER_A)));
    let report = evaluator.run(Method::Vanilla).await.expect("run");

    assert_eq!(report.answers["Q"].predicted, 'A');
    assert_eq!(report.metrics.accuracy, 1.0);
}

#[tokio::test]
async fn stub_answering_wrong_symbol_scores_zero() {
    let evaluator = Evaluator::new(corpus(), config(), Arc::new(StaticGenerator::new(ANSWER_B)));
    let report = evaluator.run(Method::Vanilla).await.expect("run");

    assert_eq!(report.answers["Q"].predicted, 'B');
    assert_eq!(report.metrics.accuracy, 0.0);
}

#[test]
fn tag_overlap_returns_only_sharing_record() {
    let retriever = Retriever::new(corpus());
    let neighbors = retriever
        .find_neighbors("Q", Split::new(0, 3), RetrievalMode::TagOverlap, None)
        .expect("neighbors");
    assert_eq!(neighbors, vec!["A".to_string()]);
}

#[test]
fn five_shots_from_two_neighbors_is_insufficient() {
    let corpus = corpus();
    let builder = PromptBuilder::from_config(&config());
    let neighbors = vec![
        corpus.get("A").expect("A"),
        corpus.get("B").expect("B"),
    ];

    let err = builder
        .build_prompt(corpus.get("Q").expect("Q"), &neighbors, 5)
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::InsufficientNeighbors {
            requested: 5,
            available: 2
        }
    ));
}

#[tokio::test]
async fn few_shot_tags_uses_sharing_demonstration() {
    let generator = Arc::new(FnGenerator::new(|prompt: &PromptSpec| {
        assert_eq!(prompt.shot_count(), 1);
        assert_eq!(prompt.demonstrations[0].record_id, "A");
        Ok(RawGeneration::Text(ANSWER_A.to_string()))
    }));
    let evaluator = Evaluator::new(corpus(), config(), generator);

    let report = evaluator.run(Method::FewShotTags).await.expect("run");
    assert_eq!(report.metrics.accuracy, 1.0);
}

#[tokio::test]
async fn timeouts_are_recorded_as_retryable_failures() {
    let generator = Arc::new(FnGenerator::new(|_: &PromptSpec| {
        Err(LabError::GenerationTimeout(std::time::Duration::from_secs(1)))
    }));
    let evaluator = Evaluator::new(corpus(), config(), generator);

    let report = evaluator.run(Method::Vanilla).await.expect("run");
    assert!(report.answers.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].retryable);
    assert_eq!(report.metrics.accuracy, 0.0);
}

#[tokio::test]
async fn internal_generator_errors_abort_the_run() {
    let generator = Arc::new(FnGenerator::new(|_: &PromptSpec| {
        Err(LabError::Internal("connection refused".to_string()))
    }));
    let evaluator = Evaluator::new(corpus(), config(), generator);

    assert!(matches!(
        evaluator.run(Method::Vanilla).await,
        Err(LabError::Internal(_))
    ));
}

#[tokio::test]
async fn exported_run_reloads_identically() {
    let evaluator = Evaluator::new(corpus(), config(), Arc::new(StaticGenerator::new(ANSWER_A)))
        .with_indexes(Arc::new(HashingEmbedder::default()))
        .await
        .expect("indexes");
    let report = evaluator.run(Method::RagFewShot).await.expect("run");

    let dir = tempfile::tempdir().expect("tempdir");
    let answers_path = export_answers(dir.path(), "answers.jsonl", &report.answers).expect("export");
    let report_path = export_report(dir.path(), "report.json", &report).expect("export report");

    assert_eq!(load_answers(&answers_path).expect("load"), report.answers);
    let reloaded = load_report(&report_path).expect("load report");
    assert_eq!(reloaded.run_id, report.run_id);
    assert_eq!(reloaded.metrics.accuracy, report.metrics.accuracy);
    assert_eq!(reloaded.answers, report.answers);
}
