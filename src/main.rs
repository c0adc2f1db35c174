use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use raglab::core::config::{AppPaths, ConfigService, LabConfig};
use raglab::core::logging;
use raglab::corpus::{load_jsonl, load_pubmedqa, Corpus, Split};
use raglab::eval::{Evaluator, Method};
use raglab::export;
use raglab::llm::{with_deadline, Generator, OpenAiCompatGenerator, StaticGenerator};
use raglab::retrieval::{Embedder, EmbeddingTable, HashingEmbedder, RetrievalMode};

#[derive(Parser)]
#[command(name = "raglab", version, about = "Few-shot and retrieval-augmented QA evaluation")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Evaluate one method over the test split and export the answers
    Run {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        method: Method,
        /// Print the prompts without calling the generator
        #[arg(long)]
        dry_run: bool,
        /// Answers file name inside the results directory
        #[arg(long)]
        out: Option<String>,
        /// Training range as START:END
        #[arg(long, value_parser = parse_split)]
        train: Option<Split>,
        /// Test range as START:END
        #[arg(long, value_parser = parse_split)]
        test: Option<Split>,
        #[arg(long)]
        num_shots: Option<usize>,
    },
    /// Print the neighbor ids of every test record as JSON
    Neighbors {
        #[arg(long)]
        dataset: PathBuf,
        /// Defaults to `retrieval.mode` from the config
        #[arg(long)]
        mode: Option<RetrievalMode>,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long, value_parser = parse_split)]
        train: Option<Split>,
        #[arg(long, value_parser = parse_split)]
        test: Option<Split>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);
    let mut config = ConfigService::new(Arc::clone(&paths))
        .load_config()
        .context("Failed to load configuration")?;

    match cli.cmd {
        Cmd::Run {
            dataset,
            method,
            dry_run,
            out,
            train,
            test,
            num_shots,
        } => {
            if let Some(num_shots) = num_shots {
                config.retrieval.num_shots = num_shots;
            }
            apply_splits(&mut config, train, test)?;
            run(&paths, config, &dataset, method, dry_run, out).await
        }
        Cmd::Neighbors {
            dataset,
            mode,
            k,
            train,
            test,
        } => {
            apply_splits(&mut config, train, test)?;
            neighbors(config, &dataset, mode, k).await
        }
    }
}

async fn run(
    paths: &AppPaths,
    config: LabConfig,
    dataset: &Path,
    method: Method,
    dry_run: bool,
    out: Option<String>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let corpus = Arc::new(load_corpus(&config, dataset)?);

    let generator: Arc<dyn Generator> = if dry_run {
        Arc::new(StaticGenerator::new(""))
    } else {
        let client = OpenAiCompatGenerator::new(&config.generator)?;
        with_deadline(
            Arc::new(client),
            Duration::from_secs(config.generator.timeout_secs),
        )
    };

    let embedder = build_embedder(&config)?;
    let evaluator = Evaluator::new(Arc::clone(&corpus), Arc::clone(&config), generator)
        .with_indexes(embedder)
        .await
        .context("Failed to build retrieval indexes")?;

    if dry_run {
        let preparation = evaluator.prepare(method).await?;
        for query in &preparation.queries {
            println!("=== {} ({}) ===", query.record_id, query.prompt.fingerprint());
            println!("{}\n", query.prompt.render());
        }
        for failure in &preparation.failures {
            eprintln!("skipped {}: {}", failure.id, failure.message);
        }
        return Ok(());
    }

    let report = evaluator.run(method).await?;
    let stem = export::run_file_stem(&report);
    let answers_file = out.unwrap_or_else(|| format!("{}.jsonl", stem));
    let answers_path = export::export_answers(&paths.results_dir, &answers_file, &report.answers)?;
    let report_path = export::export_report(&paths.results_dir, &format!("{}.report.json", stem), &report)?;

    println!("method:              {}", report.method);
    println!("accuracy:            {:.4}", report.metrics.accuracy);
    println!("keystroke reduction: {:.4}", report.metrics.keystroke_reduction);
    if let Some(correlation) = report.metrics.correlation {
        println!("correlation:         {:.4}", correlation);
    }
    for (kind, count) in report.failure_counts() {
        println!("failed ({}): {}", kind, count);
    }
    println!("answers: {}", answers_path.display());
    println!("report:  {}", report_path.display());
    Ok(())
}

async fn neighbors(
    config: LabConfig,
    dataset: &Path,
    mode: Option<RetrievalMode>,
    k: Option<usize>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let corpus = Arc::new(load_corpus(&config, dataset)?);
    let needs_embeddings = mode.unwrap_or(config.retrieval.mode) == RetrievalMode::Similarity;

    let mut evaluator = Evaluator::new(
        Arc::clone(&corpus),
        Arc::clone(&config),
        Arc::new(StaticGenerator::new("")),
    );
    if needs_embeddings {
        let embedder = build_embedder(&config)?;
        let table = EmbeddingTable::build(embedder.as_ref(), corpus.records()).await?;
        evaluator = evaluator.with_embeddings(Arc::new(table));
    }

    let set = evaluator.neighbor_set(mode, k)?;
    println!("{}", serde_json::to_string_pretty(&set)?);
    Ok(())
}

fn load_corpus(config: &LabConfig, dataset: &Path) -> anyhow::Result<Corpus> {
    let records = match dataset.extension().and_then(|ext| ext.to_str()) {
        Some("jsonl") => load_jsonl(dataset)?,
        _ => load_pubmedqa(dataset, &config.answer_mapping.labels())?,
    };
    tracing::info!(records = records.len(), dataset = %dataset.display(), "Dataset loaded");

    Corpus::new(records, config.splits.train, config.splits.test)
        .with_context(|| format!("Invalid splits for {}", dataset.display()))
}

fn build_embedder(config: &LabConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    if config.generator.embedding_model.is_some() {
        Ok(Arc::new(OpenAiCompatGenerator::new(&config.generator)?))
    } else {
        Ok(Arc::new(HashingEmbedder::default()))
    }
}

fn apply_splits(config: &mut LabConfig, train: Option<Split>, test: Option<Split>) -> anyhow::Result<()> {
    if let Some(train) = train {
        config.splits.train = train;
    }
    if let Some(test) = test {
        config.splits.test = test;
    }
    config.validate().context("Invalid command-line override")?;
    Ok(())
}

fn parse_split(value: &str) -> Result<Split, String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", value))?;
    let start = start.trim().parse::<usize>().map_err(|err| err.to_string())?;
    let end = end.trim().parse::<usize>().map_err(|err| err.to_string())?;
    if start > end {
        return Err(format!("start {} is after end {}", start, end));
    }
    Ok(Split::new(start, end))
}
