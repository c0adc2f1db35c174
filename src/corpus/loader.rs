use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::Record;
use crate::core::errors::LabError;

/// Raw entry of a PubMedQA-style dataset file.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "QUESTION")]
    question: String,
    #[serde(rename = "CONTEXTS", default)]
    contexts: Vec<String>,
    #[serde(rename = "LONG_ANSWER", default)]
    long_answer: Option<String>,
    final_decision: String,
    #[serde(rename = "MESHES", default)]
    meshes: Vec<String>,
}

/// Load a JSON object keyed by question id.
///
/// Records come back ordered by id so split ranges are stable across runs.
/// `MESHES` terms become the record's concepts.
pub fn load_pubmedqa(path: &Path, options: &[String]) -> Result<Vec<Record>, LabError> {
    let contents = fs::read_to_string(path)
        .map_err(|err| LabError::Io(format!("Failed to read {}: {}", path.display(), err)))?;
    parse_pubmedqa(&contents, options)
}

pub(crate) fn parse_pubmedqa(contents: &str, options: &[String]) -> Result<Vec<Record>, LabError> {
    let raw: BTreeMap<String, RawEntry> = serde_json::from_str(contents)
        .map_err(|err| LabError::Config(format!("Invalid dataset JSON: {}", err)))?;

    let records = raw
        .into_iter()
        .map(|(id, entry)| Record {
            id,
            question: entry.question,
            options: options.to_vec(),
            concepts: entry
                .meshes
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            gold_answer: entry.final_decision.trim().to_lowercase(),
            long_answer: entry.long_answer.filter(|a| !a.trim().is_empty()),
            contexts: entry.contexts,
        })
        .collect();

    Ok(records)
}

/// Load one serialized `Record` per line, skipping blank lines.
pub fn load_jsonl(path: &Path) -> Result<Vec<Record>, LabError> {
    let contents = fs::read_to_string(path)
        .map_err(|err| LabError::Io(format!("Failed to read {}: {}", path.display(), err)))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str::<Record>(line).map_err(|err| {
                LabError::Config(format!(
                    "{}:{}: invalid record: {}",
                    path.display(),
                    number + 1,
                    err
                ))
            })
        })
        .collect()
}
