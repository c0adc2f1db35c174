//! Persisting answers and run reports.
//!
//! Answers are written as JSON lines, one `{"id": .., "answer": {..}}` object
//! per record in ascending id order, so an export can be diffed and reloaded
//! into the identical mapping.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::answer::Answer;
use crate::core::errors::LabError;
use crate::eval::RunReport;

#[derive(Serialize)]
struct AnswerLineRef<'a> {
    id: &'a str,
    answer: &'a Answer,
}

#[derive(Deserialize)]
struct AnswerLine {
    id: String,
    answer: Answer,
}

/// Write `answers` to `dir/filename`, creating `dir` if needed.
pub fn export_answers(
    dir: &Path,
    filename: &str,
    answers: &BTreeMap<String, Answer>,
) -> Result<PathBuf, LabError> {
    fs::create_dir_all(dir).map_err(LabError::io)?;
    let path = dir.join(filename);

    let mut contents = String::new();
    for (id, answer) in answers {
        let line = serde_json::to_string(&AnswerLineRef { id, answer }).map_err(LabError::internal)?;
        contents.push_str(&line);
        contents.push('\n');
    }
    fs::write(&path, contents).map_err(LabError::io)?;

    tracing::info!(path = %path.display(), answers = answers.len(), "Exported answers");
    Ok(path)
}

/// Read a file written by [`export_answers`]. Blank lines are ignored.
pub fn load_answers(path: &Path) -> Result<BTreeMap<String, Answer>, LabError> {
    let contents = fs::read_to_string(path)
        .map_err(|err| LabError::Io(format!("{}: {}", path.display(), err)))?;

    let mut answers = BTreeMap::new();
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: AnswerLine = serde_json::from_str(line).map_err(|err| {
            LabError::UnsupportedFormat(format!(
                "{} line {}: {}",
                path.display(),
                line_no + 1,
                err
            ))
        })?;
        answers.insert(entry.id, entry.answer);
    }
    Ok(answers)
}

/// Write the full run report as pretty JSON.
pub fn export_report(dir: &Path, filename: &str, report: &RunReport) -> Result<PathBuf, LabError> {
    fs::create_dir_all(dir).map_err(LabError::io)?;
    let path = dir.join(filename);
    let serialized = serde_json::to_string_pretty(report).map_err(LabError::internal)?;
    fs::write(&path, serialized).map_err(LabError::io)?;
    Ok(path)
}

pub fn load_report(path: &Path) -> Result<RunReport, LabError> {
    let contents = fs::read_to_string(path).map_err(LabError::io)?;
    serde_json::from_str(&contents).map_err(|err| {
        LabError::UnsupportedFormat(format!("{}: {}", path.display(), err))
    })
}

/// Default file stem for a run: `<method>_<run id>`.
pub fn run_file_stem(report: &RunReport) -> String {
    format!("{}_{}", report.method, report.run_id.simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::Snippet;

    fn answers() -> BTreeMap<String, Answer> {
        let mut answers = BTreeMap::new();
        answers.insert(
            "20".to_string(),
            Answer {
                id: "20".to_string(),
                method: "rag".to_string(),
                predicted: 'B',
                rationale: Some("Line one\nwith \"quotes\"".to_string()),
                snippets: vec![Snippet {
                    source: "7".to_string(),
                    text: "Evidence.".to_string(),
                    score: 0.5,
                }],
                prompt_fingerprint: "ab".repeat(32),
            },
        );
        answers.insert(
            "3".to_string(),
            Answer {
                id: "3".to_string(),
                method: "rag".to_string(),
                predicted: 'A',
                rationale: None,
                snippets: Vec::new(),
                prompt_fingerprint: "cd".repeat(32),
            },
        );
        answers
    }

    #[test]
    fn export_reloads_identical_mapping() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested").join("results");

        let path = export_answers(&target, "answers.jsonl", &answers()).expect("export");
        let loaded = load_answers(&path).expect("load");

        assert_eq!(loaded, answers());
    }

    #[test]
    fn lines_are_in_ascending_id_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = export_answers(dir.path(), "answers.jsonl", &answers()).expect("export");
        let contents = fs::read_to_string(path).expect("read");

        let ids: Vec<String> = contents
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).expect("json");
                value["id"].as_str().expect("id").to_string()
            })
            .collect();
        // BTreeMap order: "20" sorts before "3"
        assert_eq!(ids, vec!["20".to_string(), "3".to_string()]);
    }

    #[test]
    fn malformed_line_is_reported_with_its_number() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.jsonl");
        fs::write(&path, "\n{\"id\": \"1\"}\n").expect("write");

        let err = load_answers(&path).unwrap_err();
        assert!(matches!(err, LabError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_answers(&dir.path().join("absent.jsonl")).unwrap_err();
        assert!(matches!(err, LabError::Io(_)));
    }
}
