use std::sync::OnceLock;

use regex::Regex;

use crate::core::config::PromptConfig;
use crate::core::errors::LabError;
use crate::llm::RawGeneration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnswer {
    pub rationale: String,
    pub symbol: char,
}

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}.\s]").expect("valid regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Keep letters, periods and whitespace; collapse whitespace runs to one space.
///
/// Idempotent: `clean(&clean(x)) == clean(x)`.
pub fn clean(text: &str) -> String {
    let kept = disallowed_chars().replace_all(text, "");
    whitespace_runs().replace_all(&kept, " ").trim().to_string()
}

/// Splits a generation on the rationale marker, then the answer marker.
#[derive(Debug, Clone)]
pub struct AnswerParser {
    rationale_marker: String,
    answer_marker: String,
}

impl AnswerParser {
    pub fn new(rationale_marker: impl Into<String>, answer_marker: impl Into<String>) -> Self {
        Self {
            rationale_marker: rationale_marker.into(),
            answer_marker: answer_marker.into(),
        }
    }

    pub fn from_config(prompt: &PromptConfig) -> Self {
        Self::new(&prompt.rationale_marker, &prompt.answer_marker)
    }

    /// Parse a generation. With several candidates only the first is used.
    pub fn parse(&self, raw: &RawGeneration) -> Result<ParsedAnswer, LabError> {
        match raw {
            RawGeneration::Text(text) => self.parse_text(text),
            RawGeneration::Candidates(candidates) => {
                let first = candidates.first().ok_or_else(|| {
                    LabError::MalformedAnswer("generation returned no candidates".to_string())
                })?;
                self.parse_text(first)
            }
            RawGeneration::Structured(value) => Err(LabError::UnsupportedFormat(format!(
                "expected text or a list of texts, got {}",
                json_kind(value)
            ))),
        }
    }

    pub fn parse_text(&self, text: &str) -> Result<ParsedAnswer, LabError> {
        let rationale_at = text.find(&self.rationale_marker).ok_or_else(|| {
            LabError::MalformedAnswer(format!("missing '{}' marker", self.rationale_marker))
        })?;
        let after_rationale = &text[rationale_at + self.rationale_marker.len()..];

        let answer_at = after_rationale.find(&self.answer_marker).ok_or_else(|| {
            LabError::MalformedAnswer(format!(
                "missing '{}' marker after '{}'",
                self.answer_marker, self.rationale_marker
            ))
        })?;

        let rationale = trim_field(&after_rationale[..answer_at]);
        let answer_segment = &after_rationale[answer_at + self.answer_marker.len()..];

        let cleaned = clean(answer_segment);
        let symbol = cleaned.chars().next().ok_or_else(|| {
            LabError::MalformedAnswer(format!(
                "'{}' field has no usable characters",
                self.answer_marker
            ))
        })?;

        Ok(ParsedAnswer {
            rationale: unescape(rationale),
            symbol,
        })
    }
}

impl Default for AnswerParser {
    fn default() -> Self {
        Self::from_config(&PromptConfig::default())
    }
}

/// Strip the JSON punctuation around a field value: the key's closing quote
/// and colon in front, the value's closing quote, comma and the next key's
/// opening quote behind. Escaped quotes inside the value are kept.
fn trim_field(segment: &str) -> &str {
    let mut field = segment
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '"' | ':' | '='))
        .trim_end();
    field = field.strip_suffix('"').unwrap_or(field);
    field = field.trim_end_matches(|c: char| c.is_whitespace() || c == ',');
    if let Some(body) = field.strip_suffix('"') {
        // An odd run of backslashes before the quote escapes it.
        let backslashes = body.len() - body.trim_end_matches('\\').len();
        if backslashes % 2 == 0 {
            field = body;
        }
    }
    field
}

fn unescape(value: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", value)).unwrap_or_else(|_| value.to_string())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_keeps_letters_periods_and_single_spaces() {
        assert_eq!(clean("RIS(K)! of.. Bias"), "RISK of.. Bias");
        assert_eq!(clean("  \"A\"}\n"), "A");
        assert_eq!(clean("42 !?"), "");
    }

    #[test]
    fn clean_is_idempotent() {
        let once = clean("RIS(K)! of..   Bias\t\n");
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn parses_json_shaped_answer() {
        let parser = AnswerParser::default();
        let parsed = parser
            .parse(&RawGeneration::Text(
                r#"{"step_by_step_thinking": "ok","answer_choice": "A"}"#.to_string(),
            ))
            .expect("parse");

        assert_eq!(parsed.symbol, 'A');
        assert_eq!(parsed.rationale, "ok");
    }

    #[test]
    fn rationale_escapes_are_decoded() {
        let parser = AnswerParser::default();
        let parsed = parser
            .parse_text(r#"{"step_by_step_thinking": "said \"no\"", "answer_choice": "B. no"}"#)
            .expect("parse");
        assert_eq!(parsed.rationale, "said \"no\"");
        assert_eq!(parsed.symbol, 'B');
    }

    #[test]
    fn trailing_escaped_backslash_closes_the_value() {
        let parser = AnswerParser::default();
        let parsed = parser
            .parse_text(r#"{"step_by_step_thinking": "dir C:\\", "answer_choice": "A"}"#)
            .expect("parse");
        assert_eq!(parsed.rationale, "dir C:\\");
        assert_eq!(parsed.symbol, 'A');
    }

    #[test]
    fn first_candidate_wins() {
        let parser = AnswerParser::default();
        let raw = RawGeneration::Candidates(vec![
            r#"{"step_by_step_thinking": "x", "answer_choice": "C"}"#.to_string(),
            r#"{"step_by_step_thinking": "y", "answer_choice": "A"}"#.to_string(),
        ]);
        assert_eq!(parser.parse(&raw).expect("parse").symbol, 'C');
    }

    #[test]
    fn missing_markers_are_malformed() {
        let parser = AnswerParser::default();
        assert!(matches!(
            parser.parse_text("The answer is A"),
            Err(LabError::MalformedAnswer(_))
        ));
        assert!(matches!(
            parser.parse_text(r#"{"step_by_step_thinking": "no answer field"}"#),
            Err(LabError::MalformedAnswer(_))
        ));
    }

    #[test]
    fn answer_marker_before_rationale_is_malformed() {
        let parser = AnswerParser::default();
        let text = r#"{"answer_choice": "A", "step_by_step_thinking": "late"}"#;
        assert!(matches!(parser.parse_text(text), Err(LabError::MalformedAnswer(_))));
    }

    #[test]
    fn empty_answer_segment_is_malformed() {
        let parser = AnswerParser::default();
        let text = r#"{"step_by_step_thinking": "ok", "answer_choice": "1"}"#;
        assert!(matches!(parser.parse_text(text), Err(LabError::MalformedAnswer(_))));
    }

    #[test]
    fn empty_candidate_list_is_malformed() {
        let parser = AnswerParser::default();
        assert!(matches!(
            parser.parse(&RawGeneration::Candidates(vec![])),
            Err(LabError::MalformedAnswer(_))
        ));
    }

    #[test]
    fn structured_output_is_unsupported() {
        let parser = AnswerParser::default();
        let err = parser
            .parse(&RawGeneration::Structured(json!({"answer_choice": "A"})))
            .unwrap_err();
        assert!(matches!(err, LabError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("an object"));
    }
}
