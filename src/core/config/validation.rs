use serde_json::{Map, Value};

use crate::core::errors::LabError;

pub fn validate_config(config: &Value) -> Result<(), LabError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(mapping) = expect_optional_object(root, "answer_mapping")? {
        for (label, symbol) in mapping {
            validate_symbol(&format!("answer_mapping.{}", label), symbol)?;
        }
    }

    if let Some(prompt) = expect_optional_object(root, "prompt")? {
        validate_optional_string_field(prompt, "prompt.instruction", "instruction")?;
        validate_required_string_field(prompt, "prompt.rationale_marker", "rationale_marker")?;
        validate_required_string_field(prompt, "prompt.answer_marker", "answer_marker")?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_enum_field(
            retrieval,
            "retrieval.mode",
            "mode",
            &["similarity", "tag_overlap", "random"],
        )?;
        validate_optional_u64_field(retrieval, "retrieval.k", "k", 0, 10_000)?;
        validate_u64_field(retrieval, "retrieval.num_shots", "num_shots", 0, 64)?;
        validate_u64_field(retrieval, "retrieval.seed", "seed", 0, u64::MAX)?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        validate_u64_field(rag, "rag.max_chunks", "max_chunks", 1, 100_000)?;
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 1_000)?;
        validate_u64_field(
            rag,
            "rag.max_context_length",
            "max_context_length",
            1,
            10_000_000,
        )?;
        validate_bool_field(rag, "rag.include_citations", "include_citations")?;
        validate_f64_field(
            rag,
            "rag.similarity_threshold",
            "similarity_threshold",
            -1.0,
            1.0,
        )?;
    }

    if let Some(decoding) = expect_optional_object(root, "decoding")? {
        validate_u64_field(decoding, "decoding.num_beams", "num_beams", 1, 64)?;
        validate_bool_field(decoding, "decoding.do_sample", "do_sample")?;
        validate_optional_u64_field(decoding, "decoding.max_length", "max_length", 1, 1_000_000)?;
        validate_optional_u64_field(decoding, "decoding.min_length", "min_length", 0, 1_000_000)?;
        validate_string_array_field(decoding, "decoding.concept_bias", "concept_bias")?;
    }

    if let Some(generator) = expect_optional_object(root, "generator")? {
        validate_required_string_field(generator, "generator.base_url", "base_url")?;
        validate_required_string_field(generator, "generator.model", "model")?;
        validate_u64_field(generator, "generator.timeout_secs", "timeout_secs", 1, 86_400)?;
        validate_u64_field(
            generator,
            "generator.max_concurrency",
            "max_concurrency",
            1,
            256,
        )?;
    }

    if let Some(splits) = expect_optional_object(root, "splits")? {
        for name in ["train", "test"] {
            let Some(value) = splits.get(name) else {
                continue;
            };
            let path = format!("splits.{}", name);
            let range = value
                .as_object()
                .ok_or_else(|| config_type_error(&path, "object"))?;
            validate_u64_field(range, &format!("{}.start", path), "start", 0, u64::MAX)?;
            validate_u64_field(range, &format!("{}.end", path), "end", 0, u64::MAX)?;
        }
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, LabError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_symbol(path: &str, value: &Value) -> Result<(), LabError> {
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "single-character string"));
    };
    if text.chars().count() != 1 {
        return Err(config_type_error(path, "single-character string"));
    }
    Ok(())
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), LabError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), LabError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(LabError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), LabError> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(()),
        Some(_) => validate_u64_field(section, path, key, min, max),
    }
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), LabError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(LabError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), LabError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !allowed.contains(&text) {
        return Err(LabError::Config(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            allowed.join(", ")
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), LabError> {
    let value = section.get(key).ok_or_else(|| {
        LabError::Config(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(LabError::Config(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), LabError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), LabError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(LabError::Config(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> LabError {
    LabError::Config(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
