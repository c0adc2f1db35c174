use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::defaults::default_config;
use super::paths::AppPaths;
use super::schema::LabConfig;
use super::validation::validate_config;
use crate::core::errors::LabError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 6] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "credential",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RAGLAB_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    /// Defaults, overlaid with `config.yml`, as an untyped tree.
    pub fn load_value(&self) -> Result<Value, LabError> {
        let file_config = load_yaml_file(&self.config_path())?;
        let mut merged = deep_merge(&default_config(), &file_config);

        if let Ok(key) = env::var("RAGLAB_API_KEY") {
            if !key.is_empty() {
                if let Some(generator) = merged.get_mut("generator").and_then(Value::as_object_mut) {
                    generator.insert("api_key".to_string(), Value::String(key));
                }
            }
        }

        validate_config(&merged)?;
        Ok(merged)
    }

    pub fn load_config(&self) -> Result<LabConfig, LabError> {
        let value = self.load_value()?;
        tracing::debug!(config = %redact_sensitive_values(&value), "Effective configuration");
        config_from_value(value)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

pub fn config_from_value(value: Value) -> Result<LabConfig, LabError> {
    let config: LabConfig = serde_json::from_value(value)
        .map_err(|err| LabError::Config(format!("Failed to parse configuration: {}", err)))?;
    config.validate()?;
    Ok(config)
}

fn load_yaml_file(path: &Path) -> Result<Value, LabError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(LabError::io)?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|err| {
        LabError::Config(format!("Failed to parse {}: {}", path.display(), err))
    })?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(LabError::Config(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RetrievalMode;
    use serde_json::json;

    fn service_in(dir: &Path) -> ConfigService {
        let paths = AppPaths::with_data_dir(dir.to_path_buf(), dir.join("data"));
        ConfigService::new(Arc::new(paths))
    }

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "a": 1,
            "b": { "c": 2, "d": 3 },
            "arr": [1, 2]
        });
        let override_value = json!({
            "b": { "c": 99 },
            "arr": [3],
            "e": "x"
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "a": 1,
                "b": { "c": 99, "d": 3 },
                "arr": [3],
                "e": "x"
            })
        );
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "generator": { "api_key": "secret", "model": "m" },
            "decoding": { "max_tokens": 42 }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "generator": { "api_key": "****", "model": "m" },
                "decoding": { "max_tokens": 42 }
            })
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let service = service_in(tmp.path());

        let config = service.load_config().expect("defaults load");
        assert_eq!(config.retrieval.num_shots, 3);
        assert_eq!(config.answer_mapping.symbol_for("yes").expect("mapped"), 'A');
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join("config.yml"),
            "retrieval:\n  mode: tag_overlap\n  num_shots: 2\nsplits:\n  train: { start: 0, end: 3 }\n  test: { start: 3, end: 4 }\n",
        )
        .expect("write config");
        let service = service_in(tmp.path());

        let config = service.load_config().expect("config loads");
        assert_eq!(config.retrieval.num_shots, 2);
        assert_eq!(config.retrieval.mode, RetrievalMode::TagOverlap);
        assert_eq!(config.retrieval.seed, 42);
        assert_eq!(config.splits.test.start, 3);
    }

    #[test]
    fn invalid_yaml_values_are_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("config.yml"), "decoding:\n  num_beams: 0\n")
            .expect("write config");
        let service = service_in(tmp.path());

        assert!(matches!(service.load_config(), Err(LabError::Config(_))));
    }

    #[test]
    fn neighbor_bound_below_shots_is_rejected_on_load() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join("config.yml"),
            "retrieval:\n  k: 2\n  num_shots: 3\n",
        )
        .expect("write config");
        let service = service_in(tmp.path());

        let err = service.load_config().unwrap_err();
        assert!(err.to_string().contains("retrieval.k"));
    }
}
