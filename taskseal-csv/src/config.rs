//! Codec configuration.

use crate::codec::RowPolicy;
use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use taskseal_crypto::DEFAULT_KEYS_FILE;

pub const ENV_KEYS_FILE: &str = "TASKSEAL_KEYS_FILE";
pub const ENV_WORKERS: &str = "TASKSEAL_WORKERS";
pub const ENV_ROW_POLICY: &str = "TASKSEAL_ROW_POLICY";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Keys file used by the `*_from_keys_file` operations and the CLI.
    pub keys_file: PathBuf,
    /// Row worker threads; 0 picks one per available core.
    pub workers: usize,
    pub row_policy: RowPolicy,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            keys_file: PathBuf::from(DEFAULT_KEYS_FILE),
            workers: 0,
            row_policy: RowPolicy::default(),
        }
    }
}

impl CodecConfig {
    /// Reads a JSON config file. Absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> CodecResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| CodecError::Config(format!("{}: {e}", path.display())))
    }

    /// Applies `TASKSEAL_*` environment variables on top of the current values.
    ///
    /// Unset or empty variables leave the current value untouched.
    pub fn with_env_overrides(self) -> CodecResult<Self> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> CodecResult<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = var(ENV_KEYS_FILE) {
            self.keys_file = PathBuf::from(path);
        }
        if let Some(raw) = var(ENV_WORKERS) {
            self.workers = raw.trim().parse().map_err(|_| {
                CodecError::Config(format!("{ENV_WORKERS} must be a non-negative integer, got '{raw}'"))
            })?;
        }
        if let Some(raw) = var(ENV_ROW_POLICY) {
            self.row_policy = raw.parse()?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.keys_file, PathBuf::from("tasks_keys.json"));
        assert_eq!(config.workers, 0);
        assert_eq!(config.row_policy, RowPolicy::FailFast);
    }

    #[test]
    fn env_overrides_every_field() {
        let config = CodecConfig::default()
            .apply_env(env(&[
                (ENV_KEYS_FILE, "/etc/taskseal/keys.json"),
                (ENV_WORKERS, " 4 "),
                (ENV_ROW_POLICY, "skip-and-report"),
            ]))
            .unwrap();
        assert_eq!(config.keys_file, PathBuf::from("/etc/taskseal/keys.json"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.row_policy, RowPolicy::SkipAndReport);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = CodecConfig::default()
            .apply_env(env(&[(ENV_KEYS_FILE, ""), (ENV_WORKERS, "  ")]))
            .unwrap();
        assert_eq!(config, CodecConfig::default());
    }

    #[test]
    fn invalid_env_values_are_config_errors() {
        let err = CodecConfig::default()
            .apply_env(env(&[(ENV_WORKERS, "many")]))
            .unwrap_err();
        assert!(matches!(err, CodecError::Config(_)));

        let err = CodecConfig::default()
            .apply_env(env(&[(ENV_ROW_POLICY, "retry")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: unknown row policy 'retry'");
    }

    #[test]
    fn json_file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskseal.json");
        std::fs::write(&path, r#"{ "row_policy": "skip-and-report" }"#).unwrap();

        let config = CodecConfig::from_json_file(&path).unwrap();
        assert_eq!(config.row_policy, RowPolicy::SkipAndReport);
        assert_eq!(config.keys_file, PathBuf::from(DEFAULT_KEYS_FILE));

        std::fs::write(&path, r#"{ "workers": "four" }"#).unwrap();
        assert!(matches!(
            CodecConfig::from_json_file(&path),
            Err(CodecError::Config(_))
        ));
    }
}
