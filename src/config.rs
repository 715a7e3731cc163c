use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::TriadError;

pub const DEFAULT_CONFIG_FILE: &str = "envtriad.json";
pub const DEFAULT_STORE_DIR: &str = ".envtriad";
pub const MIN_COUNT_FLOOR: u64 = 2;

/// Which values are dropped before grouping in the extract stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop null, "missing" and "not determined" before counting.
    #[default]
    ExcludeSentinels,
    /// Count and classify every observation, nulls included.
    KeepAll,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store_dir: Option<String>,
    #[serde(default)]
    pub min_count: Option<u64>,
    #[serde(default)]
    pub missing_policy: Option<MissingPolicy>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub require_known_prefix: Option<bool>,
    #[serde(default)]
    pub ignored_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub registry_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store_dir: Utf8PathBuf,
    pub min_count: u64,
    pub missing_policy: MissingPolicy,
    pub min_length: usize,
    pub require_known_prefix: bool,
    pub ignored_prefixes: Vec<String>,
    pub registry_path: Utf8PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            store_dir: Utf8PathBuf::from(DEFAULT_STORE_DIR),
            min_count: MIN_COUNT_FLOOR,
            missing_policy: MissingPolicy::default(),
            min_length: 0,
            require_known_prefix: true,
            ignored_prefixes: default_ignored_prefixes(),
            registry_path: default_registry_path(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TriadError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(TriadError::MissingConfig(config_path));
            }
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| TriadError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TriadError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TriadError> {
        let defaults = ResolvedConfig::default();

        let min_count = config
            .min_count
            .map(|count| count.max(MIN_COUNT_FLOOR))
            .unwrap_or(defaults.min_count);

        let ignored_prefixes = config
            .ignored_prefixes
            .map(|prefixes| {
                prefixes
                    .into_iter()
                    .map(|prefix| prefix.trim().to_uppercase())
                    .filter(|prefix| !prefix.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.ignored_prefixes);

        Ok(ResolvedConfig {
            store_dir: config
                .store_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.store_dir),
            min_count,
            missing_policy: config.missing_policy.unwrap_or(defaults.missing_policy),
            min_length: config.min_length.unwrap_or(defaults.min_length),
            require_known_prefix: config
                .require_known_prefix
                .unwrap_or(defaults.require_known_prefix),
            ignored_prefixes,
            registry_path: config
                .registry_path
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.registry_path),
        })
    }
}

/// Tokens that look like prefixes in free text but are not ontologies.
pub fn default_ignored_prefixes() -> Vec<String> {
    vec!["OF".to_string(), "GUT".to_string(), "RHIZOSPHERE".to_string()]
}

pub fn default_registry_path() -> Utf8PathBuf {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.home_dir()
                    .join(".cache")
                    .join("envtriad")
                    .join("prefix-registry.json"),
            )
            .ok()
        })
        .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_STORE_DIR).join("prefix-registry.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.store_dir, Utf8PathBuf::from(DEFAULT_STORE_DIR));
        assert_eq!(resolved.min_count, 2);
        assert_eq!(resolved.missing_policy, MissingPolicy::ExcludeSentinels);
        assert!(resolved.require_known_prefix);
        assert_eq!(resolved.ignored_prefixes, default_ignored_prefixes());
    }
}
