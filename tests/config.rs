use std::fs;

use assert_matches::assert_matches;
use tempfile::tempdir;

use envtriad::config::{Config, ConfigLoader, MIN_COUNT_FLOOR, MissingPolicy};
use envtriad::error::TriadError;

#[test]
fn defaults_when_nothing_is_set() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    assert_eq!(resolved.min_count, MIN_COUNT_FLOOR);
    assert_eq!(resolved.missing_policy, MissingPolicy::ExcludeSentinels);
    assert!(resolved.require_known_prefix);
    assert_eq!(resolved.min_length, 0);
    assert_eq!(resolved.ignored_prefixes, vec!["OF", "GUT", "RHIZOSPHERE"]);
    assert_eq!(resolved.store_dir.as_str(), ".envtriad");
}

#[test]
fn min_count_never_drops_below_two() {
    let config = Config {
        min_count: Some(1),
        ..Config::default()
    };
    assert_eq!(ConfigLoader::resolve_config(config).unwrap().min_count, 2);

    let config = Config {
        min_count: Some(10),
        ..Config::default()
    };
    assert_eq!(ConfigLoader::resolve_config(config).unwrap().min_count, 10);
}

#[test]
fn parse_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("envtriad.json");
    fs::write(
        &path,
        r#"{
            "store_dir": "/data/triads",
            "missing_policy": "keep_all",
            "ignored_prefixes": ["of", " gut "],
            "require_known_prefix": false
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.store_dir.as_str(), "/data/triads");
    assert_eq!(resolved.missing_policy, MissingPolicy::KeepAll);
    assert_eq!(resolved.ignored_prefixes, vec!["OF", "GUT"]);
    assert!(!resolved.require_known_prefix);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, TriadError::MissingConfig(_));
}

#[test]
fn unreadable_config_is_a_read_error() {
    let dir = tempdir().unwrap();
    let err = ConfigLoader::resolve(dir.path().to_str()).unwrap_err();
    assert_matches!(err, TriadError::ConfigRead(_));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("envtriad.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, TriadError::ConfigParse(_));
}
