use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use tempfile::tempdir;

use envtriad::error::TriadError;
use envtriad::registry::{
    PrefixRegistry, RegistryClient, fetch_registry, parse_bioportal_ontologies,
    parse_obo_registry,
};

struct StubRegistry;

impl RegistryClient for StubRegistry {
    fn fetch_obo_prefixes(&self) -> Result<Vec<String>, TriadError> {
        Ok(vec!["ENVO".to_string(), "po".to_string()])
    }

    fn fetch_bioportal_prefixes(&self) -> Result<Vec<String>, TriadError> {
        Ok(vec!["SNOMEDCT".to_string(), "ENVO".to_string()])
    }
}

#[test]
fn parse_obo_ids_and_preferred_prefixes() {
    let body = r#"{
        "ontologies": [
            {"id": "envo", "preferredPrefix": "ENVO", "title": "Environment Ontology"},
            {"id": "ncbitaxon", "preferredPrefix": "NCBITaxon"},
            {"id": "obsolete-thing"},
            {"title": "no id"}
        ]
    }"#;
    let prefixes = parse_obo_registry(body).unwrap();
    assert_eq!(
        prefixes,
        vec!["envo", "ENVO", "ncbitaxon", "NCBITaxon", "obsolete-thing"]
    );
}

#[test]
fn parse_bioportal_acronyms() {
    let body = r#"[{"acronym": "SNOMEDCT", "name": "SNOMED CT"}, {"name": "unnamed"}, {"acronym": " "}]"#;
    assert_eq!(parse_bioportal_ontologies(body).unwrap(), vec!["SNOMEDCT"]);
}

#[test]
fn malformed_registry_body() {
    let err = parse_obo_registry("<html>").unwrap_err();
    assert_matches!(err, TriadError::RegistryParse(_));
}

#[test]
fn lookups_are_case_insensitive() {
    let registry = fetch_registry(&StubRegistry).unwrap();
    assert!(registry.uses_obo_prefix("Envo"));
    assert!(registry.uses_bioportal_prefix("envo"));
    assert!(!registry.uses_obo_prefix("snomedct"));
    assert!(registry.is_known("SNOMEDCT"));
    assert!(!registry.is_known("rhizosphere"));
    assert_eq!(registry.len(), 3);
}

#[test]
fn save_then_load() {
    let dir = tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("cache/prefix-registry.json")).unwrap();
    let registry = PrefixRegistry::new(["ENVO", "uberon"], ["snomedct"]);
    registry.save(&path).unwrap();
    assert_eq!(PrefixRegistry::load(&path).unwrap(), registry);
}
