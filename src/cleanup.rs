use serde::Serialize;
use serde_json::Value;

use crate::domain::TriadField;

/// A sub-path removed from every component of every triad field, the
/// equivalent of unsetting `<field>.components.$[].<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneRule {
    pub path: String,
    /// Only prune components that already carry this key.
    pub only_when: Option<String>,
}

impl PruneRule {
    pub fn always(path: &str) -> Self {
        Self {
            path: path.to_string(),
            only_when: None,
        }
    }

    pub fn when_present(path: &str, key: &str) -> Self {
        Self {
            path: path.to_string(),
            only_when: Some(key.to_string()),
        }
    }
}

pub fn default_rules() -> Vec<PruneRule> {
    vec![
        PruneRule::always("asserted_class.label"),
        PruneRule::always("text_annotations.label"),
        PruneRule::always("text_annotations.digits_only"),
        PruneRule::always("text_annotations.lingering_envo"),
        PruneRule::always("text_annotations.label_length"),
        PruneRule::when_present("uses_obo_prefix", "asserted_class"),
        PruneRule::when_present("uses_bioportal_prefix", "asserted_class"),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionSummary {
    pub documents_touched: usize,
    pub fields_removed: usize,
}

/// Applies every rule to every document. Absent paths are no-ops, so the
/// result of a second run is identical to the first.
pub fn compact(docs: &mut [Value], rules: &[PruneRule]) -> CompactionSummary {
    let mut summary = CompactionSummary::default();
    for doc in docs.iter_mut() {
        let mut removed = 0;
        for field in TriadField::ALL {
            for rule in rules {
                removed += unset_in_components(doc, field, rule);
            }
        }
        if removed > 0 {
            summary.documents_touched += 1;
            summary.fields_removed += removed;
        }
    }
    summary
}

pub fn unset_in_components(doc: &mut Value, field: TriadField, rule: &PruneRule) -> usize {
    let Some(components) = doc
        .get_mut(field.as_str())
        .and_then(|slot| slot.get_mut("components"))
        .and_then(Value::as_array_mut)
    else {
        return 0;
    };

    let mut removed = 0;
    for component in components.iter_mut() {
        let applies = match &rule.only_when {
            Some(key) => component.get(key.as_str()).is_some(),
            None => true,
        };
        if applies && unset_path(component, &rule.path) {
            removed += 1;
        }
    }
    removed
}

/// Removes the value at a dotted path inside an object. Returns whether
/// anything was removed.
pub fn unset_path(value: &mut Value, path: &str) -> bool {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };
    let mut parent = value;
    if let Some(parent_path) = parent_path {
        for segment in parent_path.split('.') {
            parent = match parent.get_mut(segment) {
                Some(child) => child,
                None => return false,
            };
        }
    }
    parent
        .as_object_mut()
        .map(|map| map.remove(leaf).is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prunes_redundant_fields_idempotently() {
        let mut docs = vec![json!({
            "accession": "SAMN1",
            "env_medium": {
                "value": "soil [ENVO:00001998]",
                "components": [
                    {
                        "raw": "soil [ENVO:00001998]",
                        "uses_obo_prefix": true,
                        "asserted_class": {"curie_lc": "envo:00001998"},
                        "text_annotations": {"count": 2, "label_length": 4, "digits_only": false}
                    },
                    {"raw": "sand", "uses_obo_prefix": false}
                ]
            }
        })];

        let first = compact(&mut docs, &default_rules());
        assert_eq!(first.documents_touched, 1);
        assert_eq!(first.fields_removed, 3);

        let components = &docs[0]["env_medium"]["components"];
        assert!(components[0].get("uses_obo_prefix").is_none());
        assert_eq!(components[0]["text_annotations"], json!({"count": 2}));
        assert_eq!(components[1]["uses_obo_prefix"], json!(false));

        let snapshot = docs.clone();
        let second = compact(&mut docs, &default_rules());
        assert_eq!(second, CompactionSummary::default());
        assert_eq!(docs, snapshot);
    }
}
