use std::collections::HashMap;

use crate::domain::{
    Component, LabelStats, MaterializedComponent, MaterializedTriad, ParsedValue, SampleRecord,
    ScopeEntry, TriadField, TriadSlot,
};
use crate::error::TriadError;
use crate::store::{Index, IndexOutcome, MATERIALIZED, Store};

/// Component attribute an enrichment pass matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentKey {
    Label,
    CurieLc,
}

impl EnrichmentKey {
    pub const ALL: [EnrichmentKey; 2] = [EnrichmentKey::Label, EnrichmentKey::CurieLc];

    pub fn attribute(&self) -> &'static str {
        match self {
            EnrichmentKey::Label => "label",
            EnrichmentKey::CurieLc => "curie_lc",
        }
    }

    pub fn key_of<'c>(&self, component: &'c Component) -> Option<&'c str> {
        match self {
            EnrichmentKey::Label => component.label.as_deref(),
            EnrichmentKey::CurieLc => component.curie_lc.as_deref(),
        }
    }

    /// Every dotted path that must be indexed before the pass may run.
    pub fn index_paths(&self) -> Vec<String> {
        TriadField::ALL
            .into_iter()
            .map(|field| field.component_path(self.attribute()))
            .collect()
    }
}

/// Step A: one document per sample whose triad values resolved to
/// components. Fields whose value has no components are left out entirely.
pub fn build_skeleton(samples: &[SampleRecord], parsed: &[ParsedValue]) -> Vec<MaterializedTriad> {
    let catalog = parsed
        .iter()
        .map(|value| (value.env_triad_value.as_str(), value.components.as_slice()))
        .collect::<HashMap<_, _>>();

    let slot_for = |value: Option<&str>| -> Option<TriadSlot> {
        let value = value?;
        let components = catalog.get(value).filter(|components| !components.is_empty())?;
        Some(TriadSlot {
            value: value.to_string(),
            components: components
                .iter()
                .cloned()
                .map(MaterializedComponent::bare)
                .collect(),
        })
    };

    let mut docs = samples
        .iter()
        .filter_map(|sample| {
            let doc = MaterializedTriad {
                accession: sample.accession.clone(),
                env_broad_scale: slot_for(sample.triad_value(TriadField::EnvBroadScale)),
                env_local_scale: slot_for(sample.triad_value(TriadField::EnvLocalScale)),
                env_medium: slot_for(sample.triad_value(TriadField::EnvMedium)),
            };
            let has_any = doc.env_broad_scale.is_some()
                || doc.env_local_scale.is_some()
                || doc.env_medium.is_some();
            has_any.then_some(doc)
        })
        .collect::<Vec<_>>();
    docs.sort_by(|a, b| a.accession.cmp(&b.accession));
    docs
}

/// Creates every index the enrichment passes depend on.
pub fn create_indexes(store: &Store) -> Result<Vec<(String, IndexOutcome)>, TriadError> {
    let mut outcomes = Vec::new();
    for key in EnrichmentKey::ALL {
        for path in key.index_paths() {
            let outcome = store.create_index(MATERIALIZED, &path)?;
            match outcome {
                IndexOutcome::Created => tracing::info!(path = %path, "created index"),
                IndexOutcome::AlreadyExists => {
                    tracing::info!(path = %path, "index already exists")
                }
            }
            outcomes.push((path, outcome));
        }
    }
    Ok(outcomes)
}

/// Per-field indexes over one component attribute of the materialized
/// collection.
pub struct FieldIndexes {
    key: EnrichmentKey,
    indexes: Vec<(TriadField, Index)>,
}

impl FieldIndexes {
    pub fn load(store: &Store, key: EnrichmentKey) -> Result<Self, TriadError> {
        let mut indexes = Vec::with_capacity(TriadField::ALL.len());
        for field in TriadField::ALL {
            let index = store.load_index(MATERIALIZED, &field.component_path(key.attribute()))?;
            indexes.push((field, index));
        }
        Ok(Self { key, indexes })
    }

    /// Builds the indexes in memory from already loaded documents.
    pub fn from_documents(docs: &[MaterializedTriad], key: EnrichmentKey) -> Self {
        let indexes = TriadField::ALL
            .into_iter()
            .map(|field| {
                let mut index = Index {
                    collection: MATERIALIZED.to_string(),
                    path: field.component_path(key.attribute()),
                    postings: Default::default(),
                };
                for (ordinal, doc) in docs.iter().enumerate() {
                    let Some(slot) = doc.slot(field) else {
                        continue;
                    };
                    for component in &slot.components {
                        if let Some(value) = key.key_of(&component.component) {
                            let entry = index.postings.entry(value.to_string()).or_default();
                            if entry.last() != Some(&ordinal) {
                                entry.push(ordinal);
                            }
                        }
                    }
                }
                (field, index)
            })
            .collect();
        Self { key, indexes }
    }

    /// Sets a sub-field on every component whose key equals `value`,
    /// touching only the documents the index points at. Returns the number
    /// of components updated.
    pub fn apply<F>(&self, docs: &mut [MaterializedTriad], value: &str, mut set: F) -> usize
    where
        F: FnMut(&mut MaterializedComponent),
    {
        let mut updated = 0;
        for (field, index) in &self.indexes {
            for &ordinal in index.lookup(value) {
                let Some(slot) = docs.get_mut(ordinal).and_then(|doc| doc.slot_mut(*field)) else {
                    continue;
                };
                for component in slot
                    .components
                    .iter_mut()
                    .filter(|component| self.key.key_of(&component.component) == Some(value))
                {
                    set(component);
                    updated += 1;
                }
            }
        }
        updated
    }
}

/// Step B: replaces `text_annotations` on every component carrying a label
/// with that label's statistics.
pub fn annotate_labels(
    docs: &mut [MaterializedTriad],
    rows: &[LabelStats],
    indexes: &FieldIndexes,
) -> usize {
    rows.iter()
        .map(|row| {
            let annotations = row.annotations();
            indexes.apply(docs, &row.label, |component| {
                component.text_annotations = Some(annotations.clone());
            })
        })
        .sum()
}

/// Step C: replaces `asserted_class` on every component whose lowercase
/// CURIE is in scope.
pub fn assert_classes(
    docs: &mut [MaterializedTriad],
    entries: &[ScopeEntry],
    indexes: &FieldIndexes,
) -> usize {
    entries
        .iter()
        .map(|entry| {
            indexes.apply(docs, &entry.curie_lc, |component| {
                component.asserted_class = Some(entry.clone());
            })
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Enrichment;

    fn sample(accession: &str, broad: Option<&str>, medium: Option<&str>) -> SampleRecord {
        SampleRecord {
            accession: accession.to_string(),
            env_broad_scale: broad.map(str::to_string),
            env_local_scale: None,
            env_medium: medium.map(str::to_string),
        }
    }

    fn parsed() -> Vec<ParsedValue> {
        vec![ParsedValue {
            env_triad_value: "soil [ENVO:00001998]".to_string(),
            count: 2,
            components: vec![Component::resolved(
                "soil [ENVO:00001998]",
                "ENVO",
                "00001998",
                Some("soil".to_string()),
            )],
        }]
    }

    #[test]
    fn skeleton_omits_unresolved_fields_and_empty_documents() {
        let samples = vec![
            sample("SAMN2", Some("unparsed"), Some("soil [ENVO:00001998]")),
            sample("SAMN1", Some("unparsed"), None),
        ];
        let docs = build_skeleton(&samples, &parsed());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].accession, "SAMN2");
        assert!(docs[0].env_broad_scale.is_none());
        assert_eq!(docs[0].env_medium.as_ref().unwrap().components.len(), 1);
    }

    #[test]
    fn enrichment_passes_target_matching_components_only() {
        let samples = vec![sample("SAMN1", None, Some("soil [ENVO:00001998]"))];
        let mut docs = build_skeleton(&samples, &parsed());
        docs[0]
            .env_medium
            .as_mut()
            .unwrap()
            .components
            .push(MaterializedComponent::bare(Component::plain("sand", Some("sand".to_string()))));

        let label_rows = vec![LabelStats {
            label: "soil".to_string(),
            count: 2,
            label_length: 4,
            digits_only: false,
            lingering_envo: false,
        }];
        let labels = FieldIndexes::from_documents(&docs, EnrichmentKey::Label);
        assert_eq!(annotate_labels(&mut docs, &label_rows, &labels), 1);

        let scope = vec![ScopeEntry {
            curie_lc: "envo:00001998".to_string(),
            prefix: "envo".to_string(),
            local: "00001998".to_string(),
            count: 2,
            uses_obo_prefix: true,
            uses_bioportal_prefix: false,
        }];
        let curies = FieldIndexes::from_documents(&docs, EnrichmentKey::CurieLc);
        assert_eq!(assert_classes(&mut docs, &scope, &curies), 1);

        let components = &docs[0].env_medium.as_ref().unwrap().components;
        assert_eq!(components[0].enrichment(), Enrichment::Both);
        assert_eq!(components[1].enrichment(), Enrichment::Bare);

        let snapshot = docs.clone();
        annotate_labels(&mut docs, &label_rows, &labels);
        assert_classes(&mut docs, &scope, &curies);
        assert_eq!(docs, snapshot);
    }
}
