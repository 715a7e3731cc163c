//! Coverage reports over every parsed component, not just the in-scope ones,
//! plus a one-row-per-component export of the materialized triads.

use std::collections::HashMap;

use crate::domain::{
    CurieUsage, FlattenedComponent, MaterializedTriad, ParsedValue, PrefixUsage, TriadField,
};

/// Ranks the lowercase prefixes of all resolved components by summed value
/// count, registered or not.
pub fn rank_component_prefixes(parsed: &[ParsedValue]) -> Vec<PrefixUsage> {
    let mut totals = HashMap::<String, u64>::new();
    for value in parsed {
        for prefix in value.components.iter().filter_map(|c| c.prefix.as_deref()) {
            *totals.entry(prefix.to_lowercase()).or_insert(0) += value.count;
        }
    }
    let mut usage = totals
        .into_iter()
        .map(|(prefix_lc, total_count)| PrefixUsage {
            prefix_lc,
            total_count,
        })
        .collect::<Vec<_>>();
    usage.sort_by(|a, b| {
        b.total_count
            .cmp(&a.total_count)
            .then_with(|| a.prefix_lc.cmp(&b.prefix_lc))
    });
    usage
}

/// One row per upper-case CURIE. Registry flags come from the first
/// component seen with that CURIE.
pub fn aggregate_curies(parsed: &[ParsedValue]) -> Vec<CurieUsage> {
    let mut by_curie = HashMap::<&str, CurieUsage>::new();
    for value in parsed {
        for component in &value.components {
            let (Some(curie), Some(prefix)) = (&component.curie_uc, &component.prefix) else {
                continue;
            };
            by_curie
                .entry(curie.as_str())
                .and_modify(|row| row.count += value.count)
                .or_insert_with(|| CurieUsage {
                    curie_uc: curie.clone(),
                    prefix_uc: prefix.to_uppercase(),
                    count: value.count,
                    uses_obo_prefix: component.uses_obo_prefix.unwrap_or(false),
                    uses_bioportal_prefix: component.uses_bioportal_prefix.unwrap_or(false),
                });
        }
    }
    let mut rows = by_curie.into_values().collect::<Vec<_>>();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.curie_uc.cmp(&b.curie_uc)));
    rows
}

/// Documents keep their order; within a document fields follow
/// `TriadField::ALL` and components their position in the slot.
pub fn flatten_triads(docs: &[MaterializedTriad]) -> Vec<FlattenedComponent> {
    let mut rows = Vec::new();
    for doc in docs {
        for field in TriadField::ALL {
            let Some(slot) = doc.slot(field) else {
                continue;
            };
            for (instance, entry) in slot.components.iter().enumerate() {
                let component = &entry.component;
                rows.push(FlattenedComponent {
                    accession: doc.accession.clone(),
                    attribute: field,
                    instance,
                    raw_original: slot.value.clone(),
                    raw_component: component.raw.clone(),
                    curie_uc: component.curie_uc.clone(),
                    prefix_uc: component.prefix.as_deref().map(str::to_uppercase),
                    label: component.label.clone(),
                    in_scope: entry.asserted_class.is_some(),
                });
            }
        }
    }
    rows
}
