use std::collections::HashMap;

use crate::domain::{ParsedValue, PrefixUsage, ScopeEntry, curie_lc};

#[derive(Debug, Clone, Default)]
pub struct ScopeResolution {
    pub entries: Vec<ScopeEntry>,
    pub prefix_usage: Vec<PrefixUsage>,
}

struct AssertedCurie {
    count: u64,
    uses_obo_prefix: bool,
    uses_bioportal_prefix: bool,
}

/// Aggregates resolved components into one scope entry per lowercase CURIE,
/// keeping only CURIEs whose prefix is registered with OBO or BioPortal.
pub fn resolve_scope(parsed: &[ParsedValue]) -> ScopeResolution {
    // (prefix as asserted, local) in first-observed order
    let mut order = Vec::<(String, String)>::new();
    let mut asserted = HashMap::<(String, String), AssertedCurie>::new();
    for value in parsed {
        for component in &value.components {
            let (Some(prefix), Some(local)) = (&component.prefix, &component.local) else {
                continue;
            };
            let key = (prefix.clone(), local.clone());
            let entry = asserted.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                AssertedCurie {
                    count: 0,
                    uses_obo_prefix: component.uses_obo_prefix.unwrap_or(false),
                    uses_bioportal_prefix: component.uses_bioportal_prefix.unwrap_or(false),
                }
            });
            entry.count += value.count;
        }
    }

    let mut by_curie = HashMap::<String, ScopeEntry>::new();
    for (prefix, local) in order {
        let Some(stats) = asserted.remove(&(prefix.clone(), local.clone())) else {
            continue;
        };
        if !stats.uses_obo_prefix && !stats.uses_bioportal_prefix {
            continue;
        }
        let key = curie_lc(&prefix, &local);
        by_curie
            .entry(key.clone())
            .and_modify(|entry| entry.count += stats.count)
            .or_insert_with(|| ScopeEntry {
                curie_lc: key,
                prefix: prefix.to_lowercase(),
                local,
                count: stats.count,
                uses_obo_prefix: stats.uses_obo_prefix,
                uses_bioportal_prefix: stats.uses_bioportal_prefix,
            });
    }

    let mut entries = by_curie.into_values().collect::<Vec<_>>();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.curie_lc.cmp(&b.curie_lc)));

    let prefix_usage = rank_prefixes(&entries);
    ScopeResolution {
        entries,
        prefix_usage,
    }
}

pub fn rank_prefixes(entries: &[ScopeEntry]) -> Vec<PrefixUsage> {
    let mut totals = HashMap::<String, u64>::new();
    for entry in entries {
        *totals.entry(entry.prefix.to_lowercase()).or_insert(0) += entry.count;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Component;

    fn resolved(prefix: &str, local: &str, obo: bool) -> Component {
        let mut component = Component::resolved(&format!("{prefix}:{local}"), prefix, local, None);
        component.uses_obo_prefix = Some(obo);
        component.uses_bioportal_prefix = Some(false);
        component
    }

    #[test]
    fn collapses_prefix_casing() {
        let parsed = vec![
            ParsedValue {
                env_triad_value: "ENVO:00002042".to_string(),
                count: 5,
                components: vec![resolved("ENVO", "00002042", true)],
            },
            ParsedValue {
                env_triad_value: "envo:00002042".to_string(),
                count: 3,
                components: vec![resolved("envo", "00002042", true)],
            },
            ParsedValue {
                env_triad_value: "FOO:12".to_string(),
                count: 9,
                components: vec![resolved("FOO", "12", false)],
            },
        ];

        let resolution = resolve_scope(&parsed);
        assert_eq!(resolution.entries.len(), 1);
        assert_eq!(resolution.entries[0].curie_lc, "envo:00002042");
        assert_eq!(resolution.entries[0].count, 8);
        assert_eq!(resolution.prefix_usage.len(), 1);
        assert_eq!(resolution.prefix_usage[0].prefix_lc, "envo");
        assert_eq!(resolution.prefix_usage[0].total_count, 8);
    }
}
