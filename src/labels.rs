use std::collections::HashMap;

use crate::domain::{LabelStats, ParsedValue};

/// Aggregates components by their exact normalized label. Representative
/// length and flags come from the first component seen with that label.
/// Components without a label contribute nothing.
pub fn resolve_labels(parsed: &[ParsedValue]) -> Vec<LabelStats> {
    let mut stats = HashMap::<&str, LabelStats>::new();
    for value in parsed {
        for component in &value.components {
            let Some(label) = component.label.as_deref() else {
                continue;
            };
            stats
                .entry(label)
                .and_modify(|row| row.count += value.count)
                .or_insert_with(|| LabelStats {
                    label: label.to_string(),
                    count: value.count,
                    label_length: component.label_length,
                    digits_only: component.digits_only,
                    lingering_envo: component.lingering_envo,
                });
        }
    }

    let mut rows = stats.into_values().collect::<Vec<_>>();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Component;

    #[test]
    fn sums_counts_per_label_case_sensitively() {
        let parsed = vec![
            ParsedValue {
                env_triad_value: "soil".to_string(),
                count: 4,
                components: vec![Component::plain("soil", Some("soil".to_string()))],
            },
            ParsedValue {
                env_triad_value: "soil [ENVO:00001998]".to_string(),
                count: 2,
                components: vec![Component::resolved(
                    "soil [ENVO:00001998]",
                    "ENVO",
                    "00001998",
                    Some("soil".to_string()),
                )],
            },
            ParsedValue {
                env_triad_value: "ENVO:00002042".to_string(),
                count: 7,
                components: vec![Component::resolved("ENVO:00002042", "ENVO", "00002042", None)],
            },
            ParsedValue {
                env_triad_value: "12".to_string(),
                count: 3,
                components: vec![Component::plain("12", Some("12".to_string()))],
            },
            ParsedValue {
                env_triad_value: "Soil".to_string(),
                count: 1,
                components: vec![Component::plain("Soil", Some("Soil".to_string()))],
            },
        ];

        let rows = resolve_labels(&parsed);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].label, "soil");
        assert_eq!(rows[0].count, 6);
        assert_eq!(rows[0].label_length, 4);
        assert_eq!(rows[1].label, "12");
        assert!(rows[1].digits_only);
        assert_eq!(rows[2].label, "Soil");
        assert_eq!(rows[2].count, 1);
    }
}
