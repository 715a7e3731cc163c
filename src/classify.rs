use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::MissingPolicy;
use crate::domain::{SampleRecord, TriadField, TriadValue};

/// INSDC missing-value vocabulary, matched as case-insensitive substrings.
pub const INSDC_MISSING_PHRASES: [&str; 13] = [
    "control sample",
    "data agreement established pre-2023",
    "endangered species",
    "human-identifiable",
    "lab stock",
    "missing",
    "not applicable",
    "not collected",
    "not provided",
    "restricted access",
    "sample group",
    "synthetic construct",
    "third party data",
];

/// Exact values dropped before counting under `MissingPolicy::ExcludeSentinels`.
pub const SENTINEL_VALUES: [&str; 2] = ["missing", "not determined"];

const OTHER_MISSING_VALUES: [&str; 4] = ["", "na", "n/a", "null"];

fn digits_only_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+(\s+\d+)*\s*$").unwrap())
}

pub fn is_digits_only(value: &str) -> bool {
    digits_only_regex().is_match(&value.to_lowercase())
}

pub fn is_equation_like(value: &str) -> bool {
    value.starts_with('=')
}

/// Non-overlapping occurrences of "envo", derived from how much the
/// lowercased string shrinks when they are removed.
pub fn envo_mention_count(value: &str) -> usize {
    let lower = value.to_lowercase();
    let removed = lower.replace("envo", "");
    (lower.chars().count() - removed.chars().count()) / "envo".len()
}

pub fn matches_insdc_missing(value: &str) -> bool {
    let lower = value.to_lowercase();
    INSDC_MISSING_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

pub fn is_other_missing_indicator(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(text) => {
            let normalized = text.trim().to_lowercase();
            OTHER_MISSING_VALUES.contains(&normalized.as_str())
        }
    }
}

pub fn classify(value: Option<String>, count: u64) -> TriadValue {
    let text = value.as_deref().unwrap_or("");
    TriadValue {
        count,
        length: text.chars().count(),
        envo_mention_count: envo_mention_count(text),
        digits_only: is_digits_only(text),
        equation_like: is_equation_like(text),
        insdc_missing_match: matches_insdc_missing(text),
        other_missing_indicator: is_other_missing_indicator(value.as_deref()),
        env_triad_value: value,
    }
}

fn is_sentinel(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(text) => SENTINEL_VALUES.contains(&text),
    }
}

/// Counts every triad observation across the corpus, keeps values seen at
/// least `min_count` times and classifies them. Sorted by count descending,
/// ties broken by value so reruns are stable.
pub fn extract_values<'a, I>(samples: I, policy: MissingPolicy, min_count: u64) -> Vec<TriadValue>
where
    I: IntoIterator<Item = &'a SampleRecord>,
{
    let mut counts = HashMap::<Option<&'a str>, u64>::new();
    for sample in samples {
        for field in TriadField::ALL {
            let value = sample.triad_value(field);
            if policy == MissingPolicy::ExcludeSentinels && is_sentinel(value) {
                continue;
            }
            *counts.entry(value).or_insert(0) += 1;
        }
    }

    let mut values = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .map(|(value, count)| classify(value.map(str::to_string), count))
        .collect::<Vec<_>>();
    values.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.env_triad_value.cmp(&b.env_triad_value))
    });
    values
}
