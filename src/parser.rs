//! Splits a free-text triad value into candidate ontology-term components.
//!
//! Grammar, applied after trimming, stripping surrounding quotes and
//! collapsing repeated `ENVO:` prefixes:
//!
//! * If the value holds an opening bracket followed later by a closing one,
//!   every `label? [PREFIX SEP+ LOCAL]` occurrence (any of `[] () {}`) is a
//!   component. Its label is the text before the bracket, back to the
//!   nearest delimiter. Text before that delimiter and text after the last
//!   bracketed CURIE go through the delimiter rules below. If no bracket
//!   holds a CURIE, the whole value does.
//! * Otherwise the value is split on runs of `|`, `;` and `,`. Each piece is
//!   matched as `label PREFIX SEP LOCAL` (trailing CURIE), then as
//!   `PREFIX SEP+ LOCAL [SEP label]` (bare CURIE), then as
//!   `label PREFIX SEP+ LOCAL [SEP label]` (leading label). The first form
//!   whose prefix is accepted wins; otherwise the piece is plain text.
//!
//! `PREFIX = [A-Za-z][A-Za-z0-9]+`, `LOCAL = [A-Za-z0-9]{2,}` and
//! `SEP = [:-_ ：]`. A non-empty value never yields zero components.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::config::ResolvedConfig;
use crate::domain::{Component, ParsedValue, TriadValue};
use crate::registry::PrefixRegistry;

const QUOTES: [char; 4] = ['“', '”', '"', '\''];
const SEPARATOR_CHARS: [char; 4] = [':', '-', '_', '\u{FF1A}'];

fn bracket_present() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\[\(\{].+[\]\)\}]").unwrap())
}

fn bracketed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?P<label>.*?)\s*[\[\(\{](?P<prefix>[A-Za-z][A-Za-z0-9]+)[:\-_ \x{FF1A}]+(?P<local>[A-Za-z0-9]{2,})\s*[\]\)\}]",
        )
        .unwrap()
    })
}

fn trailing_hint() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s+[A-Za-z][A-Za-z0-9]+[:\-_ \x{FF1A}][A-Za-z0-9]{2,}\s*$").unwrap()
    })
}

fn trailing_curie() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<label>.*?)\s+(?P<prefix>[A-Za-z][A-Za-z0-9]+)[:\-_ \x{FF1A}]+(?P<local>[A-Za-z0-9]{2,})\s*$",
        )
        .unwrap()
    })
}

fn bare_curie() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[\[\(\{]?(?P<prefix>[A-Za-z][A-Za-z0-9]+)[:\-_ \x{FF1A}]+(?P<local>[A-Za-z0-9]{2,})(?:\s*[\]\)\}])?(?:\s*[:\-_ \x{FF1A}]\s*(?P<label_after>.+))?$",
        )
        .unwrap()
    })
}

fn leading_curie() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<label_before>.*?)\s+)?[\[\(\{]?(?P<prefix>[A-Za-z][A-Za-z0-9]+)[:\-_ \x{FF1A}]+(?P<local>[A-Za-z0-9]{2,})(?:\s*[\]\)\}])?(?:\s*[:\-_ \x{FF1A}]\s*(?P<label_after>.+))?$",
        )
        .unwrap()
    })
}

fn repeated_envo() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:envo:){2,}").unwrap())
}

fn delimiters() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[|;,]+").unwrap())
}

/// Lowercases, turns ASCII punctuation into spaces and collapses whitespace.
pub fn normalize_label(label: &str) -> Option<String> {
    let replaced = label
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_punctuation() { ' ' } else { ch })
        .collect::<String>();
    let normalized = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    (!normalized.is_empty()).then_some(normalized)
}

fn clean(text: &str) -> String {
    let stripped = text.trim().trim_matches(|ch: char| QUOTES.contains(&ch)).trim();
    repeated_envo().replace_all(stripped, "ENVO:").into_owned()
}

pub struct ComponentParser<'a> {
    registry: &'a PrefixRegistry,
    ignored_prefixes: BTreeSet<String>,
    require_known_prefix: bool,
}

impl<'a> ComponentParser<'a> {
    pub fn new(registry: &'a PrefixRegistry, config: &ResolvedConfig) -> Self {
        Self::with_options(
            registry,
            config.ignored_prefixes.iter().map(String::as_str),
            config.require_known_prefix,
        )
    }

    pub fn with_options<'i, I>(
        registry: &'a PrefixRegistry,
        ignored_prefixes: I,
        require_known_prefix: bool,
    ) -> Self
    where
        I: IntoIterator<Item = &'i str>,
    {
        Self {
            registry,
            ignored_prefixes: ignored_prefixes
                .into_iter()
                .map(|prefix| prefix.trim().to_uppercase())
                .collect(),
            require_known_prefix,
        }
    }

    pub fn parse(&self, text: &str) -> Vec<Component> {
        let text = clean(text);
        if text.is_empty() {
            return Vec::new();
        }

        if bracket_present().is_match(&text) {
            if let Some(components) = self.parse_bracketed(&text) {
                return components;
            }
        }

        let mut components = Vec::new();
        self.push_pieces(&text, &mut components);
        if components.is_empty() {
            components.push(plain(&text));
        }
        components
    }

    /// `None` when no bracket holds a CURIE.
    fn parse_bracketed(&self, text: &str) -> Option<Vec<Component>> {
        let mut components = Vec::new();
        let mut consumed = None;
        for caps in bracketed().captures_iter(text) {
            let (Some(whole), Some(label)) = (caps.get(0), caps.name("label")) else {
                continue;
            };
            let label_start = match delimiters().find_iter(label.as_str()).last() {
                Some(delimiter) => {
                    let head = &text[label.start()..label.start() + delimiter.start()];
                    self.push_pieces(head, &mut components);
                    label.start() + delimiter.end()
                }
                None => label.start(),
            };
            let raw = text[label_start..whole.end()].trim();
            let label_text = normalize_label(&text[label_start..label.end()]);
            components.push(self.resolved(raw, &caps["prefix"], &caps["local"], label_text));
            consumed = Some(whole.end());
        }

        let consumed = consumed?;
        self.push_pieces(&text[consumed..], &mut components);
        Some(components)
    }

    fn push_pieces(&self, segment: &str, components: &mut Vec<Component>) {
        for piece in delimiters().split(segment) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            if !piece.contains(SEPARATOR_CHARS) {
                components.push(plain(piece));
                continue;
            }
            let piece = clean(piece);
            let component = self
                .match_piece(&piece)
                .unwrap_or_else(|| plain(&piece));
            components.push(component);
        }
    }

    fn match_piece(&self, piece: &str) -> Option<Component> {
        let mut candidates = Vec::with_capacity(3);
        if trailing_hint().is_match(piece) {
            if let Some(caps) = trailing_curie().captures(piece) {
                candidates.push(caps);
            }
        }
        for pattern in [bare_curie(), leading_curie()] {
            if let Some(caps) = pattern.captures(piece) {
                candidates.push(caps);
            }
        }

        candidates
            .into_iter()
            .find(|caps| self.accepts(&caps["prefix"]))
            .map(|caps| {
                let label = candidate_label(&caps).and_then(normalize_label);
                self.resolved(piece, &caps["prefix"], &caps["local"], label)
            })
    }

    fn accepts(&self, prefix: &str) -> bool {
        if self.ignored_prefixes.contains(&prefix.to_uppercase()) {
            return false;
        }
        !self.require_known_prefix || self.registry.is_known(prefix)
    }

    fn resolved(&self, raw: &str, prefix: &str, local: &str, label: Option<String>) -> Component {
        let mut component = Component::resolved(raw, prefix, local, label);
        component.uses_obo_prefix = Some(self.registry.uses_obo_prefix(prefix));
        component.uses_bioportal_prefix = Some(self.registry.uses_bioportal_prefix(prefix));
        component
    }
}

fn candidate_label<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    ["label_after", "label_before", "label"]
        .into_iter()
        .filter_map(|name| caps.name(name))
        .map(|m| m.as_str())
        .find(|text| !text.trim().is_empty())
}

fn plain(raw: &str) -> Component {
    Component::plain(raw, normalize_label(raw))
}

/// Splits every parseable catalog value. Values filtered out by the
/// classifier flags or `min_length` are skipped, as are values yielding no
/// components.
pub fn parse_catalog(
    values: &[TriadValue],
    parser: &ComponentParser<'_>,
    min_length: usize,
) -> Vec<ParsedValue> {
    values
        .iter()
        .filter(|value| value.is_parseable(min_length))
        .filter_map(|value| {
            let text = value.env_triad_value.as_deref()?;
            let components = parser.parse(text);
            if components.is_empty() {
                tracing::debug!(value = text, "value yielded no components");
                return None;
            }
            Some(ParsedValue {
                env_triad_value: text.to_string(),
                count: value.count,
                components,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PrefixRegistry {
        PrefixRegistry::new(["envo", "po", "uberon"], ["envo", "snomedct"])
    }

    #[test]
    fn single_curie() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("ENVO:00002042");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].prefix.as_deref(), Some("ENVO"));
        assert_eq!(components[0].local.as_deref(), Some("00002042"));
        assert_eq!(components[0].curie_lc.as_deref(), Some("envo:00002042"));
        assert_eq!(components[0].label, None);
        assert_eq!(components[0].uses_obo_prefix, Some(true));
        assert_eq!(components[0].uses_bioportal_prefix, Some(true));
    }

    #[test]
    fn label_then_bracketed_curie() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("Soil [ENVO:00001998], marine sediment (ENVO:00002113)");
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].label.as_deref(), Some("soil"));
        assert_eq!(components[0].curie_lc.as_deref(), Some("envo:00001998"));
        assert_eq!(components[1].label.as_deref(), Some("marine sediment"));
        assert_eq!(components[1].curie_lc.as_deref(), Some("envo:00002113"));
    }

    #[test]
    fn text_after_bracketed_curie_is_kept() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("sea water [ENVO:00002149]; soil");
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].curie_lc.as_deref(), Some("envo:00002149"));
        assert_eq!(components[0].label.as_deref(), Some("sea water"));
        assert_eq!(components[0].raw, "sea water [ENVO:00002149]");
        assert!(!components[1].is_resolved());
        assert_eq!(components[1].label.as_deref(), Some("soil"));
    }

    #[test]
    fn text_between_bracketed_curies_is_kept() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components =
            parser.parse("forest [ENVO:01000174] | litter; marine sediment (ENVO:00002113)");
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].curie_lc.as_deref(), Some("envo:01000174"));
        assert_eq!(components[1].label.as_deref(), Some("litter"));
        assert!(!components[1].is_resolved());
        assert_eq!(components[2].label.as_deref(), Some("marine sediment"));
        assert_eq!(components[2].raw, "marine sediment (ENVO:00002113)");
    }

    #[test]
    fn bracket_without_curie_falls_back_to_delimiters() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("soil (wet) | ENVO:00002042");
        assert_eq!(components.len(), 2);
        assert!(!components[0].is_resolved());
        assert_eq!(components[0].label.as_deref(), Some("soil wet"));
        assert_eq!(components[1].curie_lc.as_deref(), Some("envo:00002042"));
    }

    #[test]
    fn trailing_curie_after_label() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("marine biome ENVO_00000447");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].label.as_deref(), Some("marine biome"));
        assert_eq!(components[0].curie_uc.as_deref(), Some("ENVO:00000447"));
    }

    #[test]
    fn leading_curie_with_label_after() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("ENVO:01000174 forest biome");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].curie_lc.as_deref(), Some("envo:01000174"));
        assert_eq!(components[0].label.as_deref(), Some("forest biome"));
    }

    #[test]
    fn unknown_prefix_stays_plain() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("terrestrial biome - soil");
        assert_eq!(components.len(), 1);
        assert!(!components[0].is_resolved());
        assert_eq!(components[0].label.as_deref(), Some("terrestrial biome soil"));
        assert_eq!(components[0].raw, "terrestrial biome - soil");
    }

    #[test]
    fn delimited_pieces_mix_plain_and_resolved() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("\"ENVO:ENVO:00002042 | sea water; 1234\"");
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].curie_lc.as_deref(), Some("envo:00002042"));
        assert_eq!(components[1].label.as_deref(), Some("sea water"));
        assert!(!components[1].is_resolved());
        assert!(components[2].digits_only);
    }

    #[test]
    fn lingering_envo_flags_imperfect_split() {
        let registry = registry();
        let parser = ComponentParser::with_options(&registry, ["OF"], true);
        let components = parser.parse("envo soil");
        assert_eq!(components.len(), 1);
        assert!(components[0].lingering_envo);
    }

    #[test]
    fn normalize_label_collapses_punctuation() {
        assert_eq!(
            normalize_label("  Marine_Sediment!! "),
            Some("marine sediment".to_string())
        );
        assert_eq!(normalize_label("--"), None);
    }
}
