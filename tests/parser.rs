use envtriad::classify::classify;
use envtriad::parser::{ComponentParser, parse_catalog};
use envtriad::registry::PrefixRegistry;

fn registry() -> PrefixRegistry {
    PrefixRegistry::new(["envo", "foo"], ["envo"])
}

#[test]
fn ignored_prefix_is_never_resolved() {
    let registry = registry();
    let parser = ComponentParser::with_options(&registry, ["FOO"], true);
    let components = parser.parse("forest biome FOO:1234");
    assert_eq!(components.len(), 1);
    assert!(!components[0].is_resolved());
    assert_eq!(components[0].raw, "forest biome FOO:1234");

    let parser = ComponentParser::with_options(&registry, ["OF"], true);
    let components = parser.parse("forest biome FOO:1234");
    assert_eq!(components[0].curie_lc.as_deref(), Some("foo:1234"));
    assert_eq!(components[0].label.as_deref(), Some("forest biome"));
}

#[test]
fn unknown_prefix_resolves_when_registry_is_not_required() {
    let registry = PrefixRegistry::default();
    let parser = ComponentParser::with_options(&registry, ["OF"], false);
    let components = parser.parse("BAR:9876");
    assert_eq!(components[0].curie_uc.as_deref(), Some("BAR:9876"));
    assert_eq!(components[0].uses_obo_prefix, Some(false));
    assert_eq!(components[0].uses_bioportal_prefix, Some(false));
}

#[test]
fn bracketed_curies_skip_registry_checks() {
    let registry = PrefixRegistry::default();
    let parser = ComponentParser::with_options(&registry, ["OF"], true);
    let components = parser.parse("rhizosphere [ZZZ:00042]");
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].curie_lc.as_deref(), Some("zzz:00042"));
    assert_eq!(components[0].label.as_deref(), Some("rhizosphere"));
}

#[test]
fn whitespace_only_value_yields_nothing() {
    let registry = registry();
    let parser = ComponentParser::with_options(&registry, ["OF"], true);
    assert!(parser.parse("   ").is_empty());
}

#[test]
fn catalog_skips_flagged_and_short_values() {
    let registry = registry();
    let parser = ComponentParser::with_options(&registry, ["OF"], true);
    let values = vec![
        classify(Some("ENVO:00002042".to_string()), 5),
        classify(Some("missing".to_string()), 4),
        classify(Some("=calculated".to_string()), 3),
        classify(Some("42".to_string()), 3),
        classify(Some("mud".to_string()), 2),
    ];

    let parsed = parse_catalog(&values, &parser, 0);
    let kept = parsed
        .iter()
        .map(|value| value.env_triad_value.as_str())
        .collect::<Vec<_>>();
    assert_eq!(kept, vec!["ENVO:00002042", "mud"]);
    assert_eq!(parsed[0].count, 5);

    let parsed = parse_catalog(&values, &parser, 4);
    assert_eq!(parsed.len(), 1);
}
