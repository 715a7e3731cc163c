use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TriadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TriadField {
    EnvBroadScale,
    EnvLocalScale,
    EnvMedium,
}

impl TriadField {
    pub const ALL: [TriadField; 3] = [
        TriadField::EnvBroadScale,
        TriadField::EnvLocalScale,
        TriadField::EnvMedium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriadField::EnvBroadScale => "env_broad_scale",
            TriadField::EnvLocalScale => "env_local_scale",
            TriadField::EnvMedium => "env_medium",
        }
    }

    /// Dotted path of a component attribute inside a materialized document.
    pub fn component_path(&self, attribute: &str) -> String {
        format!("{}.components.{attribute}", self.as_str())
    }
}

impl fmt::Display for TriadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TriadField {
    type Err = TriadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "env_broad_scale" => Ok(TriadField::EnvBroadScale),
            "env_local_scale" => Ok(TriadField::EnvLocalScale),
            "env_medium" => Ok(TriadField::EnvMedium),
            _ => Err(TriadError::InvalidTriadField(value.to_string())),
        }
    }
}

/// One biological sample as flattened upstream. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub accession: String,
    #[serde(default, deserialize_with = "coerce_optional_string")]
    pub env_broad_scale: Option<String>,
    #[serde(default, deserialize_with = "coerce_optional_string")]
    pub env_local_scale: Option<String>,
    #[serde(default, deserialize_with = "coerce_optional_string")]
    pub env_medium: Option<String>,
}

impl SampleRecord {
    pub fn triad_value(&self, field: TriadField) -> Option<&str> {
        match field {
            TriadField::EnvBroadScale => self.env_broad_scale.as_deref(),
            TriadField::EnvLocalScale => self.env_local_scale.as_deref(),
            TriadField::EnvMedium => self.env_medium.as_deref(),
        }
    }
}

/// Upstream exports are loosely typed; numbers and booleans show up in the
/// triad columns and are kept as their string rendering.
fn coerce_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// A distinct triad string with its frequency and classification flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriadValue {
    pub env_triad_value: Option<String>,
    pub count: u64,
    pub length: usize,
    pub envo_mention_count: usize,
    pub digits_only: bool,
    pub equation_like: bool,
    pub insdc_missing_match: bool,
    pub other_missing_indicator: bool,
}

impl TriadValue {
    /// Values worth splitting into components: not flagged by any
    /// missing/numeric/equation classifier and at least `min_length` long.
    pub fn is_parseable(&self, min_length: usize) -> bool {
        self.env_triad_value.is_some()
            && !self.digits_only
            && !self.equation_like
            && !self.insdc_missing_match
            && !self.other_missing_indicator
            && self.length >= min_length
    }
}

/// A parsed sub-token of a triad value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curie_lc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curie_uc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub label_length: usize,
    #[serde(default)]
    pub digits_only: bool,
    #[serde(default)]
    pub lingering_envo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_obo_prefix: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_bioportal_prefix: Option<bool>,
}

impl Component {
    /// A token without a recoverable `prefix:local` pair.
    pub fn plain(raw: &str, label: Option<String>) -> Self {
        let mut component = Self {
            raw: raw.to_string(),
            prefix: None,
            local: None,
            curie_lc: None,
            curie_uc: None,
            label: None,
            label_length: 0,
            digits_only: false,
            lingering_envo: false,
            uses_obo_prefix: None,
            uses_bioportal_prefix: None,
        };
        component.set_label(label);
        component
    }

    pub fn resolved(raw: &str, prefix: &str, local: &str, label: Option<String>) -> Self {
        let mut component = Self::plain(raw, None);
        component.curie_lc = Some(curie_lc(prefix, local));
        component.curie_uc = Some(curie_uc(prefix, local));
        component.prefix = Some(prefix.to_string());
        component.local = Some(local.to_string());
        component.set_label(label);
        component
    }

    fn set_label(&mut self, label: Option<String>) {
        let label = label.filter(|text| !text.is_empty());
        self.label_length = label.as_deref().map(|text| text.chars().count()).unwrap_or(0);
        self.digits_only = label
            .as_deref()
            .map(crate::classify::is_digits_only)
            .unwrap_or(false);
        self.lingering_envo = label
            .as_deref()
            .map(|text| text.to_lowercase().contains("envo"))
            .unwrap_or(false);
        self.label = label;
    }

    pub fn is_resolved(&self) -> bool {
        self.prefix.is_some() && self.local.is_some()
    }
}

pub fn curie_lc(prefix: &str, local: &str) -> String {
    format!("{}:{local}", prefix.to_lowercase())
}

pub fn curie_uc(prefix: &str, local: &str) -> String {
    format!("{}:{}", prefix.to_uppercase(), local.to_uppercase())
}

/// Component corpus row: a catalog value with its parsed components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedValue {
    pub env_triad_value: String,
    pub count: u64,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub curie_lc: String,
    pub prefix: String,
    pub local: String,
    pub count: u64,
    pub uses_obo_prefix: bool,
    pub uses_bioportal_prefix: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixUsage {
    pub prefix_lc: String,
    pub total_count: u64,
}

/// Usage of one upper-case CURIE across every parsed component, registered
/// or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurieUsage {
    pub curie_uc: String,
    pub prefix_uc: String,
    pub count: u64,
    pub uses_obo_prefix: bool,
    pub uses_bioportal_prefix: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelStats {
    pub label: String,
    pub count: u64,
    pub label_length: usize,
    pub digits_only: bool,
    pub lingering_envo: bool,
}

impl LabelStats {
    /// The row as attached to components: everything but the key.
    pub fn annotations(&self) -> TextAnnotations {
        TextAnnotations {
            count: Some(self.count),
            label_length: Some(self.label_length),
            digits_only: Some(self.digits_only),
            lingering_envo: Some(self.lingering_envo),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnnotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digits_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lingering_envo: Option<bool>,
}

/// How far a component has progressed through the enrichment passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Enrichment {
    Bare,
    ScopeResolved,
    LabelAnnotated,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedComponent {
    #[serde(flatten)]
    pub component: Component,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asserted_class: Option<ScopeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_annotations: Option<TextAnnotations>,
}

impl MaterializedComponent {
    pub fn bare(component: Component) -> Self {
        Self {
            component,
            asserted_class: None,
            text_annotations: None,
        }
    }

    pub fn enrichment(&self) -> Enrichment {
        match (self.asserted_class.is_some(), self.text_annotations.is_some()) {
            (false, false) => Enrichment::Bare,
            (true, false) => Enrichment::ScopeResolved,
            (false, true) => Enrichment::LabelAnnotated,
            (true, true) => Enrichment::Both,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriadSlot {
    pub value: String,
    pub components: Vec<MaterializedComponent>,
}

/// Per-sample output record. A triad field is present only when its value
/// resolved to at least one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedTriad {
    pub accession: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_broad_scale: Option<TriadSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_local_scale: Option<TriadSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_medium: Option<TriadSlot>,
}

impl MaterializedTriad {
    pub fn slot(&self, field: TriadField) -> Option<&TriadSlot> {
        match field {
            TriadField::EnvBroadScale => self.env_broad_scale.as_ref(),
            TriadField::EnvLocalScale => self.env_local_scale.as_ref(),
            TriadField::EnvMedium => self.env_medium.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, field: TriadField) -> Option<&mut TriadSlot> {
        match field {
            TriadField::EnvBroadScale => self.env_broad_scale.as_mut(),
            TriadField::EnvLocalScale => self.env_local_scale.as_mut(),
            TriadField::EnvMedium => self.env_medium.as_mut(),
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &MaterializedComponent> {
        TriadField::ALL
            .into_iter()
            .filter_map(|field| self.slot(field))
            .flat_map(|slot| slot.components.iter())
    }
}

/// One component of one materialized triad field, for tabular export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenedComponent {
    pub accession: String,
    pub attribute: TriadField,
    pub instance: usize,
    pub raw_original: String,
    pub raw_component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curie_uc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_uc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub in_scope: bool,
}
