use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::ValueEnum;
use serde::Serialize;

use crate::audit::{aggregate_curies, flatten_triads, rank_component_prefixes};
use crate::classify::extract_values;
use crate::cleanup::{PruneRule, compact, default_rules};
use crate::config::ResolvedConfig;
use crate::domain::{
    LabelStats, MaterializedTriad, ParsedValue, SampleRecord, ScopeEntry, TriadValue,
};
use crate::error::TriadError;
use crate::labels::resolve_labels;
use crate::materialize::{
    EnrichmentKey, FieldIndexes, annotate_labels, assert_classes, build_skeleton, create_indexes,
};
use crate::parser::{ComponentParser, parse_catalog};
use crate::registry::PrefixRegistry;
use crate::scope::resolve_scope;
use crate::store::{
    COMPONENT_CURIES, COMPONENT_PREFIX_USAGE, CollectionMeta, FLATTENED, IndexOutcome,
    LABEL_STATS, MATERIALIZED, PREFIX_USAGE, SAMPLES, SCOPE_ENTRIES, Store, TRIAD_COMPONENTS,
    TRIAD_VALUES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Extract,
    Parse,
    Scope,
    Audit,
    Labels,
    Materialize,
    Index,
    AnnotateLabels,
    AssertClasses,
    Cleanup,
    Flatten,
}

impl Stage {
    /// Dependency order.
    pub const ALL: [Stage; 11] = [
        Stage::Extract,
        Stage::Parse,
        Stage::Scope,
        Stage::Audit,
        Stage::Labels,
        Stage::Materialize,
        Stage::Index,
        Stage::AnnotateLabels,
        Stage::AssertClasses,
        Stage::Cleanup,
        Stage::Flatten,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Parse => "parse",
            Stage::Scope => "scope",
            Stage::Audit => "audit",
            Stage::Labels => "labels",
            Stage::Materialize => "materialize",
            Stage::Index => "index",
            Stage::AnnotateLabels => "annotate-labels",
            Stage::AssertClasses => "assert-classes",
            Stage::Cleanup => "cleanup",
            Stage::Flatten => "flatten",
        }
    }

    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            Stage::Extract => &[SAMPLES],
            Stage::Parse => &[TRIAD_VALUES],
            Stage::Scope | Stage::Audit | Stage::Labels => &[TRIAD_COMPONENTS],
            Stage::Materialize => &[SAMPLES, TRIAD_COMPONENTS],
            Stage::Index | Stage::Cleanup | Stage::Flatten => &[MATERIALIZED],
            Stage::AnnotateLabels => &[MATERIALIZED, LABEL_STATS],
            Stage::AssertClasses => &[MATERIALIZED, SCOPE_ENTRIES],
        }
    }

    pub fn output(&self) -> &'static str {
        match self {
            Stage::Extract => TRIAD_VALUES,
            Stage::Parse => TRIAD_COMPONENTS,
            Stage::Scope => SCOPE_ENTRIES,
            Stage::Audit => COMPONENT_CURIES,
            Stage::Labels => LABEL_STATS,
            Stage::Materialize
            | Stage::Index
            | Stage::AnnotateLabels
            | Stage::AssertClasses
            | Stage::Cleanup => MATERIALIZED,
            Stage::Flatten => FLATTENED,
        }
    }

    /// Stages that mutate the materialized collection in place record a
    /// marker on it instead of producing a collection of their own.
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Stage::AnnotateLabels | Stage::AssertClasses | Stage::Cleanup => Some(self.name()),
            _ => None,
        }
    }

    /// Markers that must be present before the stage may run.
    pub fn required_markers(&self) -> &'static [Stage] {
        match self {
            Stage::Cleanup => &[Stage::AnnotateLabels, Stage::AssertClasses],
            Stage::Flatten => &[Stage::Cleanup],
            _ => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Stage {
    type Err = TriadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == value.trim())
            .ok_or_else(|| TriadError::UnknownStage(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    AlreadyComplete,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub rows: usize,
    pub elapsed_ms: u128,
    pub started_at: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Reports of the stages that finished, and the error that stopped the run
/// if one did.
#[derive(Debug)]
pub struct StageRun {
    pub reports: Vec<StageReport>,
    pub error: Option<TriadError>,
}

struct StageOutcome {
    rows: usize,
    detail: Option<String>,
}

/// Runs the stages against one store. Every stage is guarded: a populated
/// output (or an applied marker) makes it a no-op, and forcing a rerun
/// means dropping that output first.
pub struct Pipeline {
    store: Store,
    config: ResolvedConfig,
    registry: PrefixRegistry,
}

impl Pipeline {
    pub fn new(store: Store, config: ResolvedConfig, registry: PrefixRegistry) -> Self {
        Self {
            store,
            config,
            registry,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn run_all(&self, sink: &dyn ProgressSink) -> Result<Vec<StageReport>, TriadError> {
        Stage::ALL
            .into_iter()
            .map(|stage| self.run(stage, sink))
            .collect()
    }

    /// Runs `stages` in order and stops at the first failure, keeping the
    /// reports of the stages that finished before it.
    pub fn run_stages(&self, stages: &[Stage], sink: &dyn ProgressSink) -> StageRun {
        let mut reports = Vec::with_capacity(stages.len());
        for stage in stages {
            match self.run(*stage, sink) {
                Ok(report) => reports.push(report),
                Err(error) => {
                    tracing::warn!(stage = %stage, finished = reports.len(), "stage failed");
                    return StageRun {
                        reports,
                        error: Some(error),
                    };
                }
            }
        }
        StageRun {
            reports,
            error: None,
        }
    }

    pub fn run(&self, stage: Stage, sink: &dyn ProgressSink) -> Result<StageReport, TriadError> {
        let started_at = Utc::now().to_rfc3339();
        let start = Instant::now();
        self.store.ensure_root()?;

        if let Some(rows) = self.completed_rows(stage)? {
            tracing::info!(stage = %stage, rows, "stage already complete; skipping");
            sink.event(ProgressEvent {
                message: format!("phase=Guard; {stage} already complete"),
                elapsed: Some(start.elapsed()),
            });
            return Ok(StageReport {
                stage,
                status: StageStatus::AlreadyComplete,
                rows,
                elapsed_ms: start.elapsed().as_millis(),
                started_at,
                detail: None,
            });
        }

        self.check_prerequisites(stage)?;
        sink.event(ProgressEvent {
            message: format!("phase=Run; {stage}"),
            elapsed: None,
        });
        tracing::info!(stage = %stage, "stage started");

        let outcome = match stage {
            Stage::Extract => self.extract()?,
            Stage::Parse => self.parse()?,
            Stage::Scope => self.scope()?,
            Stage::Audit => self.audit()?,
            Stage::Labels => self.labels()?,
            Stage::Materialize => self.materialize()?,
            Stage::Index => self.index()?,
            Stage::AnnotateLabels => self.enrich(EnrichmentKey::Label)?,
            Stage::AssertClasses => self.enrich(EnrichmentKey::CurieLc)?,
            Stage::Cleanup => self.cleanup()?,
            Stage::Flatten => self.flatten()?,
        };
        if let Some(marker) = stage.marker() {
            self.store.mark_pass(MATERIALIZED, marker)?;
        }

        let elapsed = start.elapsed();
        tracing::info!(
            stage = %stage,
            rows = outcome.rows,
            elapsed_ms = elapsed.as_millis() as u64,
            "stage completed"
        );
        sink.event(ProgressEvent {
            message: format!("phase=Done; {stage} rows={}", outcome.rows),
            elapsed: Some(elapsed),
        });
        Ok(StageReport {
            stage,
            status: StageStatus::Completed,
            rows: outcome.rows,
            elapsed_ms: elapsed.as_millis(),
            started_at,
            detail: outcome.detail,
        })
    }

    /// Removes one enrichment sub-field from every component and clears the
    /// markers that depend on it, so the pass can be rerun with a new shape.
    pub fn reset_enrichment(&self, key: EnrichmentKey) -> Result<usize, TriadError> {
        if !self.store.is_populated(MATERIALIZED)? {
            return Ok(0);
        }
        let (field, stage) = match key {
            EnrichmentKey::Label => ("text_annotations", Stage::AnnotateLabels),
            EnrichmentKey::CurieLc => ("asserted_class", Stage::AssertClasses),
        };
        let mut docs = self.store.read_values(MATERIALIZED)?;
        let summary = compact(&mut docs, &[PruneRule::always(field)]);
        self.store.rewrite_collection(MATERIALIZED, &docs)?;
        self.store.unmark_pass(MATERIALIZED, stage.name())?;
        self.store.unmark_pass(MATERIALIZED, Stage::Cleanup.name())?;
        tracing::info!(
            field,
            documents = summary.documents_touched,
            removed = summary.fields_removed,
            "reset enrichment"
        );
        Ok(summary.fields_removed)
    }

    pub fn status(&self) -> Result<Vec<CollectionMeta>, TriadError> {
        self.store.list_collections()
    }

    fn completed_rows(&self, stage: Stage) -> Result<Option<usize>, TriadError> {
        if let Some(marker) = stage.marker() {
            if self.store.has_pass(MATERIALIZED, marker)? {
                return Ok(Some(self.store.count(MATERIALIZED)?));
            }
            return Ok(None);
        }
        if stage == Stage::Index {
            let paths = index_paths();
            let all_present = self.store.is_populated(MATERIALIZED)?
                && paths
                    .iter()
                    .all(|path| self.store.has_index(MATERIALIZED, path));
            return Ok(all_present.then_some(paths.len()));
        }
        let output = stage.output();
        if self.store.is_populated(output)? {
            return Ok(Some(self.store.count(output)?));
        }
        Ok(None)
    }

    fn check_prerequisites(&self, stage: Stage) -> Result<(), TriadError> {
        if stage == Stage::Parse && self.config.require_known_prefix && self.registry.is_empty() {
            return Err(TriadError::PrerequisiteMissing {
                stage: stage.name().to_string(),
                collection: self.config.registry_path.to_string(),
            });
        }
        for input in stage.inputs() {
            if !self.store.is_populated(input)? {
                return Err(TriadError::PrerequisiteMissing {
                    stage: stage.name().to_string(),
                    collection: input.to_string(),
                });
            }
        }
        for required in stage.required_markers() {
            let marker = required.marker().unwrap_or(required.name());
            if !self.store.has_pass(MATERIALIZED, marker)? {
                return Err(TriadError::PrerequisiteMissing {
                    stage: stage.name().to_string(),
                    collection: format!("{MATERIALIZED} ({marker} pass)"),
                });
            }
        }
        if let Some(key) = enrichment_key(stage) {
            for path in key.index_paths() {
                self.store.require_index(MATERIALIZED, &path)?;
            }
        }
        Ok(())
    }

    fn extract(&self) -> Result<StageOutcome, TriadError> {
        let samples: Vec<SampleRecord> = self.store.read(SAMPLES)?;
        let values = extract_values(&samples, self.config.missing_policy, self.config.min_count);
        self.store.write_collection(TRIAD_VALUES, &values)?;
        Ok(StageOutcome {
            rows: values.len(),
            detail: Some(format!("{} samples scanned", samples.len())),
        })
    }

    fn parse(&self) -> Result<StageOutcome, TriadError> {
        let values: Vec<TriadValue> = self.store.read(TRIAD_VALUES)?;
        let parser = ComponentParser::new(&self.registry, &self.config);
        let parsed = parse_catalog(&values, &parser, self.config.min_length);
        let components = parsed
            .iter()
            .map(|value| value.components.len())
            .sum::<usize>();
        let unresolved = parsed
            .iter()
            .flat_map(|value| value.components.iter())
            .filter(|component| !component.is_resolved())
            .count();
        self.store.write_collection(TRIAD_COMPONENTS, &parsed)?;
        Ok(StageOutcome {
            rows: parsed.len(),
            detail: Some(format!("{components} components, {unresolved} unresolved")),
        })
    }

    fn scope(&self) -> Result<StageOutcome, TriadError> {
        let parsed: Vec<ParsedValue> = self.store.read(TRIAD_COMPONENTS)?;
        let resolution = resolve_scope(&parsed);
        self.store.write_collection(PREFIX_USAGE, &resolution.prefix_usage)?;
        self.store.write_collection(SCOPE_ENTRIES, &resolution.entries)?;
        Ok(StageOutcome {
            rows: resolution.entries.len(),
            detail: Some(format!("{} prefixes", resolution.prefix_usage.len())),
        })
    }

    fn audit(&self) -> Result<StageOutcome, TriadError> {
        let parsed: Vec<ParsedValue> = self.store.read(TRIAD_COMPONENTS)?;
        let prefixes = rank_component_prefixes(&parsed);
        let curies = aggregate_curies(&parsed);
        self.store.write_collection(COMPONENT_PREFIX_USAGE, &prefixes)?;
        self.store.write_collection(COMPONENT_CURIES, &curies)?;
        Ok(StageOutcome {
            rows: curies.len(),
            detail: Some(format!("{} prefixes", prefixes.len())),
        })
    }

    fn labels(&self) -> Result<StageOutcome, TriadError> {
        let parsed: Vec<ParsedValue> = self.store.read(TRIAD_COMPONENTS)?;
        let rows = resolve_labels(&parsed);
        self.store.write_collection(LABEL_STATS, &rows)?;
        Ok(StageOutcome {
            rows: rows.len(),
            detail: None,
        })
    }

    fn materialize(&self) -> Result<StageOutcome, TriadError> {
        let samples: Vec<SampleRecord> = self.store.read(SAMPLES)?;
        let parsed: Vec<ParsedValue> = self.store.read(TRIAD_COMPONENTS)?;
        let docs = build_skeleton(&samples, &parsed);
        self.store.write_collection(MATERIALIZED, &docs)?;
        Ok(StageOutcome {
            rows: docs.len(),
            detail: Some(format!("{} samples without resolved triads", samples.len() - docs.len())),
        })
    }

    fn index(&self) -> Result<StageOutcome, TriadError> {
        let outcomes = create_indexes(&self.store)?;
        let created = outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == IndexOutcome::Created)
            .count();
        Ok(StageOutcome {
            rows: outcomes.len(),
            detail: Some(format!("{created} created")),
        })
    }

    fn enrich(&self, key: EnrichmentKey) -> Result<StageOutcome, TriadError> {
        let indexes = FieldIndexes::load(&self.store, key)?;
        let mut docs: Vec<MaterializedTriad> = self.store.read(MATERIALIZED)?;
        let updated = match key {
            EnrichmentKey::Label => {
                let rows: Vec<LabelStats> = self.store.read(LABEL_STATS)?;
                annotate_labels(&mut docs, &rows, &indexes)
            }
            EnrichmentKey::CurieLc => {
                let entries: Vec<ScopeEntry> = self.store.read(SCOPE_ENTRIES)?;
                assert_classes(&mut docs, &entries, &indexes)
            }
        };
        self.store.rewrite_collection(MATERIALIZED, &docs)?;
        Ok(StageOutcome {
            rows: updated,
            detail: Some(format!("{updated} components updated")),
        })
    }

    fn cleanup(&self) -> Result<StageOutcome, TriadError> {
        let mut docs = self.store.read_values(MATERIALIZED)?;
        let summary = compact(&mut docs, &default_rules());
        self.store.rewrite_collection(MATERIALIZED, &docs)?;
        Ok(StageOutcome {
            rows: summary.documents_touched,
            detail: Some(format!("{} fields removed", summary.fields_removed)),
        })
    }

    fn flatten(&self) -> Result<StageOutcome, TriadError> {
        let docs: Vec<MaterializedTriad> = self.store.read(MATERIALIZED)?;
        let rows = flatten_triads(&docs);
        self.store.write_collection(FLATTENED, &rows)?;
        Ok(StageOutcome {
            rows: rows.len(),
            detail: Some(format!("{} documents", docs.len())),
        })
    }
}

fn enrichment_key(stage: Stage) -> Option<EnrichmentKey> {
    match stage {
        Stage::AnnotateLabels => Some(EnrichmentKey::Label),
        Stage::AssertClasses => Some(EnrichmentKey::CurieLc),
        _ => None,
    }
}

fn index_paths() -> Vec<String> {
    EnrichmentKey::ALL
        .into_iter()
        .flat_map(|key| key.index_paths())
        .collect()
}
