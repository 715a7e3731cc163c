use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{ProgressEvent, ProgressSink, StageReport, StageStatus};
use crate::samples::ImportSummary;
use crate::store::CollectionMeta;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Serialize)]
pub struct DropResult {
    pub collection: String,
    pub existed: bool,
}

#[derive(Debug, Serialize)]
pub struct RegistrySummary {
    pub path: String,
    pub obo: usize,
    pub bioportal: usize,
}

#[derive(Debug, Serialize)]
pub struct ResetResult {
    pub field: String,
    pub removed: usize,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_reports(reports: &[StageReport]) -> io::Result<()> {
        Self::print_json(&reports)
    }

    pub fn print_status(collections: &[CollectionMeta]) -> io::Result<()> {
        Self::print_json(&collections)
    }

    pub fn print_import(summary: &ImportSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_drop(result: &DropResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_registry(summary: &RegistrySummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_reset(result: &ResetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the tracing subscriber; used for human output.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::debug!("{}", event.message),
        }
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_reports(reports: &[StageReport]) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let reset = "\x1b[0m";

        for report in reports {
            let (label, color) = match report.status {
                StageStatus::Completed => ("done", green),
                StageStatus::AlreadyComplete => ("skipped (already complete)", yellow),
            };
            print!(
                "{color}{:<16} {label}{reset}  rows={} {}ms",
                report.stage.name(),
                report.rows,
                report.elapsed_ms
            );
            match &report.detail {
                Some(detail) => println!("  {detail}"),
                None => println!(),
            }
        }
    }

    pub fn print_status(collections: &[CollectionMeta]) {
        if collections.is_empty() {
            println!("store is empty");
            return;
        }
        for meta in collections {
            let passes = if meta.applied_passes.is_empty() {
                String::new()
            } else {
                format!("  passes: {}", meta.applied_passes.join(", "))
            };
            println!(
                "{:<38} {:>9} rows  {}{passes}",
                meta.name, meta.rows, meta.written_at
            );
        }
    }

    pub fn print_import(summary: &ImportSummary) {
        println!("imported {} samples from {}", summary.rows, summary.source);
    }

    pub fn print_drop(result: &DropResult) {
        if result.existed {
            println!("dropped {}", result.collection);
        } else {
            println!("{} did not exist", result.collection);
        }
    }

    pub fn print_registry(summary: &RegistrySummary) {
        println!(
            "saved {} OBO and {} BioPortal prefixes to {}",
            summary.obo, summary.bioportal, summary.path
        );
    }

    pub fn print_reset(result: &ResetResult) {
        println!("removed {} from {} components", result.field, result.removed);
    }
}
