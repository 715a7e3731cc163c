use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TriadError {
    #[error("stage {stage} requires {collection}, which is absent or empty")]
    #[diagnostic(help(
        "run the upstream stage first, import the sample records, or run `envtriad registry fetch`"
    ))]
    PrerequisiteMissing { stage: String, collection: String },

    #[error("collection {collection} has no index on {path}")]
    #[diagnostic(help("run `envtriad run index` before the enrichment passes"))]
    IndexMissing { collection: String, path: String },

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("invalid triad field: {0}")]
    InvalidTriadField(String),

    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to (de)serialize {collection}: {message}")]
    Serialization { collection: String, message: String },

    #[error("malformed sample record at line {line}: {message}")]
    SampleParse { line: usize, message: String },

    #[error("prefix registry request failed: {0}")]
    RegistryHttp(String),

    #[error("prefix registry returned status {status}: {message}")]
    RegistryStatus { status: u16, message: String },

    #[error("failed to parse prefix registry: {0}")]
    RegistryParse(String),
}
