use std::io::{self, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use envtriad::config::{ConfigLoader, ResolvedConfig};
use envtriad::error::TriadError;
use envtriad::materialize::EnrichmentKey;
use envtriad::output::{
    DropResult, HumanOutput, JsonOutput, LogSink, OutputMode, RegistrySummary, ResetResult,
};
use envtriad::pipeline::{Pipeline, ProgressSink, Stage};
use envtriad::registry::{PrefixRegistry, RegistryHttpClient, fetch_registry};
use envtriad::samples::import_samples;
use envtriad::store::{KNOWN_COLLECTIONS, Store};

#[derive(Parser)]
#[command(name = "envtriad")]
#[command(about = "Normalize and materialize MIxS environmental triad annotations")]
#[command(version, author)]
struct Cli {
    /// Path to envtriad.json (defaults to ./envtriad.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Load sample records (JSON Lines or TSV, optionally gzipped)")]
    Import(ImportArgs),
    #[command(about = "Manage the ontology prefix registry")]
    Registry(RegistryArgs),
    #[command(about = "Run one pipeline stage, or all of them in order")]
    Run(RunArgs),
    #[command(about = "Show the collections in the store")]
    Status,
    #[command(about = "Drop a collection so its stage recomputes")]
    Drop(CollectionArgs),
    #[command(about = "Write a collection to stdout as JSON Lines")]
    Export(CollectionArgs),
    #[command(about = "Remove one enrichment from env_triads so its pass can rerun")]
    Unset(UnsetArgs),
}

#[derive(Args)]
struct ImportArgs {
    path: Utf8PathBuf,
}

#[derive(Args)]
struct RegistryArgs {
    #[command(subcommand)]
    command: RegistryCommand,
}

#[derive(Subcommand)]
enum RegistryCommand {
    #[command(about = "Download OBO Foundry and BioPortal prefixes")]
    Fetch {
        #[arg(long)]
        out: Option<Utf8PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// A stage name, or `all`.
    target: String,
}

#[derive(Args)]
struct CollectionArgs {
    collection: String,
}

#[derive(Args)]
struct UnsetArgs {
    enrichment: UnsetTarget,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnsetTarget {
    Labels,
    Classes,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<TriadError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TriadError) -> u8 {
    match error {
        TriadError::PrerequisiteMissing { .. }
        | TriadError::IndexMissing { .. }
        | TriadError::MissingConfig(_)
        | TriadError::ConfigRead(_)
        | TriadError::ConfigParse(_) => 2,
        TriadError::RegistryHttp(_) | TriadError::RegistryStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::open(config.store_dir.clone());

    match cli.command {
        Commands::Import(args) => {
            let summary = import_samples(&store, &args.path)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_import(&summary).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_import(&summary),
            }
            Ok(())
        }
        Commands::Registry(args) => match args.command {
            RegistryCommand::Fetch { out } => run_registry_fetch(&config, out, output_mode),
        },
        Commands::Run(args) => run_stages(&args.target, store, config, output_mode),
        Commands::Status => {
            let collections = store.list_collections()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_status(&collections).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_status(&collections),
            }
            Ok(())
        }
        Commands::Drop(args) => {
            let name = known_collection(&args.collection)?;
            let result = DropResult {
                collection: name.to_string(),
                existed: store.drop_collection(name)?,
            };
            match output_mode {
                OutputMode::Json => JsonOutput::print_drop(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_drop(&result),
            }
            Ok(())
        }
        Commands::Export(args) => {
            let name = known_collection(&args.collection)?;
            let rows = store.read_values(name)?;
            let mut stdout = io::stdout().lock();
            for row in rows {
                let line = serde_json::to_string(&row).into_diagnostic()?;
                writeln!(stdout, "{line}").into_diagnostic()?;
            }
            Ok(())
        }
        Commands::Unset(args) => {
            let key = match args.enrichment {
                UnsetTarget::Labels => EnrichmentKey::Label,
                UnsetTarget::Classes => EnrichmentKey::CurieLc,
            };
            let pipeline = Pipeline::new(store, config, PrefixRegistry::default());
            let result = ResetResult {
                field: match key {
                    EnrichmentKey::Label => "text_annotations",
                    EnrichmentKey::CurieLc => "asserted_class",
                }
                .to_string(),
                removed: pipeline.reset_enrichment(key)?,
            };
            match output_mode {
                OutputMode::Json => JsonOutput::print_reset(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_reset(&result),
            }
            Ok(())
        }
    }
}

fn run_registry_fetch(
    config: &ResolvedConfig,
    out: Option<Utf8PathBuf>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let path = out.unwrap_or_else(|| config.registry_path.clone());
    let client = RegistryHttpClient::new()?;
    let registry = fetch_registry(&client)?;
    registry.save(&path)?;
    let summary = RegistrySummary {
        path: path.to_string(),
        obo: registry.obo.len(),
        bioportal: registry.bioportal.len(),
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_registry(&summary).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_registry(&summary),
    }
    Ok(())
}

fn run_stages(
    target: &str,
    store: Store,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let stages = if target == "all" {
        Stage::ALL.to_vec()
    } else {
        vec![target.parse::<Stage>()?]
    };
    let registry = if stages.contains(&Stage::Parse) {
        load_registry(&config)?
    } else {
        PrefixRegistry::default()
    };
    let pipeline = Pipeline::new(store, config, registry);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogSink,
    };

    let run = pipeline.run_stages(&stages, sink);
    match output_mode {
        OutputMode::Json => JsonOutput::print_reports(&run.reports).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_reports(&run.reports),
    }
    match run.error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn load_registry(config: &ResolvedConfig) -> Result<PrefixRegistry, TriadError> {
    if config.registry_path.as_std_path().exists() {
        let registry = PrefixRegistry::load(&config.registry_path)?;
        tracing::info!(
            path = %config.registry_path,
            prefixes = registry.len(),
            "loaded prefix registry"
        );
        return Ok(registry);
    }
    tracing::warn!(
        path = %config.registry_path,
        "no prefix registry found; run `envtriad registry fetch` first"
    );
    Ok(PrefixRegistry::default())
}

fn known_collection(name: &str) -> Result<&'static str, TriadError> {
    KNOWN_COLLECTIONS
        .into_iter()
        .find(|known| *known == name)
        .ok_or_else(|| TriadError::UnknownCollection(name.to_string()))
}
