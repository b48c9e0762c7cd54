//! `trialscreen` command-line interface.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use trialscreen_core::{
    load_patients_csv, Decision, DecisionRecord, PatientRecord, ProtocolLibrary, ResultRow,
    ResultStore,
};
use trialscreen_runtime::{BatchScreener, ProviderRegistry, Screener, ScreenerConfig};

/// LLM-assisted clinical trial eligibility screening
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider name (gemini, anthropic)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model override
    #[arg(long, global = true)]
    model: Option<String>,

    /// API key (otherwise read from config or the provider's env variable)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Directory of `<name>.md` protocol files
    #[arg(long, global = true)]
    protocols_dir: Option<PathBuf>,

    /// Result store CSV
    #[arg(long, global = true)]
    results: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Screen one patient (JSON object file) against one protocol
    Screen(ScreenArgs),

    /// Screen a patient CSV against one or more protocols and store results
    Batch(BatchArgs),

    /// Manage trial protocols
    #[command(subcommand)]
    Protocol(ProtocolCommand),

    /// Inspect stored results
    #[command(subcommand)]
    Results(ResultsCommand),
}

#[derive(Args, Debug)]
struct ScreenArgs {
    /// Patient JSON file
    #[arg(short, long)]
    patient: PathBuf,

    /// Protocol name
    #[arg(long)]
    protocol: String,

    /// Also write the result to the result store
    #[arg(long)]
    save: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Patient CSV file
    #[arg(short, long)]
    patients: PathBuf,

    /// Protocol name; repeat for several. Defaults to every stored protocol.
    #[arg(long = "protocol")]
    protocols: Vec<String>,

    /// Only screen the first N patients
    #[arg(long)]
    limit: Option<usize>,

    /// Pause between model calls in milliseconds (overrides config)
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum ProtocolCommand {
    /// List stored protocols
    List,

    /// Store a protocol from a markdown file
    Add {
        /// Protocol name (sanitized to letters, digits, '_' and '-')
        name: String,

        /// Criteria file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print a protocol's criteria
    Show { name: String },
}

#[derive(Subcommand, Debug)]
enum ResultsCommand {
    /// Decision counts
    Summary {
        /// Limit to one trial
        #[arg(long)]
        trial: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let protocols = ProtocolLibrary::new(&config.protocols_dir);
    let store = ResultStore::new(&config.results_path);

    match cli.command {
        Command::Screen(args) => screen(&config, &protocols, &store, args).await,
        Command::Batch(args) => batch(&config, &protocols, &store, args).await,
        Command::Protocol(cmd) => protocol(&protocols, cmd),
        Command::Results(cmd) => results(&store, cmd),
    }
}

/// Config file (if any) with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<ScreenerConfig> {
    let mut config = match &cli.config {
        Some(path) => ScreenerConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScreenerConfig::default(),
    };

    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }
    if let Some(key) = &cli.api_key {
        config.api_key = Some(key.clone());
    }
    if let Some(dir) = &cli.protocols_dir {
        config.protocols_dir = dir.clone();
    }
    if let Some(path) = &cli.results {
        config.results_path = path.clone();
    }

    config.validate()?;
    tracing::debug!(?config, "Resolved configuration");
    Ok(config)
}

async fn build_screener(config: &ScreenerConfig) -> Result<Screener> {
    let registry = ProviderRegistry::with_defaults();
    let screener = Screener::from_config(&registry, config)
        .with_context(|| format!("creating provider '{}'", config.provider))?;

    if !screener.is_ready().await {
        bail!(
            "provider '{}' is not ready: check its API key",
            screener.provider_name()
        );
    }

    info!(
        provider = screener.provider_name(),
        model = screener.model(),
        "Screener ready"
    );
    Ok(screener)
}

async fn screen(
    config: &ScreenerConfig,
    protocols: &ProtocolLibrary,
    store: &ResultStore,
    args: ScreenArgs,
) -> Result<()> {
    let text = std::fs::read_to_string(&args.patient)
        .with_context(|| format!("reading patient file {}", args.patient.display()))?;
    let patient = PatientRecord::from_json_str(&text)
        .with_context(|| format!("parsing patient file {}", args.patient.display()))?;
    let protocol = protocols.load(&args.protocol)?;

    let screener = build_screener(config).await?;
    let patient_id = patient.patient_id().unwrap_or_else(|| "UNKNOWN".to_string());
    let report = screener
        .screen_report(&patient_id, &protocol.name, &patient, &protocol.criteria)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_record(&report.patient_id, &report.trial_name, &report.record);
    }

    if args.save {
        let row = ResultRow::from_decision(&report.patient_id, &report.trial_name, &report.record)?;
        store.merge(vec![row])?;
    }
    Ok(())
}

async fn batch(
    config: &ScreenerConfig,
    protocols: &ProtocolLibrary,
    store: &ResultStore,
    args: BatchArgs,
) -> Result<()> {
    let mut patients = load_patients_csv(&args.patients)
        .with_context(|| format!("loading patients from {}", args.patients.display()))?;
    if let Some(limit) = args.limit {
        patients.truncate(limit);
    }

    let selected = if args.protocols.is_empty() {
        protocols.load_all()?
    } else {
        args.protocols
            .iter()
            .map(|name| protocols.load(name))
            .collect::<Result<Vec<_>, _>>()?
    };
    if selected.is_empty() {
        bail!(
            "no protocols found in {}; add one with `trialscreen protocol add`",
            protocols.root().display()
        );
    }

    let delay = args
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or(config.inter_call_delay);
    let runner = BatchScreener::new(build_screener(config).await?, delay);
    let outcome = runner.run(&patients, &selected).await;

    let merge = store.merge(outcome.rows()?)?;
    println!(
        "Batch complete: {} screenings, {} failures. Saved to {} ({} replaced, {} total rows).",
        outcome.summary.total,
        outcome.summary.failures,
        store.path().display(),
        merge.replaced,
        merge.total,
    );
    for decision in Decision::ALL {
        println!("  {:<11} {}", decision.as_str(), outcome.summary.count(decision));
    }
    Ok(())
}

fn protocol(protocols: &ProtocolLibrary, cmd: ProtocolCommand) -> Result<()> {
    match cmd {
        ProtocolCommand::List => {
            let names = protocols.list()?;
            if names.is_empty() {
                println!("No protocols in {}", protocols.root().display());
            }
            for name in names {
                println!("{name}");
            }
        }
        ProtocolCommand::Add { name, file } => {
            let criteria = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let stored = protocols.save(&name, &criteria)?;
            println!("Saved protocol '{stored}'");
        }
        ProtocolCommand::Show { name } => {
            print!("{}", protocols.load(&name)?.criteria);
        }
    }
    Ok(())
}

fn results(store: &ResultStore, cmd: ResultsCommand) -> Result<()> {
    match cmd {
        ResultsCommand::Summary { trial, json } => {
            let summary = store.summary(trial.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("Total screened: {}", summary.total);
            for decision in Decision::ALL {
                println!("  {:<11} {}", decision.as_str(), summary.count(decision));
            }
            if summary.unrecognized > 0 {
                println!("  {:<11} {}", "other", summary.unrecognized);
            }
        }
    }
    Ok(())
}

fn print_record(patient_id: &str, trial: &str, record: &DecisionRecord) {
    println!("Patient {patient_id} / {trial}: {}", record.decision);
    println!();
    println!("{}", record.reason);

    let sections = [
        ("Inclusion met", &record.inclusion_criteria_met),
        ("Inclusion not met", &record.inclusion_criteria_not_met),
        ("Exclusion met", &record.exclusion_criteria_met),
        ("Exclusion not met", &record.exclusion_criteria_not_met),
        ("Missing info", &record.missing_info),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!();
        println!("{title}:");
        for item in items {
            println!("  - {item}");
        }
    }
}
