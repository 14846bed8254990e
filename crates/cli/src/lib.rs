pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use ksm_core::analysis::AnalysisConfigPatch;
use ksm_core::config::{AppConfig, LoadOptions, LoggingConfig};
use ksm_core::domain::analysis::AnalysisMethod;

#[derive(Debug, Parser)]
#[command(
    name = "ksm",
    about = "KSM vendor offer analysis operator CLI",
    long_about = "Score vendor offers, inspect analysis results, record item selections and approve purchase requests.",
    after_help = "Examples:\n  ksm migrate\n  ksm seed\n  ksm analyze PR-2024-001\n  ksm select --actor procurement.lead --item OLI-2024-001-B1=10\n  ksm approve REQ-2024-001 --actor head.of.procurement"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a ksm.toml config file (must exist when given)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic R1 demo purchase request with two competing offers")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Score every open offer of a purchase request and render the report")]
    Analyze {
        request_id: String,
        #[arg(long, help = "automated | simplified | manual (defaults to analysis.default_method)")]
        method: Option<AnalysisMethod>,
    },
    #[command(about = "Show the latest stored analysis of a purchase request")]
    ShowAnalysis { request_id: String },
    #[command(about = "Show the active scoring weights and thresholds")]
    Weights,
    #[command(about = "Update scoring weights and thresholds; weights must keep summing to 1.0")]
    SetWeights(SetWeightsArgs),
    #[command(about = "Select or unselect offer line items in one atomic batch")]
    Select {
        #[arg(long)]
        actor: String,
        #[arg(long = "item", value_name = "ITEM_ID=QTY", value_parser = parse_selection_arg)]
        items: Vec<(String, u32)>,
        #[arg(long = "unselect", value_name = "ITEM_ID")]
        unselect: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "Approve the current selection of a purchase request")]
    Approve {
        reference: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Debug, Args)]
struct SetWeightsArgs {
    #[arg(long)]
    price: Option<f64>,
    #[arg(long)]
    quality: Option<f64>,
    #[arg(long)]
    delivery: Option<f64>,
    #[arg(long)]
    reputation: Option<f64>,
    #[arg(long)]
    payment: Option<f64>,
    #[arg(long)]
    min_vendor_count: Option<u32>,
    #[arg(long)]
    score_threshold: Option<f64>,
    #[arg(long)]
    price_variance_threshold: Option<f64>,
}

impl From<SetWeightsArgs> for AnalysisConfigPatch {
    fn from(args: SetWeightsArgs) -> Self {
        Self {
            price_weight: args.price,
            quality_weight: args.quality,
            delivery_weight: args.delivery,
            reputation_weight: args.reputation,
            payment_weight: args.payment,
            min_vendor_count: args.min_vendor_count,
            score_threshold: args.score_threshold,
            price_variance_threshold: args.price_variance_threshold,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    // Config problems are reported by the command itself with a structured outcome.
    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => commands::config::run(options),
        Command::Analyze { request_id, method } => {
            commands::analyze::run(options, &request_id, method)
        }
        Command::ShowAnalysis { request_id } => commands::show_analysis::run(options, &request_id),
        Command::Weights => commands::weights::show(options),
        Command::SetWeights(args) => commands::weights::update(options, args.into()),
        Command::Select { actor, items, unselect, notes } => {
            commands::select::run(options, &actor, &items, &unselect, notes.as_deref())
        }
        Command::Approve { reference, actor, notes } => {
            commands::approve::run(options, &reference, &actor, notes.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn init_logging(config: &LoggingConfig) {
    use ksm_core::config::LogFormat::*;

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(max_level(config))
        .with_writer(std::io::stderr);

    match config.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

fn max_level(config: &LoggingConfig) -> tracing::Level {
    config.level.parse().unwrap_or(tracing::Level::INFO)
}

fn parse_selection_arg(raw: &str) -> Result<(String, u32), String> {
    let (item_id, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM_ID=QTY, got `{raw}`"))?;
    let item_id = item_id.trim();
    if item_id.is_empty() {
        return Err(format!("missing item id in `{raw}`"));
    }
    let quantity = quantity
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("invalid quantity in `{raw}`: {error}"))?;
    Ok((item_id.to_string(), quantity))
}
