use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use available_area_api::{
    AvailableAreaApi, CompatibilityMatrixProvider, ParcelAvailabilityQuery, ReferenceData,
};
use available_area_core::{
    actions_from_json, create_action_stacks, CompatibilityCheck, CompatibilityMatrix,
    ExistingAction, LOG_CATEGORY,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "aac")]
#[command(about = "Available-area calculator CLI")]
struct Cli {
    #[arg(long, default_value = "./reference_data.json")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    AvailableArea(AvailableAreaArgs),
    Stacks(StacksArgs),
    Compatibility(CompatibilityArgs),
}

#[derive(Debug, Args)]
struct AvailableAreaArgs {
    #[arg(long)]
    sheet_id: String,
    #[arg(long)]
    parcel_id: String,
    /// Action to evaluate; repeat for several. Defaults to every enabled action.
    #[arg(long = "action")]
    actions: Vec<String>,
    /// Action applied for alongside, as CODE=SQM.
    #[arg(long = "planned", value_parser = parse_planned)]
    planned: Vec<ExistingAction>,
    #[arg(long, default_value_t = false)]
    with_results: bool,
}

#[derive(Debug, Args)]
struct StacksArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct CompatibilityArgs {
    #[arg(long)]
    a: String,
    #[arg(long)]
    b: String,
}

fn parse_planned(raw: &str) -> std::result::Result<ExistingAction, String> {
    let (code, area) = raw
        .split_once('=')
        .ok_or_else(|| format!("planned action `{raw}` MUST look like CODE=SQM"))?;
    if code.trim().is_empty() {
        return Err(format!("planned action `{raw}` is missing a code"));
    }
    let area = area
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("planned action `{raw}` has an invalid area: {err}"))?;
    Ok(ExistingAction::new(code.trim(), area))
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::AvailableArea(args) => run_available_area(&cli.data, args),
        Command::Stacks(args) => run_stacks(&args),
        Command::Compatibility(args) => run_compatibility(&cli.data, &args),
    }
}

fn run_available_area(data: &Path, args: AvailableAreaArgs) -> Result<()> {
    let reference_data = ReferenceData::load(data)?;
    tracing::debug!(category = LOG_CATEGORY, path = %data.display(), "loaded reference data");
    let api = AvailableAreaApi::new(reference_data);
    let availability = api.calculate_for_parcel(ParcelAvailabilityQuery {
        sheet_id: args.sheet_id,
        parcel_id: args.parcel_id,
        action_codes: args.actions,
        planned_actions: args.planned,
        with_results: args.with_results,
    })?;
    emit_json(serde_json::to_value(availability)?)
}

fn run_stacks(args: &StacksArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read stack input {}", args.input.display()))?;
    let input: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse stack input {}", args.input.display()))?;

    let actions = actions_from_json(input.get("actions").unwrap_or(&Value::Null))?;
    let pairs: Vec<(String, String)> = match input.get("compatibility") {
        Some(value) => serde_json::from_value(value.clone())
            .context("compatibility MUST be an array of [code, code] pairs")?,
        None => Vec::new(),
    };
    let matrix = CompatibilityMatrix::from_pairs(pairs.iter().map(|(a, b)| (a.as_str(), b.as_str())));

    tracing::debug!(
        category = LOG_CATEGORY,
        actions = actions.len(),
        compatibility_rows = matrix.len(),
        "building stacks"
    );
    let result = create_action_stacks(&actions, &matrix)?;
    emit_json(serde_json::json!({
        "stacks": result.stacks,
        "explanations": result.explanations,
    }))
}

fn run_compatibility(data: &Path, args: &CompatibilityArgs) -> Result<()> {
    let reference_data = ReferenceData::load(data)?;
    tracing::debug!(category = LOG_CATEGORY, path = %data.display(), "loaded reference data");
    let matrix = reference_data.compatibility_matrix(&[args.a.clone(), args.b.clone()])?;
    emit_json(serde_json::json!({
        "a": args.a,
        "b": args.b,
        "compatible": matrix.is_compatible(&args.a, &args.b),
    }))
}
