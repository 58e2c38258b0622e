use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use soracalc::cli::{Cli, Commands, FactsInput};
use soracalc::config::{load_config, SoraConfig};
use soracalc::{load_version_profile, FactMap, MethodologyVersion, RiskFamily, SoraEngine};
use std::io::Read;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Main orchestrator function
fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config();
    let pretty = cli.pretty || config.pretty;

    match cli.command {
        Commands::Ground { input } => {
            classify_command(&config, &input, Some(RiskFamily::Ground), pretty)
        }
        Commands::Air { input } => classify_command(&config, &input, Some(RiskFamily::Air), pretty),
        Commands::Assess { input } => classify_command(&config, &input, None, pretty),
        Commands::Assurance {
            methodology,
            ground,
            air,
        } => {
            let engine = build_engine(&config)?;
            let version = methodology.unwrap_or(config.default_version);
            let outcome = engine.classify_assurance(version, ground, &air)?;
            print_json(&outcome, pretty)
        }
        Commands::CheckProfile { path } => check_profile(&path, pretty),
    }
}

/// Log to stderr so stdout carries only JSON.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("SORACALC_LOG").unwrap_or_else(|_| "soracalc=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_engine(config: &SoraConfig) -> Result<SoraEngine> {
    let profiles = config
        .profiles()
        .context("Failed to load methodology profiles")?;
    Ok(SoraEngine::new(profiles))
}

// family None runs the combined assessment
fn classify_command(
    config: &SoraConfig,
    input: &FactsInput,
    family: Option<RiskFamily>,
    pretty: bool,
) -> Result<()> {
    let engine = build_engine(config)?;
    let version: MethodologyVersion = input.methodology.unwrap_or(config.default_version);
    let facts = read_facts(input.facts.as_deref())?;

    match family {
        Some(family) => print_json(&engine.classify(version, family, &facts)?, pretty),
        None => print_json(&engine.assess(version, &facts)?, pretty),
    }
}

fn read_facts(path: Option<&Path>) -> Result<FactMap> {
    let contents = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read facts from {}", path.display()))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read facts from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&contents).context("Facts must be a JSON object of numbers, booleans and strings")
}

#[derive(Serialize)]
struct ProfileSummary {
    version: MethodologyVersion,
    title: Option<String>,
    ground_rules: usize,
    air_rules: usize,
    ground_mitigations: usize,
    air_mitigations: usize,
}

fn check_profile(path: &Path, pretty: bool) -> Result<()> {
    let profile = load_version_profile(path)
        .with_context(|| format!("Profile {} is invalid", path.display()))?;
    let summary = ProfileSummary {
        version: profile.version,
        title: profile.title.clone(),
        ground_rules: profile.ground.overrides.len() + profile.ground.table.rules().len(),
        air_rules: profile.air.overrides.len() + profile.air.table.rules().len(),
        ground_mitigations: profile.ground.pipeline.definitions.len(),
        air_mitigations: profile.air.pipeline.definitions.len(),
    };
    print_json(&summary, pretty)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}
