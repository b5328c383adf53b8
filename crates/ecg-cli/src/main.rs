//! ECG Pipeline - condition recordings and score them with an anomaly model

mod cli;
mod summary;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, ProcessArgs, SimulateArgs};
use ecg_core::{format, RawEcgRecord};
use ecg_inference::{EcgService, HttpInferenceClient, ModelRegistry, DEFAULT_MODEL_ID};
use ecg_processing::{Pipeline, PipelineConfig, PipelineReport};
use ecg_simulation::{EcgConfig, EcgSimulator};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Process(args) => process(args).await,
        Command::Simulate(args) => simulate(args),
        Command::Config => {
            println!("{}", PipelineConfig::default().to_json()?);
            Ok(())
        }
    }
}

async fn process(args: ProcessArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;

    let record = match &args.input {
        Some(path) => read_record(path)?,
        None => EcgSimulator::new(EcgConfig::default())?.generate(10.0)?,
    };
    tracing::info!(samples = record.sample_count(), "Loaded recording");

    let report = if args.no_inference {
        pipeline.run_record(&record)?
    } else {
        let service = build_service(pipeline, &args)?;
        service.process(&record, args.model.as_deref()).await?
    };

    if args.summary {
        eprint!("{}", summary::render(&report));
    }
    write_report(&report, args.pretty, args.output.as_deref())
}

fn read_record(path: &Path) -> Result<RawEcgRecord> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    format::read_csv(BufReader::new(file)).with_context(|| format!("Failed to parse {}", path.display()))
}

fn build_service(pipeline: Pipeline, args: &ProcessArgs) -> Result<EcgService<HttpInferenceClient>> {
    let mut registry = ModelRegistry::builtin();
    if let Some(endpoint) = &args.endpoint {
        registry = registry.with_endpoint(DEFAULT_MODEL_ID, endpoint.clone())?;
    }
    let client = HttpInferenceClient::new(Duration::from_secs(args.timeout))?;
    Ok(EcgService::new(pipeline, registry, client))
}

fn write_report(report: &PipelineReport, pretty: bool, output: Option<&Path>) -> Result<()> {
    let json = report.to_json(pretty).context("Failed to serialize report")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(json.as_bytes())
                .and_then(|_| stdout.write_all(b"\n"))
                .context("Failed to write report to stdout")
        }
    }
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let base = if args.clean {
        EcgConfig::clean(args.signal_pattern())
    } else {
        EcgConfig {
            pattern: args.signal_pattern(),
            ..EcgConfig::default()
        }
    };
    let config = EcgConfig {
        sampling_rate: args.rate,
        dropout_proportion: args.dropout,
        label: args.label,
        seed: args.seed,
        ..base
    };

    let mut simulator = EcgSimulator::new(config).context("Invalid simulation settings")?;
    let record = simulator.generate(args.duration)?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            format::write_csv(&record, BufWriter::new(file))?;
        }
        None => format::write_csv(&record, std::io::stdout().lock())?,
    }

    tracing::info!(samples = record.sample_count(), "Wrote synthetic recording");
    Ok(())
}
