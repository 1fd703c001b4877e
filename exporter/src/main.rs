use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use dosecore::model::parse_timestamp;
use generator::profile::{build_measurements, write_measurements_csv, GeneratorConfig};
use log::info;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::{RunOptions, Runner};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Dose map export driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Measurement table to read (overrides the workflow config)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Export file to publish (overrides the workflow config)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Checkpoint file (overrides the workflow config)
    #[arg(long)]
    state: Option<PathBuf>,
    /// Recompute even when no new measurements arrived
    #[arg(long, default_value_t = false)]
    force: bool,
    /// Reference time, RFC 3339 or `YYYY-MM-DD HH:MM:SS`; defaults to now
    #[arg(long)]
    now: Option<String>,
    /// Write this many synthetic measurements to the input before running
    #[arg(long)]
    generate: Option<usize>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::default()
    };
    workflow_config.apply_overrides(args.input, args.output, args.state);

    let now = match args.now.as_deref() {
        Some(text) => parse_timestamp(text).with_context(|| format!("parsing --now {text:?}"))?,
        None => Utc::now(),
    };

    if let Some(count) = args.generate {
        let rows = build_measurements(&GeneratorConfig {
            count,
            seed: args.seed,
            ..Default::default()
        })?;
        write_measurements_csv(&workflow_config.input, &rows)?;
        info!(
            "generated {} measurements into {}",
            rows.len(),
            workflow_config.input.display()
        );
    }

    let runner = Runner::new(workflow_config.clone());
    let report = runner.execute(&RunOptions {
        now,
        force: args.force,
    })?;

    if report.exported {
        println!(
            "Exported {} records to {} (ids up to {}, read {}, rejected {})",
            report.records,
            workflow_config.output.display(),
            report.max_id,
            report.metrics.read,
            report.metrics.rejected_total()
        );
    } else {
        println!(
            "Nothing new since id {} (latest {}), export left untouched",
            report.previous_max_id, report.max_id
        );
    }

    Ok(())
}
