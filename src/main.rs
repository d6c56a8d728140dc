use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use seirdsim::{EpidemicMetrics, Registry, RunRequest, SimulationConfig, SimulationState};
use serde::Serialize;
use std::{fs, path::PathBuf};

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Validate,

    Run {
        #[arg(long, conflicts_with = "days")]
        steps: Option<u64>,

        #[arg(long)]
        days: Option<f64>,

        /// Do not request an early stop once no agent is exposed or infected.
        #[arg(long)]
        keep_going: bool,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Report {
    state: SimulationState,
    metrics: EpidemicMetrics,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let cfg = SimulationConfig::from_file(&args.config).context("failed to construct cfg")?;
    log::info!("{cfg:#?}");

    match args.command {
        Command::Validate => log::info!("{:?} is valid", args.config),
        Command::Run {
            steps,
            days,
            keep_going,
            output,
        } => {
            let req = match (steps, days) {
                (Some(steps), _) => RunRequest::steps(steps),
                (None, Some(days)) => RunRequest::days(days),
                (None, None) => RunRequest::default(),
            }
            .stop_when_no_infected(!keep_going);
            run_simulation(cfg, &req, output)?;
        }
    }

    Ok(())
}

fn run_simulation(cfg: SimulationConfig, req: &RunRequest, output: Option<PathBuf>) -> Result<()> {
    let registry = Registry::new();
    let (id, _) = registry
        .create(cfg)
        .context("failed to create simulation")?;

    let state = registry.run(&id, req).context("failed to run simulation")?;
    let metrics = registry
        .get_metrics(&id)
        .context("failed to compute metrics")?;
    log::info!(
        "{id} stopped on day {:.2} with status {:?}: {:?}",
        state.current_day,
        state.status,
        state.counts
    );
    log::info!("{metrics:#?}");

    if let Some(file) = output {
        if file.is_dir() {
            bail!("{file:?} is a directory");
        }
        let report = Report { state, metrics };
        let contents = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        fs::write(&file, contents).with_context(|| format!("failed to write {file:?}"))?;
        log::info!("saved {file:?}");
    }

    Ok(())
}
