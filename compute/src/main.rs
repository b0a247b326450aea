//! SecureNet policy engine - command-line front end.
//!
//! Evaluates topology snapshots exported by the SecureNet Designer editor:
//! - Flow simulation against the policy set
//! - Segmentation analysis of the topology
//! - Snapshot inspection (version, hash, counts)
//!
//! Process flow:
//! 1. Parse configuration and initialize logging
//! 2. Load the snapshot (JSON, RON or packed payload)
//! 3. Evaluate it
//! 4. Print the result and append an audit record

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use securenet_core::{analyze, simulate_snapshot, worst_level, Level, TopologyGraph};
use securenet_engine::config::{Cli, Command, OutputFormat};
use securenet_engine::render::{render_findings, render_inspection, render_outcomes, Inspection};
use securenet_engine::snapshot::{load_snapshot, EvaluationLog, LoadedSnapshot};

/// Exit code when analysis finds a critical weakness
const EXIT_CRITICAL: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "evaluation failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing subsystem. Logs go to stderr so stdout stays
/// machine-readable.
fn init_tracing(cli: &Cli) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let json_layer = cli.log_json.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let pretty_layer = (!cli.log_json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    if let Some(workers) = cli.workers.filter(|w| *w > 1) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global()
            .context("failed to configure worker pool")?;
    }

    let path = cli.command.file();
    let loaded = load_snapshot(path).with_context(|| format!("loading {}", path.display()))?;

    match &cli.command {
        Command::Simulate { .. } => simulate(cli, &loaded),
        Command::Analyze { .. } => analyze_topology(cli, &loaded),
        Command::Inspect { .. } => {
            let inspection = Inspection::new(&loaded);
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inspection)?),
                OutputFormat::Text => print!("{}", render_inspection(&inspection)),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn simulate(cli: &Cli, loaded: &LoadedSnapshot) -> Result<ExitCode> {
    let start = Instant::now();
    let mut log = EvaluationLog::new("simulate", &loaded.raw, &loaded.snapshot, start);

    let result = simulate_snapshot(&loaded.snapshot, &cli.simulation_options());
    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err(e) => {
            log.set_outcome(&e.to_string());
            write_audit(cli, &mut log);
            return Err(e).context("simulation failed");
        }
    };

    log.record_outcomes(&outcomes);
    write_audit(cli, &mut log);
    info!(
        evaluation_id = %log.evaluation_id,
        scenarios = outcomes.len(),
        duration_ms = log.duration_ms,
        "simulate finished"
    );

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcomes)?),
        OutputFormat::Text => print!("{}", render_outcomes(&outcomes)),
    }
    Ok(ExitCode::SUCCESS)
}

fn analyze_topology(cli: &Cli, loaded: &LoadedSnapshot) -> Result<ExitCode> {
    let start = Instant::now();
    let mut log = EvaluationLog::new("analyze", &loaded.raw, &loaded.snapshot, start);

    let graph = match TopologyGraph::from_snapshot(&loaded.snapshot.topology) {
        Ok(graph) => graph,
        Err(e) => {
            log.set_outcome(&e.to_string());
            write_audit(cli, &mut log);
            return Err(e).context("malformed topology");
        }
    };

    let findings = analyze(&graph);
    log.record_findings(&findings);
    write_audit(cli, &mut log);
    info!(
        evaluation_id = %log.evaluation_id,
        findings = findings.len(),
        duration_ms = log.duration_ms,
        "analyze finished"
    );

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&findings)?),
        OutputFormat::Text => print!("{}", render_findings(&findings)),
    }

    if worst_level(&findings) == Some(Level::Critical) {
        return Ok(ExitCode::from(EXIT_CRITICAL));
    }
    Ok(ExitCode::SUCCESS)
}

/// Audit logging never fails the evaluation itself.
fn write_audit(cli: &Cli, log: &mut EvaluationLog) {
    log.finalize();
    let Some(path) = &cli.audit_log else {
        return;
    };
    if let Err(e) = log.append_to(path) {
        warn!(path = %path.display(), error = %e, "failed to write audit record");
    }
}
