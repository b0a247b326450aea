//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use securenet_core::{CancelToken, Parallelism, SimulationOptions};

/// SecureNet policy engine command-line arguments
#[derive(Parser, Debug)]
#[command(name = "securenet", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Worker threads for scenario evaluation (1 = sequential)
    #[arg(short, long, global = true, env = "SECURENET_WORKERS")]
    pub workers: Option<usize>,

    /// Abort a simulation batch after this many milliseconds
    #[arg(long, global = true, env = "SECURENET_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(short, long, global = true, env = "SECURENET_LOG", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "SECURENET_LOG_JSON")]
    pub log_json: bool,

    /// Append one JSON audit record per evaluation to this file
    #[arg(long, global = true, env = "SECURENET_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Simulate every scenario in a snapshot
    Simulate {
        /// Snapshot file (.json, .ron, or a packed payload)
        file: PathBuf,
    },
    /// Run the segmentation checks over a snapshot's topology
    Analyze {
        /// Snapshot file (.json, .ron, or a packed payload)
        file: PathBuf,
    },
    /// Print engine version, snapshot hash and counts
    Inspect {
        /// Snapshot file (.json, .ron, or a packed payload)
        file: PathBuf,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Simulate { .. } => "simulate",
            Command::Analyze { .. } => "analyze",
            Command::Inspect { .. } => "inspect",
        }
    }

    pub fn file(&self) -> &PathBuf {
        match self {
            Command::Simulate { file } | Command::Analyze { file } | Command::Inspect { file } => file,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    pub fn parallelism(&self) -> Parallelism {
        match self.workers {
            Some(1) => Parallelism::Sequential,
            _ => Parallelism::Parallel,
        }
    }

    /// Simulation options; the timeout clock starts when this is called.
    pub fn simulation_options(&self) -> SimulationOptions {
        let cancel = match self.timeout_ms {
            Some(ms) => CancelToken::new().with_timeout(Duration::from_millis(ms)),
            None => CancelToken::new(),
        };
        SimulationOptions {
            parallelism: self.parallelism(),
            cancel,
        }
    }
}
