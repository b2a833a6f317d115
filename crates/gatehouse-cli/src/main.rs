//! Gatehouse - policy gate for agent sessions
//!
//! Wired into the runtime's hook mechanism: each lifecycle event arrives as
//! JSON on stdin, the response envelope leaves on stdout, and the exit code
//! carries the decision (0 allow, 1 warn, 2 block). Logs go to stderr so
//! stdout stays protocol-clean.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use gatehouse_core::{
    standard_registry, GateConfig, MemoryStore, SessionStore, SqliteStore,
};

mod hook;
mod state;

/// Gatehouse - policy gate for agent sessions
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Policy gate for agent sessions", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.gatehouse/gatehouse.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session state backing store
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Sqlite)]
    store: StoreKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Per-process state, lost on exit
    Memory,
    /// Durable state at the configured state path
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Gate one lifecycle event read from stdin
    ///
    /// Reads the hook JSON the runtime pipes in, evaluates the predicate
    /// chain against the session's state, prints the response envelope,
    /// and exits 0/1/2 for allow/warn/block.
    Hook {
        /// Execute sync delegates in-process instead of returning a
        /// delegate directive for the runtime to handle
        #[arg(long)]
        run_delegates: bool,
    },

    /// Inspect or clear per-session gate state
    State {
        #[command(subcommand)]
        command: state::StateCommand,
    },

    /// List registered predicates in evaluation order
    Predicates,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gatehouse=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &GateConfig, kind: StoreKind) -> Result<Arc<dyn SessionStore>> {
    Ok(match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Sqlite => Arc::new(SqliteStore::open(&config.state_path)?),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = match &cli.config {
        Some(path) => GateConfig::load_from(path)?,
        None => GateConfig::load()?,
    };

    match cli.command {
        Commands::Hook { run_delegates } => {
            let store = open_store(&config, cli.store)?;
            let code = hook::run(&config, store, run_delegates).await?;
            std::process::exit(code);
        }
        Commands::State { command } => {
            let store = open_store(&config, cli.store)?;
            state::run(store, command)
        }
        Commands::Predicates => {
            let registry = standard_registry(&config)?;
            for registration in registry.registrations() {
                let predicate = &registration.predicate;
                let events = predicate
                    .events()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{:>4}  {:<18} {:<12} [{events}]",
                    registration.priority,
                    predicate.name(),
                    predicate.policy().to_string(),
                );
            }
            Ok(())
        }
    }
}
