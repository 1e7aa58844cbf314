//! ayame - network lab builder
//!
//! Entry point for the `ayame` command.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ayame::{BindingPolicy, Coverage, HostNetwork, Orchestrator, StateStore, TopologyConfig};
use ayame_common::ShellRunner;

/// Build network labs from namespaces, veth links and OVS bridges
#[derive(Parser, Debug)]
#[command(name = "ayame")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// State file path (default: $HOME/.ayame/state.json)
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision the topology described by a config file
    Create {
        /// Topology YAML
        #[arg(short = 'c', long)]
        config: PathBuf,

        /// Log commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Fail when a device matches no link or bridge
        #[arg(long)]
        strict: bool,
    },
    /// Tear down the provisioned topology
    Delete {
        /// Log commands without running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the provisioned topology
    Status,
    /// Run every scenario under a directory
    Test {
        /// Scenario directory
        #[arg(short = 'p', long)]
        path: PathBuf,
    },
}

/// Initializes tracing; `RUST_LOG` wins over `--log-level`
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn orchestrator(args: &Args, dry_run: bool) -> Orchestrator {
    let runner = if dry_run {
        ShellRunner::dry_run()
    } else {
        ShellRunner::new()
    };
    let store = StateStore::new(
        args.state_path
            .clone()
            .unwrap_or_else(StateStore::default_path),
    );
    Orchestrator::new(Arc::new(HostNetwork::new(Arc::new(runner))), store).with_dry_run(dry_run)
}

async fn create(args: &Args, config: &Path, dry_run: bool, strict: bool) -> anyhow::Result<()> {
    let input = tokio::fs::read_to_string(config)
        .await
        .with_context(|| format!("failed to read {}", config.display()))?;
    let topology = TopologyConfig::from_yaml(&input)
        .with_context(|| format!("invalid topology in {}", config.display()))?;

    let policy = BindingPolicy {
        coverage: if strict {
            Coverage::Strict
        } else {
            Coverage::Lenient
        },
    };
    let orch = orchestrator(args, dry_run).with_policy(policy);
    let state = orch.init_resources(&topology).await?;

    if dry_run {
        info!("dry run, state not saved");
    } else {
        orch.save_state(&state).await?;
    }
    println!("{}", state.dump_all()?);
    Ok(())
}

async fn delete(args: &Args, dry_run: bool) -> anyhow::Result<()> {
    orchestrator(args, dry_run).dispose_resources().await?;
    info!("all resources deleted");
    Ok(())
}

async fn status(args: &Args) -> anyhow::Result<()> {
    match orchestrator(args, true).load_resources().await? {
        Some(state) => println!("{}", state.dump_all()?),
        None => println!("no topology is provisioned"),
    }
    Ok(())
}

async fn test(path: &Path) -> anyhow::Result<()> {
    let summary = ayame::scenario::run_all(path, BindingPolicy::default()).await?;
    println!("{}", summary);
    if !summary.all_passed() {
        bail!("{} scenario(s) failed", summary.failed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let result = match &args.command {
        Command::Create {
            config,
            dry_run,
            strict,
        } => create(&args, config, *dry_run, *strict).await,
        Command::Delete { dry_run } => delete(&args, *dry_run).await,
        Command::Status => status(&args).await,
        Command::Test { path } => test(path).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
