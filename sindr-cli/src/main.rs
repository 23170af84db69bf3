//! # sindr CLI
//!
//! Command-line front-end for provisioning ephemeral multi-node
//! container-orchestrator clusters on a single host, each node a privileged
//! nested-container-daemon container on the host's engine.
//!
//! This binary contains no cluster-lifecycle logic of its own: it parses
//! arguments, renders results, plumbs `ctrl-c` into the cancellation token
//! every `sindr_core` operation takes, and calls straight through to
//! `sindr_core`. All of the hard engineering — network allocation, node
//! creation, cluster formation, teardown — lives in that crate.

mod args;
mod commands;
mod config;
mod utils;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use args::Command;
use sindr_core::cancel::Cancellation;
use sindr_core::SindConfig;
use sindr_engine::DockerEngine;

/// sindr - ephemeral container-orchestrator clusters on a single host.
#[derive(Parser)]
#[command(name = "sindr")]
#[command(about = "Provision ephemeral multi-node container-orchestrator clusters on a single host")]
#[command(version)]
struct Cli {
    /// Name of the cluster to operate on.
    #[arg(long, global = true, default_value = "default")]
    cluster_name: String,

    /// Maximum time, in seconds, to wait for the operation to complete.
    /// Overrides `SINDR_DEADLINE_SECS` and the config file when given.
    #[arg(long, global = true)]
    deadline: Option<u64>,

    /// Optional TOML config file, overlaid by `SINDR_*` environment
    /// variables and then by these command-line flags.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip interactive confirmation prompts (currently only `delete`).
    #[arg(long, global = true, default_value_t = false)]
    non_interactive: bool,

    /// Host engine daemon URL (e.g. `unix:///var/run/docker.sock`,
    /// `tcp://127.0.0.1:2375`). Defaults to the platform's standard
    /// `DOCKER_HOST` resolution when omitted.
    #[arg(long, global = true)]
    docker_host: Option<String>,

    /// Enable debug-level logging.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SindConfig::load(cli.config.as_deref())?;

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = format!("sindr={level}");
    if config.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(err) = run(cli, config).await {
        error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli, config: SindConfig) -> Result<()> {
    // `version` needs no engine connection at all.
    if matches!(cli.command, Command::Version) {
        commands::version();
        return Ok(());
    }

    let engine = Arc::new(DockerEngine::connect(cli.docker_host.as_deref().unwrap_or_default())?);
    let cluster_name = cli.cluster_name.clone();
    let deadline = Duration::from_secs(cli.deadline.unwrap_or(config.default_deadline.as_secs()));
    let default_node_image = config.default_node_image.clone();

    match cli.command {
        Command::Create(args) => {
            with_cancellation(deadline, |cancel| async move {
                commands::create(&engine, &cancel, &cluster_name, &default_node_image, &args).await
            })
            .await
        }
        Command::Delete => {
            let non_interactive = cli.non_interactive;
            with_cancellation(deadline, |cancel| async move {
                commands::delete(&engine, &cancel, &cluster_name, non_interactive).await
            })
            .await
        }
        Command::Start => {
            with_cancellation(deadline, |cancel| async move {
                commands::start(&engine, &cancel, &cluster_name).await
            })
            .await
        }
        Command::Stop => {
            with_cancellation(deadline, |cancel| async move {
                commands::stop(&engine, &cancel, &cluster_name).await
            })
            .await
        }
        Command::List => {
            with_cancellation(deadline, |cancel| async move { commands::list(&engine, &cancel).await }).await
        }
        Command::Inspect => {
            with_cancellation(deadline, |cancel| async move {
                commands::inspect(&engine, &cancel, &cluster_name).await
            })
            .await
        }
        Command::Push(args) => {
            with_cancellation(deadline, |cancel| async move {
                commands::push(&engine, &cancel, &cluster_name, &args).await
            })
            .await
        }
        Command::Env => {
            with_cancellation(deadline, |cancel| async move {
                commands::env(&engine, &cancel, &cluster_name).await
            })
            .await
        }
        Command::Version => unreachable!("handled above"),
    }
}

/// Runs `op` against a fresh deadline-bound [`Cancellation`], cancelling it
/// as soon as the process receives `ctrl-c`. This is the one piece of
/// signal-to-cancellation plumbing the CLI owns; `sindr_core` itself never
/// looks at OS signals.
async fn with_cancellation<F, Fut>(deadline: Duration, op: F) -> Result<()>
where
    F: FnOnce(Cancellation) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let cancel = Cancellation::with_timeout(deadline);
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, cancelling in-flight operation");
            signal_cancel.cancel();
        }
    });

    op(cancel).await
}
