//! Command handlers: one function per `sindr` subcommand. Each is a thin
//! wrapper that builds the right `sindr_core` inputs, calls into the core,
//! and renders the result — no cluster-lifecycle logic of its own.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use sindr_core::cancel::Cancellation;
use sindr_core::config::ClusterConfiguration;
use sindr_core::{create_cluster, inspect as inspect_mod, lifecycle, push, teardown};
use sindr_engine::DockerEngine;

use crate::args::{CreateArgs, PushArgs};
use crate::utils::format_status;

pub async fn create(
    engine: &Arc<DockerEngine>,
    cancel: &Cancellation,
    cluster_name: &str,
    default_node_image: &str,
    args: &CreateArgs,
) -> Result<()> {
    let config: ClusterConfiguration =
        crate::config::cluster_configuration(cluster_name, default_node_image, args)?;

    info!(cluster = %cluster_name, "creating cluster");
    let status = create_cluster(engine, cancel, &config)
        .await
        .with_context(|| format!("create cluster {cluster_name:?}"))?;

    println!("cluster {cluster_name:?} created");
    print!("{}", format_status(&status));
    Ok(())
}

pub async fn delete(
    engine: &Arc<DockerEngine>,
    cancel: &Cancellation,
    cluster_name: &str,
    non_interactive: bool,
) -> Result<()> {
    if !non_interactive && !confirm(&format!("delete cluster {cluster_name:?}?"))? {
        println!("aborted");
        return Ok(());
    }

    teardown::delete_cluster(engine, cancel, cluster_name)
        .await
        .with_context(|| format!("delete cluster {cluster_name:?}"))?;
    println!("cluster {cluster_name:?} deleted");
    Ok(())
}

pub async fn start(engine: &Arc<DockerEngine>, cancel: &Cancellation, cluster_name: &str) -> Result<()> {
    lifecycle::start_cluster(engine, cancel, cluster_name)
        .await
        .with_context(|| format!("start cluster {cluster_name:?}"))?;
    println!("cluster {cluster_name:?} started");
    Ok(())
}

pub async fn stop(engine: &Arc<DockerEngine>, cancel: &Cancellation, cluster_name: &str) -> Result<()> {
    lifecycle::stop_cluster(engine, cancel, cluster_name)
        .await
        .with_context(|| format!("stop cluster {cluster_name:?}"))?;
    println!("cluster {cluster_name:?} stopped");
    Ok(())
}

pub async fn list(engine: &Arc<DockerEngine>, cancel: &Cancellation) -> Result<()> {
    let clusters = inspect_mod::list_clusters(engine.as_ref(), cancel)
        .await
        .context("list clusters")?;

    if clusters.is_empty() {
        println!("no clusters");
        return Ok(());
    }

    for status in &clusters {
        print!("{}", format_status(status));
    }
    Ok(())
}

pub async fn inspect(engine: &Arc<DockerEngine>, cancel: &Cancellation, cluster_name: &str) -> Result<()> {
    match inspect_mod::inspect_cluster(engine.as_ref(), cancel, cluster_name)
        .await
        .with_context(|| format!("inspect cluster {cluster_name:?}"))?
    {
        Some(status) => {
            print!("{}", format_status(&status));
            Ok(())
        }
        None => bail!("cluster {cluster_name:?} not found"),
    }
}

pub async fn push(
    engine: &Arc<DockerEngine>,
    cancel: &Cancellation,
    cluster_name: &str,
    args: &PushArgs,
) -> Result<()> {
    match &args.file {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read image archive {path:?}"))?;
            push::push_image_file(engine, cancel, cluster_name, &bytes)
                .await
                .context("push image archive")?;
        }
        None => {
            if args.images.is_empty() {
                bail!("push requires either image references or --file");
            }
            push::push_image_refs(engine, cancel, cluster_name, &args.images)
                .await
                .context("push image references")?;
        }
    }
    println!("pushed images to cluster {cluster_name:?}");
    Ok(())
}

pub async fn env(engine: &Arc<DockerEngine>, cancel: &Cancellation, cluster_name: &str) -> Result<()> {
    let (_, endpoint) = sindr_core::endpoint::resolve_primary_endpoint(engine, cancel, cluster_name)
        .await
        .with_context(|| format!("resolve endpoint for cluster {cluster_name:?}"))?;
    println!("export DOCKER_HOST={endpoint}");
    Ok(())
}

pub fn version() {
    println!("sindr {}", env!("CARGO_PKG_VERSION"));
}

/// Prompts on stdin for a yes/no confirmation. Used only by `delete` when
/// `--non-interactive` is not set.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().ok();

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
