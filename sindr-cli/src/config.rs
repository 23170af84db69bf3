//! Turns parsed CLI arguments into the `sindr_core` types that drive the
//! cluster lifecycle core. No cluster-lifecycle logic lives here — only
//! translation from flags to `ClusterConfiguration`.

use std::str::FromStr;

use anyhow::{Context, Result};
use sindr_core::config::ClusterConfiguration;

use crate::args::CreateArgs;

/// Builds a `ClusterConfiguration` from `sindr create`'s flags and the
/// global `--cluster-name`. `default_node_image` is the ambient
/// `SindConfig::default_node_image` (itself `SINDR_NODE_IMAGE`/config-file/
/// built-in, in that order); `--image` always wins when given.
pub fn cluster_configuration(
    cluster_name: &str,
    default_node_image: &str,
    args: &CreateArgs,
) -> Result<ClusterConfiguration> {
    let subnet = args
        .subnet
        .as_deref()
        .map(ipnetwork::Ipv4Network::from_str)
        .transpose()
        .with_context(|| format!("invalid --subnet {:?}", args.subnet))?;

    Ok(ClusterConfiguration {
        cluster_name: cluster_name.to_string(),
        network_name: args.network.clone().unwrap_or_else(|| cluster_name.to_string()),
        subnet,
        managers: args.managers,
        workers: args.workers,
        image: Some(args.image.clone().unwrap_or_else(|| default_node_image.to_string())),
        pull_image: args.pull,
        port_bindings: args.ports.clone(),
        extra_daemon_args: args.daemon_args.clone(),
    })
}
