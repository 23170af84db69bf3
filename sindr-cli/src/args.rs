//! Command-line argument structures for every `sindr` subcommand.
//!
//! Mirrors the teacher's `aerolithdb-cli::args` module: one `#[derive(Args)]`
//! struct per subcommand, with doc comments that double as `--help` output.
//! None of these structs carry cluster-lifecycle logic of their own — they
//! are parsed here and handed to `sindr_core` as a `ClusterConfiguration` or
//! a bare cluster name.

use clap::{Args, Subcommand};

/// Top-level subcommands, matching the CLI surface named in the design:
/// `create`, `delete`, `start`, `stop`, `list`, `inspect`, `push`, `env`,
/// `version`.
#[derive(Subcommand)]
pub enum Command {
    /// Create a new cluster.
    ///
    /// Allocates the overlay network, creates every node container, forms
    /// the cluster (init on the primary, join on every other node), and
    /// waits for the requested manager/worker counts to come up.
    Create(CreateArgs),

    /// Delete a cluster: removes every labelled container and network.
    ///
    /// Idempotent — deleting an already-deleted (or partially deleted)
    /// cluster succeeds.
    Delete,

    /// Start every node of a stopped cluster.
    Start,

    /// Stop every node of a running cluster.
    Stop,

    /// List every cluster visible on the host.
    List,

    /// Show the status of one cluster.
    Inspect,

    /// Load images onto every node of a running cluster, without a registry.
    Push(PushArgs),

    /// Print a shell `export` of the cluster's daemon host URL.
    ///
    /// Intended for `eval "$(sindr env)"` so that a plain `docker` client
    /// picks up `DOCKER_HOST` and talks to the nested cluster instead of
    /// the host engine.
    Env,

    /// Print the CLI version.
    Version,
}

/// Arguments for `sindr create`.
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Overlay network name. Defaults to the cluster name.
    #[arg(long)]
    pub network: Option<String>,

    /// Number of manager nodes, including the primary. Must be at least 1.
    #[arg(long, default_value_t = 1)]
    pub managers: u16,

    /// Number of worker nodes.
    #[arg(long, default_value_t = 0)]
    pub workers: u16,

    /// Explicit `/24` CIDR for the cluster's overlay network (e.g.
    /// `10.7.0.0/24`). Picked at random from `10.0.0.0/16` when omitted.
    #[arg(long)]
    pub subnet: Option<String>,

    /// Node image reference. Defaults to the built-in nested-daemon image.
    #[arg(long)]
    pub image: Option<String>,

    /// Pull the node image even if already present locally.
    #[arg(long, default_value_t = false)]
    pub pull: bool,

    /// Publish a host port into the primary node, `host:container[/proto]`.
    /// Repeatable.
    #[arg(long = "port", value_name = "HOST:CONTAINER[/PROTO]")]
    pub ports: Vec<String>,

    /// Extra argument forwarded to the nested daemon's command line.
    /// Repeatable.
    #[arg(long = "daemon-arg")]
    pub daemon_args: Vec<String>,
}

/// Arguments for `sindr push`.
#[derive(Debug, Args)]
pub struct PushArgs {
    /// Image references already present on the host engine, to be saved
    /// and loaded onto every cluster node. Mutually exclusive with
    /// `--file`.
    pub images: Vec<String>,

    /// Push a pre-built image archive (as produced by `docker save`)
    /// instead of saving `images` from the host engine.
    #[arg(long, conflicts_with = "images")]
    pub file: Option<std::path::PathBuf>,
}
