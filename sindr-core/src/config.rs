//! Data model: `ClusterConfiguration`, `NodeSpec`, `ClusterStatus`,
//! `NetworkSpec`, `JoinParameters`, plus the ambient `SindConfig` process
//! settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::engine::{ContainerSummary, PortBinding, Protocol};
use crate::error::{Result, SindError};
use crate::label::NodeRole;

/// The default node image, baked in as configuration rather than contract:
/// implementers should treat the exact default as configuration, subject to
/// change, not a guarantee callers build on.
pub const DEFAULT_NODE_IMAGE: &str = "docker:24-dind";

/// Declarative description of the cluster to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    pub cluster_name: String,
    pub network_name: String,

    /// A user-supplied `/24` CIDR; when absent, one is picked at random
    /// from `10.0.0.0/16`.
    #[serde(default)]
    pub subnet: Option<ipnetwork::Ipv4Network>,

    pub managers: u16,
    #[serde(default)]
    pub workers: u16,

    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub pull_image: bool,

    /// Raw `host:container[/proto]` specs, parsed by `parse_port_bindings`.
    #[serde(default)]
    pub port_bindings: Vec<String>,

    /// Extra arguments forwarded to the nested daemon at container create
    /// time. Not interpreted by the core; stashed on the node's command
    /// line by the engine adapter.
    #[serde(default)]
    pub extra_daemon_args: Vec<String>,
}

impl ClusterConfiguration {
    /// Validates the configuration, failing fast before any side effect.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(SindError::configuration("cluster name is required"));
        }
        if self.network_name.is_empty() {
            return Err(SindError::configuration("network name is required"));
        }
        if self.managers < 1 {
            return Err(SindError::configuration(
                "invalid manager count, must be >= 1",
            ));
        }
        parse_port_bindings(&self.port_bindings)?;
        Ok(())
    }

    pub fn image_ref(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_NODE_IMAGE)
    }
}

/// Parses `host:container[/proto]` specs into `PortBinding`s, failing on the
/// first malformed entry. Grounded in the original's use of
/// `nat.ParsePortSpecs` (`pkg/sind/internal/node.go`); Rust has no
/// equivalent in the ecosystem this corpus reaches for, so this is a small
/// self-contained parser rather than a borrowed crate.
pub fn parse_port_bindings(specs: &[String]) -> Result<Vec<PortBinding>> {
    specs.iter().map(|spec| parse_port_binding(spec)).collect()
}

fn parse_port_binding(spec: &str) -> Result<PortBinding> {
    let (container_part, host_part) = {
        let mut parts = spec.splitn(2, ':');
        let first = parts.next().unwrap_or_default();
        match parts.next() {
            Some(second) => (second, first),
            None => {
                return Err(SindError::configuration(format!(
                    "malformed port binding {spec:?}, expected host:container[/proto]"
                )))
            }
        }
    };

    let (container_port_str, protocol) = match container_part.split_once('/') {
        Some((port, proto)) => (port, parse_protocol(proto)?),
        None => (container_part, Protocol::Tcp),
    };

    let host_port: u16 = host_part
        .parse()
        .map_err(|_| SindError::configuration(format!("malformed port binding {spec:?}")))?;
    let container_port: u16 = container_port_str
        .parse()
        .map_err(|_| SindError::configuration(format!("malformed port binding {spec:?}")))?;

    Ok(PortBinding {
        host_port,
        container_port,
        protocol,
    })
}

fn parse_protocol(proto: &str) -> Result<Protocol> {
    match proto {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        other => Err(SindError::configuration(format!(
            "unsupported protocol {other:?}, expected tcp or udp"
        ))),
    }
}

/// A single node to be created, as planned by `sindr_core::node::NodeCreator`.
/// Indices are zero-based per role.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub role: NodeRole,
    /// Zero-based index within role (e.g. the third worker has `index == 2`).
    pub index: u16,
    pub hostname: String,
    pub ipv4_address: Ipv4Addr,
    pub image: String,
}

/// The cluster's overlay network plan, consumed by
/// `sindr_core::network::NetworkProvisioner`.
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub name: String,
    pub subnet: ipnetwork::Ipv4Network,
    pub labels: HashMap<String, String>,
}

/// Everything the cluster former needs to join every non-primary node.
#[derive(Debug, Clone)]
pub struct JoinParameters {
    pub primary_ipv4: Ipv4Addr,
    pub manager_token: String,
    pub worker_token: String,
    pub manager_container_ids: Vec<String>,
    pub worker_container_ids: Vec<String>,
}

/// Derived status of a cluster, reconstructed purely from labelled
/// containers. Absence of the primary means the cluster does not exist,
/// represented here as `inspect_cluster` returning `Ok(None)` rather than a
/// sentinel value.
#[derive(Debug, Clone)]
pub struct ClusterStatus {
    pub name: String,
    pub managers: u16,
    pub managers_running: u16,
    pub workers: u16,
    pub workers_running: u16,
    pub nodes: Vec<ContainerSummary>,
}

impl ClusterStatus {
    /// The cluster is complete when the primary, every configured manager,
    /// and every configured worker exist and report `running`.
    pub fn is_quorate(&self, desired_managers: u16, desired_workers: u16) -> bool {
        self.managers == desired_managers
            && self.managers_running == desired_managers
            && self.workers == desired_workers
            && self.workers_running == desired_workers
    }
}

/// Process-wide settings that are not part of a per-call
/// `ClusterConfiguration`.
///
/// Precedence, highest first: explicit overrides passed by the caller (e.g.
/// CLI flags), `SINDR_*` environment variables, an optional TOML file, then
/// these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SindConfig {
    #[serde(default = "default_node_image")]
    pub default_node_image: String,
    #[serde(default = "default_deadline_secs", with = "duration_secs")]
    pub default_deadline: Duration,
    #[serde(default)]
    pub json_logs: bool,
}

fn default_node_image() -> String {
    DEFAULT_NODE_IMAGE.to_string()
}

fn default_deadline_secs() -> Duration {
    Duration::from_secs(120)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Default for SindConfig {
    fn default() -> Self {
        Self {
            default_node_image: default_node_image(),
            default_deadline: default_deadline_secs(),
            json_logs: false,
        }
    }
}

impl SindConfig {
    /// Loads configuration from an optional TOML file, then overlays
    /// `SINDR_*` environment variables. Neither source is required; a
    /// missing file is not an error, matching the original's tolerance for
    /// bare defaults.
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    SindError::configuration(format!("unable to read {path:?}: {e}"))
                })?;
                toml::from_str(&contents)
                    .map_err(|e| SindError::configuration(format!("invalid config file: {e}")))?
            }
            _ => SindConfig::default(),
        };

        if let Ok(image) = std::env::var("SINDR_NODE_IMAGE") {
            config.default_node_image = image;
        }
        if let Ok(secs) = std::env::var("SINDR_DEADLINE_SECS") {
            config.default_deadline = Duration::from_secs(secs.parse().map_err(|_| {
                SindError::configuration("SINDR_DEADLINE_SECS must be an integer")
            })?);
        }
        if let Ok(json) = std::env::var("SINDR_JSON_LOGS") {
            config.json_logs = json == "1" || json.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
