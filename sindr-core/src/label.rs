//! Label and naming convention.
//!
//! Labels are the single source of truth for cluster membership: no cluster
//! state is persisted anywhere else. See `sindr_core::inspect` and
//! `sindr_core::teardown`, which both discover everything purely from these
//! labels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `com.sind.cluster.name` — stamped on every container and network a
/// cluster owns.
pub const CLUSTER_NAME_LABEL: &str = "com.sind.cluster.name";

/// `com.sind.cluster.role` — one of `primary`, `manager`, `worker`.
pub const CLUSTER_ROLE_LABEL: &str = "com.sind.cluster.role";

/// The nested daemon's TCP listening port inside every node container.
pub const NESTED_DAEMON_PORT: u16 = 2375;

/// The cluster control-plane gossip port, bound only on the overlay network.
pub const GOSSIP_PORT: u16 = 2377;

/// A node's role within the cluster.
///
/// The primary is a manager for quorum purposes; it gets its own label value
/// because it alone initializes the cluster and publishes the daemon port,
/// but `NodeRole::hostname_segment` folds it back into `"manager"` since
/// hostnames only distinguish manager/worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    Primary,
    Manager,
    Worker,
}

impl NodeRole {
    /// The value stored in `CLUSTER_ROLE_LABEL`.
    pub fn label_value(self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Manager => "manager",
            NodeRole::Worker => "worker",
        }
    }

    /// The role segment used in the container hostname. Primary and manager
    /// nodes share the `manager` segment; only the label distinguishes them.
    pub fn hostname_segment(self) -> &'static str {
        match self {
            NodeRole::Primary | NodeRole::Manager => "manager",
            NodeRole::Worker => "worker",
        }
    }

    /// Whether this role counts toward the manager quorum.
    pub fn is_manager(self) -> bool {
        matches!(self, NodeRole::Primary | NodeRole::Manager)
    }

    pub fn from_label_value(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(NodeRole::Primary),
            "manager" => Some(NodeRole::Manager),
            "worker" => Some(NodeRole::Worker),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_value())
    }
}

/// Builds the deterministic hostname `sind-<cluster>-<role>-<index>`.
///
/// A pure function of `(cluster, role, index)`: callers never need to
/// resolve a name back from a container, which keeps tests and post-hoc
/// diagnosis simple.
pub fn node_hostname(cluster_name: &str, role: NodeRole, index: u16) -> String {
    format!(
        "sind-{cluster_name}-{segment}-{index}",
        segment = role.hostname_segment()
    )
}

/// Formats a single `key=value` label filter expression.
pub fn cluster_label_filter(cluster_name: &str) -> String {
    format!("{CLUSTER_NAME_LABEL}={cluster_name}")
}

/// Formats the `role=primary` label filter expression.
pub fn primary_role_filter() -> String {
    format!("{CLUSTER_ROLE_LABEL}=primary")
}
