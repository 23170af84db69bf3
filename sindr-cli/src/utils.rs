//! Output formatting helpers shared across command handlers.

use sindr_core::config::ClusterStatus;
use sindr_core::engine::ContainerState;

/// Renders a cluster's status as the human-readable table printed by
/// `sindr inspect` and `sindr list`.
pub fn format_status(status: &ClusterStatus) -> String {
    let mut out = format!(
        "{name}: managers {managers_running}/{managers} running, workers {workers_running}/{workers} running\n",
        name = status.name,
        managers_running = status.managers_running,
        managers = status.managers,
        workers_running = status.workers_running,
        workers = status.workers,
    );

    for node in &status.nodes {
        out.push_str(&format!(
            "  {hostname:<28} {state:<8} {id}\n",
            hostname = node.hostname,
            state = state_label(node.state),
            id = short_id(&node.id),
        ));
    }

    out
}

fn state_label(state: ContainerState) -> &'static str {
    match state {
        ContainerState::Running => "running",
        ContainerState::Created => "created",
        ContainerState::Exited => "exited",
        ContainerState::Other => "unknown",
    }
}

/// Truncates a container id to the short form operators expect (`docker ps`
/// style), without assuming any particular id length.
fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}
