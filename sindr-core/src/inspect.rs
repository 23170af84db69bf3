//! Cluster discovery: reconstructs cluster status purely from labels on the
//! host engine, with no persisted registry of any kind.

use std::collections::HashSet;

use crate::cancel::Cancellation;
use crate::config::ClusterStatus;
use crate::engine::{ContainerEngine, ContainerState};
use crate::error::{Result, SindError};
use crate::label::{cluster_label_filter, primary_role_filter, NodeRole, CLUSTER_NAME_LABEL, CLUSTER_ROLE_LABEL};

/// Returns the current status of `cluster_name`, or `Ok(None)` if no node
/// carrying that cluster's label exists.
pub async fn inspect_cluster<E: ContainerEngine + ?Sized>(
    engine: &E,
    cancel: &Cancellation,
    cluster_name: &str,
) -> Result<Option<ClusterStatus>> {
    let filters = vec![cluster_label_filter(cluster_name)];
    let nodes = engine.list_containers(cancel, &filters).await?;

    if nodes.is_empty() {
        return Ok(None);
    }

    let mut status = ClusterStatus {
        name: cluster_name.to_string(),
        managers: 0,
        managers_running: 0,
        workers: 0,
        workers_running: 0,
        nodes: nodes.clone(),
    };

    for node in &nodes {
        let role_label = node.labels.get(CLUSTER_ROLE_LABEL).ok_or_else(|| {
            SindError::consistency(format!("node {:?} has no role label", node.id))
        })?;
        let role = NodeRole::from_label_value(role_label).ok_or_else(|| {
            SindError::consistency(format!(
                "node {:?} has an unrecognised role label {role_label:?}",
                node.id
            ))
        })?;

        let running = node.state == ContainerState::Running;
        if role.is_manager() {
            status.managers += 1;
            if running {
                status.managers_running += 1;
            }
        } else {
            status.workers += 1;
            if running {
                status.workers_running += 1;
            }
        }
    }

    Ok(Some(status))
}

/// Lists every distinct cluster visible on the host engine, by finding each
/// cluster's primary node and inspecting its full status.
///
/// A primary found by the first list call that has disappeared by the time
/// its own status is inspected (a race with a concurrent teardown) is
/// skipped rather than treated as an error.
pub async fn list_clusters<E: ContainerEngine + ?Sized>(
    engine: &E,
    cancel: &Cancellation,
) -> Result<Vec<ClusterStatus>> {
    let filters = vec![primary_role_filter()];
    let primaries = engine.list_containers(cancel, &filters).await?;

    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(primaries.len());

    for primary in &primaries {
        let cluster_name = primary.labels.get(CLUSTER_NAME_LABEL).ok_or_else(|| {
            SindError::consistency(format!(
                "primary node {:?} has no cluster name label",
                primary.id
            ))
        })?;

        if !seen.insert(cluster_name.clone()) {
            continue;
        }

        if let Some(status) = inspect_cluster(engine, cancel, cluster_name).await? {
            result.push(status);
        }
    }

    Ok(result)
}
