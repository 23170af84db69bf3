//! Resolves the host-reachable address of a cluster's nested daemon.

use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::engine::{ClusterEngine, ContainerSummary, Protocol};
use crate::error::{Result, SindError};
use crate::label::{cluster_label_filter, primary_role_filter, NESTED_DAEMON_PORT};

/// Finds the one `role=primary` container for `cluster_name`, erroring if
/// it is missing or not unique.
pub async fn find_primary_container<E: ClusterEngine + ?Sized>(
    engine: &E,
    cancel: &Cancellation,
    cluster_name: &str,
) -> Result<ContainerSummary> {
    let filters = vec![cluster_label_filter(cluster_name), primary_role_filter()];
    let mut containers = engine.list_containers(cancel, &filters).await?;

    match containers.len() {
        0 => Err(SindError::precondition(format!(
            "primary container for cluster {cluster_name:?} not found"
        ))),
        1 => Ok(containers.remove(0)),
        _ => Err(SindError::consistency(format!(
            "primary container for cluster {cluster_name:?} is not unique"
        ))),
    }
}

/// Derives a `tcp://host:port` endpoint for the nested daemon published by
/// `primary`, reachable from this host process.
pub fn resolve_daemon_endpoint<E: ClusterEngine + ?Sized>(
    engine: &E,
    primary: &ContainerSummary,
) -> Result<String> {
    let published_port = primary
        .ports
        .iter()
        .find(|p| p.private_port == NESTED_DAEMON_PORT && p.protocol == Protocol::Tcp)
        .and_then(|p| p.public_port)
        .ok_or_else(|| {
            SindError::precondition(format!(
                "primary container {:?} does not publish port {NESTED_DAEMON_PORT}",
                primary.hostname
            ))
        })?;

    let host = reachable_host(engine.daemon_host());
    Ok(format!("tcp://{host}:{published_port}"))
}

/// Strips a client daemon URL down to a bare host, substituting `localhost`
/// for local transports (unix sockets, named pipes) that have no host
/// component of their own.
fn reachable_host(daemon_host: &str) -> String {
    if let Some(rest) = daemon_host.strip_prefix("tcp://") {
        return rest.split(':').next().unwrap_or("localhost").to_string();
    }
    if let Some(rest) = daemon_host.strip_prefix("http://") {
        return rest.split(':').next().unwrap_or("localhost").to_string();
    }
    "localhost".to_string()
}

/// Resolves the full connect string for a cluster's primary node by
/// combining [`find_primary_container`] and [`resolve_daemon_endpoint`].
pub async fn resolve_primary_endpoint<E: ClusterEngine + ?Sized>(
    engine: &Arc<E>,
    cancel: &Cancellation,
    cluster_name: &str,
) -> Result<(ContainerSummary, String)> {
    let primary = find_primary_container(engine.as_ref(), cancel, cluster_name).await?;
    let endpoint = resolve_daemon_endpoint(engine.as_ref(), &primary)?;
    Ok((primary, endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reachable_host_strips_tcp_scheme_and_port() {
        assert_eq!(reachable_host("tcp://192.0.2.10:2375"), "192.0.2.10");
    }

    #[test]
    fn reachable_host_falls_back_to_localhost_for_unix_socket() {
        assert_eq!(reachable_host("unix:///var/run/docker.sock"), "localhost");
    }
}
