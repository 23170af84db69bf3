//! Cluster formation: turns a set of freshly-created, unconnected node
//! containers into a single quorate cluster.
//!
//! Formation is a small state machine: `Created` (nodes exist, daemon not
//! yet initialised) -> `Initialised` (the primary's nested daemon has run
//! its own cluster-init and minted join tokens) -> `Formed` (every other
//! node has joined). Each state is reached by exactly one method on
//! [`ClusterFormer`]; callers normally drive all three through
//! [`ClusterFormer::form`].

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cancel::Cancellation;
use crate::concurrency::{fan_out, wait_ready, READINESS_POLL_INTERVAL};
use crate::config::JoinParameters;
use crate::engine::{ClusterEngine, ContainerSummary};
use crate::error::{Result, SindError};
use crate::label::{NodeRole, GOSSIP_PORT};

const SWARM_LISTEN_ADDR: &str = "0.0.0.0:2377";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormationState {
    Created,
    Initialised,
    Formed,
}

/// Drives a freshly-created set of node containers through cluster
/// formation against a single `ClusterEngine`.
pub struct ClusterFormer<E> {
    engine: Arc<E>,
}

impl<E> ClusterFormer<E>
where
    E: ClusterEngine + 'static,
{
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Runs the full `Created -> Initialised -> Formed` sequence: waits for
    /// the primary's nested daemon, initialises it, then joins every
    /// manager and worker container.
    pub async fn form(
        &self,
        cancel: &Cancellation,
        network_name: &str,
        primary: &ContainerSummary,
        daemon_endpoint: &str,
        manager_containers: &[(String, String)],
        worker_containers: &[(String, String)],
    ) -> Result<FormationState> {
        let join = self
            .initialise(cancel, network_name, primary, daemon_endpoint)
            .await?;

        self.join_all(cancel, &join, manager_containers, worker_containers)
            .await?;

        Ok(FormationState::Formed)
    }

    /// Waits for the primary's nested daemon to answer pings, initialises
    /// its own cluster, and returns the join tokens plus the primary's
    /// overlay-network address.
    async fn initialise(
        &self,
        cancel: &Cancellation,
        network_name: &str,
        primary: &ContainerSummary,
        daemon_endpoint: &str,
    ) -> Result<JoinParameters> {
        info!(endpoint = daemon_endpoint, "connecting to primary nested daemon");
        let daemon = self.engine.connect_daemon(cancel, daemon_endpoint).await?;

        wait_ready(cancel, READINESS_POLL_INTERVAL, || {
            let daemon = daemon.clone();
            async move { Ok(daemon.ping(cancel).await.is_ok()) }
        })
        .await
        .map_err(|_| {
            SindError::precondition(format!(
                "primary node {:?} nested daemon never became reachable",
                primary.hostname
            ))
        })?;

        info!("initialising cluster on primary node");
        daemon.swarm_init(cancel, SWARM_LISTEN_ADDR).await?;

        let primary_ipv4 = primary_overlay_address(primary, network_name)?;
        let swarm_info = daemon.swarm_inspect(cancel).await?;

        Ok(JoinParameters {
            primary_ipv4,
            manager_token: swarm_info.manager_token,
            worker_token: swarm_info.worker_token,
            manager_container_ids: vec![],
            worker_container_ids: vec![],
        })
    }

    /// Runs `docker swarm join` inside every non-primary container
    /// concurrently, using the manager token for managers and the worker
    /// token for workers.
    async fn join_all(
        &self,
        cancel: &Cancellation,
        join: &JoinParameters,
        manager_containers: &[(String, String)],
        worker_containers: &[(String, String)],
    ) -> Result<()> {
        let remote = format!("{}:{GOSSIP_PORT}", join.primary_ipv4);

        let mut items: Vec<(String, String, String)> = Vec::new();
        for (hostname, id) in manager_containers {
            items.push((hostname.clone(), id.clone(), join.manager_token.clone()));
        }
        for (hostname, id) in worker_containers {
            items.push((hostname.clone(), id.clone(), join.worker_token.clone()));
        }

        if items.is_empty() {
            return Ok(());
        }

        let engine = self.engine.clone();
        let remote = Arc::new(remote);

        fan_out(cancel, items, move |(hostname, id, token), item_cancel| {
            let engine = engine.clone();
            let remote = remote.clone();
            async move {
                let cmd = vec![
                    "docker".to_string(),
                    "swarm".to_string(),
                    "join".to_string(),
                    "--token".to_string(),
                    token,
                    (*remote).clone(),
                ];
                let outcome = engine
                    .exec(&item_cancel, &id, &cmd)
                    .await
                    .map_err(|e| SindError::engine(format!("join node {hostname}"), e))?;

                if !outcome.succeeded() {
                    return Err(SindError::engine(
                        format!("join node {hostname}"),
                        std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!(
                                "swarm join exited with status {}: {}",
                                outcome.exit_code,
                                String::from_utf8_lossy(&outcome.stderr)
                            ),
                        ),
                    ));
                }

                Ok(())
            }
        })
        .await?;

        Ok(())
    }

    /// Polls the cluster's visible node list until every configured manager
    /// and worker has joined, or the deadline elapses.
    pub async fn wait_quorate<F, Fut>(
        &self,
        cancel: &Cancellation,
        desired_managers: u16,
        desired_workers: u16,
        mut current_status: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<crate::config::ClusterStatus>>,
    {
        wait_ready(cancel, Duration::from_millis(100), || {
            let status = current_status();
            async move {
                let status = status.await?;
                Ok(status.is_quorate(desired_managers, desired_workers))
            }
        })
        .await
    }
}

fn primary_overlay_address(primary: &ContainerSummary, network_name: &str) -> Result<Ipv4Addr> {
    primary
        .networks
        .get(network_name)
        .and_then(|endpoint| endpoint.ipv4_address)
        .ok_or_else(|| {
            SindError::precondition(format!(
                "primary node {:?} is not a member of network {network_name:?}",
                primary.hostname
            ))
        })
}

/// Partitions created node containers into manager and worker join lists,
/// skipping the primary itself (it never joins, it initialises).
pub fn partition_for_join(
    nodes: &[(crate::config::NodeSpec, String)],
) -> (Vec<(String, String)>, Vec<(String, String)>) {
    let mut managers = Vec::new();
    let mut workers = Vec::new();

    for (spec, id) in nodes {
        match spec.role {
            NodeRole::Primary => continue,
            NodeRole::Manager => managers.push((spec.hostname.clone(), id.clone())),
            NodeRole::Worker => workers.push((spec.hostname.clone(), id.clone())),
        }
    }

    (managers, workers)
}
