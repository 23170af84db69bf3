//! Cluster lifecycle core for ephemeral container-orchestrator clusters.
//!
//! This crate holds no process-wide mutable state: every operation takes the
//! capability object ([`engine::ClusterEngine`]) and a [`cancel::Cancellation`]
//! as parameters, and host-engine resources labelled with a cluster's name are
//! the only shared state. See each module for the component of the design it
//! implements.

pub mod cancel;
pub mod cluster;
pub mod concurrency;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod inspect;
pub mod label;
pub mod lifecycle;
pub mod network;
pub mod node;
pub mod push;
pub mod teardown;

use std::sync::Arc;
use tracing::info;

use cancel::Cancellation;
use cluster::ClusterFormer;
use config::{ClusterConfiguration, ClusterStatus};
use engine::ClusterEngine;
use error::{Result, SindError};
use node::NodeCreator;

pub use config::SindConfig;

/// Creates a new cluster end to end: validates the configuration, ensures the
/// node image is present, allocates the overlay network, creates every node
/// concurrently, resolves the primary's daemon endpoint, forms the cluster,
/// and returns the resulting status.
///
/// Mirrors the data flow in the design: `validate -> ensure image -> allocate
/// network -> fan-out create nodes -> resolve primary endpoint -> wait daemon
/// -> init cluster -> read tokens -> fan-out join`. Not atomic: two concurrent
/// calls for the same cluster name race on the duplicate check below and on
/// the name-conflicting network create; callers are responsible for
/// serializing same-name operations.
pub async fn create_cluster<E>(
    engine: &Arc<E>,
    cancel: &Cancellation,
    config: &ClusterConfiguration,
) -> Result<ClusterStatus>
where
    E: ClusterEngine + 'static,
{
    config.validate()?;

    if inspect::inspect_cluster(engine.as_ref(), cancel, &config.cluster_name)
        .await?
        .is_some()
    {
        return Err(SindError::precondition(format!(
            "cluster {:?} already exists",
            config.cluster_name
        )));
    }

    let node_creator = NodeCreator::new(engine.clone());
    node_creator.ensure_image(cancel, config).await?;

    let network_provisioner = network::NetworkProvisioner::new(engine.clone());
    let network_spec = network_provisioner.plan(
        &config.network_name,
        &config.cluster_name,
        config.subnet,
        Default::default(),
    );
    info!(
        cluster = %config.cluster_name,
        network = %network_spec.name,
        subnet = %network_spec.subnet,
        "allocating cluster network"
    );
    let network_id = network_provisioner.create(cancel, &network_spec).await?;

    let port_bindings = config::parse_port_bindings(&config.port_bindings)?;
    let plan = node_creator.plan(config, network_spec.subnet)?;
    info!(cluster = %config.cluster_name, nodes = plan.len(), "creating cluster nodes");
    let created = node_creator
        .create_nodes(cancel, config, &network_id, port_bindings, plan)
        .await?;

    let (primary_container, daemon_endpoint) =
        endpoint::resolve_primary_endpoint(engine, cancel, &config.cluster_name).await?;

    let former = ClusterFormer::new(engine.clone());
    let (managers, workers) = cluster::partition_for_join(&created);
    former
        .form(
            cancel,
            &config.network_name,
            &primary_container,
            &daemon_endpoint,
            &managers,
            &workers,
        )
        .await?;

    former
        .wait_quorate(cancel, config.managers, config.workers, || {
            let engine = engine.clone();
            let cluster_name = config.cluster_name.clone();
            async move {
                inspect::inspect_cluster(engine.as_ref(), &Cancellation::new(), &cluster_name)
                    .await?
                    .ok_or_else(|| {
                        SindError::consistency(format!(
                            "cluster {cluster_name:?} disappeared while forming"
                        ))
                    })
            }
        })
        .await?;

    inspect::inspect_cluster(engine.as_ref(), cancel, &config.cluster_name)
        .await?
        .ok_or_else(|| {
            SindError::consistency(format!(
                "cluster {:?} disappeared immediately after formation",
                config.cluster_name
            ))
        })
}
