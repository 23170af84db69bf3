//! Cluster teardown: removes every container and network a cluster owns.
//!
//! Containers are removed before networks, strictly: a network with an
//! attached container cannot be removed by most engines, so reversing the
//! order would turn a transient ordering mistake into a stuck cluster.

use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::concurrency::fan_out;
use crate::engine::{ContainerEngine, NetworkEngine};
use crate::error::{Result, SindError};
use crate::label::cluster_label_filter;

/// Removes every container and network labelled with `cluster_name`.
/// Idempotent: a cluster that no longer exists (or has already been
/// partially removed) is not an error.
///
/// Takes `Arc<E>` rather than `&E`: `fan_out` spawns one task per item on the
/// `tokio` runtime, which requires the operation closure (and everything it
/// captures) to be `'static` — an owned, cloneable handle rather than a
/// borrow tied to this call's stack frame.
pub async fn delete_cluster<E>(engine: &Arc<E>, cancel: &Cancellation, cluster_name: &str) -> Result<()>
where
    E: ContainerEngine + NetworkEngine + 'static,
{
    let filters = vec![cluster_label_filter(cluster_name)];

    let (containers, networks) = tokio::try_join!(
        engine.list_containers(cancel, &filters),
        engine.list_networks(cancel, &filters),
    )?;

    let container_ids: Vec<String> = containers.into_iter().map(|c| c.id).collect();
    let remove_engine = engine.clone();
    fan_out(cancel, container_ids, move |id, item_cancel| {
        let engine = remove_engine.clone();
        async move {
            engine
                .remove_container(&item_cancel, &id, true, true)
                .await
                .map_err(|e| SindError::engine(format!("remove container {id}"), e))
        }
    })
    .await?;

    let network_ids: Vec<String> = networks.into_iter().map(|n| n.id).collect();
    let remove_engine = engine.clone();
    fan_out(cancel, network_ids, move |id, item_cancel| {
        let engine = remove_engine.clone();
        async move {
            engine
                .remove_network(&item_cancel, &id)
                .await
                .map_err(|e| SindError::engine(format!("remove network {id}"), e))
        }
    })
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        containers: Vec<crate::engine::ContainerSummary>,
        networks: Vec<crate::engine::NetworkSummary>,
        removed_containers: Arc<AtomicUsize>,
        removed_networks: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ContainerEngine for CountingEngine {
        async fn list_containers(
            &self,
            _cancel: &Cancellation,
            _label_filters: &[String],
        ) -> Result<Vec<crate::engine::ContainerSummary>> {
            Ok(self.containers.clone())
        }
        async fn create_container(
            &self,
            _cancel: &Cancellation,
            _spec: &crate::engine::CreateContainerSpec,
        ) -> Result<String> {
            unimplemented!()
        }
        async fn start_container(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn stop_container(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn remove_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            force: bool,
            remove_volumes: bool,
        ) -> Result<()> {
            assert!(force);
            assert!(remove_volumes);
            self.removed_containers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn inspect_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
        ) -> Result<crate::engine::ContainerSummary> {
            unimplemented!()
        }
        async fn exec(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            _cmd: &[String],
        ) -> Result<crate::engine::ExecOutcome> {
            unimplemented!()
        }
        async fn copy_to_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            _tar_archive: &[u8],
            _dest_path: &str,
        ) -> Result<()> {
            unimplemented!()
        }
    }

    #[async_trait::async_trait]
    impl NetworkEngine for CountingEngine {
        async fn list_networks(
            &self,
            _cancel: &Cancellation,
            _label_filters: &[String],
        ) -> Result<Vec<crate::engine::NetworkSummary>> {
            Ok(self.networks.clone())
        }
        async fn create_network(
            &self,
            _cancel: &Cancellation,
            _spec: &crate::engine::CreateNetworkSpec,
        ) -> Result<String> {
            unimplemented!()
        }
        async fn remove_network(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            self.removed_networks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn delete_removes_all_labelled_containers_and_networks() {
        let removed_containers = Arc::new(AtomicUsize::new(0));
        let removed_networks = Arc::new(AtomicUsize::new(0));

        let engine = CountingEngine {
            containers: vec![
                crate::engine::ContainerSummary {
                    id: "c1".into(),
                    hostname: "sind-t1-manager-0".into(),
                    image: "docker:24-dind".into(),
                    labels: HashMap::new(),
                    state: crate::engine::ContainerState::Running,
                    ports: vec![],
                    networks: HashMap::new(),
                },
                crate::engine::ContainerSummary {
                    id: "c2".into(),
                    hostname: "sind-t1-worker-0".into(),
                    image: "docker:24-dind".into(),
                    labels: HashMap::new(),
                    state: crate::engine::ContainerState::Running,
                    ports: vec![],
                    networks: HashMap::new(),
                },
            ],
            networks: vec![crate::engine::NetworkSummary {
                id: "n1".into(),
                name: "t1".into(),
                labels: HashMap::new(),
            }],
            removed_containers: removed_containers.clone(),
            removed_networks: removed_networks.clone(),
        };

        delete_cluster(&Arc::new(engine), &Cancellation::new(), "t1").await.unwrap();

        assert_eq!(removed_containers.load(Ordering::SeqCst), 2);
        assert_eq!(removed_networks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_is_a_no_op_on_an_absent_cluster() {
        let engine = CountingEngine {
            containers: vec![],
            networks: vec![],
            removed_containers: Arc::new(AtomicUsize::new(0)),
            removed_networks: Arc::new(AtomicUsize::new(0)),
        };
        delete_cluster(&Arc::new(engine), &Cancellation::new(), "ghost").await.unwrap();
    }
}
