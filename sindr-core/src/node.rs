//! Node planning and creation: builds the full list of node containers for
//! a cluster and brings them up concurrently.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

use crate::cancel::Cancellation;
use crate::concurrency::fan_out;
use crate::config::{ClusterConfiguration, NodeSpec};
use crate::engine::{ContainerEngine, CreateContainerSpec, ImageEngine, PortBinding};
use crate::error::{Result, SindError};
use crate::label::{node_hostname, NodeRole, CLUSTER_NAME_LABEL, CLUSTER_ROLE_LABEL};

/// Plans and creates every node container for a cluster.
pub struct NodeCreator<E> {
    engine: Arc<E>,
}

impl<E> NodeCreator<E>
where
    E: ContainerEngine + ImageEngine + 'static,
{
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Builds the node plan: one primary, `managers - 1` additional
    /// managers, then `workers` workers, each with a distinct hostname and
    /// an IPv4 address drawn from `subnet` in the order primary, managers,
    /// workers. The primary always gets the first usable address in the
    /// subnet.
    pub fn plan(&self, config: &ClusterConfiguration, subnet: ipnetwork::Ipv4Network) -> Result<Vec<NodeSpec>> {
        // `.0` is the network address and `.1` is reserved for the gateway;
        // the primary gets the first usable node address, `.2`.
        let mut hosts = subnet.iter().skip(2);
        let image = config.image_ref().to_string();

        let mut nodes = Vec::with_capacity(1 + (config.managers as usize - 1) + config.workers as usize);

        let primary_ip = next_host(&mut hosts, subnet)?;
        nodes.push(NodeSpec {
            role: NodeRole::Primary,
            index: 0,
            hostname: node_hostname(&config.cluster_name, NodeRole::Primary, 0),
            ipv4_address: primary_ip,
            image: image.clone(),
        });

        for manager_index in 1..config.managers {
            let ip = next_host(&mut hosts, subnet)?;
            nodes.push(NodeSpec {
                role: NodeRole::Manager,
                index: manager_index,
                hostname: node_hostname(&config.cluster_name, NodeRole::Manager, manager_index),
                ipv4_address: ip,
                image: image.clone(),
            });
        }

        for worker_index in 0..config.workers {
            let ip = next_host(&mut hosts, subnet)?;
            nodes.push(NodeSpec {
                role: NodeRole::Worker,
                index: worker_index,
                hostname: node_hostname(&config.cluster_name, NodeRole::Worker, worker_index),
                ipv4_address: ip,
                image: image.clone(),
            });
        }

        Ok(nodes)
    }

    /// Ensures the node image is present, pulling it when the configuration
    /// requests it and failing with a precondition error otherwise.
    pub async fn ensure_image(&self, cancel: &Cancellation, config: &ClusterConfiguration) -> Result<()> {
        let image = config.image_ref();
        if self.engine.image_exists(cancel, image).await? {
            return Ok(());
        }
        if !config.pull_image {
            return Err(SindError::precondition(format!(
                "image {image:?} not present locally and pull was not requested"
            )));
        }
        info!(image, "pulling node image");
        self.engine.pull_image(cancel, image).await
    }

    /// Creates and starts every planned node concurrently. The primary node
    /// additionally exposes the nested daemon port plus any user-requested
    /// port bindings; the gossip port is never exposed to the host, only
    /// reachable on the cluster's overlay network. Non-primary nodes publish
    /// nothing.
    pub async fn create_nodes(
        &self,
        cancel: &Cancellation,
        config: &ClusterConfiguration,
        network_id: &str,
        port_bindings: Vec<PortBinding>,
        nodes: Vec<NodeSpec>,
    ) -> Result<Vec<(NodeSpec, String)>> {
        let cluster_name = config.cluster_name.clone();
        let network_name = config.network_name.clone();
        let network_id = network_id.to_string();
        let engine = self.engine.clone();
        let port_bindings = Arc::new(port_bindings);

        fan_out(cancel, nodes, move |node, item_cancel| {
            let engine = engine.clone();
            let cluster_name = cluster_name.clone();
            let network_name = network_name.clone();
            let network_id = network_id.clone();
            let port_bindings = port_bindings.clone();
            async move {
                let mut labels = std::collections::HashMap::new();
                labels.insert(CLUSTER_NAME_LABEL.to_string(), cluster_name.clone());
                labels.insert(CLUSTER_ROLE_LABEL.to_string(), node.role.label_value().to_string());

                let is_primary = matches!(node.role, NodeRole::Primary);
                let spec = CreateContainerSpec {
                    hostname: node.hostname.clone(),
                    image: node.image.clone(),
                    labels,
                    privileged: true,
                    exposed_ports: if is_primary {
                        vec![(crate::label::NESTED_DAEMON_PORT, crate::engine::Protocol::Tcp)]
                    } else {
                        vec![]
                    },
                    publish_all_ports: is_primary,
                    port_bindings: if is_primary {
                        (*port_bindings).clone()
                    } else {
                        vec![]
                    },
                    network_id,
                    network_name,
                    ipv4_address: node.ipv4_address,
                };

                let id = engine
                    .create_container(&item_cancel, &spec)
                    .await
                    .map_err(|e| SindError::engine(format!("create container {}", node.hostname), e))?;
                engine
                    .start_container(&item_cancel, &id)
                    .await
                    .map_err(|e| SindError::engine(format!("start container {}", node.hostname), e))?;

                Ok((node, id))
            }
        })
        .await
    }
}

fn next_host(
    hosts: &mut impl Iterator<Item = Ipv4Addr>,
    subnet: ipnetwork::Ipv4Network,
) -> Result<Ipv4Addr> {
    hosts.next().ok_or_else(|| {
        SindError::configuration(format!(
            "subnet {subnet} does not have enough addresses for the requested cluster size"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn config(managers: u16, workers: u16) -> ClusterConfiguration {
        ClusterConfiguration {
            cluster_name: "t1".to_string(),
            network_name: "t1".to_string(),
            subnet: None,
            managers,
            workers,
            image: None,
            pull_image: false,
            port_bindings: vec![],
            extra_daemon_args: vec![],
        }
    }

    struct NoopEngine;
    #[async_trait::async_trait]
    impl ContainerEngine for NoopEngine {
        async fn list_containers(
            &self,
            _cancel: &Cancellation,
            _label_filters: &[String],
        ) -> Result<Vec<crate::engine::ContainerSummary>> {
            Ok(vec![])
        }
        async fn create_container(
            &self,
            _cancel: &Cancellation,
            _spec: &CreateContainerSpec,
        ) -> Result<String> {
            Ok("container-id".to_string())
        }
        async fn start_container(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn stop_container(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            _force: bool,
            _remove_volumes: bool,
        ) -> Result<()> {
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
    impl ImageEngine for NoopEngine {
        async fn image_exists(&self, _cancel: &Cancellation, _image_ref: &str) -> Result<bool> {
            Ok(true)
        }
        async fn pull_image(&self, _cancel: &Cancellation, _image_ref: &str) -> Result<()> {
            Ok(())
        }
        async fn save_images(&self, _cancel: &Cancellation, _image_refs: &[String]) -> Result<Vec<u8>> {
            Ok(vec![])
        }
    }

    #[test]
    fn plan_assigns_distinct_sequential_addresses() {
        let creator = NodeCreator::new(Arc::new(NoopEngine));
        let subnet = ipnetwork::Ipv4Network::from_str("10.0.5.0/24").unwrap();
        let nodes = creator.plan(&config(2, 3), subnet).unwrap();

        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[0].role, NodeRole::Primary);
        assert_eq!(nodes[1].role, NodeRole::Manager);
        assert_eq!(nodes[2].role, NodeRole::Worker);

        let addrs: Vec<_> = nodes.iter().map(|n| n.ipv4_address).collect();
        let unique: std::collections::HashSet<_> = addrs.iter().collect();
        assert_eq!(unique.len(), addrs.len());
        assert_eq!(nodes[0].ipv4_address, subnet.iter().nth(2).unwrap());
    }

    #[test]
    fn primary_lands_on_dot_two_leaving_dot_one_for_the_gateway() {
        let creator = NodeCreator::new(Arc::new(NoopEngine));
        let subnet = ipnetwork::Ipv4Network::from_str("10.7.0.0/24").unwrap();
        let nodes = creator.plan(&config(3, 4), subnet).unwrap();

        assert_eq!(nodes[0].ipv4_address, "10.7.0.2".parse::<Ipv4Addr>().unwrap());
        assert!(nodes.iter().all(|n| n.ipv4_address != "10.7.0.1".parse::<Ipv4Addr>().unwrap()));
    }

    #[test]
    fn plan_gives_managers_and_workers_zero_based_indices() {
        let creator = NodeCreator::new(Arc::new(NoopEngine));
        let subnet = ipnetwork::Ipv4Network::from_str("10.0.5.0/24").unwrap();
        let nodes = creator.plan(&config(3, 2), subnet).unwrap();

        let managers: Vec<_> = nodes
            .iter()
            .filter(|n| n.role == NodeRole::Manager)
            .map(|n| n.index)
            .collect();
        assert_eq!(managers, vec![1, 2]);

        let workers: Vec<_> = nodes
            .iter()
            .filter(|n| n.role == NodeRole::Worker)
            .map(|n| n.index)
            .collect();
        assert_eq!(workers, vec![0, 1]);
    }

    #[tokio::test]
    async fn ensure_image_fails_when_missing_and_pull_not_requested() {
        struct MissingImageEngine;
        #[async_trait::async_trait]
        impl ContainerEngine for MissingImageEngine {
            async fn list_containers(
                &self,
                _cancel: &Cancellation,
                _label_filters: &[String],
            ) -> Result<Vec<crate::engine::ContainerSummary>> {
                Ok(vec![])
            }
            async fn create_container(
                &self,
                _cancel: &Cancellation,
                _spec: &CreateContainerSpec,
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
                _force: bool,
                _remove_volumes: bool,
            ) -> Result<()> {
                unimplemented!()
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
        impl ImageEngine for MissingImageEngine {
            async fn image_exists(&self, _cancel: &Cancellation, _image_ref: &str) -> Result<bool> {
                Ok(false)
            }
            async fn pull_image(&self, _cancel: &Cancellation, _image_ref: &str) -> Result<()> {
                unimplemented!()
            }
            async fn save_images(
                &self,
                _cancel: &Cancellation,
                _image_refs: &[String],
            ) -> Result<Vec<u8>> {
                unimplemented!()
            }
        }

        let creator = NodeCreator::new(Arc::new(MissingImageEngine));
        let result = creator.ensure_image(&Cancellation::new(), &config(1, 0)).await;
        assert!(matches!(result, Err(SindError::Precondition(_))));
    }
}
