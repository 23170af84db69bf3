//! Network provisioner: picks or accepts a `/24` subnet, creates a labelled
//! overlay network.

use ipnetwork::Ipv4Network;
use rand::Rng;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

use crate::cancel::Cancellation;
use crate::config::NetworkSpec;
use crate::engine::{CreateNetworkSpec, NetworkEngine};
use crate::error::Result;
use crate::label::CLUSTER_NAME_LABEL;

/// Picks or accepts a cluster subnet and creates the corresponding overlay
/// network on the host engine.
pub struct NetworkProvisioner<E> {
    engine: Arc<E>,
}

impl<E> NetworkProvisioner<E>
where
    E: NetworkEngine,
{
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Builds the network plan: the given subnet if supplied, otherwise a
    /// random `10.0.<r>.0/24`. The picker is best-effort: a collision with
    /// an existing host network surfaces later as an engine error from
    /// `create`.
    pub fn plan(
        &self,
        network_name: &str,
        cluster_name: &str,
        user_subnet: Option<Ipv4Network>,
        user_labels: HashMap<String, String>,
    ) -> NetworkSpec {
        let subnet = user_subnet.unwrap_or_else(pick_random_subnet);

        let mut labels = user_labels;
        labels.insert(CLUSTER_NAME_LABEL.to_string(), cluster_name.to_string());

        NetworkSpec {
            name: network_name.to_string(),
            subnet,
            labels,
        }
    }

    /// Creates the overlay network and returns the engine's network id.
    pub async fn create(&self, cancel: &Cancellation, spec: &NetworkSpec) -> Result<String> {
        info!(network = %spec.name, subnet = %spec.subnet, "creating cluster overlay network");

        let id = self
            .engine
            .create_network(
                cancel,
                &CreateNetworkSpec {
                    name: spec.name.clone(),
                    labels: spec.labels.clone(),
                    subnet: Some(spec.subnet),
                },
            )
            .await?;

        Ok(id)
    }
}

/// Picks a random `10.0.<r>.0/24` subnet, `r` in `0..=255`.
fn pick_random_subnet() -> Ipv4Network {
    let r: u8 = rand::thread_rng().gen_range(0..=255);
    Ipv4Network::new(Ipv4Addr::new(10, 0, r, 0), 24)
        .expect("a /24 over a fixed octet is always a valid network")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_subnet_is_a_slash_24_in_10_0_0_0_16() {
        for _ in 0..50 {
            let net = pick_random_subnet();
            assert_eq!(net.prefix(), 24);
            let octets = net.network().octets();
            assert_eq!(octets[0], 10);
            assert_eq!(octets[1], 0);
            assert_eq!(octets[3], 0);
        }
    }

    #[test]
    fn plan_merges_cluster_label_with_user_labels() {
        let mut user_labels = HashMap::new();
        user_labels.insert("team".to_string(), "platform".to_string());

        // NetworkProvisioner::plan doesn't need the engine, but the type is
        // generic over it, so build one against a trivial no-op engine.
        struct NoopEngine;
        #[async_trait::async_trait]
        impl NetworkEngine for NoopEngine {
            async fn list_networks(
                &self,
                _cancel: &Cancellation,
                _label_filters: &[String],
            ) -> Result<Vec<crate::engine::NetworkSummary>> {
                Ok(vec![])
            }
            async fn create_network(
                &self,
                _cancel: &Cancellation,
                _spec: &CreateNetworkSpec,
            ) -> Result<String> {
                Ok("net-id".to_string())
            }
            async fn remove_network(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
                Ok(())
            }
        }

        let provisioner = NetworkProvisioner::new(Arc::new(NoopEngine));
        let spec = provisioner.plan(
            "t1",
            "t1",
            Some(Ipv4Network::new(Ipv4Addr::new(10, 7, 0, 0), 24).unwrap()),
            user_labels,
        );

        assert_eq!(spec.labels.get(CLUSTER_NAME_LABEL).unwrap(), "t1");
        assert_eq!(spec.labels.get("team").unwrap(), "platform");
        assert_eq!(spec.subnet.to_string(), "10.7.0.0/24");
    }
}
