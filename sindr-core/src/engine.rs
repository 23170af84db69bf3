//! The capability interface: the narrow set of host container-engine
//! operations the cluster lifecycle core depends on.
//!
//! These traits are deliberately small and per-concern, mirroring the
//! original implementation's per-method Go interfaces
//! (`containerLister`, `containerStopper`, `networkCreator`, `pinger`, ...)
//! so that tests can fake exactly the methods a given operation needs. No
//! concrete client type appears here — `sindr-engine` is the one crate that
//! implements these traits against a real host daemon.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::error::Result;

/// A container as reported by `list_containers` / `inspect_container`.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub hostname: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub state: ContainerState,
    pub ports: Vec<PortMapping>,
    /// Network name -> endpoint settings, for every network this container
    /// is attached to.
    pub networks: HashMap<String, NetworkEndpoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Exited,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy)]
pub struct PortMapping {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: Protocol,
}

#[derive(Debug, Clone)]
pub struct NetworkEndpoint {
    pub network_id: String,
    pub ipv4_address: Option<Ipv4Addr>,
}

/// A single `host:container[/proto]` port publication, parsed ahead of time
/// so malformed specs fail before any side effect.
#[derive(Debug, Clone, Copy)]
pub struct PortBinding {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// Arguments to create a single node container. Built by
/// `sindr_core::node::NodeCreator`, consumed by `ContainerEngine::create_container`.
#[derive(Debug, Clone)]
pub struct CreateContainerSpec {
    pub hostname: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub privileged: bool,
    /// Ports the container should expose (published only when
    /// `publish_all_ports` or an entry in `port_bindings` references them).
    pub exposed_ports: Vec<(u16, Protocol)>,
    pub publish_all_ports: bool,
    pub port_bindings: Vec<PortBinding>,
    pub network_id: String,
    pub network_name: String,
    pub ipv4_address: Ipv4Addr,
}

/// The result of running a command inside a container via `exec`.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// A network as reported by `list_networks`.
#[derive(Debug, Clone)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// Arguments to create the cluster's overlay network.
#[derive(Debug, Clone)]
pub struct CreateNetworkSpec {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub subnet: Option<ipnetwork::Ipv4Network>,
}

/// Manager and worker join tokens, plus the two swarm-style counts needed
/// once a cluster is quorate.
#[derive(Debug, Clone)]
pub struct SwarmInfo {
    pub manager_token: String,
    pub worker_token: String,
}

/// List/create/start/stop/remove/inspect/exec/copy over containers.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn list_containers(
        &self,
        cancel: &Cancellation,
        label_filters: &[String],
    ) -> Result<Vec<ContainerSummary>>;

    async fn create_container(
        &self,
        cancel: &Cancellation,
        spec: &CreateContainerSpec,
    ) -> Result<String>;

    async fn start_container(&self, cancel: &Cancellation, id: &str) -> Result<()>;

    async fn stop_container(&self, cancel: &Cancellation, id: &str) -> Result<()>;

    async fn remove_container(
        &self,
        cancel: &Cancellation,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<()>;

    async fn inspect_container(&self, cancel: &Cancellation, id: &str) -> Result<ContainerSummary>;

    async fn exec(&self, cancel: &Cancellation, id: &str, cmd: &[String]) -> Result<ExecOutcome>;

    async fn copy_to_container(
        &self,
        cancel: &Cancellation,
        id: &str,
        tar_archive: &[u8],
        dest_path: &str,
    ) -> Result<()>;
}

/// List/create/remove overlay networks.
#[async_trait]
pub trait NetworkEngine: Send + Sync {
    async fn list_networks(
        &self,
        cancel: &Cancellation,
        label_filters: &[String],
    ) -> Result<Vec<NetworkSummary>>;

    async fn create_network(
        &self,
        cancel: &Cancellation,
        spec: &CreateNetworkSpec,
    ) -> Result<String>;

    async fn remove_network(&self, cancel: &Cancellation, id: &str) -> Result<()>;
}

/// Check/pull/save images.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    async fn image_exists(&self, cancel: &Cancellation, image_ref: &str) -> Result<bool>;

    async fn pull_image(&self, cancel: &Cancellation, image_ref: &str) -> Result<()>;

    /// Saves the given image refs to a tar archive, returned in memory
    /// (clusters are small and local; this avoids a filesystem dependency
    /// in the trait itself).
    async fn save_images(&self, cancel: &Cancellation, image_refs: &[String]) -> Result<Vec<u8>>;
}

/// Operations against a (possibly nested) container-engine daemon's own
/// clustering protocol: readiness, cluster init, and token inspection.
#[async_trait]
pub trait DaemonEngine: Send + Sync {
    async fn ping(&self, cancel: &Cancellation) -> Result<()>;

    async fn swarm_init(&self, cancel: &Cancellation, listen_addr: &str) -> Result<()>;

    async fn swarm_inspect(&self, cancel: &Cancellation) -> Result<SwarmInfo>;
}

/// The full capability surface the cluster lifecycle core depends on: every
/// container/network/image operation against the *host* engine, plus the
/// ability to open a fresh `DaemonEngine` client against a resolved nested
/// endpoint (used by the cluster former to talk to the primary's own nested
/// daemon once it is reachable).
#[async_trait]
pub trait ClusterEngine: ContainerEngine + NetworkEngine + ImageEngine + Send + Sync {
    /// The host engine's own daemon URL (e.g. `unix:///var/run/docker.sock`
    /// or `tcp://203.0.113.1:2375`), used by the endpoint resolver to derive
    /// a host-reachable address for the primary's published daemon port.
    fn daemon_host(&self) -> &str;

    /// Opens a new client against a nested daemon's resolved endpoint
    /// (`tcp://host:port`).
    async fn connect_daemon(
        &self,
        cancel: &Cancellation,
        endpoint: &str,
    ) -> Result<Arc<dyn DaemonEngine>>;
}
