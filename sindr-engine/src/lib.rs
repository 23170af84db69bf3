//! A [`sindr_core::engine::ClusterEngine`] implementation backed by a real
//! Docker Engine API daemon, via `bollard`.
//!
//! One [`DockerEngine`] wraps one connection to the *host* daemon. Its
//! [`ClusterEngine::connect_daemon`] opens a second, independent connection
//! to a *nested* daemon's published port — the two never share a client,
//! since the nested daemon is reachable only via the endpoint the core
//! resolves at runtime.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ExportImagesOptions};
use bollard::models::{EndpointIpamConfig, EndpointSettings, HostConfig, Ipam, IpamConfig, PortBinding as BollardPortBinding};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions, RemoveNetworkOptions};
use bollard::Docker;
use futures::stream::TryStreamExt;
use tracing::{debug, info};

use sindr_core::cancel::Cancellation;
use sindr_core::engine::{
    ClusterEngine, ContainerEngine, ContainerState, ContainerSummary, CreateContainerSpec,
    CreateNetworkSpec, DaemonEngine, ExecOutcome, ImageEngine, NetworkEndpoint, NetworkEngine,
    NetworkSummary, PortMapping, Protocol, SwarmInfo,
};
use sindr_core::error::{Result, SindError};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// A `ClusterEngine` backed by a single daemon connection, resolved once at
/// construction time from a Docker-style URL (`unix:///...`, `tcp://...`,
/// `http://...`, or empty for the platform default).
pub struct DockerEngine {
    client: Docker,
    daemon_host: String,
}

impl DockerEngine {
    /// Connects to `daemon_host`, a Docker daemon URL, or the platform
    /// default (`DOCKER_HOST` env var, falling back to the local socket)
    /// when empty.
    pub fn connect(daemon_host: &str) -> Result<Self> {
        let client = connect(daemon_host)?;
        Ok(Self {
            client,
            daemon_host: daemon_host.to_string(),
        })
    }
}

fn connect(daemon_host: &str) -> Result<Docker> {
    let result = if daemon_host.is_empty() {
        Docker::connect_with_local_defaults()
    } else if let Some(path) = daemon_host.strip_prefix("unix://") {
        Docker::connect_with_unix(path, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    } else if daemon_host.starts_with("tcp://") || daemon_host.starts_with("http://") {
        Docker::connect_with_http(daemon_host, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_local_defaults()
    };

    result.map_err(|e| SindError::engine(format!("connect to daemon {daemon_host:?}"), e))
}

fn to_filter_map(labels: &[String]) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    if !labels.is_empty() {
        filters.insert("label".to_string(), labels.to_vec());
    }
    filters
}

fn parse_state(state: Option<String>) -> ContainerState {
    match state.as_deref() {
        Some("running") => ContainerState::Running,
        Some("created") => ContainerState::Created,
        Some("exited") => ContainerState::Exited,
        _ => ContainerState::Other,
    }
}

fn map_networks(
    networks: Option<HashMap<String, EndpointSettings>>,
) -> HashMap<String, NetworkEndpoint> {
    networks
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| {
            let ipv4_address = endpoint
                .ip_address
                .filter(|ip| !ip.is_empty())
                .and_then(|ip| ip.parse::<Ipv4Addr>().ok());
            (
                name,
                NetworkEndpoint {
                    network_id: endpoint.network_id.unwrap_or_default(),
                    ipv4_address,
                },
            )
        })
        .collect()
}

fn map_ports(ports: Option<Vec<bollard::models::Port>>) -> Vec<PortMapping> {
    ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| {
            let protocol = match p.typ {
                Some(bollard::models::PortTypeEnum::UDP) => Protocol::Udp,
                _ => Protocol::Tcp,
            };
            PortMapping {
                private_port: p.private_port,
                public_port: p.public_port,
                protocol,
            }
        })
        .collect()
}

fn map_summary(c: bollard::models::ContainerSummary) -> ContainerSummary {
    let hostname = c
        .names
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();

    ContainerSummary {
        id: c.id.unwrap_or_default(),
        hostname,
        image: c.image.unwrap_or_default(),
        labels: c.labels.unwrap_or_default(),
        state: parse_state(c.state),
        ports: map_ports(c.ports),
        networks: map_networks(c.network_settings.and_then(|s| s.networks)),
    }
}

fn map_inspect(id: String, c: bollard::models::ContainerInspectResponse) -> ContainerSummary {
    let hostname = c
        .config
        .as_ref()
        .and_then(|cfg| cfg.hostname.clone())
        .or_else(|| c.name.clone().map(|n| n.trim_start_matches('/').to_string()))
        .unwrap_or_default();
    let image = c.config.as_ref().and_then(|cfg| cfg.image.clone()).unwrap_or_default();
    let labels = c.config.and_then(|cfg| cfg.labels).unwrap_or_default();
    let state = c
        .state
        .and_then(|s| s.status)
        .map(|status| match status {
            bollard::models::ContainerStateStatusEnum::RUNNING => ContainerState::Running,
            bollard::models::ContainerStateStatusEnum::CREATED => ContainerState::Created,
            bollard::models::ContainerStateStatusEnum::EXITED => ContainerState::Exited,
            _ => ContainerState::Other,
        })
        .unwrap_or(ContainerState::Other);
    let network_settings = c.network_settings;
    let ports = network_settings
        .as_ref()
        .and_then(|ns| ns.ports.clone())
        .map(|port_map| {
            port_map
                .into_iter()
                .filter_map(|(key, bindings)| {
                    let mut parts = key.splitn(2, '/');
                    let private_port: u16 = parts.next()?.parse().ok()?;
                    let protocol = match parts.next() {
                        Some("udp") => Protocol::Udp,
                        _ => Protocol::Tcp,
                    };
                    let public_port = bindings
                        .unwrap_or_default()
                        .into_iter()
                        .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()));
                    Some(PortMapping {
                        private_port,
                        public_port,
                        protocol,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let networks = map_networks(network_settings.and_then(|ns| ns.networks));

    ContainerSummary {
        id,
        hostname,
        image,
        labels,
        state,
        ports,
        networks,
    }
}

fn protocol_str(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(
        &self,
        _cancel: &Cancellation,
        label_filters: &[String],
    ) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions {
            all: true,
            filters: to_filter_map(label_filters),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| SindError::engine("list containers", e))?;

        Ok(containers.into_iter().map(map_summary).collect())
    }

    async fn create_container(
        &self,
        _cancel: &Cancellation,
        spec: &CreateContainerSpec,
    ) -> Result<String> {
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for (port, protocol) in &spec.exposed_ports {
            exposed_ports.insert(format!("{port}/{}", protocol_str(*protocol)), HashMap::new());
        }

        let mut port_bindings: HashMap<String, Option<Vec<BollardPortBinding>>> = HashMap::new();
        for binding in &spec.port_bindings {
            let key = format!("{}/{}", binding.container_port, protocol_str(binding.protocol));
            port_bindings.insert(
                key,
                Some(vec![BollardPortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(binding.host_port.to_string()),
                }]),
            );
        }

        let mut endpoints_config = HashMap::new();
        endpoints_config.insert(
            spec.network_name.clone(),
            EndpointSettings {
                network_id: Some(spec.network_id.clone()),
                ipam_config: Some(EndpointIpamConfig {
                    ipv4_address: Some(spec.ipv4_address.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let host_config = HostConfig {
            privileged: Some(spec.privileged),
            publish_all_ports: Some(spec.publish_all_ports),
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            ..Default::default()
        };

        let config = Config {
            hostname: Some(spec.hostname.clone()),
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            networking_config: Some(NetworkingConfig { endpoints_config }),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.hostname.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| SindError::engine(format!("create container {}", spec.hostname), e))?;

        Ok(response.id)
    }

    async fn start_container(&self, _cancel: &Cancellation, id: &str) -> Result<()> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SindError::engine(format!("start container {id}"), e))
    }

    async fn stop_container(&self, _cancel: &Cancellation, id: &str) -> Result<()> {
        self.client
            .stop_container(id, Some(StopContainerOptions { t: 10 }))
            .await
            .map_err(|e| SindError::engine(format!("stop container {id}"), e))
    }

    async fn remove_container(
        &self,
        _cancel: &Cancellation,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<()> {
        match self
            .client
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    v: remove_volumes,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(SindError::engine(format!("remove container {id}"), e)),
        }
    }

    async fn inspect_container(&self, _cancel: &Cancellation, id: &str) -> Result<ContainerSummary> {
        let inspect = self
            .client
            .inspect_container(id, None)
            .await
            .map_err(|e| SindError::engine(format!("inspect container {id}"), e))?;
        Ok(map_inspect(id.to_string(), inspect))
    }

    async fn exec(&self, _cancel: &Cancellation, id: &str, cmd: &[String]) -> Result<ExecOutcome> {
        let created = self
            .client
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SindError::engine(format!("create exec in {id}"), e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let started = self
            .client
            .start_exec(&created.id, Some(StartExecOptions::default()))
            .await
            .map_err(|e| SindError::engine(format!("start exec in {id}"), e))?;

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(chunk) = output
                .try_next()
                .await
                .map_err(|e| SindError::engine(format!("read exec output from {id}"), e))?
            {
                match chunk {
                    bollard::container::LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                    bollard::container::LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    _ => {}
                }
            }
        }

        let inspect = self
            .client
            .inspect_exec(&created.id)
            .await
            .map_err(|e| SindError::engine(format!("inspect exec in {id}"), e))?;
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(ExecOutcome {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn copy_to_container(
        &self,
        _cancel: &Cancellation,
        id: &str,
        tar_archive: &[u8],
        dest_path: &str,
    ) -> Result<()> {
        self.client
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path: dest_path.to_string(),
                    ..Default::default()
                }),
                tar_archive.to_vec().into(),
            )
            .await
            .map_err(|e| SindError::engine(format!("copy files into container {id}"), e))
    }
}

#[async_trait]
impl NetworkEngine for DockerEngine {
    async fn list_networks(
        &self,
        _cancel: &Cancellation,
        label_filters: &[String],
    ) -> Result<Vec<NetworkSummary>> {
        let options = ListNetworksOptions {
            filters: to_filter_map(label_filters),
        };

        let networks = self
            .client
            .list_networks(Some(options))
            .await
            .map_err(|e| SindError::engine("list networks", e))?;

        Ok(networks
            .into_iter()
            .map(|n| NetworkSummary {
                id: n.id.unwrap_or_default(),
                name: n.name.unwrap_or_default(),
                labels: n.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_network(&self, _cancel: &Cancellation, spec: &CreateNetworkSpec) -> Result<String> {
        let ipam = spec
            .subnet
            .map(|subnet| {
                // `.0` is the network address; `.1` is the reserved gateway suffix
                // (`spec.md` §6), leaving `.2` as the first node address.
                let gateway = subnet.iter().nth(1).map(|ip| ip.to_string());
                Ipam {
                    config: Some(vec![IpamConfig {
                        subnet: Some(subnet.to_string()),
                        gateway,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }
            })
            .unwrap_or_default();

        let response = self
            .client
            .create_network(CreateNetworkOptions {
                name: spec.name.clone(),
                driver: "bridge".to_string(),
                labels: spec.labels.clone(),
                ipam,
                ..Default::default()
            })
            .await
            .map_err(|e| SindError::engine(format!("create network {}", spec.name), e))?;

        Ok(response.id)
    }

    async fn remove_network(&self, _cancel: &Cancellation, id: &str) -> Result<()> {
        match self.client.remove_network(id, None::<RemoveNetworkOptions>).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(SindError::engine(format!("remove network {id}"), e)),
        }
    }
}

#[async_trait]
impl ImageEngine for DockerEngine {
    async fn image_exists(&self, _cancel: &Cancellation, image_ref: &str) -> Result<bool> {
        match self.client.inspect_image(image_ref).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(false),
            Err(e) => Err(SindError::engine(format!("inspect image {image_ref}"), e)),
        }
    }

    async fn pull_image(&self, _cancel: &Cancellation, image_ref: &str) -> Result<()> {
        info!(image = image_ref, "pulling node image");
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image_ref,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream
            .try_next()
            .await
            .map_err(|e| SindError::engine(format!("pull image {image_ref}"), e))?
        {
            debug!(?progress, "pull progress");
        }

        Ok(())
    }

    async fn save_images(&self, _cancel: &Cancellation, image_refs: &[String]) -> Result<Vec<u8>> {
        let mut stream = self.client.export_images(&ExportImagesOptions {
            names: image_refs.to_vec(),
        });

        let mut archive = Vec::new();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| SindError::engine("export images", e))?
        {
            archive.extend_from_slice(&chunk);
        }

        Ok(archive)
    }
}

/// A `DaemonEngine` against a single nested daemon endpoint
/// (`tcp://host:port`), opened once the primary node's daemon port is
/// resolved and reachable.
pub struct NestedDaemon {
    client: Docker,
}

#[async_trait]
impl DaemonEngine for NestedDaemon {
    async fn ping(&self, _cancel: &Cancellation) -> Result<()> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SindError::engine("ping nested daemon", e))
    }

    async fn swarm_init(&self, _cancel: &Cancellation, listen_addr: &str) -> Result<()> {
        let request = bollard::models::SwarmInitRequest {
            listen_addr: Some(listen_addr.to_string()),
            ..Default::default()
        };
        self.client
            .init_swarm(request)
            .await
            .map(|_| ())
            .map_err(|e| SindError::engine("initialise nested swarm", e))
    }

    async fn swarm_inspect(&self, _cancel: &Cancellation) -> Result<SwarmInfo> {
        let swarm = self
            .client
            .inspect_swarm()
            .await
            .map_err(|e| SindError::engine("inspect nested swarm", e))?;

        let tokens = swarm.join_tokens.unwrap_or_default();
        Ok(SwarmInfo {
            manager_token: tokens.manager.unwrap_or_default(),
            worker_token: tokens.worker.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ClusterEngine for DockerEngine {
    fn daemon_host(&self) -> &str {
        &self.daemon_host
    }

    async fn connect_daemon(
        &self,
        _cancel: &Cancellation,
        endpoint: &str,
    ) -> Result<Arc<dyn DaemonEngine>> {
        let client = connect(endpoint)?;
        Ok(Arc::new(NestedDaemon { client }))
    }
}
