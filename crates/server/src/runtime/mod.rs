use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

pub mod docker;
pub mod helpers;

pub type DynContainerRuntime = Arc<dyn ContainerRuntime>;

/// Raw log chunks from a container, in arrival order. Chunks are not
/// guaranteed to be line-aligned.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, ContainerRuntimeError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited { exit_code: Option<i64> },
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: Option<String>,
    pub status: ContainerStatus,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn pull_image(&self, image: &str) -> Result<(), ContainerRuntimeError>;
    async fn start_container(&self, spec: ContainerSpec) -> Result<String, ContainerRuntimeError>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ContainerRuntimeError>;

    /// Resolves the host port the daemon published for the given container
    /// port. `None` while the binding has not appeared yet.
    async fn resolve_host_port(
        &self,
        id: &str,
        container_port: u16,
    ) -> Result<Option<u16>, ContainerRuntimeError>;

    async fn stop_container(&self, id: &str, timeout_secs: u32)
    -> Result<(), ContainerRuntimeError>;
    async fn remove_container(&self, id: &str) -> Result<(), ContainerRuntimeError>;

    /// Follows stdout and stderr of a running container from now on.
    async fn stream_logs(&self, id: &str) -> Result<LogStream, ContainerRuntimeError>;
}

/// Single TCP port exposure for a sensor container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortExposure {
    pub container_port: u16,
    /// When `None` the daemon assigns an ephemeral host port.
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub env: Vec<(String, String)>,
    pub port: PortExposure,
    pub labels: Vec<(String, String)>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, name: impl Into<String>, port: PortExposure) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            env: Vec::new(),
            port,
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContainerRuntimeError {
    #[error("failed to connect to runtime ({context}): {source}")]
    Connection {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to pull image {image}: {source}")]
    PullImage {
        image: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to create container {name}: {source}")]
    CreateContainer {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("port conflict on host port {host_port}")]
    PortConflict {
        id: String,
        host_port: u16,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to start container {id}: {source}")]
    StartContainer {
        id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to inspect container {id}: {source}")]
    InspectContainer {
        id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to stop container {id}: {source}")]
    StopContainer {
        id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to remove container {id}: {source}")]
    RemoveContainer {
        id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to stream logs for container {id}: {source}")]
    Logs {
        id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("container {id} not found")]
    NotFound { id: String },
}

impl ContainerRuntimeError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ContainerRuntimeError::Connection { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerRuntimeError::NotFound { .. })
    }

    pub fn is_port_conflict(&self) -> bool {
        matches!(self, ContainerRuntimeError::PortConflict { .. })
    }
}

pub use docker::DockerRuntime;
