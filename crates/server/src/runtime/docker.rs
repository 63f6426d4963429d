use async_trait::async_trait;
use bollard::{
    errors::Error as DockerError,
    models::{ContainerCreateBody, HostConfig, RestartPolicy, RestartPolicyNameEnum},
    query_parameters::{
        CreateContainerOptions, CreateImageOptions, InspectContainerOptions, LogsOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    Docker,
};
use futures_util::StreamExt;

use crate::runtime::{
    helpers::{build_port, format_env, map_status, published_host_port},
    ContainerDetails, ContainerRuntime, ContainerRuntimeError, ContainerSpec, LogStream,
    PortExposure,
};

/// Hard resource and privilege limits applied to every sensor container.
/// Sensors are attacker-facing, so they run with no capabilities, no
/// privilege escalation, and a small memory budget.
const SENSOR_MEMORY_BYTES: i64 = 512 * 1024 * 1024;
const SENSOR_CPU_SHARES: i64 = 256;

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, ContainerRuntimeError> {
        let docker =
            Docker::connect_with_defaults().map_err(|err| ContainerRuntimeError::Connection {
                context: "connect",
                source: err.into(),
            })?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &str) -> Result<(), ContainerRuntimeError> {
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: Some(image.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream.next().await {
            progress.map_err(|err| {
                map_connection_or(err, "pull_image", |source| {
                    ContainerRuntimeError::PullImage {
                        image: image.to_string(),
                        source: source.into(),
                    }
                })
            })?;
        }

        Ok(())
    }

    async fn start_container(&self, spec: ContainerSpec) -> Result<String, ContainerRuntimeError> {
        self.pull_image(&spec.image).await?;

        let env = format_env(&spec.env);
        let (port_bindings, exposed_ports) = build_port(&spec.port);

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            memory: Some(SENSOR_MEMORY_BYTES),
            cpu_shares: Some(SENSOR_CPU_SHARES),
            ..Default::default()
        };

        let container_config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env,
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.into_iter().collect())
            },
            ..Default::default()
        };

        let create_opts = CreateContainerOptions {
            name: Some(spec.name.clone()),
            platform: String::new(),
        };

        let created = self
            .docker
            .create_container(Some(create_opts), container_config)
            .await
            .map_err(|err| {
                map_connection_or(err, "create_container", |source| {
                    ContainerRuntimeError::CreateContainer {
                        name: spec.name.clone(),
                        source: source.into(),
                    }
                })
            })?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await
            .map_err(|err| map_start_error(err, &created.id, &spec.port))?;

        Ok(created.id)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ContainerRuntimeError> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|err| {
                map_docker_error(err, id, "inspect_container", |id, source| {
                    ContainerRuntimeError::InspectContainer {
                        id,
                        source: source.into(),
                    }
                })
            })?;

        let status = map_status(details.state.as_ref());
        let name = details.name.map(|n| n.trim_start_matches('/').to_string());
        let id = details.id.unwrap_or_else(|| id.to_string());

        Ok(ContainerDetails { id, name, status })
    }

    async fn resolve_host_port(
        &self,
        id: &str,
        container_port: u16,
    ) -> Result<Option<u16>, ContainerRuntimeError> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|err| {
                map_docker_error(err, id, "resolve_host_port", |id, source| {
                    ContainerRuntimeError::InspectContainer {
                        id,
                        source: source.into(),
                    }
                })
            })?;

        Ok(published_host_port(&details, container_port))
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: u32,
    ) -> Result<(), ContainerRuntimeError> {
        match self
            .docker
            .stop_container(
                id,
                Some(StopContainerOptions {
                    signal: None,
                    t: Some(timeout_secs as i32),
                }),
            )
            .await
        {
            Ok(_) => Ok(()),
            // Already stopped.
            Err(err) if is_not_modified(&err) => Ok(()),
            Err(err) => Err(map_docker_error(err, id, "stop_container", |id, source| {
                ContainerRuntimeError::StopContainer {
                    id,
                    source: source.into(),
                }
            })),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), ContainerRuntimeError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    v: false,
                    force: true,
                    link: false,
                }),
            )
            .await
            .map_err(|err| {
                map_docker_error(err, id, "remove_container", |id, source| {
                    ContainerRuntimeError::RemoveContainer {
                        id,
                        source: source.into(),
                    }
                })
            })
    }

    async fn stream_logs(&self, id: &str) -> Result<LogStream, ContainerRuntimeError> {
        // Verify the container exists before handing back a stream so callers
        // get a classified error instead of an immediately-failing stream.
        self.inspect_container(id).await?;

        let options = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "0".to_string(),
            ..Default::default()
        };

        let id_owned = id.to_string();
        let stream = self
            .docker
            .logs(id, Some(options))
            .map(move |chunk| match chunk {
                Ok(log) => Ok(log.into_bytes()),
                Err(err) => Err(map_docker_error(
                    err,
                    &id_owned,
                    "stream_logs",
                    |id, source| ContainerRuntimeError::Logs {
                        id,
                        source: source.into(),
                    },
                )),
            });

        Ok(Box::pin(stream))
    }
}

fn map_connection_or<F>(err: DockerError, context: &'static str, wrap: F) -> ContainerRuntimeError
where
    F: FnOnce(DockerError) -> ContainerRuntimeError,
{
    if is_connection_error(&err) {
        ContainerRuntimeError::Connection {
            context,
            source: err.into(),
        }
    } else {
        wrap(err)
    }
}

fn map_docker_error<F>(
    err: DockerError,
    id: &str,
    context: &'static str,
    wrap: F,
) -> ContainerRuntimeError
where
    F: FnOnce(String, DockerError) -> ContainerRuntimeError,
{
    if is_not_found(&err) {
        ContainerRuntimeError::NotFound { id: id.to_string() }
    } else if is_connection_error(&err) {
        ContainerRuntimeError::Connection {
            context,
            source: err.into(),
        }
    } else {
        wrap(id.to_string(), err)
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_not_modified(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

fn is_connection_error(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::IOError { .. }
            | DockerError::HyperResponseError { .. }
            | DockerError::RequestTimeoutError
            | DockerError::SocketNotFoundError(_)
    )
}

fn map_start_error(
    err: DockerError,
    container_id: &str,
    port: &PortExposure,
) -> ContainerRuntimeError {
    if is_port_conflict_message(&err) {
        return ContainerRuntimeError::PortConflict {
            id: container_id.to_string(),
            host_port: port.host_port.unwrap_or(port.container_port),
            source: err.into(),
        };
    }

    if is_connection_error(&err) {
        return ContainerRuntimeError::Connection {
            context: "start_container",
            source: err.into(),
        };
    }

    ContainerRuntimeError::StartContainer {
        id: container_id.to_string(),
        source: err.into(),
    }
}

fn is_port_conflict_message(err: &DockerError) -> bool {
    let DockerError::DockerResponseServerError { message, .. } = err else {
        return false;
    };

    let lower = message.to_ascii_lowercase();
    lower.contains("port is already allocated")
        || lower.contains("address already in use")
        || lower.contains("ports are not available")
}
