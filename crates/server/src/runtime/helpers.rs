use std::collections::HashMap;

use bollard::models::{
    ContainerInspectResponse, ContainerState, ContainerStateStatusEnum, PortBinding, PortMap,
};

use crate::runtime::{ContainerStatus, PortExposure};

pub(crate) type ExposedPorts = HashMap<String, HashMap<(), ()>>;

pub(crate) fn format_env(env: &[(String, String)]) -> Option<Vec<String>> {
    if env.is_empty() {
        None
    } else {
        Some(env.iter().map(|(k, v)| format!("{k}={v}")).collect())
    }
}

/// Builds the single TCP binding a sensor container exposes. An absent host
/// port leaves the binding empty so the daemon assigns an ephemeral port.
pub(crate) fn build_port(port: &PortExposure) -> (PortMap, ExposedPorts) {
    let key = format!("{}/tcp", port.container_port);

    let mut exposed_ports: ExposedPorts = HashMap::new();
    exposed_ports.entry(key.clone()).or_default();

    let mut port_bindings: PortMap = HashMap::new();
    port_bindings.insert(
        key,
        Some(vec![PortBinding {
            host_ip: None,
            host_port: port.host_port.map(|p| p.to_string()),
        }]),
    );

    (port_bindings, exposed_ports)
}

pub(crate) fn map_status(state: Option<&ContainerState>) -> ContainerStatus {
    if let Some(state) = state {
        match state.status.as_ref() {
            Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
            Some(ContainerStateStatusEnum::EXITED) => ContainerStatus::Exited {
                exit_code: state.exit_code,
            },
            Some(other) => ContainerStatus::Unknown(other.to_string()),
            None => ContainerStatus::Unknown("unknown".into()),
        }
    } else {
        ContainerStatus::Unknown("unknown".into())
    }
}

/// Pulls the published host port for `container_port` out of an inspect
/// response, if the daemon has materialized the binding yet.
pub(crate) fn published_host_port(
    details: &ContainerInspectResponse,
    container_port: u16,
) -> Option<u16> {
    let ports = details.network_settings.as_ref()?.ports.as_ref()?;
    let bindings = ports.get(&format!("{container_port}/tcp"))?.as_ref()?;
    bindings
        .iter()
        .find_map(|binding| binding.host_port.as_deref()?.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::NetworkSettings;

    #[test]
    fn format_env_renders_pairs() {
        assert_eq!(format_env(&[]), None);
        let env = vec![("COWRIE_TELNET_ENABLED".to_string(), "yes".to_string())];
        assert_eq!(
            format_env(&env),
            Some(vec!["COWRIE_TELNET_ENABLED=yes".to_string()])
        );
    }

    #[test]
    fn build_port_with_fixed_host_port() {
        let (bindings, exposed) = build_port(&PortExposure {
            container_port: 2222,
            host_port: Some(2222),
        });

        assert!(exposed.contains_key("2222/tcp"));
        let binding = bindings["2222/tcp"].as_ref().expect("binding list");
        assert_eq!(binding[0].host_port.as_deref(), Some("2222"));
    }

    #[test]
    fn build_port_without_host_port_leaves_binding_open() {
        let (bindings, _) = build_port(&PortExposure {
            container_port: 80,
            host_port: None,
        });
        let binding = bindings["80/tcp"].as_ref().expect("binding list");
        assert_eq!(binding[0].host_port, None);
    }

    #[test]
    fn map_status_handles_known_and_unknown_states() {
        let running = ContainerState {
            status: Some(ContainerStateStatusEnum::RUNNING),
            ..Default::default()
        };
        assert_eq!(map_status(Some(&running)), ContainerStatus::Running);

        let exited = ContainerState {
            status: Some(ContainerStateStatusEnum::EXITED),
            exit_code: Some(137),
            ..Default::default()
        };
        assert_eq!(
            map_status(Some(&exited)),
            ContainerStatus::Exited {
                exit_code: Some(137)
            }
        );

        assert_eq!(map_status(None), ContainerStatus::Unknown("unknown".into()));
    }

    #[test]
    fn published_host_port_reads_inspect_bindings() {
        let mut ports: PortMap = HashMap::new();
        ports.insert(
            "2222/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some("49153".into()),
            }]),
        );
        let details = ContainerInspectResponse {
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(published_host_port(&details, 2222), Some(49153));
        assert_eq!(published_host_port(&details, 80), None);
    }

    #[test]
    fn published_host_port_none_before_binding_exists() {
        let details = ContainerInspectResponse::default();
        assert_eq!(published_host_port(&details, 2222), None);
    }
}
