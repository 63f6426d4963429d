use std::time::Duration;

use metrics::counter;
use tracing::{error, info, warn};
use uuid::Uuid;

use common::api::{
    CreateHoneypotRequest, DeleteHoneypotResponse, HoneypotKind, HoneypotResponse,
    UpdateHoneypotRequest,
};

use crate::app_state::AppState;
use crate::error::{ApiResult, AppError};
use crate::persistence::{self, HoneypotRecord, NewHoneypot, UpdatedHoneypot};
use crate::runtime::{ContainerRuntimeError, ContainerSpec, DynContainerRuntime, PortExposure};
use crate::validation;

const HONEYPOT_NOT_FOUND: &str = "Honeypot not found";
const DEFAULT_HOST: &str = "0.0.0.0";

/// Container recipe for one sensor flavor.
pub struct SensorProfile {
    pub image: &'static str,
    pub container_port: u16,
    pub env: Vec<(String, String)>,
}

/// Both SSH and Telnet ride the same Cowrie image; Telnet just flips the
/// listener on and targets the other service port.
pub fn sensor_profile(kind: HoneypotKind) -> SensorProfile {
    match kind {
        HoneypotKind::Ssh => SensorProfile {
            image: "cowrie/cowrie:latest",
            container_port: 2222,
            env: Vec::new(),
        },
        HoneypotKind::Telnet => SensorProfile {
            image: "cowrie/cowrie:latest",
            container_port: 2223,
            env: vec![("COWRIE_TELNET_ENABLED".to_string(), "yes".to_string())],
        },
        HoneypotKind::Http => SensorProfile {
            image: "dinotools/dionaea:latest",
            container_port: 80,
            env: Vec::new(),
        },
    }
}

fn new_container_name(kind: HoneypotKind) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-node-{}", kind.as_str(), &suffix[..8])
}

/// Provisions a honeypot: start the container, discover the published port,
/// persist the record, attach the log forwarder.
///
/// Container start and record insert cannot happen atomically, so a
/// persistence failure after a successful start triggers a compensating
/// container removal. The resulting error names the terminal stage
/// (`failed_compensating` when cleanup succeeded, `failed_orphaned` when the
/// container is left behind) so operators know whether manual cleanup is
/// needed.
pub async fn provision_honeypot(
    state: &AppState,
    req: CreateHoneypotRequest,
) -> ApiResult<HoneypotResponse> {
    let name = validation::validate_name(&state.limits, &req.name)?;
    let host = match req.host.as_deref() {
        None => DEFAULT_HOST.to_string(),
        Some(host) => validation::require_field("host", host, state.limits.max_name_len)?,
    };
    let requested_port = req.port.map(validation::validate_port).transpose()?;
    if let Some(port) = requested_port
        && !crate::ports::is_port_free(&host, port)
    {
        return Err(AppError::conflict(format!(
            "host port {port} is already allocated"
        )));
    }

    let profile = sensor_profile(req.kind);
    let container_name = new_container_name(req.kind);
    let mut spec = ContainerSpec::new(
        profile.image,
        container_name.clone(),
        PortExposure {
            container_port: profile.container_port,
            host_port: requested_port,
        },
    );
    spec.env = profile.env;
    spec.labels = vec![
        ("managed-by".to_string(), "apiary".to_string()),
        ("apiary.kind".to_string(), req.kind.as_str().to_string()),
    ];

    let container_id = state
        .runtime
        .start_container(spec)
        .await
        .map_err(map_start_error)?;
    info!(container_id = %container_id, name = %name, "sensor container started");

    let published = wait_for_host_port(state, &container_id, profile.container_port).await;
    if published.is_none() {
        warn!(container_id = %container_id, "host port never appeared, recording requested port");
    }
    let port = published.or(requested_port).unwrap_or(0);

    let persisted = persist_honeypot(
        state,
        NewHoneypot {
            name,
            kind: req.kind.as_str().to_string(),
            host,
            port: i64::from(port),
            status: "active".to_string(),
            container_id: Some(container_id.clone()),
            container_name: Some(container_name),
        },
    )
    .await;

    let id = match persisted {
        Ok(id) => id,
        Err(err) => return Err(compensate_failed_persist(state, &container_id, err).await),
    };

    state
        .forwarders
        .attach(state.db.clone(), state.runtime.clone(), id, container_id)
        .await;

    let record = persistence::honeypots::get_honeypot(&state.db, id)
        .await?
        .ok_or_else(|| AppError::internal("provisioned honeypot vanished"))?;
    to_response(record)
}

fn map_start_error(err: ContainerRuntimeError) -> AppError {
    if let ContainerRuntimeError::PortConflict { host_port, .. } = &err {
        return AppError::conflict(format!("host port {host_port} is already allocated"));
    }
    if err.is_connection_error() {
        return AppError::service_unavailable("container runtime unavailable");
    }
    counter!("apiary_provision_failures_total", "stage" => "container_start").increment(1);
    error!(?err, "failed to start sensor container");
    AppError::provision_failed(format!("failed to start sensor container: {err}"))
}

async fn wait_for_host_port(
    state: &AppState,
    container_id: &str,
    container_port: u16,
) -> Option<u16> {
    for _ in 0..state.provision.port_poll_attempts {
        match state
            .runtime
            .resolve_host_port(container_id, container_port)
            .await
        {
            Ok(Some(port)) => return Some(port),
            Ok(None) => {}
            Err(err) => {
                warn!(container_id, ?err, "host port lookup failed, retrying");
            }
        }
        tokio::time::sleep(Duration::from_millis(state.provision.port_poll_interval_ms)).await;
    }
    None
}

async fn persist_honeypot(state: &AppState, new: NewHoneypot) -> anyhow::Result<i64> {
    let mut tx = state.db.begin().await?;
    let id = persistence::honeypots::insert_honeypot(&mut tx, new).await?;
    tx.commit().await?;
    Ok(id)
}

async fn compensate_failed_persist(
    state: &AppState,
    container_id: &str,
    err: anyhow::Error,
) -> AppError {
    let removed = match state.runtime.remove_container(container_id).await {
        Ok(()) => true,
        Err(remove_err) if remove_err.is_not_found() => true,
        Err(remove_err) => {
            error!(container_id, ?remove_err, "compensating removal failed");
            false
        }
    };

    let stage = if removed {
        "failed_compensating"
    } else {
        "failed_orphaned"
    };
    counter!("apiary_provision_failures_total", "stage" => stage).increment(1);
    error!(container_id, stage, ?err, "provisioning failed after container start");

    if removed {
        AppError::provision_failed(format!(
            "provisioning failed ({stage}): persistence failed and container {container_id} was removed: {err}"
        ))
    } else {
        AppError::provision_failed(format!(
            "provisioning failed ({stage}): persistence failed and container {container_id} could not be removed, manual cleanup required: {err}"
        ))
    }
}

pub async fn get_honeypot(state: &AppState, id: i64) -> ApiResult<HoneypotResponse> {
    let record = persistence::honeypots::get_honeypot(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(HONEYPOT_NOT_FOUND))?;
    to_response(record)
}

pub async fn list_honeypots(state: &AppState) -> ApiResult<Vec<HoneypotResponse>> {
    let records = persistence::honeypots::list_honeypots(&state.db).await?;
    records.into_iter().map(to_response).collect()
}

/// Patches the record only. Changing the kind or port here does not redeploy
/// the container.
pub async fn update_honeypot(
    state: &AppState,
    id: i64,
    req: UpdateHoneypotRequest,
) -> ApiResult<HoneypotResponse> {
    let name = req
        .name
        .as_deref()
        .map(|name| validation::validate_name(&state.limits, name))
        .transpose()?;
    let host = req
        .host
        .as_deref()
        .map(|host| validation::require_field("host", host, state.limits.max_name_len))
        .transpose()?;
    let port = req.port.map(validation::validate_port).transpose()?;

    let rows = persistence::honeypots::update_honeypot(
        &state.db,
        id,
        UpdatedHoneypot {
            name,
            kind: req.kind.map(|kind| kind.as_str().to_string()),
            host,
            port: port.map(i64::from),
            status: req.status.map(|status| status.as_str().to_string()),
        },
    )
    .await?;
    if rows == 0 {
        return Err(AppError::not_found(HONEYPOT_NOT_FOUND));
    }

    let record = persistence::honeypots::get_honeypot(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(HONEYPOT_NOT_FOUND))?;
    to_response(record)
}

/// Tears a honeypot down: stop the forwarder, reclaim the container, delete
/// the record (events cascade).
pub async fn delete_honeypot(state: &AppState, id: i64) -> ApiResult<DeleteHoneypotResponse> {
    let record = persistence::honeypots::get_honeypot(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(HONEYPOT_NOT_FOUND))?;

    state.forwarders.detach(id).await;

    let container_removed = match record.container_id.as_deref() {
        Some(container_id) => {
            reclaim_container(&state.runtime, container_id, state.provision.stop_timeout_secs).await
        }
        None => false,
    };

    persistence::honeypots::delete_honeypot(&state.db, id).await?;
    info!(honeypot_id = id, container_removed, "honeypot deleted");

    Ok(DeleteHoneypotResponse {
        message: "Honeypot deleted successfully".to_string(),
        container_removed,
    })
}

/// Stops and removes a container, treating an already-gone container as
/// success. Returns whether the container is gone afterwards.
pub async fn reclaim_container(
    runtime: &DynContainerRuntime,
    container_id: &str,
    stop_timeout_secs: u32,
) -> bool {
    match runtime.stop_container(container_id, stop_timeout_secs).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => return true,
        Err(err) => {
            warn!(container_id, ?err, "stop failed, forcing removal");
        }
    }

    match runtime.remove_container(container_id).await {
        Ok(()) => true,
        Err(err) if err.is_not_found() => true,
        Err(err) => {
            warn!(container_id, ?err, "container removal failed");
            false
        }
    }
}

fn to_response(record: HoneypotRecord) -> ApiResult<HoneypotResponse> {
    let kind = record
        .kind
        .parse()
        .map_err(|_| AppError::internal("stored honeypot kind is invalid"))?;
    let status = record
        .status
        .parse()
        .map_err(|_| AppError::internal("stored honeypot status is invalid"))?;
    let port = u16::try_from(record.port)
        .map_err(|_| AppError::internal("stored honeypot port is invalid"))?;

    Ok(HoneypotResponse {
        id: record.id,
        name: record.name,
        kind,
        host: record.host,
        port,
        status,
        container_id: record.container_id,
        container_name: record.container_name,
        created_at: record.created_at,
        events_count: record.events_count,
    })
}
