//! Shared API DTOs used by the apiary server and its integration tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Sensor flavor backing a honeypot node (wire format uses lowercase values).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HoneypotKind {
    /// SSH sensor (Cowrie).
    Ssh,
    /// Telnet sensor (Cowrie with telnet enabled).
    Telnet,
    /// HTTP sensor (Dionaea).
    Http,
}

impl HoneypotKind {
    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HoneypotKind::Ssh => "ssh",
            HoneypotKind::Telnet => "telnet",
            HoneypotKind::Http => "http",
        }
    }
}

impl std::str::FromStr for HoneypotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(HoneypotKind::Ssh),
            "telnet" => Ok(HoneypotKind::Telnet),
            "http" => Ok(HoneypotKind::Http),
            other => Err(format!("unknown honeypot kind: {other}")),
        }
    }
}

/// Lifecycle status of a honeypot record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HoneypotStatus {
    /// Backing container is running and events are being collected.
    Active,
    /// No running container is associated with the record.
    Inactive,
}

impl HoneypotStatus {
    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HoneypotStatus::Active => "active",
            HoneypotStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for HoneypotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(HoneypotStatus::Active),
            "inactive" => Ok(HoneypotStatus::Inactive),
            other => Err(format!("unknown honeypot status: {other}")),
        }
    }
}

/// Honeypot representation returned to operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct HoneypotResponse {
    /// Database identifier.
    pub id: i64,
    /// Operator-supplied display name.
    pub name: String,
    /// Sensor flavor.
    pub kind: HoneypotKind,
    /// Bind host of the exposed service.
    pub host: String,
    /// Published host port. Zero when discovery never resolved a binding.
    pub port: u16,
    /// Lifecycle status.
    pub status: HoneypotStatus,
    /// Backing container id, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Backing container name, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Number of events attributed to this honeypot.
    pub events_count: i64,
}

/// Request body for provisioning a new honeypot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateHoneypotRequest {
    /// Display name.
    pub name: String,
    /// Sensor flavor to deploy.
    pub kind: HoneypotKind,
    /// Bind host override, defaults to `0.0.0.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Requested host port. When omitted the daemon picks an ephemeral port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Partial update of an existing honeypot record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateHoneypotRequest {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New sensor flavor label. Does not redeploy the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<HoneypotKind>,
    /// New bind host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// New published port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// New lifecycle status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HoneypotStatus>,
}

/// Response to a honeypot deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DeleteHoneypotResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// Whether the backing container was removed during teardown.
    pub container_removed: bool,
}

/// Event representation returned to operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct EventResponse {
    /// Database identifier.
    pub id: i64,
    /// Owning honeypot.
    pub honeypot_id: i64,
    /// Source address of the observed activity (IPv4 or IPv6).
    pub ip_address: String,
    /// Time the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Classified or caller-supplied event type.
    pub event_type: String,
    /// Free-form detail payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Request body for direct event ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateEventRequest {
    /// Owning honeypot. Accepts a number or a numeric string.
    #[serde(deserialize_with = "honeypot_id_from_any")]
    #[schema(value_type = i64)]
    pub honeypot_id: i64,
    /// Source address of the observed activity.
    pub ip_address: String,
    /// Event type. When empty or absent the details are classified instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Free-form detail payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn honeypot_id_from_any<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Int(i64),
        Text(String),
    }
    match Repr::deserialize(deserializer)? {
        Repr::Int(v) => Ok(v),
        Repr::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Generic confirmation body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessageResponse {
    /// Human-readable confirmation.
    pub message: String,
}

/// Liveness probe body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct HealthResponse {
    /// Fixed `ok` marker.
    pub status: String,
    /// Server time at probe evaluation.
    pub timestamp: DateTime<Utc>,
}

/// Error body returned by every non-success response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description of the failure.
    pub error: String,
    /// Stable machine-readable error code.
    pub code: String,
}
