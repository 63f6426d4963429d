use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use common::api;
use common::api::{
    CreateEventRequest, CreateHoneypotRequest, DeleteHoneypotResponse, EventResponse,
    HealthResponse, HoneypotResponse, MessageResponse, UpdateHoneypotRequest,
};

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::services;

mod error_mapper;
mod events;
mod honeypots;
mod system;

/// Assembles the full API surface with request-id and trace middleware.
pub fn build_router() -> Router<AppState> {
    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id());

    Router::<AppState>::new()
        .merge(system::router())
        .merge(honeypots::router())
        .merge(events::router())
        .layer(middleware_stack)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        system::healthz,
        system::metrics,
        honeypots::create_honeypot,
        honeypots::list_honeypots,
        honeypots::get_honeypot,
        honeypots::update_honeypot,
        honeypots::delete_honeypot,
        events::create_event,
        events::list_events,
        events::get_event,
        events::delete_event,
    ),
    components(schemas(
        api::HoneypotKind,
        api::HoneypotStatus,
        api::HoneypotResponse,
        api::CreateHoneypotRequest,
        api::UpdateHoneypotRequest,
        api::DeleteHoneypotResponse,
        api::EventResponse,
        api::CreateEventRequest,
        api::MessageResponse,
        api::HealthResponse,
        api::ErrorResponse,
    )),
    tags(
        (name = "system", description = "Health and metrics"),
        (name = "honeypots", description = "Honeypot provisioning and lifecycle"),
        (name = "events", description = "Attack event ingestion and queries"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_covers_all_operations() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
        assert!(paths.iter().any(|p| p.as_str() == "/metrics"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/honeypots"));
        assert!(paths
            .iter()
            .any(|p| p.as_str() == "/api/v1/honeypots/{honeypot_id}"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/events"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/events/{event_id}"));
    }
}
