use super::*;

use crate::persistence::EventFilters;

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/api/v1/events", get(list_events).post(create_event))
        .route(
            "/api/v1/events/{event_id}",
            get(get_event).delete(delete_event),
        )
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct EventListParams {
    /// Only events belonging to this honeypot.
    honeypot_id: Option<i64>,
    /// Only events from this source address.
    ip_address: Option<String>,
    /// Only events with this type label.
    event_type: Option<String>,
}

impl From<EventListParams> for EventFilters {
    fn from(params: EventListParams) -> Self {
        Self {
            honeypot_id: params.honeypot_id,
            ip_address: params.ip_address,
            event_type: params.event_type,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/events",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event recorded", body = EventResponse),
        (status = 400, description = "Invalid request", body = api::ErrorResponse),
        (status = 404, description = "Owning honeypot does not exist", body = api::ErrorResponse),
        (status = 503, description = "Store unavailable, payload diverted to side log", body = api::ErrorResponse)
    ),
    tag = "events"
)]
pub(crate) async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    let event = services::events::ingest_event(&state, req).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[utoipa::path(
    get,
    path = "/api/v1/events",
    params(EventListParams),
    responses((status = 200, description = "Events, newest first", body = [EventResponse])),
    tag = "events"
)]
pub(crate) async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> ApiResult<Json<Vec<EventResponse>>> {
    let events = services::events::list_events(&state, params.into()).await?;
    Ok(Json(events))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/{event_id}",
    params(("event_id" = i64, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event detail", body = EventResponse),
        (status = 404, description = "No such event", body = api::ErrorResponse)
    ),
    tag = "events"
)]
pub(crate) async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<Json<EventResponse>> {
    let event = services::events::get_event(&state, event_id).await?;
    Ok(Json(event))
}

#[utoipa::path(
    delete,
    path = "/api/v1/events/{event_id}",
    params(("event_id" = i64, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event deleted", body = MessageResponse),
        (status = 404, description = "No such event", body = api::ErrorResponse)
    ),
    tag = "events"
)]
pub(crate) async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let result = services::events::delete_event(&state, event_id).await?;
    Ok(Json(result))
}
