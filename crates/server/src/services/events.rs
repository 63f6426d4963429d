use metrics::counter;
use tracing::{error, warn};

use common::api::{CreateEventRequest, EventResponse, MessageResponse};

use crate::app_state::AppState;
use crate::classify;
use crate::error::{ApiResult, AppError};
use crate::persistence::{self, EventFilters, EventRecord, NewEvent};
use crate::validation;

const HONEYPOT_NOT_FOUND: &str = "Honeypot not found";
const EVENT_NOT_FOUND: &str = "Event not found";

enum Persisted {
    Stored(EventRecord),
    MissingHoneypot,
}

/// Ingests one operator-submitted event.
///
/// The caller-supplied event type wins when present; otherwise the details
/// text runs through the classifier. A persistence failure first writes the
/// raw payload to the side log so the observation survives a database outage,
/// then surfaces the error.
pub async fn ingest_event(state: &AppState, req: CreateEventRequest) -> ApiResult<EventResponse> {
    let ip_address = validation::validate_ip_address(&state.limits, &req.ip_address)?;
    let event_type =
        match validation::validate_event_type(&state.limits, req.event_type.as_deref())? {
            Some(supplied) => supplied,
            None => classify::classify_or_other(req.details.as_deref().unwrap_or("")).to_string(),
        };

    let new = NewEvent {
        honeypot_id: req.honeypot_id,
        ip_address,
        event_type,
        details: req.details.clone(),
    };

    match persist_event(state, new).await {
        Ok(Persisted::Stored(record)) => {
            counter!("apiary_events_ingested_total").increment(1);
            Ok(to_response(record))
        }
        Ok(Persisted::MissingHoneypot) => Err(AppError::not_found(HONEYPOT_NOT_FOUND)),
        Err(err) => {
            side_log_payload(state, &req).await;
            Err(err.into())
        }
    }
}

async fn persist_event(state: &AppState, new: NewEvent) -> anyhow::Result<Persisted> {
    let mut tx = state.db.begin().await?;
    if !persistence::events::honeypot_exists(&mut tx, new.honeypot_id).await? {
        return Ok(Persisted::MissingHoneypot);
    }
    let record = persistence::events::insert_event(&mut tx, new).await?;
    tx.commit().await?;
    Ok(Persisted::Stored(record))
}

async fn side_log_payload(state: &AppState, req: &CreateEventRequest) {
    let payload = match serde_json::to_value(req) {
        Ok(payload) => payload,
        Err(err) => {
            error!(?err, "could not serialize payload for side log");
            return;
        }
    };

    if let Err(err) = state.raw_log.append(&payload).await {
        counter!("apiary_sidelog_failures_total").increment(1);
        error!(?err, "side log write failed, payload lost");
    } else {
        warn!(
            honeypot_id = req.honeypot_id,
            "event diverted to side log after persistence failure"
        );
    }
}

pub async fn get_event(state: &AppState, id: i64) -> ApiResult<EventResponse> {
    let record = persistence::events::get_event(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(EVENT_NOT_FOUND))?;
    Ok(to_response(record))
}

/// Lists events newest first, optionally narrowed by owning honeypot, source
/// address, and event type.
pub async fn list_events(state: &AppState, filters: EventFilters) -> ApiResult<Vec<EventResponse>> {
    let records = persistence::events::list_events(&state.db, filters).await?;
    Ok(records.into_iter().map(to_response).collect())
}

pub async fn delete_event(state: &AppState, id: i64) -> ApiResult<MessageResponse> {
    let rows = persistence::events::delete_event(&state.db, id).await?;
    if rows == 0 {
        return Err(AppError::not_found(EVENT_NOT_FOUND));
    }
    Ok(MessageResponse {
        message: "Event deleted successfully".to_string(),
    })
}

fn to_response(record: EventRecord) -> EventResponse {
    EventResponse {
        id: record.id,
        honeypot_id: record.honeypot_id,
        ip_address: record.ip_address,
        timestamp: record.timestamp,
        event_type: record.event_type,
        details: record.details,
    }
}
