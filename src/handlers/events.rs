use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::{Extension, Json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::RepositoryError;
use crate::handlers::validation::prepare_event;
use crate::models::{EventRequest, Identity, ListEventsResponse};
use crate::state::AppState;
use crate::utils::response::{created, empty_success, success};
use crate::utils::AppError;

const EVENT_NOT_FOUND: &str = "Event not found";

/// Ids that are not UUIDs cannot name a stored event.
fn event_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(EVENT_NOT_FOUND.to_string()))
}

fn request_body(payload: Result<Json<EventRequest>, JsonRejection>) -> Result<EventRequest, AppError> {
    match payload {
        Ok(Json(request)) => Ok(request),
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "Rejected request body");
            Err(AppError::BadRequest("Invalid request body".to_string()))
        }
    }
}

/// `GET /api/events`
pub async fn list_events(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, AppError> {
    let events = state
        .events
        .list()
        .await
        .map_err(|e| AppError::storage("Failed to retrieve events", e))?;

    debug!(user = %identity.username, count = events.len(), "Listed events");
    Ok(success(ListEventsResponse::from(events)))
}

/// `GET /api/events/{id}`
pub async fn get_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = event_id(&id)?;

    let event = state
        .events
        .get(id)
        .await
        .map_err(|e| AppError::storage("Failed to retrieve event", e))?
        .ok_or_else(|| AppError::NotFound(EVENT_NOT_FOUND.to_string()))?;

    debug!(user = %identity.username, event_id = %event.id, "Fetched event");
    Ok(success(event))
}

/// `POST /api/events`
pub async fn create_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let new_event = prepare_event(request_body(payload)?)?;

    let event = state
        .events
        .create(new_event)
        .await
        .map_err(|e| AppError::storage("Failed to create event", e))?;

    info!(user = %identity.username, event_id = %event.id, "Event created");
    Ok(created(event))
}

/// `PUT /api/events/{id}`
pub async fn update_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = event_id(&id)?;
    let new_event = prepare_event(request_body(payload)?)?;

    let existing = state
        .events
        .get(id)
        .await
        .map_err(|e| AppError::storage("Failed to retrieve event", e))?;
    if existing.is_none() {
        return Err(AppError::NotFound(EVENT_NOT_FOUND.to_string()));
    }

    // The row can still disappear between the read and the write.
    let event = match state.events.update(id, new_event).await {
        Ok(event) => event,
        Err(RepositoryError::NotFound) => {
            return Err(AppError::NotFound(EVENT_NOT_FOUND.to_string()))
        }
        Err(e) => return Err(AppError::storage("Failed to update event", e)),
    };

    info!(user = %identity.username, event_id = %event.id, "Event updated");
    Ok(success(event))
}

/// `DELETE /api/events/{id}`
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = event_id(&id)?;

    match state.events.delete(id).await {
        Ok(()) => {}
        Err(RepositoryError::NotFound) => {
            return Err(AppError::NotFound(EVENT_NOT_FOUND.to_string()))
        }
        Err(e) => return Err(AppError::storage("Failed to delete event", e)),
    }

    info!(user = %identity.username, event_id = %id, "Event deleted");
    Ok(empty_success())
}
