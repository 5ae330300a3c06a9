use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A stored calendar event. `end_time` is always strictly after `start_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated, sanitized fields a client may set on an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Request body for both `POST /api/events` and `PUT /api/events/{id}`.
///
/// Every field is optional at the decoding stage so that absent and `null`
/// fields reach structural validation, which reports all of them at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EventRequest {
    #[serde(default)]
    #[validate(
        required(message = "is required"),
        length(min = 1, max = 255, message = "must be between 1 and 255 characters")
    )]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000, message = "must be at most 1000 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    #[validate(required(message = "is required"), length(min = 1, message = "is required"))]
    pub start_time: Option<String>,

    #[serde(default)]
    #[validate(required(message = "is required"), length(min = 1, message = "is required"))]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEventsResponse {
    pub events: Vec<Event>,
    pub count: usize,
}

impl From<Vec<Event>> for ListEventsResponse {
    fn from(events: Vec<Event>) -> Self {
        Self {
            count: events.len(),
            events,
        }
    }
}
