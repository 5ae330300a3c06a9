//! HTTP-level tests against the full router, backed by the in-memory repositories.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use calendar_api::config::{AuthConfig, Config};
use calendar_api::db::{
    EventRepository, InMemoryEventRepository, InMemoryUserRepository, RepositoryResult,
};
use calendar_api::handlers::system::{HealthResponse, VersionResponse};
use calendar_api::models::{Event, ListEventsResponse, NewEvent};
use calendar_api::routes::create_routes;
use calendar_api::state::AppState;
use calendar_api::utils::response::ApiErrorResponse;

const API_KEY: &str = "test-admin-key-123";

fn app_with(events: Arc<dyn EventRepository>) -> Router {
    let mut config = Config::default();
    config.auth = AuthConfig::new(config.auth.api_key_header.clone(), Some(API_KEY.to_string()));

    let state = AppState::new(events, Arc::new(InMemoryUserRepository::new()), config.auth.clone());
    create_routes(state, &config)
}

fn app() -> Router {
    app_with(Arc::new(InMemoryEventRepository::new()))
}

async fn send(app: &Router, method: Method, uri: &str, key: Option<&str>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        request = request.header("X-API-Key", key);
    }
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn create(app: &Router, body: Value) -> Event {
    let (status, bytes) = send(app, Method::POST, "/api/events", Some(API_KEY), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", String::from_utf8_lossy(&bytes));
    serde_json::from_slice(&bytes).unwrap()
}

async fn list(app: &Router) -> ListEventsResponse {
    let (status, bytes) = send(app, Method::GET, "/api/events", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&bytes).unwrap()
}

fn error_body(bytes: &[u8]) -> ApiErrorResponse {
    serde_json::from_slice(bytes).unwrap()
}

/// Fails the test if any storage call is made.
struct UntouchableEvents;

#[async_trait]
impl EventRepository for UntouchableEvents {
    async fn list(&self) -> RepositoryResult<Vec<Event>> {
        panic!("list must not be reached")
    }
    async fn get(&self, _id: Uuid) -> RepositoryResult<Option<Event>> {
        panic!("get must not be reached")
    }
    async fn create(&self, _event: NewEvent) -> RepositoryResult<Event> {
        panic!("create must not be reached")
    }
    async fn update(&self, _id: Uuid, _event: NewEvent) -> RepositoryResult<Event> {
        panic!("update must not be reached")
    }
    async fn delete(&self, _id: Uuid) -> RepositoryResult<()> {
        panic!("delete must not be reached")
    }
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_standup_lifecycle() {
    let app = app();

    let created = create(
        &app,
        json!({
            "title": "Standup",
            "start_time": "2025-06-13T09:00:00Z",
            "end_time": "2025-06-13T09:15:00Z"
        }),
    )
    .await;
    assert_eq!(created.title, "Standup");
    assert!(created.description.is_none());
    assert_eq!(created.created_at, created.updated_at);

    let listed = list(&app).await;
    assert_eq!(listed.count, 1);
    assert_eq!(listed.events, vec![created.clone()]);

    let uri = format!("/api/events/{}", created.id);
    let (status, bytes) = send(&app, Method::GET, &uri, Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: Event = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(fetched, created);

    let (status, bytes) = send(
        &app,
        Method::PUT,
        &uri,
        Some(API_KEY),
        Some(json!({
            "title": "Standup (moved)",
            "description": "Daily sync",
            "start_time": "2025-06-13T10:00:00Z",
            "end_time": "2025-06-13T10:15:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated: Event = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.title, "Standup (moved)");
    assert_eq!(updated.description.as_deref(), Some("Daily sync"));
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);

    let (status, bytes) = send(&app, Method::GET, &uri, Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Event>(&bytes).unwrap(), updated);

    let (status, bytes) = send(&app, Method::DELETE, &uri, Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(bytes.is_empty());

    let (status, _) = send(&app, Method::GET, &uri, Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(list(&app).await.count, 0);
}

#[tokio::test]
async fn test_empty_list_is_an_empty_array() {
    let (status, bytes) = send(&app(), Method::GET, "/api/events", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "events": [], "count": 0 }));
}

#[tokio::test]
async fn test_list_is_ordered_by_start_time() {
    let app = app();
    for (title, start, end) in [
        ("late", "2025-06-13T15:00:00Z", "2025-06-13T16:00:00Z"),
        ("early", "2025-06-13T08:00:00Z", "2025-06-13T09:00:00Z"),
        ("middle", "2025-06-13T12:00:00Z", "2025-06-13T13:00:00Z"),
    ] {
        create(&app, json!({ "title": title, "start_time": start, "end_time": end })).await;
    }

    let titles: Vec<String> = list(&app).await.events.into_iter().map(|e| e.title).collect();
    assert_eq!(titles, ["early", "middle", "late"]);
}

#[tokio::test]
async fn test_missing_key_never_reaches_storage() {
    let app = app_with(Arc::new(UntouchableEvents));

    for (method, uri) in [
        (Method::GET, "/api/events".to_string()),
        (Method::POST, "/api/events".to_string()),
        (Method::GET, format!("/api/events/{}", Uuid::new_v4())),
        (Method::DELETE, format!("/api/events/{}", Uuid::new_v4())),
    ] {
        let (status, bytes) = send(&app, method, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        let body = error_body(&bytes);
        assert_eq!(body.error, "AUTH_ERROR");
        assert_eq!(body.message, "API key required");
    }

    let (status, bytes) = send(&app, Method::GET, "/api/events", Some("invalid-key"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(&bytes).message, "Invalid API key");
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let app = app();
    let body = json!({
        "title": "Standup",
        "start_time": "2025-06-13T09:00:00Z",
        "end_time": "2025-06-13T09:15:00Z"
    });

    for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
        let uri = format!("/api/events/{id}");

        let (status, bytes) = send(&app, Method::GET, &uri, Some(API_KEY), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error = error_body(&bytes);
        assert_eq!(error.error, "NOT_FOUND");
        assert_eq!(error.message, "Event not found");

        let (status, _) = send(&app, Method::PUT, &uri, Some(API_KEY), Some(body.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(API_KEY), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    assert_eq!(list(&app).await.count, 0);
}

#[tokio::test]
async fn test_missing_title_is_reported_per_field() {
    let (status, bytes) = send(
        &app(),
        Method::POST,
        "/api/events",
        Some(API_KEY),
        Some(json!({
            "start_time": "2025-06-13T09:00:00Z",
            "end_time": "2025-06-13T09:15:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let error = error_body(&bytes);
    assert_eq!(error.error, "VALIDATION_ERROR");
    let details = error.details.unwrap();
    assert!(details.contains_key("title"));
    assert!(!details.contains_key("start_time"));
}

#[tokio::test]
async fn test_null_fields_are_reported_per_field() {
    let (status, bytes) = send(
        &app(),
        Method::POST,
        "/api/events",
        Some(API_KEY),
        Some(json!({
            "title": null,
            "start_time": "2025-06-13T09:00:00Z",
            "end_time": null
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let error = error_body(&bytes);
    assert_eq!(error.error, "VALIDATION_ERROR");
    let details = error.details.unwrap();
    assert!(details.contains_key("title"));
    assert!(details.contains_key("end_time"));
    assert!(!details.contains_key("start_time"));
}

#[tokio::test]
async fn test_loose_timestamp_forms_are_rejected() {
    let app = app();
    let (status, bytes) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(API_KEY),
        Some(json!({
            "title": "Standup",
            "start_time": "2025-06-13 09:00:00Z",
            "end_time": "2025-06-13T10:00:00z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_body(&bytes).details.unwrap().contains_key("start_time"));

    assert_eq!(list(&app).await.count, 0);
}

#[tokio::test]
async fn test_equal_times_are_rejected_and_not_stored() {
    let app = app();
    let (status, bytes) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(API_KEY),
        Some(json!({
            "title": "Zero length",
            "start_time": "2025-06-13T09:00:00Z",
            "end_time": "2025-06-13T09:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_body(&bytes).details.unwrap().contains_key("end_time"));

    assert_eq!(list(&app).await.count, 0);
}

#[tokio::test]
async fn test_invalid_update_leaves_event_unchanged() {
    let app = app();
    let created = create(
        &app,
        json!({
            "title": "Review",
            "start_time": "2025-06-13T09:00:00Z",
            "end_time": "2025-06-13T10:00:00Z"
        }),
    )
    .await;

    let uri = format!("/api/events/{}", created.id);
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(API_KEY),
        Some(json!({
            "title": "Review",
            "start_time": "2025-06-13T11:00:00Z",
            "end_time": "2025-06-13T10:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, bytes) = send(&app, Method::GET, &uri, Some(API_KEY), None).await;
    assert_eq!(serde_json::from_slice::<Event>(&bytes).unwrap(), created);
}

#[tokio::test]
async fn test_markup_is_escaped_before_storage() {
    let event = create(
        &app(),
        json!({
            "title": "<script>alert('x')</script>",
            "description": "Tom & Jerry",
            "start_time": "2025-06-13T09:00:00Z",
            "end_time": "2025-06-13T10:00:00Z"
        }),
    )
    .await;

    assert_eq!(event.title, "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;");
    assert_eq!(event.description.as_deref(), Some("Tom &amp; Jerry"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/events")
        .header("X-API-Key", API_KEY)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let error = error_body(&bytes);
    assert_eq!(error.error, "BAD_REQUEST");
    assert_eq!(error.message, "Invalid request body");
}

#[tokio::test]
async fn test_health_and_version_are_public() {
    let app = app();

    let (status, bytes) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.database, "connected");

    let (status, bytes) = send(&app, Method::GET, "/version", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let version: VersionResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(version.version, env!("CARGO_PKG_VERSION"));
    assert!(!version.build_info.is_empty());
}

#[tokio::test]
async fn test_security_headers_are_set() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app().oneshot(request).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert!(headers.get("x-frame-options").is_some());
    assert!(headers.get("strict-transport-security").is_none());
}
