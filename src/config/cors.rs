use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::Config;

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// CORS for API-key clients. Keys travel in a header, not cookies, so
/// credentials are never allowed and any origin is accepted by default.
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins(config.cors_allowed_origins.as_deref()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            config.auth.api_key_header.clone(),
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .max_age(Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn allowed_origins(configured: Option<&str>) -> AllowOrigin {
    let Some(configured) = configured else {
        return AllowOrigin::any();
    };

    let origins: Vec<HeaderValue> = configured
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => {
                tracing::debug!(origin, "CORS: allowing origin");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(origin, error = %e, "CORS: ignoring invalid origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: no valid origins configured, allowing any origin");
        AllowOrigin::any()
    } else {
        tracing::info!(count = origins.len(), "CORS: restricted to configured origins");
        AllowOrigin::list(origins)
    }
}
