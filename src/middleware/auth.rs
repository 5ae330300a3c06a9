//! API-key authentication.
//!
//! Every `/api` request must carry the configured header. The key is either
//! the operator's bootstrap key or belongs to a stored user; the resolved
//! [`Identity`] is inserted into the request extensions for the handler.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};

use crate::config::{mask, AuthConfig};
use crate::db::{RepositoryError, UserRepository};
use crate::models::user::ADMIN_USERNAME;
use crate::models::{Identity, NewUser, User};
use crate::state::AppState;
use crate::utils::AppError;

pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = &state.auth.api_key_header;
    let api_key = request
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .filter(|key| !key.is_empty())
        .map(str::to_owned);

    let Some(api_key) = api_key else {
        warn!(header = %header, "Missing API key");
        return Err(AppError::AuthError("API key required".to_string()));
    };

    let identity = authenticate(&state.auth, state.users.as_ref(), &api_key).await?;
    debug!(username = %identity.username, bootstrap = identity.bootstrap, "Request authenticated");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Resolves a presented key to an identity without touching the request.
pub async fn authenticate(
    auth: &AuthConfig,
    users: &dyn UserRepository,
    api_key: &str,
) -> Result<Identity, AppError> {
    if auth.bootstrap_admin_key.as_deref() == Some(api_key) {
        info!("Bootstrap admin key used for authentication");
        return Ok(Identity::bootstrap_admin());
    }

    match users.find_by_api_key(api_key).await {
        Ok(Some(user)) => Ok(Identity::from(&user)),
        Ok(None) => {
            warn!("Invalid API key provided");
            Err(AppError::AuthError("Invalid API key".to_string()))
        }
        Err(source) => Err(AppError::storage("Authentication error", source)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// No bootstrap key is configured.
    Skipped,
    Created(User),
    Existing(User),
    /// The admin user exists but holds a different key. The stored key is left as is.
    KeyMismatch(User),
}

/// Ensures an `admin` user bound to the bootstrap key exists. Runs once at startup.
pub async fn provision_bootstrap_admin(
    auth: &AuthConfig,
    users: &dyn UserRepository,
) -> Result<BootstrapOutcome, RepositoryError> {
    let Some(key) = auth.bootstrap_admin_key.as_deref() else {
        warn!("No bootstrap admin key configured, skipping admin user creation");
        return Ok(BootstrapOutcome::Skipped);
    };

    info!(key = %mask(key), "Setting up bootstrap admin user");

    if let Some(existing) = users.find_by_username(ADMIN_USERNAME).await? {
        if existing.api_key != key {
            warn!(username = %existing.username, "Admin user exists with a different API key; stored key not updated");
            return Ok(BootstrapOutcome::KeyMismatch(existing));
        }
        info!(username = %existing.username, "Admin user already exists");
        return Ok(BootstrapOutcome::Existing(existing));
    }

    let admin = users
        .create(NewUser {
            username: ADMIN_USERNAME.to_string(),
            api_key: key.to_string(),
        })
        .await?;

    info!(username = %admin.username, user_id = %admin.id, "Created bootstrap admin user");
    Ok(BootstrapOutcome::Created(admin))
}
