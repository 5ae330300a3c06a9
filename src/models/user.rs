use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub api_key: String,
}

/// The principal behind a single authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// `None` when the request used the bootstrap key rather than a stored user.
    pub user_id: Option<Uuid>,
    pub username: String,
    pub bootstrap: bool,
}

impl Identity {
    pub fn bootstrap_admin() -> Self {
        Self {
            user_id: None,
            username: ADMIN_USERNAME.to_string(),
            bootstrap: true,
        }
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: Some(user.id),
            username: user.username.clone(),
            bootstrap: false,
        }
    }
}
