use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RepositoryError, RepositoryResult};
use crate::models::{NewUser, User};

/// Lookup and creation of API users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_api_key(&self, api_key: &str) -> RepositoryResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;

    async fn create(&self, user: NewUser) -> RepositoryResult<User>;
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_api_key(&self, api_key: &str) -> RepositoryResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, api_key, created_at, updated_at
            FROM users
            WHERE api_key = $1
            "#,
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::database("get user by API key"))
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, api_key, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::database("get user by username"))
    }

    async fn create(&self, user: NewUser) -> RepositoryResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, api_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, username, api_key, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.api_key)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::database("create user"))
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_api_key(&self, api_key: &str) -> RepositoryResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.api_key == api_key).cloned())
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn create(&self, user: NewUser) -> RepositoryResult<User> {
        let mut users = self.users.write().await;

        if users.iter().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict("users_username_key".to_string()));
        }
        if users.iter().any(|u| u.api_key == user.api_key) {
            return Err(RepositoryError::Conflict("users_api_key_key".to_string()));
        }

        let now = Utc::now().trunc_subsecs(6);
        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            api_key: user.api_key,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }
}
