use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RepositoryError, RepositoryResult};
use crate::models::{Event, NewEvent};

/// Persistence contract for events. `get` reports absence as `Ok(None)`;
/// `update` and `delete` report it as `RepositoryError::NotFound`.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// All events, ordered by start time ascending.
    async fn list(&self) -> RepositoryResult<Vec<Event>>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Event>>;

    /// Assigns the id and both timestamps, then stores the event.
    async fn create(&self, event: NewEvent) -> RepositoryResult<Event>;

    /// Replaces the mutable fields and refreshes `updated_at`.
    async fn update(&self, id: Uuid, event: NewEvent) -> RepositoryResult<Event>;

    async fn delete(&self, id: Uuid) -> RepositoryResult<()>;

    async fn ping(&self) -> RepositoryResult<()>;
}

pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn list(&self) -> RepositoryResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, start_time, end_time, created_at, updated_at
            FROM events
            ORDER BY start_time ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::database("query events"))
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, start_time, end_time, created_at, updated_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::database("get event"))
    }

    async fn create(&self, event: NewEvent) -> RepositoryResult<Event> {
        let now = Utc::now();

        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (id, title, description, start_time, end_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, title, description, start_time, end_time, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.title)
        .bind(event.description.as_deref())
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::database("create event"))
    }

    async fn update(&self, id: Uuid, event: NewEvent) -> RepositoryResult<Event> {
        // GREATEST keeps updated_at strictly increasing even for two writes
        // inside the same transaction timestamp.
        let updated = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET title = $2,
                description = $3,
                start_time = $4,
                end_time = $5,
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING id, title, description, start_time, end_time, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&event.title)
        .bind(event.description.as_deref())
        .bind(event.start_time)
        .bind(event.end_time)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::database("update event"))?;

        updated.ok_or(RepositoryError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::database("delete event"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::database("ping database"))?;
        Ok(())
    }
}

/// Process-local store with the same contract as [`PgEventRepository`].
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<Uuid, Event>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Microsecond precision, matching what PostgreSQL stores.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn list(&self) -> RepositoryResult<Vec<Event>> {
        let mut events: Vec<Event> = self.events.read().await.values().cloned().collect();
        events.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(events)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Event>> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn create(&self, event: NewEvent) -> RepositoryResult<Event> {
        let created_at = now();
        let event = Event {
            id: Uuid::new_v4(),
            title: event.title,
            description: event.description,
            start_time: event.start_time,
            end_time: event.end_time,
            created_at,
            updated_at: created_at,
        };

        self.events.write().await.insert(event.id, event.clone());
        Ok(event)
    }

    async fn update(&self, id: Uuid, event: NewEvent) -> RepositoryResult<Event> {
        let mut events = self.events.write().await;
        let stored = events.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        stored.title = event.title;
        stored.description = event.description;
        stored.start_time = event.start_time;
        stored.end_time = event.end_time;
        stored.updated_at = now().max(stored.updated_at + Duration::microseconds(1));

        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        self.events
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
