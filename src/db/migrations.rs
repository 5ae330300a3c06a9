//! Forward-only schema migrations tracked in the `schema_migrations` ledger.
//!
//! Steps are plain data so they can be sorted, checksummed and reported on.
//! Each step runs in its own transaction together with its ledger row, so a
//! version is either fully applied and recorded or not at all.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Executor, FromRow, PgPool};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Version of the step that creates the ledger itself. It is never recorded.
pub const BOOTSTRAP_VERSION: &str = "001";

const LEDGER_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version VARCHAR(255) PRIMARY KEY,
    description VARCHAR(500) NOT NULL,
    applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    checksum VARCHAR(64) NOT NULL
);
"#;

const RECORD_SQL: &str = r#"
INSERT INTO schema_migrations (version, description, applied_at, checksum)
VALUES ($1, $2, NOW(), $3)
ON CONFLICT (version) DO NOTHING
"#;

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: BOOTSTRAP_VERSION,
        description: "Create schema_migrations table",
        sql: LEDGER_DDL,
    },
    Migration {
        version: "002",
        description: "Create events table",
        sql: r#"
CREATE TABLE IF NOT EXISTS events (
    id UUID PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    description TEXT,
    start_time TIMESTAMP WITH TIME ZONE NOT NULL,
    end_time TIMESTAMP WITH TIME ZONE NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    CHECK (end_time > start_time)
);
"#,
    },
    Migration {
        version: "003",
        description: "Create indexes on events table",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_events_start_time ON events(start_time);
CREATE INDEX IF NOT EXISTS idx_events_end_time ON events(end_time);
CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);
"#,
    },
    Migration {
        version: "004",
        description: "Create users table for API authentication",
        sql: r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    username VARCHAR(100) UNIQUE NOT NULL,
    api_key VARCHAR(255) UNIQUE NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
CREATE INDEX IF NOT EXISTS idx_users_api_key ON users(api_key);
"#,
    },
    Migration {
        version: "005",
        description: "Widen events.title to hold escaped titles",
        // Titles are length-checked before HTML escaping, which can grow them up to six-fold.
        sql: r#"
ALTER TABLE events ALTER COLUMN title TYPE TEXT;
"#,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: &'static str,
    pub description: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub fn is_bootstrap(&self) -> bool {
        self.version == BOOTSTRAP_VERSION
    }

    /// Lowercase hex SHA-256 of the SQL body.
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.sql.as_bytes()))
    }
}

/// Every known step, sorted by version regardless of declaration order.
pub fn migrations() -> Vec<Migration> {
    sorted(MIGRATIONS.to_vec())
}

fn sorted(mut migrations: Vec<Migration>) -> Vec<Migration> {
    migrations.sort_by(|a, b| a.version.cmp(b.version));
    migrations
}

/// Steps still to apply, in order. The bootstrap step is never pending once
/// the ledger has been read, because reading it creates the table.
pub fn pending<'a>(migrations: &'a [Migration], applied: &BTreeSet<String>) -> Vec<&'a Migration> {
    migrations
        .iter()
        .filter(|m| !m.is_bootstrap() && !applied.contains(m.version))
        .collect()
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to prepare schema_migrations table: {0}")]
    Ledger(#[source] sqlx::Error),

    #[error("failed to apply migration {version} ({description}): {source}")]
    Apply {
        version: &'static str,
        description: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// A row of the ledger as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct LedgerEntry {
    pub version: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: &'static str,
    pub description: &'static str,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
    /// `None` when there is no stored checksum to compare against.
    pub checksum_matches: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub total: usize,
    pub applied: usize,
    pub skipped: usize,
}

pub struct Migrator {
    pool: PgPool,
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new(pool: PgPool) -> Self {
        Self::with_migrations(pool, migrations())
    }

    pub fn with_migrations(pool: PgPool, migrations: Vec<Migration>) -> Self {
        Self {
            pool,
            migrations: sorted(migrations),
        }
    }

    /// Creates the ledger table if needed. Runs outside any transaction.
    async fn ensure_ledger(&self) -> Result<(), MigrationError> {
        self.pool
            .execute(LEDGER_DDL)
            .await
            .map_err(MigrationError::Ledger)?;
        Ok(())
    }

    /// The ledger contents, ordered by version.
    pub async fn ledger(&self) -> Result<Vec<LedgerEntry>, MigrationError> {
        self.ensure_ledger().await?;

        sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT version, description, applied_at, checksum
            FROM schema_migrations
            ORDER BY version
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(MigrationError::Ledger)
    }

    pub async fn applied_versions(&self) -> Result<BTreeSet<String>, MigrationError> {
        let entries = self.ledger().await?;
        for entry in &entries {
            debug!(
                version = %entry.version,
                description = %entry.description,
                applied_at = %entry.applied_at.to_rfc3339(),
                "Previously applied migration"
            );
        }
        Ok(entries.into_iter().map(|e| e.version).collect())
    }

    /// Runs one step and records it in the same transaction.
    pub async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let fail = |source: sqlx::Error| MigrationError::Apply {
            version: migration.version,
            description: migration.description,
            source,
        };

        info!(
            version = migration.version,
            description = migration.description,
            "Applying migration"
        );
        let started = Instant::now();

        let mut tx = self.pool.begin().await.map_err(fail)?;

        // A plain string runs through the simple query protocol, which
        // accepts multi-statement bodies.
        (&mut *tx).execute(migration.sql).await.map_err(fail)?;

        if !migration.is_bootstrap() {
            sqlx::query(RECORD_SQL)
                .bind(migration.version)
                .bind(migration.description)
                .bind(migration.checksum())
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
        }

        tx.commit().await.map_err(fail)?;

        info!(
            version = migration.version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Migration completed"
        );
        Ok(())
    }

    /// Applies every pending step in version order, stopping at the first failure.
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        info!("Starting database migrations");

        let applied = self.applied_versions().await?;
        let pending = pending(&self.migrations, &applied);

        let report = MigrationReport {
            total: self.migrations.len(),
            applied: pending.len(),
            skipped: self.migrations.len() - pending.len(),
        };
        info!(
            total = report.total,
            pending = report.applied,
            already_applied = report.skipped,
            "Migration plan computed"
        );

        for migration in pending {
            self.apply(migration).await?;
        }

        if report.applied == 0 {
            info!("All migrations are up to date");
        } else {
            info!(applied = report.applied, "Applied pending migrations");
        }
        Ok(report)
    }

    /// Every step with its applied state. Does not apply anything.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>, MigrationError> {
        let ledger: BTreeMap<String, LedgerEntry> = self
            .ledger()
            .await?
            .into_iter()
            .map(|entry| (entry.version.clone(), entry))
            .collect();

        let statuses = self
            .migrations
            .iter()
            .map(|migration| match ledger.get(migration.version) {
                Some(entry) => {
                    let matches = entry.checksum == migration.checksum();
                    if !matches {
                        warn!(
                            version = migration.version,
                            "Stored checksum differs from the current migration body"
                        );
                    }
                    MigrationStatus {
                        version: migration.version,
                        description: migration.description,
                        applied: true,
                        applied_at: Some(entry.applied_at),
                        checksum_matches: Some(matches),
                    }
                }
                None => MigrationStatus {
                    version: migration.version,
                    description: migration.description,
                    applied: migration.is_bootstrap(),
                    applied_at: None,
                    checksum_matches: None,
                },
            })
            .collect();

        Ok(statuses)
    }
}
