use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use calendar_api::cli::{Cli, Command};
use calendar_api::config::Config;
use calendar_api::db::{self, Migrator, PgEventRepository, PgUserRepository};
use calendar_api::middleware::{provision_bootstrap_admin, BootstrapOutcome};
use calendar_api::routes::create_routes;
use calendar_api::state::AppState;
use calendar_api::version;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn init_tracing(config: &Config) {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config);

    info!(version = version::VERSION, build = %version::build_info(), "Starting Calendar API");
    config.log_summary();

    let pool = db::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    match cli.command() {
        Command::Migrate => {
            run_migrations(&pool).await?;
        }
        Command::MigrateStatus => {
            print_migration_status(&pool).await?;
        }
        Command::Serve => {
            run_migrations(&pool).await?;
            serve(pool, &config).await?;
        }
    }

    Ok(())
}

async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let report = Migrator::new(pool.clone())
        .run()
        .await
        .context("Failed to run migrations")?;
    info!(applied = report.applied, skipped = report.skipped, "Migrations run successfully");
    Ok(())
}

async fn print_migration_status(pool: &PgPool) -> anyhow::Result<()> {
    let statuses = Migrator::new(pool.clone())
        .status()
        .await
        .context("Failed to read migration status")?;

    for status in statuses {
        let applied_at = status
            .applied_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let checksum = match status.checksum_matches {
            Some(true) => "ok",
            Some(false) => "MISMATCH",
            None => "-",
        };
        println!(
            "{}  {:<8} {:<32} {:<8} {}",
            status.version,
            if status.applied { "applied" } else { "pending" },
            applied_at,
            checksum,
            status.description,
        );
    }
    Ok(())
}

async fn serve(pool: PgPool, config: &Config) -> anyhow::Result<()> {
    let state = AppState::new(
        Arc::new(PgEventRepository::new(pool.clone())),
        Arc::new(PgUserRepository::new(pool.clone())),
        config.auth.clone(),
    );

    let outcome = provision_bootstrap_admin(&state.auth, state.users.as_ref())
        .await
        .context("Failed to set up bootstrap admin user")?;
    info!(outcome = outcome_label(&outcome), "Bootstrap admin checked");

    let app = create_routes(state, config);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    let addr = listener.local_addr()?;
    info!("Server running at http://{}", addr);

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    });
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut handle => {
            result.context("Server task panicked")?.context("Server failed")?;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    info!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Shutting down server");
    shutdown.notify_one();

    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(result) => {
            result.context("Server task panicked")?.context("Server failed")?;
            info!("Server exited cleanly");
        }
        Err(_) => warn!("Graceful shutdown timed out; in-flight requests dropped"),
    }

    pool.close().await;
    Ok(())
}

fn outcome_label(outcome: &BootstrapOutcome) -> &'static str {
    match outcome {
        BootstrapOutcome::Skipped => "skipped",
        BootstrapOutcome::Created(_) => "created",
        BootstrapOutcome::Existing(_) => "existing",
        BootstrapOutcome::KeyMismatch(_) => "key_mismatch",
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
