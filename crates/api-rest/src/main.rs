//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the clinic REST API on its own.
//!
//! ## Intended use
//! Handy during development when only the HTTP surface (with OpenAPI/Swagger UI) is needed.
//! The workspace's main `clinic-run` binary starts the same server.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::state::{config_from_env, connect, run_migrations_from_env};
use api_rest::{build_router, shutdown_signal, AppState};

/// Main entry point for the clinic REST API server
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `DATABASE_URL`, `JWT_SECRET`: required
/// - `RUN_MIGRATIONS`: apply embedded migrations at startup (default: true)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - configuration is missing or invalid,
/// - the database is unreachable or a migration fails,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CLINIC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = config_from_env()?;
    tracing::debug!(?cfg, "configuration loaded");
    let pool = connect(&cfg, run_migrations_from_env()?).await?;
    let app = build_router(AppState::new(pool, cfg)?);

    tracing::info!("-- Starting clinic REST API on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
