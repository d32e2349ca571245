use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::state::{config_from_env, connect, run_migrations_from_env};
use api_rest::{AppState, build_router, shutdown_signal};

/// Crates logged at `info` unless `RUST_LOG` says otherwise.
const LOG_TARGETS: [&str; 3] = ["clinic_run", "clinic_core", "api_rest"];

/// Main entry point for the clinic backend
///
/// Resolves configuration, opens the database pool, applies migrations when enabled and
/// serves the REST API until Ctrl-C or SIGTERM.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `DATABASE_URL`: Postgres connection string (required)
/// - `JWT_SECRET`: token signing secret, at least 32 bytes (required)
/// - `TOKEN_TTL_HOURS`, `CLINIC_STORAGE_DIR`, `DATABASE_MAX_CONNECTIONS`, `MAX_UPLOAD_BYTES`,
///   `VAPID_PRIVATE_KEY`, `VAPID_SUBJECT`, `RUN_MIGRATIONS`: optional
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CLINIC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = config_from_env()?;
    tracing::debug!(?cfg, "configuration loaded");
    let pool = connect(&cfg, run_migrations_from_env()?).await?;
    let app = build_router(AppState::new(pool, cfg)?);

    tracing::info!("++ Starting clinic REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Clinic REST stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_targets_include_this_binary() {
        let own = module_path!().split("::").next().unwrap_or_default();
        assert!(LOG_TARGETS.contains(&own), "{own} is not logged");
        for target in LOG_TARGETS {
            assert!(format!("{target}=info")
                .parse::<tracing_subscriber::filter::Directive>()
                .is_ok());
        }
    }
}
