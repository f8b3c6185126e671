//! Adpulse server binary.
//!
//! # Configuration
//!
//! - `ADPULSE_PORT` (default 3000)
//! - `ADPULSE_DATABASE_URL` (default `sqlite:adpulse.db?mode=rwc`)
//! - `ADPULSE_GRAPH_URL` (default `https://graph.facebook.com`)
//! - `ADPULSE_GRAPH_VERSION` (default `v18.0`)
//! - `ADPULSE_LEAD_VALUE` (default 50)
//! - `RUST_LOG` for log filtering

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use adpulse::api::{AppState, router};
use adpulse::credentials::CredentialStore;
use adpulse::storage::Storage;
use adpulse::views::{Dashboard, DashboardConfig};

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:adpulse.db?mode=rwc";

fn dashboard_config_from_env() -> DashboardConfig {
    let defaults = DashboardConfig::default();

    DashboardConfig {
        graph_url: env::var("ADPULSE_GRAPH_URL").unwrap_or(defaults.graph_url),
        graph_version: env::var("ADPULSE_GRAPH_VERSION").unwrap_or(defaults.graph_version),
        lead_value: env::var("ADPULSE_LEAD_VALUE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &f64| v.is_finite() && *v >= 0.0)
            .unwrap_or(defaults.lead_value),
        currency: defaults.currency,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Access tokens never reach the logs; credentials print redacted
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("adpulse=info".parse()?))
        .init();

    let port: u16 = env::var("ADPULSE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("ADPULSE_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let config = dashboard_config_from_env();
    info!(
        port,
        db_url = %db_url,
        graph_url = %config.graph_url,
        graph_version = %config.graph_version,
        lead_value = config.lead_value,
        "Starting Adpulse server"
    );

    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    let credentials = CredentialStore::load(storage).await?;
    if !credentials.is_connected().await {
        info!("No saved credentials, waiting for POST /credentials");
    }

    let state = AppState {
        credentials,
        dashboard: Dashboard::new(config),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Adpulse is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
