//! Server bootstrap: configuration, the reference `Store`/`CaHandler`
//! implementations, and the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::ca::LocalCa;
use crate::config::{Config, ConfigError};
use crate::error::AcmeError;
use crate::handlers;
use crate::store::memory::InMemoryStore;
use crate::store::{Store, SCHEMA_VERSION};
use crate::util::SigDown;

/// Errors that can abort startup, before any request has been served.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to initialize the server: {0}")]
    Acme(#[from] AcmeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store schema version {found} is incompatible with the server's schema version {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

/// Starts the ACME server.
///
/// - Loads `.env` values and installs the `tracing` subscriber.
/// - Loads configuration (CLI args + JSON file + environment fallbacks).
/// - Builds the reference [`InMemoryStore`] and [`LocalCa`] backends — swap
///   these for real implementations of [`crate::store::Store`] and
///   [`crate::ca::CaHandler`] to run against a real database and CA.
/// - Serves the HTTP surface from [`handlers::routes`], shutting down
///   gracefully on `SIGTERM`/`SIGINT`: in-flight validations and CA calls
///   are allowed to commit before exit.
pub async fn run() -> Result<(), RunError> {
    dotenvy::dotenv().ok();
    crate::util::telemetry::init();

    let config = Config::load()?;
    let store = Arc::new(InMemoryStore::new());

    let found = store.schema_version().await?;
    if found != SCHEMA_VERSION {
        tracing::error!(found, expected = SCHEMA_VERSION, "store schema version mismatch, refusing to start");
        return Err(RunError::SchemaMismatch { found, expected: SCHEMA_VERSION });
    }

    let ca = Arc::new(LocalCa::new()?);
    let state = AppState::new(config.clone(), store, ca)?;
    let app = handlers::routes(state).layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "starting acme server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!(%addr, error = %e, "failed to bind"))?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;

    Ok(())
}
