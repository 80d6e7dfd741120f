//! storefront-api: HTTP and WebSocket API of the cosmetics storefront.
//!
//! - Auth: email/password or Google ID tokens, exchanged for JWT access and
//!   refresh tokens. `X-Debug-User` impersonation when AUTH_DEBUG_HEADER is on.
//! - Storage: in-memory (default) or SQLite (file) when the `sqlite` feature is enabled.
//! - Chat: REST history plus a room-based relay on `/ws/chat`.
//! - CORS: configurable via CORS_ALLOW_ORIGIN for the shop and admin frontends.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! JWT_SECRET=change-me-change-me cargo run -p storefront-api
//!
//! # persistent storage
//! STORAGE_PROVIDER=sqlite DB_PATH=data/storefront.db \
//! JWT_SECRET=change-me-change-me cargo run -p storefront-api
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod auth;
mod config;
mod dto;
mod error;
mod extract;
mod hub;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use domain::adapters::memory_repo::InMemoryStore;
use domain::Store;
use google_auth::GoogleVerifier;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::auth::{BcryptHasher, DEBUG_USER_HEADER};
use crate::config::{Config, LogFormat, StorageProvider};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let store = match build_store(&cfg) {
        Ok(store) => store,
        Err(e) => {
            error!(err = %e, "storage unavailable");
            std::process::exit(1);
        }
    };
    let google = cfg.google_oauth_client_id.as_ref().map(|client_id| {
        GoogleVerifier::new(client_id.clone())
            .with_hosted_domain(cfg.google_hosted_domain.clone())
            .insecure_skip_signature(cfg.insecure_skip_signature)
    });
    if google.is_none() {
        info!("GOOGLE_OAUTH_CLIENT_ID not set; Google sign-in disabled");
    }
    let state = AppState::new(&cfg, store, Arc::new(BcryptHasher::default()), google);

    let app = with_layers(routes::router(state), &cfg);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "storefront-api listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn with_layers(app: Router, cfg: &Config) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    let app = app
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(DEBUG_USER_HEADER),
            ])
    };
    app.layer(cors)
}

fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Pick the store from config and feature flags. A store that cannot be opened
// is fatal rather than silently swapped for an empty in-memory one.
fn build_store(cfg: &Config) -> Result<Arc<dyn Store>, String> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        StorageProvider::Sqlite => {
            let repo = sqlite_adapter::SqliteRepo::new(&cfg.db_path).map_err(|e| {
                format!("failed to open sqlite store at {}: {}", cfg.db_path.display(), e)
            })?;
            info!(path = %cfg.db_path.display(), "using sqlite store");
            Ok(Arc::new(repo))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageProvider::Sqlite => {
            Err("STORAGE_PROVIDER=sqlite but the server was built without the `sqlite` feature".into())
        }
        StorageProvider::Memory => {
            info!("using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testkit;

    #[test]
    fn memory_store_is_the_default() {
        let cfg = testkit::config();
        assert_eq!(cfg.storage_provider, StorageProvider::Memory);
        assert!(build_store(&cfg).is_ok());
    }

    #[test]
    fn unopenable_sqlite_store_is_an_error() {
        // A regular file where the database directory should be.
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = testkit::config();
        cfg.storage_provider = StorageProvider::Sqlite;
        cfg.db_path = blocker.path().join("storefront.db");
        assert!(build_store(&cfg).is_err());
    }
}
