use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    response::IntoResponse,
    routing::{get, post},
};
use kitsune_auth::SetVerifier;
use kitsune_storage::DynAccountStorage;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    config::{AppConfig, StorageBackend},
    handlers, middleware as app_middleware, webhook,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: DynAccountStorage,
    pub verifier: Arc<SetVerifier>,
}

impl AppState {
    pub fn new(storage: DynAccountStorage, verifier: SetVerifier) -> Self {
        Self {
            storage,
            verifier: Arc::new(verifier),
        }
    }
}

/// Opens the configured storage backend.
pub async fn create_storage(cfg: &AppConfig) -> anyhow::Result<DynAccountStorage> {
    match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(kitsune_db_memory::create_account_storage())
        }
        StorageBackend::Postgres => {
            tracing::info!(
                pool_size = cfg.storage.postgres.pool_size,
                run_migrations = cfg.storage.postgres.run_migrations,
                "Using PostgreSQL storage"
            );
            Ok(kitsune_db_postgres::create_storage(&cfg.storage.postgres).await?)
        }
    }
}

/// Builds the router over already-constructed state.
pub fn build_router(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let mut router = Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route(
            &cfg.server.webhook_path,
            post(webhook::receive_security_event),
        );

    if cfg.metrics.enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    let trace = TraceLayer::new_for_http()
        .make_span_with(|req: &axum::http::Request<_>| {
            let req_id = req
                .extensions()
                .get::<axum::http::HeaderValue>()
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            tracing::info_span!(
                "http.request",
                http.method = %req.method(),
                http.target = %req.uri(),
                http.status_code = tracing::field::Empty,
                request_id = %req_id
            )
        })
        .on_response(
            |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                span.record(
                    "http.status_code",
                    tracing::field::display(res.status().as_u16()),
                );
                tracing::info!(
                    http.status = %res.status().as_u16(),
                    elapsed_ms = %latency.as_millis(),
                    "request handled"
                );
            },
        );

    router
        .route_layer(middleware::from_fn(app_middleware::track_metrics))
        // Outermost first: request id -> trace -> cors -> body limit
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::request_id))
                .layer(trace)
                .layer(CorsLayer::permissive())
                // `Cors` needs a `Default` response body; erase the limit body type
                .map_response(IntoResponse::into_response)
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
        .with_state(state)
}

/// Builds the full application from configuration: storage, verifier, router.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let storage = create_storage(cfg).await?;
    let verifier = SetVerifier::from_config(&cfg.fxa)?;
    tracing::info!(
        issuer = %cfg.fxa.issuer,
        jwks_url = %verifier.key_set().jwks_url(),
        "Security event verifier configured"
    );
    Ok(build_router(cfg, AppState::new(storage, verifier)))
}

pub struct KitsuneServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<KitsuneServer> {
        if self.config.metrics.enabled {
            crate::metrics::init_metrics();
        }
        let app = build_app(&self.config).await?;

        Ok(KitsuneServer {
            addr: self.addr,
            app,
        })
    }
}

impl KitsuneServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
