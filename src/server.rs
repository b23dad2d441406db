// HTTP surface of the management service
//
// Endpoints:
//   GET  /token               issue a bearer token
//   POST /auth                verify token and admit against the route quota
//   GET  /cache               cacheable registry (initial pull by the cache owner)
//   POST /cache               merge a usage report, echo the merged registry
//   GET  /quotas/{route_key}  current state of one route
//   GET  /health              liveness
//   GET  /metrics             Prometheus text format

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::{AuthDecision, AuthGateway, AuthRequest};
use crate::metrics;
use crate::quota::{CacheUpdate, QuotaEntry, QuotaStore, RouteKind, WindowResetter};
use crate::token::TokenService;

/// Shared state injected into every handler
#[derive(Debug, Clone)]
pub struct AppState {
    gateway: AuthGateway,
    tokens: Arc<TokenService>,
    store: QuotaStore,
    rate_limit_header: u32,
}

impl AppState {
    pub fn new(tokens: Arc<TokenService>, store: QuotaStore, config: &Config) -> Self {
        Self {
            gateway: AuthGateway::new(tokens.clone(), store.clone(), config.server.default_route.clone()),
            tokens,
            store,
            rate_limit_header: config.server.rate_limit_header,
        }
    }

    pub fn store(&self) -> &QuotaStore {
        &self.store
    }
}

/// Build the axum router over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/token", get(issue_token))
        .route("/auth", post(authenticate))
        .route("/cache", get(get_cache).post(post_cache))
        .route("/quotas/{route_key}", get(get_quota))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The management service: HTTP router plus window resetter
pub struct GatekeeperServer {
    config: Config,
    state: AppState,
}

impl GatekeeperServer {
    /// Wire the components described by `config`
    ///
    /// # Errors
    ///
    /// Fails if the signing key cannot be loaded or metrics cannot register.
    pub fn from_config(config: Config) -> Result<Self> {
        metrics::init().context("Failed to initialize metrics")?;

        let tokens = Arc::new(config.token.token_service()?);
        let store = QuotaStore::new(&config.routes);
        let state = AppState::new(tokens, store, &config);

        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server.socket_addr()?;
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve on an existing listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let resetter = WindowResetter::new(self.state.store.clone(), self.config.window.duration()).spawn();

        info!(
            addr = %listener.local_addr().context("Listener has no local address")?,
            verifying_key = %self.state.tokens.verifying_key_hex(),
            "gatekeeper listening"
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error");

        resetter.stop().await;
        info!("gatekeeper stopped");
        result
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::RouteNotFound(_) => (StatusCode::NOT_FOUND, "ROUTE_NOT_FOUND"),
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        };

        let body = Json(json!({
            "status": status.as_u16(),
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

fn status_code(decision: &AuthDecision) -> StatusCode {
    match decision {
        AuthDecision::Admitted { .. } => StatusCode::OK,
        AuthDecision::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        AuthDecision::QuotaReached { .. } => StatusCode::TOO_MANY_REQUESTS,
    }
}

/// Token from an `Authorization: Bearer` header; the scheme name is
/// case-insensitive
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Token endpoint
async fn issue_token(State(state): State<AppState>) -> impl IntoResponse {
    let token = state.tokens.issue();
    metrics::TOKENS_ISSUED_TOTAL.inc();
    debug!("token issued");
    Json(json!({ "token": token }))
}

/// Auth endpoint. An unreadable body is treated as carrying no token, so it
/// ends in a 401 rather than a parse error.
async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = if body.is_empty() {
        AuthRequest::default()
    } else {
        serde_json::from_slice::<AuthRequest>(&body).unwrap_or_else(|e| {
            warn!("unreadable auth request body: {}", e);
            AuthRequest::default()
        })
    };

    let token = request.token.or_else(|| bearer_token(&headers));
    let decision = state
        .gateway
        .authorize(token.as_deref(), request.path.as_deref())
        .await?;

    let body = decision.to_response(state.rate_limit_header);
    Ok((status_code(&decision), Json(body)).into_response())
}

/// Initial cache pull
async fn get_cache(State(state): State<AppState>) -> impl IntoResponse {
    info!("initial cache request received");
    Json(state.store.snapshot_cacheable().await)
}

/// Periodic cache update
async fn post_cache(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, GatewayError> {
    let update: CacheUpdate = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed cache update: {}", e)))?;

    info!(routes = update.reports.len(), "cache update received");
    Ok(Json(state.store.merge_cache_update(&update).await))
}

/// One route as reported by `GET /quotas/{route_key}`
#[derive(Debug, Serialize)]
struct RouteStatus {
    kind: RouteKind,
    #[serde(flatten)]
    entry: QuotaEntry,
}

/// Single route lookup
async fn get_quota(
    State(state): State<AppState>,
    Path(route_key): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let (kind, entry) = state.store.route_status(&route_key).await.map_err(|_| {
        warn!(route = %route_key, "quota lookup for unregistered route");
        GatewayError::RouteNotFound(route_key.clone())
    })?;
    debug!(route = %route_key, kind = kind.as_str(), used = entry.used, "quota lookup");
    Ok(Json(RouteStatus { kind, entry }))
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}
