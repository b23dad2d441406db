//! Auth Gateway
//!
//! Makes the single admission decision for one protected request:
//!
//! ```text
//! Received ──verify token──▶ TokenChecked ──admit route──▶ QuotaChecked
//!    │                                                        │
//!    └─ invalid ─▶ Rejected(401)              exceeded ─▶ Rejected(429)
//!                                             admitted ─▶ Admitted(200)
//! ```
//!
//! A rejected token never reaches the quota store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AuthError, GatewayError, QuotaError};
use crate::metrics;
use crate::quota::{QuotaEntry, QuotaStore};
use crate::token::TokenService;

/// Default informational value reported as `x-rate-limit-header`
pub const DEFAULT_RATE_LIMIT_HEADER: u32 = 20;

pub const MESSAGE_AUTHENTICATED: &str = "Authenticated";
pub const MESSAGE_UNAUTHENTICATED: &str = "Unauthenticated";
pub const MESSAGE_QUOTA_REACHED: &str = "Service quota reached";

/// Body of an auth request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Bearer token; may instead arrive in the `Authorization` header
    #[serde(default)]
    pub token: Option<String>,

    /// Upstream path being accessed; defaults to the protected route
    #[serde(default)]
    pub path: Option<String>,
}

/// Body of an auth response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub status: u16,
    pub message: String,
    #[serde(
        rename = "x-rate-limit-header",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rate_limit_header: Option<u32>,
}

/// Terminal state of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Token valid and one unit of quota taken
    Admitted { route: String, entry: QuotaEntry },
    /// Token missing or invalid; quota untouched
    Unauthenticated(AuthError),
    /// Token valid but the route's window is used up
    QuotaReached { route: String, quota: u64 },
}

impl AuthDecision {
    /// HTTP status for this decision
    pub fn status(&self) -> u16 {
        match self {
            AuthDecision::Admitted { .. } => 200,
            AuthDecision::Unauthenticated(_) => 401,
            AuthDecision::QuotaReached { .. } => 429,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthDecision::Admitted { .. } => MESSAGE_AUTHENTICATED,
            AuthDecision::Unauthenticated(_) => MESSAGE_UNAUTHENTICATED,
            AuthDecision::QuotaReached { .. } => MESSAGE_QUOTA_REACHED,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, AuthDecision::Admitted { .. })
    }

    fn outcome(&self) -> &'static str {
        match self {
            AuthDecision::Admitted { .. } => "admitted",
            AuthDecision::Unauthenticated(_) => "unauthenticated",
            AuthDecision::QuotaReached { .. } => "quota_reached",
        }
    }

    /// Response body; the quota rejection carries no rate-limit header
    pub fn to_response(&self, rate_limit_header: u32) -> AuthResponse {
        let header = match self {
            AuthDecision::QuotaReached { .. } => None,
            _ => Some(rate_limit_header),
        };

        AuthResponse {
            status: self.status(),
            message: self.message().to_string(),
            rate_limit_header: header,
        }
    }
}

/// Verifies tokens and admits requests against non-cacheable quotas
#[derive(Debug, Clone)]
pub struct AuthGateway {
    tokens: Arc<TokenService>,
    store: QuotaStore,
    default_route: String,
}

impl AuthGateway {
    pub fn new(tokens: Arc<TokenService>, store: QuotaStore, default_route: impl Into<String>) -> Self {
        Self {
            tokens,
            store,
            default_route: default_route.into(),
        }
    }

    /// Decide one request.
    ///
    /// Returns `Err` only when the request resolves to no non-cacheable route,
    /// which points at a configuration mismatch between proxy and service.
    pub async fn authorize(
        &self,
        token: Option<&str>,
        path: Option<&str>,
    ) -> Result<AuthDecision, GatewayError> {
        let request_id = Uuid::new_v4();
        let timer = metrics::AUTH_DURATION_SECONDS.start_timer();

        // Received -> TokenChecked
        if let Err(e) = self.tokens.verify(token.unwrap_or_default()) {
            warn!(%request_id, error = %e, "token authentication failed");
            return Ok(self.finish(AuthDecision::Unauthenticated(e), timer));
        }

        // TokenChecked -> QuotaChecked
        let route = match path {
            Some(path) => self
                .store
                .non_cacheable_route_for_path(path)
                .await
                .map_err(|_| {
                    error!(%request_id, path, "no non-cacheable route is registered for path");
                    metrics::AUTH_DECISIONS_TOTAL
                        .with_label_values(&["route_not_found"])
                        .inc();
                    GatewayError::RouteNotFound(path.to_string())
                })?,
            None => self.default_route.clone(),
        };

        let decision = match self.store.admit(&route).await {
            Ok(entry) => {
                info!(%request_id, route = %route, used = entry.used, quota = entry.quota, "request authenticated");
                AuthDecision::Admitted { route, entry }
            }
            Err(QuotaError::Exceeded { route, quota }) => {
                info!(%request_id, route = %route, quota, "service quota reached");
                AuthDecision::QuotaReached { route, quota }
            }
            Err(QuotaError::NotFound(route)) => {
                error!(%request_id, route = %route, "protected route is not registered as non-cacheable");
                metrics::AUTH_DECISIONS_TOTAL
                    .with_label_values(&["route_not_found"])
                    .inc();
                return Err(GatewayError::RouteNotFound(route));
            }
        };

        Ok(self.finish(decision, timer))
    }

    fn finish(&self, decision: AuthDecision, timer: prometheus::HistogramTimer) -> AuthDecision {
        timer.observe_duration();
        metrics::AUTH_DECISIONS_TOTAL
            .with_label_values(&[decision.outcome()])
            .inc();
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::RoutesConfig;

    fn gateway() -> (AuthGateway, Arc<TokenService>, QuotaStore) {
        let tokens = Arc::new(TokenService::generate());
        let store = QuotaStore::new(&RoutesConfig::default());
        let gateway = AuthGateway::new(tokens.clone(), store.clone(), "baz");
        (gateway, tokens, store)
    }

    #[tokio::test]
    async fn test_valid_token_admitted() {
        let (gateway, tokens, store) = gateway();
        let token = tokens.issue();

        let decision = gateway.authorize(Some(token.as_str()), None).await.unwrap();

        assert!(decision.is_admitted());
        assert_eq!(decision.status(), 200);
        assert_eq!(decision.message(), "Authenticated");
        assert_eq!(store.get("baz").await.unwrap().used, 1);
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let (gateway, _, store) = gateway();

        let decision = gateway.authorize(None, None).await.unwrap();

        assert!(matches!(decision, AuthDecision::Unauthenticated(_)));
        assert_eq!(decision.status(), 401);
        assert_eq!(store.get("baz").await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_tampered_token_leaves_usage() {
        let (gateway, tokens, store) = gateway();
        let mut token = tokens.issue().into_string();
        token.insert(5, 'x');

        for _ in 0..3 {
            let decision = gateway.authorize(Some(&token), Some("/baz")).await.unwrap();
            assert_eq!(decision.status(), 401);
        }

        for key in ["foo", "bar", "baz"] {
            assert_eq!(store.get(key).await.unwrap().used, 0);
        }
    }

    #[tokio::test]
    async fn test_quota_scenario() {
        let (gateway, tokens, store) = gateway();
        let token = tokens.issue();

        for _ in 0..10 {
            let decision = gateway.authorize(Some(token.as_str()), Some("/baz")).await.unwrap();
            assert_eq!(decision.status(), 200);
        }

        let decision = gateway.authorize(Some(token.as_str()), Some("/baz")).await.unwrap();
        assert_eq!(
            decision,
            AuthDecision::QuotaReached {
                route: "baz".to_string(),
                quota: 10
            }
        );
        assert_eq!(decision.message(), "Service quota reached");

        store.reset_all().await;

        let decision = gateway.authorize(Some(token.as_str()), None).await.unwrap();
        assert!(decision.is_admitted());
    }

    #[tokio::test]
    async fn test_unknown_path_is_an_error() {
        let (gateway, tokens, _) = gateway();
        let token = tokens.issue();

        let result = gateway.authorize(Some(token.as_str()), Some("/qux")).await;
        assert!(matches!(result, Err(GatewayError::RouteNotFound(ref p)) if p == "/qux"));

        // Cacheable paths are enforced by the cache owner, not here
        let result = gateway.authorize(Some(token.as_str()), Some("/foo")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_misconfigured_default_route() {
        let tokens = Arc::new(TokenService::generate());
        let store = QuotaStore::new(&RoutesConfig::default());
        let gateway = AuthGateway::new(tokens.clone(), store, "foo");

        let result = gateway.authorize(Some(tokens.issue().as_str()), None).await;
        assert!(matches!(result, Err(GatewayError::RouteNotFound(_))));
    }

    #[test]
    fn test_response_bodies() {
        let admitted = AuthDecision::Admitted {
            route: "baz".to_string(),
            entry: QuotaEntry::new("/baz", 10),
        };
        assert_eq!(
            serde_json::to_value(admitted.to_response(20)).unwrap(),
            serde_json::json!({"status": 200, "message": "Authenticated", "x-rate-limit-header": 20})
        );

        let rejected = AuthDecision::Unauthenticated(AuthError::invalid("bad"));
        assert_eq!(
            serde_json::to_value(rejected.to_response(20)).unwrap(),
            serde_json::json!({"status": 401, "message": "Unauthenticated", "x-rate-limit-header": 20})
        );

        let reached = AuthDecision::QuotaReached {
            route: "baz".to_string(),
            quota: 10,
        };
        assert_eq!(
            serde_json::to_value(reached.to_response(20)).unwrap(),
            serde_json::json!({"status": 429, "message": "Service quota reached"})
        );
    }
}
