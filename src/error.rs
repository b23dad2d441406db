//! Error Types
//!
//! Typed failures for token handling and quota bookkeeping. None of these
//! cross the HTTP boundary as faults; the server maps each one to a status
//! and a JSON body.

/// Token verification failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Missing, malformed or wrongly signed token
    #[error("Invalid token: {0}")]
    Invalid(String),
}

impl AuthError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        AuthError::Invalid(reason.into())
    }
}

/// Signing key could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningKeyError {
    /// Seed is not valid hex
    #[error("Signing key is not valid hex: {0}")]
    InvalidHex(String),

    /// Seed has the wrong size
    #[error("Signing key must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Quota store failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    /// Route key (or path) is not registered where it was looked up
    #[error("Route not found: {0}")]
    NotFound(String),

    /// The route has no quota left in this window
    #[error("Quota exceeded for route {route}: {quota} requests per window")]
    Exceeded { route: String, quota: u64 },
}

/// Failure of an HTTP-facing operation that is not a normal auth decision
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request names a route this service does not know
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// Request body could not be understood
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = QuotaError::Exceeded {
            route: "baz".to_string(),
            quota: 10,
        };
        assert_eq!(
            err.to_string(),
            "Quota exceeded for route baz: 10 requests per window"
        );
        assert_eq!(
            QuotaError::NotFound("qux".to_string()).to_string(),
            "Route not found: qux"
        );

        let err = SigningKeyError::InvalidLength {
            expected: 32,
            actual: 4,
        };
        assert_eq!(err.to_string(), "Signing key must be 32 bytes, got 4");
    }

    #[test]
    fn test_gateway_error_messages() {
        let err = GatewayError::RouteNotFound("/qux".to_string());
        assert_eq!(err.to_string(), "Route not found: /qux");

        let err = GatewayError::InvalidRequest("malformed cache update".to_string());
        assert_eq!(err.to_string(), "Invalid request: malformed cache update");
    }
}
