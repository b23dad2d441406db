//! Gatekeeper Library
//!
//! Management side of an API gateway: issues and verifies bearer tokens,
//! enforces per-route request quotas over fixed windows, and reconciles
//! usage reported by an external cache owner.

pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod quota;
pub mod server;
pub mod token;

pub use config::Config;
pub use error::{AuthError, GatewayError, QuotaError, SigningKeyError};
pub use gateway::{AuthDecision, AuthGateway, AuthRequest, AuthResponse};
pub use quota::{CacheUpdate, QuotaEntry, QuotaStore, WindowResetter};
pub use server::{AppState, GatekeeperServer};
pub use token::{Token, TokenService};
