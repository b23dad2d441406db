// Configuration File Support
//
// This module provides configuration file parsing for the gatekeeper service.
// Supports TOML format with environment variable overrides.
// The file path is passed on the command line; a missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::gateway::DEFAULT_RATE_LIMIT_HEADER;
use crate::quota::{RoutesConfig, WindowConfig, MAX_WINDOW_SECS};
use crate::token::TokenService;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Token signing configuration
    pub token: TokenConfig,

    /// Quota window configuration
    pub window: WindowConfig,

    /// Route tables
    pub routes: RoutesConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:8000`
    pub listen_addr: String,

    /// Value reported as `x-rate-limit-header` in auth responses
    pub rate_limit_header: u32,

    /// Non-cacheable route admitted when an auth request names no path
    pub default_route: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            rate_limit_header: DEFAULT_RATE_LIMIT_HEADER,
            default_route: "baz".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.listen_addr))
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TokenConfig {
    /// Hex-encoded 32-byte Ed25519 seed. When unset a key is generated at
    /// startup and tokens do not survive a restart.
    pub signing_key: Option<String>,
}

impl TokenConfig {
    /// Build the token service, generating a key if none is configured
    pub fn token_service(&self) -> Result<TokenService> {
        match &self.signing_key {
            Some(seed) => TokenService::from_hex_seed(seed).context("Failed to load signing key"),
            None => {
                tracing::warn!("No signing key configured, generating an ephemeral one");
                Ok(TokenService::generate())
            }
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the result fails validation. A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - GATEKEEPER_LOG_LEVEL
    /// - GATEKEEPER_LOG_FORMAT
    /// - GATEKEEPER_LISTEN_ADDR
    /// - GATEKEEPER_WINDOW_SECS
    /// - GATEKEEPER_SIGNING_KEY
    /// - GATEKEEPER_RATE_LIMIT_HEADER
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(level) = var("GATEKEEPER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("GATEKEEPER_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(addr) = var("GATEKEEPER_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(secs) = var("GATEKEEPER_WINDOW_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.window.reset_interval_secs = secs;
            }
        }
        if let Some(key) = var("GATEKEEPER_SIGNING_KEY") {
            self.token.signing_key = Some(key);
        }
        if let Some(header) = var("GATEKEEPER_RATE_LIMIT_HEADER") {
            if let Ok(header) = header.parse::<u32>() {
                self.server.rate_limit_header = header;
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: pretty, compact",
                self.logging.format
            ),
        }

        self.server.socket_addr()?;

        if self.window.reset_interval_secs == 0 {
            anyhow::bail!("Window reset interval must be at least 1 second");
        }
        if self.window.reset_interval_secs > MAX_WINDOW_SECS {
            anyhow::bail!(
                "Window reset interval must be at most {} seconds, got {}",
                MAX_WINDOW_SECS,
                self.window.reset_interval_secs
            );
        }

        self.routes
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid routes: {}", e))?;

        if !self.routes.is_non_cacheable(&self.server.default_route) {
            anyhow::bail!(
                "Default route '{}' must be a non-cacheable route",
                self.server.default_route
            );
        }

        if let Some(seed) = &self.token.signing_key {
            TokenService::from_hex_seed(seed).context("Invalid signing key")?;
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
