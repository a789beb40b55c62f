// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the message mirror.
//!
//! Configuration is resolved once at startup by [`MirrorConfig::load`] and
//! handed to [`MirrorService::from_config()`](crate::MirrorService::from_config).
//! It is never re-read mid-request.
//!
//! # Configuration Structure
//!
//! ```text
//! MirrorConfig
//! ├── database: DatabaseConfig      # SQLite message store + commit ledger
//! ├── registry: RegistryConfig      # JSON document of repository targets
//! ├── remote: RemoteConfig          # Repository content service (GitHub)
//! ├── server: ServerConfig          # HTTP bind address
//! └── list: ListConfig              # Feed paging limits
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "database": { "sqlite_path": "/var/lib/msgmirror/chat.db" },
//!   "registry": { "path": "/etc/msgmirror/repositories.json" },
//!   "remote": { "request_timeout": "5s", "rate_limit_per_sec": 10 },
//!   "server": { "bind_addr": "0.0.0.0:8000" }
//! }
//! ```
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `MIRROR_CONFIG` | Path of the JSON config file |
//! | `MIRROR_DATABASE_PATH` | Overrides `database.sqlite_path` |
//! | `MIRROR_REGISTRY_PATH` | Overrides `registry.path` |
//! | `MIRROR_BIND_ADDR` | Overrides `server.bind_addr` |
//! | `GITHUB_API_URL` | Overrides `remote.api_base_url` |
//! | `GITHUB_TOKEN` | Bearer credential (required for remote calls) |

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the bearer credential.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub list: ListConfig,
}

impl MirrorConfig {
    /// Load configuration from `MIRROR_CONFIG` (if set), apply environment
    /// overrides and resolve the credential from `GITHUB_TOKEN`.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("MIRROR_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a JSON config file. Missing sections take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            MirrorError::Config(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MIRROR_DATABASE_PATH") {
            self.database.sqlite_path = v;
        }
        if let Some(v) = lookup("MIRROR_REGISTRY_PATH") {
            self.registry.path = v;
        }
        if let Some(v) = lookup("MIRROR_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("GITHUB_API_URL") {
            self.remote.api_base_url = v;
        }
        if let Some(v) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.remote.token = Some(v);
        }
    }

    /// Minimal config for tests: in-memory database, registry under `dir`.
    pub fn for_testing(dir: impl AsRef<Path>) -> Self {
        Self {
            database: DatabaseConfig::in_memory(),
            registry: RegistryConfig {
                path: dir.as_ref().join("repositories.json").to_string_lossy().to_string(),
            },
            remote: RemoteConfig {
                token: Some("test-token".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DatabaseConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Local SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (`:memory:` for tests).
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_sqlite_path() -> String {
    "database/chat.db".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            wal_mode: true,
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RegistryConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the repository target document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: String,
}

fn default_registry_path() -> String {
    "config/repositories.json".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RemoteConfig: repository content service
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings for talking to the repository content service.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the hosting API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer credential. Never serialized; resolved from `GITHUB_TOKEN`.
    #[serde(skip)]
    pub token: Option<String>,

    /// Per-call timeout as a duration string (e.g., "10s").
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Sustained remote calls per second across all repositories.
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    /// Maximum remote calls in flight at once.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Recent calls a repository's circuit judges its failure rate over.
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// How long an open circuit rejects calls (seconds).
    #[serde(default = "default_circuit_reset_timeout")]
    pub circuit_reset_timeout_sec: u64,

    /// Maximum messages a single push replicates per repository.
    #[serde(default = "default_push_batch_limit")]
    pub push_batch_limit: u32,
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout() -> String {
    "10s".to_string()
}

fn default_user_agent() -> String {
    concat!("msgmirror/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_rate_limit_per_sec() -> u32 {
    20
}

fn default_rate_limit_burst() -> u32 {
    40
}

fn default_max_concurrent_calls() -> usize {
    16
}

fn default_circuit_failure_threshold() -> u32 {
    5
}

fn default_circuit_reset_timeout() -> u64 {
    30
}

fn default_push_batch_limit() -> u32 {
    500
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token: None,
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            rate_limit_burst: default_rate_limit_burst(),
            max_concurrent_calls: default_max_concurrent_calls(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_reset_timeout_sec: default_circuit_reset_timeout(),
            push_batch_limit: default_push_batch_limit(),
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_base_url", &self.api_base_url)
            .field("token", &self.token.as_deref().map(mask_secret))
            .field("request_timeout", &self.request_timeout)
            .field("user_agent", &self.user_agent)
            .field("rate_limit_per_sec", &self.rate_limit_per_sec)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field("max_concurrent_calls", &self.max_concurrent_calls)
            .field("circuit_failure_threshold", &self.circuit_failure_threshold)
            .field("circuit_reset_timeout_sec", &self.circuit_reset_timeout_sec)
            .field("push_batch_limit", &self.push_batch_limit)
            .finish()
    }
}

impl RemoteConfig {
    /// Parse the request_timeout string to a Duration.
    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// The bearer credential, or a configuration error if none was supplied.
    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                MirrorError::Config(format!(
                    "{} not found in environment; set it in .env or the process environment",
                    TOKEN_ENV
                ))
            })
    }

    /// Rate limit settings for the shared remote-call limiter.
    pub fn rate_limit_config(&self) -> crate::resilience::RateLimitConfig {
        crate::resilience::RateLimitConfig {
            burst_size: self.rate_limit_burst,
            refill_rate: self.rate_limit_per_sec,
        }
    }

    /// Circuit breaker settings applied to each repository.
    pub fn circuit_config(&self) -> crate::circuit_breaker::CircuitConfig {
        crate::circuit_breaker::CircuitConfig {
            failure_threshold: self.circuit_failure_threshold,
            recovery_timeout: Duration::from_secs(self.circuit_reset_timeout_sec),
            ..Default::default()
        }
    }
}

/// Mask a secret for display: first four characters, the rest as `*`.
pub fn mask_secret(value: &str) -> String {
    let len = value.chars().count();
    if len > 4 {
        let head: String = value.chars().take(4).collect();
        format!("{}{}", head, "*".repeat(len - 4))
    } else {
        "****".to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ServerConfig / ListConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Feed paging limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_list_limit")]
    pub default_limit: u32,

    #[serde(default = "default_max_list_limit")]
    pub max_limit: u32,
}

fn default_list_limit() -> u32 {
    100
}

fn default_max_list_limit() -> u32 {
    1000
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: default_list_limit(),
            max_limit: default_max_list_limit(),
        }
    }
}

impl ListConfig {
    /// Resolve a requested page size against the configured limits.
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
