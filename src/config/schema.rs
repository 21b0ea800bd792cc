//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the admin
//! service. All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::release::GatewayTarget;

/// Root configuration for the admin control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// HTTP API listener settings.
    pub server: ServerConfig,

    /// Token issuance and the seeded account directory.
    pub auth: AuthConfig,

    /// Where draft and published configuration live.
    pub store: StoreConfig,

    /// Release pipeline and gateway fleet.
    pub release: ReleaseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Admin API listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,

    /// Per-request timeout. Publish requests wait for the release, so this
    /// should exceed `push_timeout_ms * push_attempts`.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body size.
    pub max_body_bytes: usize,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 60,
            max_body_bytes: 1024 * 1024,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. When empty a random one is generated at
    /// startup and tokens do not survive a restart.
    pub jwt_secret: String,

    /// `iss` claim issued and required on every token.
    pub issuer: String,

    /// Lifetime of issued tokens.
    pub token_ttl_secs: u64,

    /// bcrypt work factor for passwords set through the API.
    pub bcrypt_cost: u32,

    /// Accounts allowed to log in.
    pub accounts: Vec<AccountConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "gateway-admin".to_string(),
            token_ttl_secs: 3600,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            accounts: Vec::new(),
        }
    }
}

/// A login account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AccountConfig {
    pub username: String,

    /// bcrypt hash of the password (`gatewayctl hash-password`).
    pub password_hash: String,

    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

/// Configuration store settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Data directory. In-memory only when unset.
    pub data_dir: Option<PathBuf>,

    /// Published versions kept in memory for history queries.
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            history_limit: 32,
        }
    }
}

/// Release pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Deadline for a single push attempt to one target.
    pub push_timeout_ms: u64,

    /// Attempts per target, including the first one.
    pub push_attempts: u32,

    /// Base delay for exponential backoff between attempts.
    pub backoff_base_ms: u64,

    /// Maximum backoff delay.
    pub backoff_max_ms: u64,

    /// Re-push the previous published snapshot to targets that applied a
    /// release that failed elsewhere.
    pub compensate_on_failure: bool,

    /// Release reports kept for status and history queries.
    pub report_history: usize,

    /// Gateway instances receiving pushes. Reloaded without restart.
    pub targets: Vec<GatewayTarget>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            push_timeout_ms: 5_000,
            push_attempts: 3,
            backoff_base_ms: 200,
            backoff_max_ms: 5_000,
            compensate_on_failure: false,
            report_history: 50,
            targets: Vec::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
