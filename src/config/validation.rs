//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts >= 1)
//! - Detect duplicate accounts and gateway targets
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AdminConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::auth::is_bcrypt_hash;
use crate::config::schema::AdminConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &AdminConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Server
    let server = &config.server;
    if server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("`{}` is not a socket address", server.bind_address),
        ));
    }
    if server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be greater than 0"));
    }
    if let Some(tls) = &server.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("server.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("server.tls.key_path", "must not be empty"));
        }
    }

    // Auth
    let auth = &config.auth;
    if auth.issuer.trim().is_empty() {
        errors.push(ValidationError::new("auth.issuer", "must not be empty"));
    }
    if auth.token_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.token_ttl_secs", "must be greater than 0"));
    }
    if !(4..=31).contains(&auth.bcrypt_cost) {
        errors.push(ValidationError::new("auth.bcrypt_cost", "must be between 4 and 31"));
    }
    let mut usernames = HashSet::new();
    for (i, account) in auth.accounts.iter().enumerate() {
        if account.username.trim().is_empty() {
            errors.push(ValidationError::new(format!("auth.accounts[{i}].username"), "must not be empty"));
        } else if !usernames.insert(account.username.as_str()) {
            errors.push(ValidationError::new(
                format!("auth.accounts[{i}].username"),
                format!("duplicate account `{}`", account.username),
            ));
        }
        if !is_bcrypt_hash(&account.password_hash) {
            errors.push(ValidationError::new(
                format!("auth.accounts[{i}].password_hash"),
                "must be a bcrypt hash",
            ));
        }
    }

    // Store
    if config.store.history_limit == 0 {
        errors.push(ValidationError::new("store.history_limit", "must be at least 1"));
    }

    // Release
    let release = &config.release;
    if release.push_timeout_ms == 0 {
        errors.push(ValidationError::new("release.push_timeout_ms", "must be greater than 0"));
    }
    if release.push_attempts == 0 {
        errors.push(ValidationError::new("release.push_attempts", "must be at least 1"));
    }
    if release.backoff_base_ms > release.backoff_max_ms {
        errors.push(ValidationError::new(
            "release.backoff_base_ms",
            "must not exceed release.backoff_max_ms",
        ));
    }
    if release.report_history == 0 {
        errors.push(ValidationError::new("release.report_history", "must be at least 1"));
    }
    let mut names = HashSet::new();
    for (i, target) in release.targets.iter().enumerate() {
        if target.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("release.targets[{i}].name"), "must not be empty"));
        } else if !names.insert(target.name.as_str()) {
            errors.push(ValidationError::new(
                format!("release.targets[{i}].name"),
                format!("duplicate target `{}`", target.name),
            ));
        }
        if !matches!(target.url.scheme(), "http" | "https") {
            errors.push(ValidationError::new(
                format!("release.targets[{i}].url"),
                "scheme must be http or https",
            ));
        }
    }

    // Observability
    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::config::schema::AccountConfig;
    use crate::release::GatewayTarget;
    use url::Url;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AdminConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AdminConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        config.auth.bcrypt_cost = 2;
        config.auth.accounts = vec![
            AccountConfig {
                username: "ops".to_string(),
                password_hash: "abc".to_string(),
                role: Role::Admin,
            },
            AccountConfig {
                username: "ops".to_string(),
                password_hash: "$2b$04$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW".to_string(),
                role: Role::User,
            },
        ];
        let target = GatewayTarget {
            name: "edge".to_string(),
            url: Url::parse("ftp://edge:21").unwrap(),
        };
        config.release.targets = vec![target.clone(), target];
        config.observability.log_level = "loud".to_string();

        let fields: Vec<String> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "auth.bcrypt_cost",
                "auth.accounts[0].password_hash",
                "auth.accounts[1].username",
                "release.targets[0].url",
                "release.targets[1].name",
                "release.targets[1].url",
                "observability.log_level",
            ]
        );
    }
}
