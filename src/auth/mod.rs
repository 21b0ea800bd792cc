//! Identity & access.
//!
//! # Data Flow
//! ```text
//! POST /login ──▶ accounts.rs (bcrypt check) ──▶ token.rs (sign HS256)
//! POST /register, /user/password/edit ──▶ accounts.rs (bcrypt hash)
//!
//! Authorization: Bearer <jwt>
//!     → token.rs (signature, issuer, expiry)
//!     → revocation.rs (logged-out token ids)
//!     → Identity
//!     → policy.rs (operation → minimum role)
//! ```
//!
//! # Design Decisions
//! - Authentication and authorization both fail before any store access
//! - The role table is data, not scattered `if` checks

pub mod accounts;
pub mod policy;
pub mod revocation;
pub mod token;

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::AuthConfig;
use crate::error::{AdminError, AdminResult};

pub use accounts::{hash_password, is_bcrypt_hash, Account, AccountDirectory};
pub use policy::{authorize, required_role, Operation};
pub use revocation::RevocationList;
pub use token::{Claims, IssuedToken, TokenManager};

/// Caller roles. `Admin` satisfies everything `User` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Admin => "admin",
        })
    }
}

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingCredentials,

    #[error("authorization header is not a bearer token")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,

    #[error("token has been revoked")]
    Revoked,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("account `{0}` already exists")]
    AccountExists(String),

    #[error("account `{0}` no longer exists")]
    UnknownAccount(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("password {0}")]
    WeakPassword(String),

    #[error("current password does not match")]
    WrongPassword,

    #[error("failed to hash password: {0}")]
    Hashing(String),
}

impl From<AuthError> for AdminError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(msg) | AuthError::Hashing(msg) => AdminError::Internal(msg),
            AuthError::AccountExists(username) => AdminError::AlreadyExists {
                subject: "account".to_string(),
                key: username,
            },
            AuthError::InvalidUsername(msg) => AdminError::invalid_field("account", "username", msg),
            AuthError::WeakPassword(msg) => AdminError::invalid_field("account", "password", msg),
            AuthError::WrongPassword => {
                AdminError::invalid_field("account", "old_password", "does not match the current password")
            }
            other => AdminError::Unauthenticated(other.to_string()),
        }
    }
}

/// Response body of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub token_type: String,
    pub username: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Facade over tokens, revocation, accounts and the role table.
pub struct AccessControl {
    tokens: TokenManager,
    revoked: RevocationList,
    accounts: AccountDirectory,
}

impl AccessControl {
    pub fn new(config: &AuthConfig) -> Self {
        let accounts = AccountDirectory::from_config(&config.accounts, config.bcrypt_cost);
        if accounts.is_empty() {
            tracing::warn!("No accounts configured, nobody can log in");
        } else {
            tracing::info!(accounts = accounts.len(), "Account directory loaded");
        }

        Self {
            tokens: TokenManager::new(config),
            revoked: RevocationList::new(),
            accounts,
        }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let Some(account) = self.accounts.verify(username, password) else {
            tracing::warn!(username, "Login failed");
            return Err(AuthError::InvalidCredentials);
        };

        let issued = self.tokens.issue(&account.username, account.role)?;
        tracing::info!(username, role = %account.role, token_id = %issued.token_id, "Login succeeded");
        Ok(Session {
            token: issued.token,
            token_type: "Bearer".to_string(),
            username: account.username.clone(),
            role: account.role,
            expires_at: issued.expires_at,
        })
    }

    /// Resolve the `Authorization` header value into an identity.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        let header = authorization.ok_or(AuthError::MissingCredentials)?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MalformedHeader)?;

        let claims = self.tokens.verify(token)?;
        if self.revoked.is_revoked(&claims.jti) {
            return Err(AuthError::Revoked);
        }

        Ok(Identity {
            subject: claims.sub,
            role: claims.role,
            token_id: claims.jti,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }

    pub fn authorize(&self, identity: &Identity, operation: Operation) -> AdminResult<()> {
        authorize(identity, operation)
    }

    /// Revoke the caller's token until it expires.
    pub fn logout(&self, identity: &Identity) {
        self.revoked
            .revoke(&identity.token_id, identity.expires_at.timestamp());
        tracing::info!(username = %identity.subject, token_id = %identity.token_id, "Logged out");
    }

    pub fn account(&self, username: &str) -> Option<Account> {
        self.accounts.get(username)
    }

    /// Self-service sign-up. New accounts always get the `user` role.
    pub fn register(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let account = self.accounts.register(username, password)?;
        tracing::info!(username, role = %account.role, "Account registered");
        Ok(account)
    }

    pub fn change_password(
        &self,
        identity: &Identity,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.accounts
            .change_password(&identity.subject, old_password, new_password)
            .inspect_err(|e| tracing::warn!(username = %identity.subject, error = %e, "Password change refused"))?;
        tracing::info!(username = %identity.subject, "Password changed");
        Ok(())
    }

    /// Forget revocations of tokens that have expired on their own.
    pub fn purge_revoked(&self) -> usize {
        self.revoked.purge_expired(Utc::now().timestamp())
    }
}
