//! HS256 session tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthError, Role};
use crate::config::schema::AuthConfig;

/// Ten years.
const MAX_TTL_SECS: u64 = 315_360_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // username
    pub role: Role,
    pub jti: String,  // token id, the revocation key
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl TokenManager {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = if config.jwt_secret.is_empty() {
            tracing::warn!(
                "auth.jwt_secret is not set, using a random secret; sessions will not survive a restart"
            );
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(48)
                .map(char::from)
                .collect()
        } else {
            config.jwt_secret.clone()
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 5;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            ttl: Duration::seconds(config.token_ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    pub fn issue(&self, subject: &str, role: Role) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let token_id = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: subject.to_string(),
            role,
            jti: token_id.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            token_id,
            expires_at,
        })
    }

    /// Check signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = TokenManager::new(&config("top-secret"));
        let issued = tokens.issue("alice", Role::Admin).unwrap();

        let claims = tokens.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.jti, issued.token_id);
        assert_eq!(claims.iss, "gateway-admin");
    }

    #[test]
    fn test_rejects_foreign_and_garbled_tokens() {
        let ours = TokenManager::new(&config("top-secret"));
        let theirs = TokenManager::new(&config("other-secret"));
        let foreign = theirs.issue("mallory", Role::Admin).unwrap();

        assert!(matches!(ours.verify(&foreign.token), Err(AuthError::InvalidToken(_))));
        assert!(matches!(ours.verify("not.a.jwt"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_rejects_expired_tokens() {
        let tokens = TokenManager::new(&config("top-secret"));
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "alice".to_string(),
            role: Role::User,
            jti: "old".to_string(),
            exp: now - 3600,
            iat: now - 7200,
            iss: "gateway-admin".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"top-secret"),
        )
        .unwrap();
        assert!(matches!(tokens.verify(&token), Err(AuthError::Expired)));
    }
}
