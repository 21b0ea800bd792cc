//! Revoked token ids, kept until the token would have expired anyway.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct RevocationList {
    /// jti → expiry (unix seconds)
    revoked: DashMap<String, i64>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, token_id: &str, expires_at: i64) {
        self.revoked.insert(token_id.to_string(), expires_at);
    }

    pub fn is_revoked(&self, token_id: &str) -> bool {
        self.revoked.contains_key(token_id)
    }

    /// Drop entries whose token has expired. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.revoked.len())
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}
