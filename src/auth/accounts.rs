//! Accounts seeded from configuration.
//!
//! Registrations and password changes made through the API live in memory
//! only; the configuration file is what a restart comes back to.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::{AuthError, Role};
use crate::config::schema::AccountConfig;

pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt ignores input past this length.
pub const MAX_PASSWORD_BYTES: usize = 72;

const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub username: String,
    pub role: Role,
    #[serde(skip)]
    password_hash: String,
}

#[derive(Debug)]
pub struct AccountDirectory {
    accounts: DashMap<String, Account>,
    cost: u32,
}

impl AccountDirectory {
    /// `cost` is the bcrypt work factor for passwords set at runtime.
    pub fn from_config(accounts: &[AccountConfig], cost: u32) -> Self {
        let accounts = accounts
            .iter()
            .map(|a| {
                (
                    a.username.clone(),
                    Account {
                        username: a.username.clone(),
                        role: a.role,
                        password_hash: a.password_hash.clone(),
                    },
                )
            })
            .collect();
        Self { accounts, cost }
    }

    pub fn get(&self, username: &str) -> Option<Account> {
        self.accounts.get(username).map(|entry| entry.value().clone())
    }

    /// The account, if `password` matches its stored hash.
    pub fn verify(&self, username: &str, password: &str) -> Option<Account> {
        let account = self.get(username)?;
        password_matches(&account, password).then_some(account)
    }

    /// Create a `user` account.
    pub fn register(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        validate_username(username)?;
        validate_password(password)?;
        if self.accounts.contains_key(username) {
            return Err(AuthError::AccountExists(username.to_string()));
        }
        // Hash outside the shard lock.
        let password_hash = hash_password(password, self.cost)?;

        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AuthError::AccountExists(username.to_string())),
            Entry::Vacant(slot) => {
                let account = Account {
                    username: username.to_string(),
                    role: Role::User,
                    password_hash,
                };
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    /// Replace the password of `username` after checking the current one.
    pub fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password)?;
        let current = self
            .get(username)
            .ok_or_else(|| AuthError::UnknownAccount(username.to_string()))?;
        if !password_matches(&current, old_password) {
            return Err(AuthError::WrongPassword);
        }
        let password_hash = hash_password(new_password, self.cost)?;

        let mut entry = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| AuthError::UnknownAccount(username.to_string()))?;
        // Changed by someone else since the check.
        if entry.password_hash != current.password_hash {
            return Err(AuthError::WrongPassword);
        }
        entry.password_hash = password_hash;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// bcrypt hash of `password` at work factor `cost`.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Shape check for a stored bcrypt hash (`$2b$12$` + 53 characters).
pub fn is_bcrypt_hash(hash: &str) -> bool {
    let Some(rest) = ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .find_map(|prefix| hash.strip_prefix(prefix))
    else {
        return false;
    };
    let Some((cost, salt_and_hash)) = rest.split_once('$') else {
        return false;
    };
    cost.len() == 2
        && cost.chars().all(|c| c.is_ascii_digit())
        && salt_and_hash.len() == 53
        && salt_and_hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '/')
}

fn password_matches(account: &Account, password: &str) -> bool {
    bcrypt::verify(password, &account.password_hash).unwrap_or_else(|e| {
        tracing::warn!(username = %account.username, error = %e, "Stored password hash is unusable");
        false
    })
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(AuthError::InvalidUsername(format!(
            "must be 1 to {MAX_USERNAME_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AuthError::InvalidUsername(
            "may only contain letters, digits, `-`, `_` and `.`".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(format!(
            "must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::WeakPassword(format!(
            "must not exceed {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    fn directory() -> AccountDirectory {
        AccountDirectory::from_config(
            &[AccountConfig {
                username: "ops".to_string(),
                password_hash: hash_password("hunter2-long", COST).unwrap(),
                role: Role::Admin,
            }],
            COST,
        )
    }

    #[test]
    fn test_verify() {
        let directory = directory();
        assert_eq!(directory.verify("ops", "hunter2-long").map(|a| a.role), Some(Role::Admin));
        assert!(directory.verify("ops", "hunter3-long").is_none());
        assert!(directory.verify("nobody", "hunter2-long").is_none());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_hash_shape() {
        let hash = hash_password("correct horse", COST).unwrap();
        assert!(is_bcrypt_hash(&hash), "{hash}");
        assert!(is_bcrypt_hash("$2a$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW"));
        assert!(!is_bcrypt_hash("8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918"));
        assert!(!is_bcrypt_hash("$2b$1$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW"));
    }

    #[test]
    fn test_register_defaults_to_user_and_rejects_duplicates() {
        let directory = directory();
        let account = directory.register("newcomer", "first-password").unwrap();
        assert_eq!(account.role, Role::User);
        assert_eq!(
            directory.verify("newcomer", "first-password").map(|a| a.role),
            Some(Role::User)
        );

        assert!(matches!(
            directory.register("newcomer", "other-password"),
            Err(AuthError::AccountExists(name)) if name == "newcomer"
        ));
        assert!(matches!(
            directory.register("ops", "other-password"),
            Err(AuthError::AccountExists(_))
        ));
        // The seeded admin is untouched.
        assert_eq!(directory.verify("ops", "hunter2-long").map(|a| a.role), Some(Role::Admin));
    }

    #[test]
    fn test_register_validates_input() {
        let directory = directory();
        assert!(matches!(
            directory.register("", "long-enough"),
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            directory.register("with space", "long-enough"),
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            directory.register("shorty", "short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            directory.register("verbose", &"x".repeat(MAX_PASSWORD_BYTES + 1)),
            Err(AuthError::WeakPassword(_))
        ));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_change_password() {
        let directory = directory();
        assert!(matches!(
            directory.change_password("ops", "not-the-password", "brand-new-pass"),
            Err(AuthError::WrongPassword)
        ));
        assert!(directory.verify("ops", "hunter2-long").is_some());

        directory
            .change_password("ops", "hunter2-long", "brand-new-pass")
            .unwrap();
        assert!(directory.verify("ops", "hunter2-long").is_none());
        assert_eq!(directory.verify("ops", "brand-new-pass").map(|a| a.role), Some(Role::Admin));

        assert!(matches!(
            directory.change_password("ops", "brand-new-pass", "tiny"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            directory.change_password("ghost", "whatever-pass", "brand-new-pass"),
            Err(AuthError::UnknownAccount(_))
        ));
    }
}
