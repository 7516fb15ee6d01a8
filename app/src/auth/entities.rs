use crate::{hex::Hex, user};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::Digest;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

const SALT_LEN: usize = 16;
const SESSION_TOKEN_LEN: usize = 32;

/// How long an admin session stays valid after login.
pub(crate) fn session_lifetime() -> Duration {
    Duration::hours(12)
}

#[derive(Debug, Error)]
#[error("access denied")]
pub struct AccessDenied;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TokenId(pub Uuid);

/// This grant represents a compile-time proof that the bearer is logged in as an admin. Every
/// privileged operation takes one.
#[derive(Debug)]
pub struct AdminGrant {
    pub token_id: TokenId,
    pub user_id: user::Id,
}

/// A salted SHA256 hash of an admin password, stored as `salt$hash` in hex.
#[derive(Debug, Clone)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub(crate) fn generate(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let salt = Hex::encode(&salt);
        let hash = salted_hash(salt.as_str(), password);
        Self(format!("{}${}", salt.as_str(), hash.as_str()))
    }

    pub(crate) fn from_stored(stored: String) -> Self {
        Self(stored)
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks a password against this hash. The comparison takes the same time no matter where
    /// the hashes differ.
    pub(crate) fn verify(&self, password: &str) -> bool {
        match self.0.split_once('$') {
            Some((salt, expected)) => {
                let actual = salted_hash(salt, password);
                actual.as_str().as_bytes().ct_eq(expected.as_bytes()).into()
            }
            None => false,
        }
    }
}

fn salted_hash(salt: &str, password: &str) -> Hex {
    let mut hasher = sha2::Sha256::new();
    hasher.update(salt);
    hasher.update(password);
    Hex::encode(&hasher.finalize())
}

/// An opaque admin session token. It is handed to the admin once; only its hash is stored.
#[derive(Debug, Clone)]
pub struct SessionToken(String);

impl SessionToken {
    pub(crate) fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(Hex::encode(&bytes).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A hash of the session token.
pub struct TokenHash(Hex);

impl TokenHash {
    /// Plain unsalted SHA-256. Session tokens are 32 random bytes, so a slow or salted hash adds
    /// nothing here, unlike for passwords.
    pub(crate) fn generate(token: &str) -> Self {
        let mut hasher = sha2::Sha256::new();
        hasher.update(token);
        Self(Hex::encode(&hasher.finalize()))
    }

    pub(crate) fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A stored session, joined with the current role of its user.
#[derive(Debug)]
pub(crate) struct Session {
    pub id: TokenId,
    pub user_id: user::Id,
    pub role: user::Role,
    pub expires: DateTime<Utc>,
}

impl Session {
    /// The role is checked on every request, so demoting an admin revokes their sessions.
    pub(crate) fn admin_grant(&self, now: DateTime<Utc>) -> Result<AdminGrant, AccessDenied> {
        if self.expires > now && self.role == user::Role::Admin {
            Ok(AdminGrant {
                token_id: self.id,
                user_id: self.user_id,
            })
        } else {
            Err(AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_only_the_right_password() {
        let hash = PasswordHash::generate("hunter22");
        assert!(hash.verify("hunter22"));
        assert!(!hash.verify("hunter23"));
        assert!(!hash.verify(""));
    }

    #[test]
    fn password_hashes_are_salted() {
        let a = PasswordHash::generate("hunter22");
        let b = PasswordHash::generate("hunter22");
        assert_ne!(a.as_str(), b.as_str());
        assert!(PasswordHash::from_stored(a.as_str().to_owned()).verify("hunter22"));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!PasswordHash::from_stored("plaintext".to_owned()).verify("plaintext"));
    }

    #[test]
    fn session_tokens_are_random() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_eq!(a.as_str().len(), SESSION_TOKEN_LEN * 2);
        assert_ne!(a.as_str(), b.as_str());
        assert_ne!(
            TokenHash::generate(a.as_str()).as_str(),
            TokenHash::generate(b.as_str()).as_str()
        );
    }

    fn session(role: user::Role, expires: DateTime<Utc>) -> Session {
        Session {
            id: TokenId(Uuid::new_v4()),
            user_id: user::Id(Uuid::new_v4()),
            role,
            expires,
        }
    }

    #[test]
    fn admin_grant_requires_live_admin_session() {
        let now = Utc::now();
        let later = now + session_lifetime();
        assert!(session(user::Role::Admin, later).admin_grant(now).is_ok());
        assert!(session(user::Role::Client, later).admin_grant(now).is_err());
        assert!(session(user::Role::Admin, now).admin_grant(now).is_err());
    }
}
