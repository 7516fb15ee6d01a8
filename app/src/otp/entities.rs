use crate::phone::PhoneNumber;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const CODE_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum Error {
    #[error("too many OTP requests, please wait before requesting another code")]
    RateLimited,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("OTP code must be exactly {} digits", CODE_LEN)]
pub struct InvalidCode;

/// Issuance limits for one-time codes.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// How long a code can be used after it was issued.
    pub ttl: Duration,
    /// At most `max_codes` codes are issued per phone number within this trailing window.
    pub window: Duration,
    pub max_codes: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            window: Duration::minutes(5),
            max_codes: 3,
        }
    }
}

impl Policy {
    pub(crate) fn is_exhausted(&self, issued_in_window: i64) -> bool {
        issued_in_window >= self.max_codes
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Id(pub Uuid);

/// A one-time code: exactly six ASCII digits, leading zeros allowed.
#[derive(Clone, PartialEq, Eq)]
pub struct Code(String);

impl Code {
    /// Draws every digit independently and uniformly.
    pub(crate) fn generate(rng: &mut impl Rng) -> Self {
        Self(
            (0..CODE_LEN)
                .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                .collect(),
        )
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidCode> {
        if raw.len() == CODE_LEN && raw.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(InvalidCode)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Codes are credentials, keep them out of the logs.
impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Code(******)")
    }
}

/// A code issued to a phone number. A token can be consumed at most once, and only before it
/// expires; expiry needs no transition of its own, an expired token is simply never accepted.
#[derive(Debug, Clone)]
pub struct OtpToken {
    pub id: Id,
    pub phone: PhoneNumber,
    pub code: Code,
    pub expires: DateTime<Utc>,
    pub is_used: bool,
    pub created: DateTime<Utc>,
}

impl OtpToken {
    pub(crate) fn issue(phone: PhoneNumber, code: Code, policy: &Policy, now: DateTime<Utc>) -> Self {
        Self {
            id: Id(Uuid::new_v4()),
            phone,
            code,
            expires: now + policy.ttl,
            is_used: false,
            created: now,
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && self.expires > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn generated_codes_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let code = Code::generate(&mut rng);
            assert_eq!(Code::parse(code.as_str()), Ok(code.clone()));
        }
    }

    #[test]
    fn generated_codes_use_every_digit_in_every_position() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [[false; 10]; CODE_LEN];
        for _ in 0..2000 {
            let code = Code::generate(&mut rng);
            for (position, digit) in code.as_str().bytes().enumerate() {
                seen[position][(digit - b'0') as usize] = true;
            }
        }
        assert!(seen.iter().all(|digits| digits.iter().all(|seen| *seen)));
    }

    #[test]
    fn parse_rejects_malformed_codes() {
        assert!(Code::parse("012345").is_ok());
        for raw in ["", "12345", "1234567", "12a456", " 12345", "１２３４５６"] {
            assert_eq!(Code::parse(raw), Err(InvalidCode), "{}", raw);
        }
    }

    #[test]
    fn debug_does_not_leak_the_code() {
        let code = Code::parse("424242").unwrap();
        assert!(!format!("{:?}", code).contains("424242"));
    }

    #[test]
    fn token_expires_exactly_after_ttl() {
        let policy = Policy::default();
        let now = Utc::now();
        let token = OtpToken::issue(
            PhoneNumber::parse("+996700000001").unwrap(),
            Code::parse("123456").unwrap(),
            &policy,
            now,
        );
        assert_eq!(token.expires, now + Duration::minutes(5));
        assert!(token.is_usable(now));
        assert!(token.is_usable(token.expires - Duration::seconds(1)));
        assert!(!token.is_usable(token.expires));
        assert!(!token.is_usable(token.expires + Duration::seconds(1)));
    }

    #[test]
    fn used_token_is_not_usable() {
        let mut token = OtpToken::issue(
            PhoneNumber::parse("+996700000001").unwrap(),
            Code::parse("123456").unwrap(),
            &Policy::default(),
            Utc::now(),
        );
        token.is_used = true;
        assert!(!token.is_usable(token.created));
    }

    #[test]
    fn policy_allows_three_codes_per_window() {
        let policy = Policy::default();
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }
}
