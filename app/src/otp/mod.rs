//! One-time codes for phone login. Codes are rate limited per phone number, stored before they are
//! delivered, and claimed with a single conditional update so that a code is accepted at most once
//! even when it is verified concurrently.

use crate::{database::Database, phone::PhoneNumber, worker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};

mod entities;
mod messenger;

pub use entities::{Code, Error, Id, InvalidCode, OtpToken, Policy, CODE_LEN};
pub use messenger::{DispatchError, GatewayMessenger, LogMessenger, Messenger};

#[derive(Clone)]
pub struct Otp {
    policy: Policy,
    messenger: Arc<dyn Messenger>,
}

impl Otp {
    pub fn new(policy: Policy, messenger: Arc<dyn Messenger>) -> Self {
        Self { policy, messenger }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Issues a new code for `phone` and hands it to the messenger without waiting for delivery.
    pub async fn generate(&self, db: &Database, phone: &PhoneNumber) -> Result<OtpToken, Error> {
        let token = self.generate_at(db, phone, Utc::now()).await?;
        messenger::dispatch(
            Arc::clone(&self.messenger),
            token.phone.clone(),
            token.code.clone(),
        );
        Ok(token)
    }

    /// Issues a new code as of `now`, without delivering it.
    ///
    /// Issuance for one phone number is serialized with an advisory lock, so concurrent requests
    /// can't slip past the rate limit together.
    pub async fn generate_at(
        &self,
        db: &Database,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
    ) -> Result<OtpToken, Error> {
        let mut data_tx = db.begin().await?;
        queries::lock_phone(&mut data_tx, phone).await?;

        let window_start = now - self.policy.window;
        let issued = queries::count_issued_since(&mut data_tx, phone, window_start).await?;
        if self.policy.is_exhausted(issued) {
            log::info!("rate limiting OTP requests for {}", phone);
            return Err(Error::RateLimited);
        }

        let purged = queries::delete_spent(&mut *data_tx, Some(phone), now, window_start).await?;
        if purged > 0 {
            log::debug!("purged {} spent OTP tokens for {}", purged, phone);
        }

        let code = Code::generate(&mut rand::thread_rng());
        let token = OtpToken::issue(phone.clone(), code, &self.policy, now);
        queries::insert(&mut data_tx, &token).await?;
        data_tx.commit().await?;
        log::info!("issued OTP {:?} for {}", token.id, phone);
        Ok(token)
    }

    pub async fn verify(
        &self,
        db: &Database,
        phone: &PhoneNumber,
        code: &Code,
    ) -> Result<bool, Error> {
        verify_at(db, phone, code, Utc::now()).await
    }
}

/// Consumes a usable token matching `phone` and `code` as of `now`. Returns false if there is
/// none; a code that was already consumed or has expired is not an error.
pub async fn verify_at(
    db: &Database,
    phone: &PhoneNumber,
    code: &Code,
    now: DateTime<Utc>,
) -> Result<bool, Error> {
    match queries::claim(db, phone, code, now).await? {
        Some(id) => {
            log::info!("OTP {:?} consumed by {}", id, phone);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Removes used and expired tokens of every phone number. Tokens still inside the rate limit
/// window are kept, they count towards the limit. Failures are logged and swallowed.
pub async fn cleanup_expired(db: &Database, policy: &Policy) {
    cleanup_expired_at(db, policy, Utc::now()).await
}

pub async fn cleanup_expired_at(db: &Database, policy: &Policy, now: DateTime<Utc>) {
    match queries::delete_spent(db, None, now, now - policy.window).await {
        Ok(purged) => log::info!("OTP sweep removed {} tokens", purged),
        Err(e) => log::error!("OTP sweep failed: {}", e),
    }
}

pub fn start_sweeper(db: Database, policy: Policy, interval: Duration) {
    worker::start(Sweeper {
        db,
        policy,
        interval,
    });
}

struct Sweeper {
    db: Database,
    policy: Policy,
    interval: Duration,
}

#[async_trait]
impl worker::Worker for Sweeper {
    async fn run(&mut self) {
        cleanup_expired(&self.db, &self.policy).await;
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

mod queries {
    use super::{Code, Id, OtpToken};
    use crate::{
        database::{self, CountRow},
        phone::PhoneNumber,
    };
    use chrono::{DateTime, Utc};
    use sqlx::PgExecutor;
    use uuid::Uuid;

    pub(super) async fn lock_phone(
        data_tx: &mut database::Transaction,
        phone: &PhoneNumber,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(phone.as_str())
            .execute(&mut **data_tx)
            .await?;
        Ok(())
    }

    pub(super) async fn count_issued_since(
        data_tx: &mut database::Transaction,
        phone: &PhoneNumber,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        Ok(sqlx::query_as::<_, CountRow>(
            "SELECT COUNT(*) AS count FROM otp_tokens WHERE phone_number = $1 AND created >= $2",
        )
        .bind(phone.as_str())
        .bind(since)
        .fetch_one(&mut **data_tx)
        .await?
        .count)
    }

    /// Deletes used or expired tokens created before `created_before`, of one phone number or of
    /// all of them.
    pub(super) async fn delete_spent<'e>(
        executor: impl PgExecutor<'e>,
        phone: Option<&PhoneNumber>,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        Ok(sqlx::query(
            r#"DELETE FROM otp_tokens WHERE (is_used OR expires < $1) AND created < $2
                AND ($3::TEXT IS NULL OR phone_number = $3)"#,
        )
        .bind(now)
        .bind(created_before)
        .bind(phone.map(|phone| phone.as_str()))
        .execute(executor)
        .await?
        .rows_affected())
    }

    pub(super) async fn insert(
        data_tx: &mut database::Transaction,
        token: &OtpToken,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO otp_tokens (id, phone_number, code, expires, is_used, created)
                VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(token.id.0)
        .bind(token.phone.as_str())
        .bind(token.code.as_str())
        .bind(token.expires)
        .bind(token.is_used)
        .bind(token.created)
        .execute(&mut **data_tx)
        .await?;
        Ok(())
    }

    /// Marks one usable matching token as used and returns its id. The outer `is_used` condition
    /// is re-checked after waiting on a concurrent claim of the same row, so only one claim wins.
    pub(super) async fn claim<'e>(
        executor: impl PgExecutor<'e>,
        phone: &PhoneNumber,
        code: &Code,
        now: DateTime<Utc>,
    ) -> Result<Option<Id>, sqlx::Error> {
        Ok(sqlx::query_as::<_, (Uuid,)>(
            r#"UPDATE otp_tokens SET is_used = TRUE
                WHERE is_used = FALSE AND id = (
                    SELECT id FROM otp_tokens
                    WHERE phone_number = $1 AND code = $2 AND is_used = FALSE AND expires > $3
                    ORDER BY created DESC LIMIT 1
                )
                RETURNING id"#,
        )
        .bind(phone.as_str())
        .bind(code.as_str())
        .bind(now)
        .fetch_optional(executor)
        .await?
        .map(|(id,)| Id(id)))
    }
}
