//! The cashback ledger: an append-only log of balance changes, and the balance it adds up to.
//! There are two operations on it: accruals, which credit cashback, and deductions, which debit
//! it. Both read the balance, update it, and append an [`Entry`] inside one database transaction.
//! The update only succeeds if nobody changed the balance since it was read; otherwise the whole
//! transaction is retried, so concurrent changes to one user are serialized without lost updates.

use crate::{
    concurrency,
    database::Database,
    money::Tenths,
    user, QueryRange,
};
use std::time::Duration;
use thiserror::Error;

mod entities;

pub use entities::{Balance, Charge, Entry, Id, InsufficientBalance, Stats, DEDUCTION_PRODUCT_ID};

#[derive(Debug, Error)]
pub enum Error {
    #[error("user not found")]
    UserNotFound,
    #[error("amount must be a positive number")]
    InvalidAmount,
    #[error("{0}")]
    InsufficientBalance(#[from] InsufficientBalance),
    #[error("{0:?}")]
    ConcurrencyConflict(#[from] concurrency::ConflictError),
    #[error("{0}")]
    DeadlineExceeded(#[from] concurrency::DeadlineExceeded),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Upper bound for one balance change, retries included.
    pub deadline: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(5),
        }
    }
}

/// Credits `amount` to the user. A zero amount still leaves an entry behind.
pub async fn accrue(
    db: &Database,
    policy: &Policy,
    user_id: user::Id,
    amount: Tenths,
    charge: Charge,
) -> Result<Entry, Error> {
    if amount.is_negative() {
        return Err(Error::InvalidAmount);
    }
    apply(db, policy, user_id, amount, charge).await
}

/// Debits `amount` from the user, failing without any effect if the balance would go negative.
pub async fn deduct(
    db: &Database,
    policy: &Policy,
    user_id: user::Id,
    amount: Tenths,
    reason: Option<String>,
) -> Result<Entry, Error> {
    if !amount.is_positive() {
        return Err(Error::InvalidAmount);
    }
    apply(db, policy, user_id, -amount, Charge::deduction(reason)).await
}

async fn apply(
    db: &Database,
    policy: &Policy,
    user_id: user::Id,
    amount: Tenths,
    charge: Charge,
) -> Result<Entry, Error> {
    concurrency::with_deadline(
        policy.deadline,
        concurrency::retry_loop(|| async {
            let mut data_tx = db.begin().await?;
            let mut balance = queries::get_balance(&mut data_tx, user_id)
                .await?
                .ok_or(Error::UserNotFound)?;
            let entry = Entry::record(&mut balance, amount, charge.clone())?;
            queries::update_balance(&mut data_tx, &balance).await?;
            queries::insert(&mut data_tx, &entry).await?;
            data_tx.commit().await?;
            log::info!(
                "ledger entry {:?} for user {:?}: {} -> {}",
                entry.id,
                user_id,
                entry.balance_before,
                entry.balance_after
            );
            Ok::<_, Error>(entry)
        }),
    )
    .await?
}

/// Lists entries of a user, newest first.
pub async fn list(
    db: &Database,
    user_id: user::Id,
    range: QueryRange,
) -> Result<Vec<Entry>, sqlx::Error> {
    queries::list(db, user_id, range).await
}

pub async fn stats(db: &Database, user_id: user::Id) -> Result<Stats, sqlx::Error> {
    queries::stats(db, user_id).await
}

/// Sum of all entries of a user. Always equal to the stored balance.
pub async fn total(db: &Database, user_id: user::Id) -> Result<Tenths, sqlx::Error> {
    queries::total(db, user_id).await
}

mod queries {
    use super::{Balance, Charge, Entry, Id, Stats};
    use crate::{
        concurrency,
        database::{self, Database},
        money::{Cents, Tenths},
        user, QueryRange,
    };
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use uuid::Uuid;

    const COLUMNS: &str = "id, user_id, product_id, product_name, product_price_cents, catalog_price_cents, cashback_tenths, balance_before_tenths, balance_after_tenths, payment_type, created";

    pub(super) async fn get_balance(
        data_tx: &mut database::Transaction,
        user_id: user::Id,
    ) -> Result<Option<Balance>, sqlx::Error> {
        Ok(sqlx::query_as::<_, BalanceRow>(
            "SELECT id AS user_id, balance_tenths FROM users WHERE id = $1",
        )
        .bind(user_id.0)
        .fetch_optional(&mut **data_tx)
        .await?
        .map(|row| row.into_entity()))
    }

    pub(super) async fn update_balance(
        data_tx: &mut database::Transaction,
        balance: &Balance,
    ) -> Result<(), super::Error> {
        sqlx::query(
            "UPDATE users SET balance_tenths = $1 WHERE id = $2 AND balance_tenths = $3 RETURNING id",
        )
        .bind(balance.amount().0)
        .bind(balance.user_id().0)
        .bind(balance.original_amount().0)
        .fetch_optional(&mut **data_tx)
        .await?
        .ok_or(concurrency::ConflictError)?;
        Ok(())
    }

    pub(super) async fn insert(
        data_tx: &mut database::Transaction,
        entry: &Entry,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(formatcp!(
            r#"INSERT INTO transactions ({})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
            COLUMNS
        ))
        .bind(entry.id.0)
        .bind(entry.user_id.0)
        .bind(&entry.charge.product_id)
        .bind(&entry.charge.product_name)
        .bind(entry.charge.product_price.0)
        .bind(entry.charge.catalog_price.map(|price| price.0))
        .bind(entry.amount.0)
        .bind(entry.balance_before.0)
        .bind(entry.balance_after.0)
        .bind(&entry.charge.payment_type)
        .bind(entry.created)
        .execute(&mut **data_tx)
        .await?;
        Ok(())
    }

    pub(super) async fn list(
        db: &Database,
        user_id: user::Id,
        range: QueryRange,
    ) -> Result<Vec<Entry>, sqlx::Error> {
        Ok(sqlx::query_as::<_, EntryRow>(formatcp!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY created DESC LIMIT $2 OFFSET $3",
            COLUMNS
        ))
        .bind(user_id.0)
        .bind(range.limit)
        .bind(range.offset)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| row.into_entity())
        .collect())
    }

    pub(super) async fn stats(db: &Database, user_id: user::Id) -> Result<Stats, sqlx::Error> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"SELECT COUNT(*) AS transactions,
                COALESCE(SUM(cashback_tenths) FILTER (WHERE cashback_tenths > 0), 0)::BIGINT AS accrued,
                COALESCE(-SUM(cashback_tenths) FILTER (WHERE cashback_tenths < 0), 0)::BIGINT AS deducted,
                MAX(created) AS last_transaction
                FROM transactions WHERE user_id = $1"#,
        )
        .bind(user_id.0)
        .fetch_one(db)
        .await?;
        Ok(Stats {
            transactions: row.transactions,
            accrued: Tenths(row.accrued),
            deducted: Tenths(row.deducted),
            last_transaction: row.last_transaction,
        })
    }

    pub(super) async fn total(db: &Database, user_id: user::Id) -> Result<Tenths, sqlx::Error> {
        let (sum,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COALESCE(SUM(cashback_tenths), 0)::BIGINT FROM transactions WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_one(db)
        .await?;
        Ok(Tenths(sum))
    }

    #[derive(sqlx::FromRow, Debug)]
    struct BalanceRow {
        user_id: Uuid,
        balance_tenths: i64,
    }

    impl BalanceRow {
        fn into_entity(self) -> Balance {
            Balance::new(user::Id(self.user_id), Tenths(self.balance_tenths))
        }
    }

    #[derive(sqlx::FromRow, Debug)]
    struct StatsRow {
        transactions: i64,
        accrued: i64,
        deducted: i64,
        last_transaction: Option<DateTime<Utc>>,
    }

    #[derive(sqlx::FromRow, Debug)]
    struct EntryRow {
        id: Uuid,
        user_id: Uuid,
        product_id: String,
        product_name: String,
        product_price_cents: i64,
        catalog_price_cents: Option<i64>,
        cashback_tenths: i64,
        balance_before_tenths: i64,
        balance_after_tenths: i64,
        payment_type: Option<String>,
        created: DateTime<Utc>,
    }

    impl EntryRow {
        fn into_entity(self) -> Entry {
            Entry {
                id: Id(self.id),
                user_id: user::Id(self.user_id),
                charge: Charge {
                    product_id: self.product_id,
                    product_name: self.product_name,
                    product_price: Cents(self.product_price_cents),
                    catalog_price: self.catalog_price_cents.map(Cents),
                    payment_type: self.payment_type,
                },
                amount: Tenths(self.cashback_tenths),
                balance_before: Tenths(self.balance_before_tenths),
                balance_after: Tenths(self.balance_after_tenths),
                created: self.created,
            }
        }
    }
}
