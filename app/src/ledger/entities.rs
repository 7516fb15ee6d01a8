use crate::money::{Cents, Tenths};
use crate::user;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Product id recorded on deduction entries, which have no originating product.
pub const DEDUCTION_PRODUCT_ID: &str = "DEDUCTION";
const DEDUCTION_PRODUCT_NAME: &str = "Cashback deduction";

#[derive(Debug, Error)]
#[error("insufficient balance")]
pub struct InsufficientBalance;

/// Represents the user balance.
///
/// Notice that this struct stores the original amount as well as any updates done on the balance.
/// This allows us to write SQL queries that avoid concurrency issues - in general, a balance will only be
/// updated successfully if no other process updated the balance in between the time when we loaded it
/// and the time when we tried to update it.
#[derive(Debug, Clone, Default)]
pub struct Balance {
    user_id: user::Id,
    original_amount: Tenths,
    amount: Tenths,
}

impl Balance {
    pub fn new(user_id: user::Id, amount: Tenths) -> Self {
        Self {
            user_id,
            original_amount: amount,
            amount,
        }
    }

    pub fn user_id(&self) -> user::Id {
        self.user_id
    }

    pub fn original_amount(&self) -> Tenths {
        self.original_amount
    }

    pub fn amount(&self) -> Tenths {
        self.amount
    }

    /// Applies a signed change. The balance never goes negative.
    pub fn apply(&mut self, change: Tenths) -> Result<(), InsufficientBalance> {
        let after = self.amount + change;
        if after.is_negative() {
            return Err(InsufficientBalance);
        }
        self.amount = after;
        Ok(())
    }
}

/// Describes what a ledger entry is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub product_id: String,
    pub product_name: String,
    /// The price the cashback was computed from.
    pub product_price: Cents,
    /// The catalog price, kept for auditing when a different price was charged.
    pub catalog_price: Option<Cents>,
    pub payment_type: Option<String>,
}

impl Charge {
    pub fn deduction(reason: Option<String>) -> Self {
        Self {
            product_id: DEDUCTION_PRODUCT_ID.to_owned(),
            product_name: reason.unwrap_or_else(|| DEDUCTION_PRODUCT_NAME.to_owned()),
            product_price: Cents(0),
            catalog_price: None,
            payment_type: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Id(pub Uuid);

/// An immutable row of the ledger. `balance_after == balance_before + amount` always holds, and
/// the amounts of all entries of a user sum up to their balance.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: Id,
    pub user_id: user::Id,
    pub charge: Charge,
    /// Positive for accruals, negative for deductions.
    pub amount: Tenths,
    pub balance_before: Tenths,
    pub balance_after: Tenths,
    pub created: DateTime<Utc>,
}

impl Entry {
    /// Applies `amount` to `balance` and records the change.
    pub(crate) fn record(
        balance: &mut Balance,
        amount: Tenths,
        charge: Charge,
    ) -> Result<Self, InsufficientBalance> {
        let balance_before = balance.amount();
        balance.apply(amount)?;
        Ok(Self {
            id: Id(Uuid::new_v4()),
            user_id: balance.user_id(),
            charge,
            amount,
            balance_before,
            balance_after: balance.amount(),
            created: Utc::now(),
        })
    }

    pub fn is_deduction(&self) -> bool {
        self.amount.is_negative()
    }
}

/// Totals over the ledger of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub transactions: i64,
    pub accrued: Tenths,
    /// Total deducted, as a non-negative amount.
    pub deducted: Tenths,
    pub last_transaction: Option<DateTime<Utc>>,
}
