//! Crediting cashback for purchases, and deducting it again. A batch credits every product of a
//! purchase on its own: a product that fails is reported and skipped, and products credited before
//! it stay credited.

use crate::{
    auth::AdminGrant,
    catalog::ProductCatalog,
    database::Database,
    ledger::{self, Entry},
    money::Tenths,
    phone::PhoneNumber,
    user::{self, User},
};
use futures::{stream, Future, StreamExt};
use std::sync::Arc;

mod entities;

pub use entities::{
    BatchSummary, Deduction, Error, Item, ItemError, ItemFailure, ItemOutcome, DIRECT_PRODUCT_ID,
};

#[derive(Clone)]
pub struct Cashback {
    catalog: Arc<dyn ProductCatalog>,
    ledger: ledger::Policy,
}

impl Cashback {
    pub fn new(catalog: Arc<dyn ProductCatalog>, ledger: ledger::Policy) -> Self {
        Self { catalog, ledger }
    }

    pub fn catalog(&self) -> &dyn ProductCatalog {
        self.catalog.as_ref()
    }

    /// Credits cashback for each item, one after the other in input order.
    pub async fn process_batch(
        &self,
        grant: &AdminGrant,
        db: &Database,
        phone: &PhoneNumber,
        items: Vec<Item>,
        payment_type: Option<String>,
    ) -> Result<BatchSummary, Error> {
        if items.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let user = get_user(db, phone).await?;
        log::info!(
            "admin {:?} processing {} products for user {:?}",
            grant.user_id,
            items.len(),
            user.id
        );

        let user_id = user.id;
        let results = fold_items(items, |item| {
            let payment_type = payment_type.clone();
            async move {
                let reference = item.reference().to_owned();
                self.accrue_item(db, user_id, item, payment_type)
                    .await
                    .map_err(|e| {
                        log::warn!("no cashback for {} to user {:?}: {}", reference, user_id, e);
                        ItemFailure {
                            reference,
                            error: e.to_string(),
                        }
                    })
            }
        })
        .await;

        let user = get_user(db, phone).await?;
        let summary = BatchSummary::new(user, results);
        log::info!(
            "batch for user {:?} done: {} credited, {} failed, {} cashback",
            summary.user.id,
            summary.successful,
            summary.failed,
            summary.total_cashback
        );
        Ok(summary)
    }

    async fn accrue_item(
        &self,
        db: &Database,
        user_id: user::Id,
        item: Item,
        payment_type: Option<String>,
    ) -> Result<Entry, ItemError> {
        let product = match &item {
            Item::Catalog { product_id, .. } => Some(self.catalog.get(product_id).await?),
            Item::Inline { .. } => None,
        };
        let charge = item.charge(product, payment_type)?;
        let amount = charge.product_price.cashback();
        Ok(ledger::accrue(db, &self.ledger, user_id, amount, charge).await?)
    }

    pub async fn deduct(
        &self,
        grant: &AdminGrant,
        db: &Database,
        phone: &PhoneNumber,
        amount: Tenths,
        reason: Option<String>,
    ) -> Result<Deduction, Error> {
        let user = get_user(db, phone).await?;
        let entry = ledger::deduct(db, &self.ledger, user.id, amount, reason)
            .await
            .map_err(|e| match e {
                ledger::Error::UserNotFound => Error::UserNotFound,
                e => Error::Ledger(e),
            })?;
        log::info!(
            "admin {:?} deducted {} from user {:?}",
            grant.user_id,
            amount,
            user.id
        );
        let user = get_user(db, phone).await?;
        Ok(Deduction { user, entry })
    }
}

async fn get_user(db: &Database, phone: &PhoneNumber) -> Result<User, Error> {
    user::get(db, phone).await.map_err(|e| match e {
        user::Error::Database(e) => Error::Database(e),
        _ => Error::UserNotFound,
    })
}

/// Runs `process` on each item in turn and collects the outcomes in input order.
async fn fold_items<T, F, Fut>(items: Vec<T>, process: F) -> Vec<ItemOutcome>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ItemOutcome>,
{
    stream::iter(items).then(process).collect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::Charge,
        money::{Cents, Tenths},
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(product_id: &str, amount: i64) -> Entry {
        Entry {
            id: ledger::Id(Uuid::new_v4()),
            user_id: user::Id(Uuid::nil()),
            charge: Charge {
                product_id: product_id.to_owned(),
                product_name: product_id.to_owned(),
                product_price: Cents(amount * 1000 / 3),
                catalog_price: None,
                payment_type: None,
            },
            amount: Tenths(amount),
            balance_before: Tenths(0),
            balance_after: Tenths(amount),
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failed_item_does_not_stop_the_batch() {
        let items = vec!["a", "missing", "c"];
        let mut seen = Vec::new();
        let results = fold_items(items, |id| {
            seen.push(id);
            async move {
                if id == "missing" {
                    Err(ItemFailure {
                        reference: id.to_owned(),
                        error: "product missing not found".to_owned(),
                    })
                } else {
                    Ok(entry(id, 10))
                }
            }
        })
        .await;

        assert_eq!(seen, vec!["a", "missing", "c"]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().charge.product_id, "a");
        assert_eq!(results[1].as_ref().unwrap_err().reference, "missing");
        assert_eq!(results[2].as_ref().unwrap().charge.product_id, "c");

        let user = User::new(PhoneNumber::parse("+996700000001").unwrap(), None, user::Role::Client);
        let summary = BatchSummary::new(user, results);
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_cashback, Tenths(20));
    }

    #[tokio::test]
    async fn items_run_one_after_the_other() {
        let results = fold_items(vec![30u64, 1, 10], |delay| async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(entry(&delay.to_string(), 1))
        })
        .await;
        let order: Vec<_> = results
            .iter()
            .map(|result| result.as_ref().unwrap().charge.product_id.clone())
            .collect();
        assert_eq!(order, vec!["30", "1", "10"]);
    }
}
