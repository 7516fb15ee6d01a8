use crate::{
    catalog::Product,
    ledger::{self, Charge, Entry},
    money::{Cents, Tenths},
    user::User,
};
use thiserror::Error;

/// Product id recorded for products that were priced by the caller instead of the catalog.
pub const DIRECT_PRODUCT_ID: &str = "DIRECT";

#[derive(Debug, Error)]
pub enum Error {
    #[error("user not found")]
    UserNotFound,
    #[error("no products to process")]
    EmptyBatch,
    #[error(transparent)]
    Ledger(#[from] ledger::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// One purchased product in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A catalog product, optionally charged at a different price than the catalog's.
    Catalog {
        product_id: String,
        custom_price: Option<Cents>,
    },
    /// A product that is not in the catalog, priced by the caller.
    Inline { name: String, price: Cents },
}

impl Item {
    /// How the item is referred to in failure reports.
    pub fn reference(&self) -> &str {
        match self {
            Item::Catalog { product_id, .. } => product_id,
            Item::Inline { name, .. } => name,
        }
    }

    /// Builds the ledger charge for this item. `product` is the catalog product for catalog
    /// items and ignored otherwise.
    pub(crate) fn charge(
        self,
        product: Option<Product>,
        payment_type: Option<String>,
    ) -> Result<Charge, ItemError> {
        let charge = match (self, product) {
            (
                Item::Catalog {
                    product_id,
                    custom_price,
                },
                Some(product),
            ) => Charge {
                product_id,
                product_name: product.name,
                product_price: custom_price.unwrap_or(product.price),
                catalog_price: custom_price.map(|_| product.price),
                payment_type,
            },
            (Item::Catalog { product_id, .. }, None) => {
                return Err(ItemError::ProductNotFound(product_id))
            }
            (Item::Inline { name, price }, _) => {
                if name.trim().is_empty() {
                    return Err(ItemError::MissingName);
                }
                Charge {
                    product_id: DIRECT_PRODUCT_ID.to_owned(),
                    product_name: name.trim().to_owned(),
                    product_price: price,
                    catalog_price: None,
                    payment_type,
                }
            }
        };
        if charge.product_price.is_negative() {
            return Err(ItemError::NegativePrice);
        }
        Ok(charge)
    }
}

/// Why a single item of a batch was not credited.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("product {0} not found")]
    ProductNotFound(String),
    #[error("product name must not be empty")]
    MissingName,
    #[error("price must not be negative")]
    NegativePrice,
    #[error(transparent)]
    Catalog(#[from] crate::catalog::Error),
    #[error(transparent)]
    Ledger(#[from] ledger::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub reference: String,
    pub error: String,
}

/// The outcome of one item: the ledger entry it produced, or why it failed.
pub type ItemOutcome = Result<Entry, ItemFailure>;

/// Result of a batch, with one outcome per item in input order.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// The user as of after the batch.
    pub user: User,
    pub results: Vec<ItemOutcome>,
    pub total_items: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_cashback: Tenths,
}

impl BatchSummary {
    pub(crate) fn new(user: User, results: Vec<ItemOutcome>) -> Self {
        let successful = results.iter().filter(|result| result.is_ok()).count();
        let total_cashback = results
            .iter()
            .filter_map(|result| result.as_ref().ok())
            .map(|entry| entry.amount)
            .sum();
        Self {
            user,
            total_items: results.len(),
            successful,
            failed: results.len() - successful,
            total_cashback,
            results,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Deduction {
    /// The user as of after the deduction.
    pub user: User,
    pub entry: Entry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tea() -> Product {
        Product {
            id: "p-1".to_owned(),
            name: "Tea".to_owned(),
            price: Cents(3333),
            description: None,
            category: Some("drinks".to_owned()),
        }
    }

    #[test]
    fn catalog_item_is_charged_at_catalog_price() {
        let item = Item::Catalog {
            product_id: "p-1".to_owned(),
            custom_price: None,
        };
        let charge = item.charge(Some(tea()), Some("CASH".to_owned())).unwrap();
        assert_eq!(charge.product_name, "Tea");
        assert_eq!(charge.product_price, Cents(3333));
        assert_eq!(charge.catalog_price, None);
        assert_eq!(charge.payment_type.as_deref(), Some("CASH"));
    }

    #[test]
    fn custom_price_overrides_and_catalog_price_is_kept() {
        let item = Item::Catalog {
            product_id: "p-1".to_owned(),
            custom_price: Some(Cents(1667)),
        };
        let charge = item.charge(Some(tea()), None).unwrap();
        assert_eq!(charge.product_price, Cents(1667));
        assert_eq!(charge.catalog_price, Some(Cents(3333)));
        assert_eq!(charge.product_price.cashback(), Tenths(5));
    }

    #[test]
    fn inline_items_need_a_name_and_a_sane_price() {
        let blank = Item::Inline {
            name: "  ".to_owned(),
            price: Cents(100),
        };
        assert!(matches!(blank.charge(None, None), Err(ItemError::MissingName)));

        let negative = Item::Inline {
            name: "Bread".to_owned(),
            price: Cents(-100),
        };
        assert!(matches!(negative.charge(None, None), Err(ItemError::NegativePrice)));

        let bread = Item::Inline {
            name: " Bread ".to_owned(),
            price: Cents(250),
        };
        let charge = bread.charge(None, None).unwrap();
        assert_eq!(charge.product_id, DIRECT_PRODUCT_ID);
        assert_eq!(charge.product_name, "Bread");
    }

    #[test]
    fn missing_catalog_product_is_reported_by_id() {
        let item = Item::Catalog {
            product_id: "nope".to_owned(),
            custom_price: None,
        };
        assert_eq!(item.reference(), "nope");
        match item.charge(None, None) {
            Err(ItemError::ProductNotFound(id)) => assert_eq!(id, "nope"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
