//! Read-only lookup of products and their prices. Which backend serves the catalog is decided once
//! at startup, see [`Backend`].

use crate::{database::Database, money::Cents};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

mod database;
mod remote;

pub use database::DatabaseCatalog;
pub use remote::RemoteCatalog;

#[derive(Debug, Error)]
pub enum Error {
    #[error("product {0} not found")]
    NotFound(String),
    #[error("catalog returned an invalid product: {0}")]
    InvalidProduct(String),
    #[error("catalog is unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Cents,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get(&self, id: &str) -> Result<Product, Error>;

    async fn list(&self) -> Result<Vec<Product>, Error>;

    /// Products whose name contains `query`, ignoring case.
    async fn search(&self, query: &str) -> Result<Vec<Product>, Error>;

    async fn is_healthy(&self) -> bool;
}

#[derive(Debug, Clone)]
pub enum Backend {
    /// The `products` table of our own database.
    Database,
    /// A read-only product API.
    Remote { url: Url, api_key: Option<String> },
}

pub fn from_backend(backend: Backend, db: Database) -> Arc<dyn ProductCatalog> {
    match backend {
        Backend::Database => Arc::new(DatabaseCatalog::new(db)),
        Backend::Remote { url, api_key } => Arc::new(RemoteCatalog::new(url, api_key)),
    }
}
