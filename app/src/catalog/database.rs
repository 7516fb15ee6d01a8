use super::{Error, Product, ProductCatalog};
use crate::database::Database;
use async_trait::async_trait;

pub struct DatabaseCatalog {
    db: Database,
}

impl DatabaseCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductCatalog for DatabaseCatalog {
    async fn get(&self, id: &str) -> Result<Product, Error> {
        queries::get(&self.db, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_owned()))
    }

    async fn list(&self) -> Result<Vec<Product>, Error> {
        Ok(queries::list(&self.db).await?)
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, Error> {
        Ok(queries::search(&self.db, query).await?)
    }

    async fn is_healthy(&self) -> bool {
        match queries::ping(&self.db).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("product table is not reachable: {}", e);
                false
            }
        }
    }
}

mod queries {
    use super::Product;
    use crate::{database::Database, money::Cents};
    use const_format::formatcp;

    const COLUMNS: &str = "id, name, price_cents, description, category";

    pub(super) async fn get(db: &Database, id: &str) -> Result<Option<Product>, sqlx::Error> {
        Ok(sqlx::query_as::<_, ProductRow>(formatcp!(
            "SELECT {} FROM products WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(|row| row.into_entity()))
    }

    pub(super) async fn list(db: &Database) -> Result<Vec<Product>, sqlx::Error> {
        Ok(sqlx::query_as::<_, ProductRow>(formatcp!(
            "SELECT {} FROM products ORDER BY name",
            COLUMNS
        ))
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| row.into_entity())
        .collect())
    }

    pub(super) async fn search(db: &Database, query: &str) -> Result<Vec<Product>, sqlx::Error> {
        Ok(sqlx::query_as::<_, ProductRow>(formatcp!(
            "SELECT {} FROM products WHERE STRPOS(LOWER(name), LOWER($1)) > 0 ORDER BY name",
            COLUMNS
        ))
        .bind(query)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| row.into_entity())
        .collect())
    }

    pub(super) async fn ping(db: &Database) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1 FROM products LIMIT 1")
            .fetch_optional(db)
            .await?;
        Ok(())
    }

    #[derive(sqlx::FromRow, Debug)]
    struct ProductRow {
        id: String,
        name: String,
        price_cents: i64,
        description: Option<String>,
        category: Option<String>,
    }

    impl ProductRow {
        fn into_entity(self) -> Product {
            Product {
                id: self.id,
                name: self.name,
                price: Cents(self.price_cents),
                description: self.description,
                category: self.category,
            }
        }
    }
}
