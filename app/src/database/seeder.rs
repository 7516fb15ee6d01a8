use super::{Database, Transaction};
use crate::auth::PasswordHash;
use chrono::Utc;
use uuid::Uuid;

const PRODUCTS: &[(&str, &str, i64, &str)] = &[
    ("1", "Green tea", 3333, "drinks"),
    ("2", "Espresso", 1667, "drinks"),
    ("3", "Croissant", 25000, "bakery"),
    ("4", "Rye bread", 9990, "bakery"),
];

/// Inserts a development admin (password `admin`), a client and a few products. Existing rows are
/// left untouched, so this can run on every start.
pub async fn seed_development_data(db: &Database) -> Result<(), sqlx::Error> {
    let mut data_tx = db.begin().await?;
    seed_user(&mut data_tx, 1, "+996700000001", "Admin", Some("admin")).await?;
    seed_user(&mut data_tx, 2, "+996700000002", "Test Client", None).await?;
    for &(id, name, price_cents, category) in PRODUCTS {
        sqlx::query(
            r#"INSERT INTO products (id, name, price_cents, description, category)
                VALUES ($1, $2, $3, NULL, $4) ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(id)
        .bind(name)
        .bind(price_cents)
        .bind(category)
        .execute(&mut *data_tx)
        .await?;
    }
    data_tx.commit().await
}

async fn seed_user(
    data_tx: &mut Transaction,
    index: u128,
    phone: &str,
    name: &str,
    admin_password: Option<&str>,
) -> Result<(), sqlx::Error> {
    let role = if admin_password.is_some() { "ADMIN" } else { "CLIENT" };
    sqlx::query(
        r#"INSERT INTO users (id, phone_number, name, role, password_hash, balance_tenths, created)
            VALUES ($1, $2, $3, $4, $5, 0, $6) ON CONFLICT DO NOTHING"#,
    )
    .bind(Uuid::from_u128(index))
    .bind(phone)
    .bind(name)
    .bind(role)
    .bind(admin_password.map(|password| PasswordHash::generate(password).as_str().to_owned()))
    .bind(Utc::now())
    .execute(&mut **data_tx)
    .await?;
    Ok(())
}
