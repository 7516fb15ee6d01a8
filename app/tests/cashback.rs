use app::{
    auth::{self, AdminGrant},
    cashback::{self, Cashback, Item},
    catalog::{self, Backend},
    database::{self, Database},
    ledger,
    login,
    money::{Cents, Tenths},
    phone::PhoneNumber,
    user::{self, Name},
};

const ADMIN_PHONE: &str = "+996770000001";

/// Migrates, seeds the catalog, and logs in a fresh admin.
async fn setup(db: &Database) -> (Cashback, AdminGrant, PhoneNumber) {
    database::run_migrations(db).await.unwrap();
    database::seed_development_data(db).await.unwrap();
    login::bootstrap_admin(db, ADMIN_PHONE, "secret", "Cashier")
        .await
        .unwrap();
    let session = login::admin_login(db, ADMIN_PHONE, "secret").await.unwrap();
    let grant = auth::get_admin_grant(db, session.token.as_str())
        .await
        .unwrap();

    let phone = PhoneNumber::parse("+996555123456").unwrap();
    user::find_or_create(db, &phone, Name::parse("Nurlan"))
        .await
        .unwrap();
    let catalog = catalog::from_backend(Backend::Database, db.clone());
    (Cashback::new(catalog, ledger::Policy::default()), grant, phone)
}

fn catalog_item(id: &str) -> Item {
    Item::Catalog {
        product_id: id.to_owned(),
        custom_price: None,
    }
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn missing_product_fails_alone(db: Database) {
    let (cashback, grant, phone) = setup(&db).await;
    let items = vec![
        catalog_item("1"),
        catalog_item("does-not-exist"),
        Item::Inline {
            name: "Bread".to_owned(),
            price: Cents(1000),
        },
    ];
    let summary = cashback
        .process_batch(&grant, &db, &phone, items, Some("CASH".to_owned()))
        .await
        .unwrap();

    assert_eq!(summary.total_items, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.results[0].as_ref().unwrap().charge.product_id, "1");
    assert_eq!(
        summary.results[1].as_ref().unwrap_err().reference,
        "does-not-exist"
    );
    assert_eq!(
        summary.results[2].as_ref().unwrap().charge.product_id,
        cashback::DIRECT_PRODUCT_ID
    );
    // 33.33 earns 1.0 and 10.00 earns 0.3.
    assert_eq!(summary.total_cashback, Tenths(13));
    assert_eq!(summary.user.balance, Tenths(13));
    assert_eq!(ledger::total(&db, summary.user.id).await.unwrap(), Tenths(13));
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn custom_price_is_charged_and_catalog_price_kept(db: Database) {
    let (cashback, grant, phone) = setup(&db).await;
    let items = vec![Item::Catalog {
        product_id: "1".to_owned(),
        custom_price: Some(Cents(1667)),
    }];
    let summary = cashback
        .process_batch(&grant, &db, &phone, items, None)
        .await
        .unwrap();

    let entry = summary.results[0].as_ref().unwrap();
    assert_eq!(entry.amount, Tenths(5));
    assert_eq!(entry.charge.product_price, Cents(1667));
    assert_eq!(entry.charge.catalog_price, Some(Cents(3333)));
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn unknown_user_fails_the_whole_batch(db: Database) {
    let (cashback, grant, _) = setup(&db).await;
    let stranger = PhoneNumber::parse("+996999999999").unwrap();
    let result = cashback
        .process_batch(&grant, &db, &stranger, vec![catalog_item("1")], None)
        .await;
    assert!(matches!(result, Err(cashback::Error::UserNotFound)));
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn deduction_reports_the_new_balance(db: Database) {
    let (cashback, grant, phone) = setup(&db).await;
    cashback
        .process_batch(&grant, &db, &phone, vec![catalog_item("3")], None)
        .await
        .unwrap();

    let deduction = cashback
        .deduct(&grant, &db, &phone, Tenths(5), Some("coffee".to_owned()))
        .await
        .unwrap();
    assert_eq!(deduction.entry.balance_before, Tenths(75));
    assert_eq!(deduction.user.balance, Tenths(70));

    let result = cashback.deduct(&grant, &db, &phone, Tenths(71), None).await;
    assert!(matches!(
        result,
        Err(cashback::Error::Ledger(ledger::Error::InsufficientBalance(_)))
    ));
}
