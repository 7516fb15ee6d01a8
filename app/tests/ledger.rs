use app::{
    database::{self, Database},
    ledger::{self, Charge, Policy},
    money::{Cents, Tenths},
    phone::PhoneNumber,
    user::{self, Name, User},
};
use uuid::Uuid;

async fn setup(db: &Database) -> User {
    database::run_migrations(db).await.unwrap();
    let phone = PhoneNumber::parse("+996555000111").unwrap();
    user::find_or_create(db, &phone, Name::parse("Aida"))
        .await
        .unwrap()
}

fn charge(price: Cents) -> Charge {
    Charge {
        product_id: "p-1".to_owned(),
        product_name: "Tea".to_owned(),
        product_price: price,
        catalog_price: None,
        payment_type: Some("CARD".to_owned()),
    }
}

async fn stored_balance(db: &Database, user: &User) -> Tenths {
    user::get(db, &user.phone).await.unwrap().balance
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn accrual_moves_balance_and_leaves_an_entry(db: Database) {
    let user = setup(&db).await;
    let price = Cents(3333);
    let entry = ledger::accrue(&db, &Policy::default(), user.id, price.cashback(), charge(price))
        .await
        .unwrap();

    assert_eq!(entry.amount, Tenths(10));
    assert_eq!(entry.balance_before, Tenths(0));
    assert_eq!(entry.balance_after, Tenths(10));
    assert_eq!(stored_balance(&db, &user).await, entry.balance_after);

    let entries = ledger::list(&db, user.id, app::QueryRange { limit: 10, offset: 0 })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].charge, charge(price));
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn overdrawing_deduction_changes_nothing(db: Database) {
    let user = setup(&db).await;
    let policy = Policy::default();
    ledger::accrue(&db, &policy, user.id, Tenths(5), charge(Cents(1667)))
        .await
        .unwrap();

    let result = ledger::deduct(&db, &policy, user.id, Tenths(6), None).await;
    assert!(matches!(result, Err(ledger::Error::InsufficientBalance(_))));
    assert_eq!(stored_balance(&db, &user).await, Tenths(5));
    assert_eq!(ledger::stats(&db, user.id).await.unwrap().transactions, 1);

    let entry = ledger::deduct(&db, &policy, user.id, Tenths(5), Some("gift".to_owned()))
        .await
        .unwrap();
    assert_eq!(entry.amount, Tenths(-5));
    assert_eq!(entry.charge.product_id, ledger::DEDUCTION_PRODUCT_ID);
    assert_eq!(stored_balance(&db, &user).await, Tenths(0));
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn non_positive_deductions_are_rejected(db: Database) {
    let user = setup(&db).await;
    let policy = Policy::default();
    for amount in [Tenths(0), Tenths(-10)] {
        let result = ledger::deduct(&db, &policy, user.id, amount, None).await;
        assert!(matches!(result, Err(ledger::Error::InvalidAmount)));
    }
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn unknown_user_is_not_found(db: Database) {
    database::run_migrations(&db).await.unwrap();
    let result = ledger::accrue(
        &db,
        &Policy::default(),
        user::Id(Uuid::new_v4()),
        Tenths(1),
        charge(Cents(100)),
    )
    .await;
    assert!(matches!(result, Err(ledger::Error::UserNotFound)));
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn concurrent_changes_are_not_lost(db: Database) {
    let user = setup(&db).await;
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let db = db.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                ledger::accrue(&db, &Policy::default(), user_id, Tenths(3), charge(Cents(1000)))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(stored_balance(&db, &user).await, Tenths(30));
    assert_eq!(ledger::total(&db, user.id).await.unwrap(), Tenths(30));

    let entries = ledger::list(&db, user.id, app::QueryRange { limit: 100, offset: 0 })
        .await
        .unwrap();
    assert_eq!(entries.len(), 10);
    for entry in entries {
        assert_eq!(entry.balance_after, entry.balance_before + entry.amount);
    }
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn stats_split_accruals_and_deductions(db: Database) {
    let user = setup(&db).await;
    let policy = Policy::default();
    ledger::accrue(&db, &policy, user.id, Tenths(25), charge(Cents(83333)))
        .await
        .unwrap();
    ledger::deduct(&db, &policy, user.id, Tenths(7), None)
        .await
        .unwrap();

    let stats = ledger::stats(&db, user.id).await.unwrap();
    assert_eq!(stats.transactions, 2);
    assert_eq!(stats.accrued, Tenths(25));
    assert_eq!(stats.deducted, Tenths(7));
    assert!(stats.last_transaction.is_some());
    assert_eq!(ledger::total(&db, user.id).await.unwrap(), Tenths(18));
}
