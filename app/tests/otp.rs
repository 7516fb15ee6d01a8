use app::{
    database::{self, Database},
    otp::{self, Code, LogMessenger, Otp, Policy},
    phone::PhoneNumber,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

async fn setup(db: &Database) -> Otp {
    database::run_migrations(db).await.unwrap();
    Otp::new(Policy::default(), Arc::new(LogMessenger))
}

fn phone() -> PhoneNumber {
    PhoneNumber::parse("+996701234567").unwrap()
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn fourth_code_within_window_is_rate_limited(db: Database) {
    let otp = setup(&db).await;
    let now = Utc::now();
    for i in 0..3 {
        otp.generate_at(&db, &phone(), now + Duration::seconds(i))
            .await
            .unwrap();
    }
    let result = otp.generate_at(&db, &phone(), now + Duration::seconds(10)).await;
    assert!(matches!(result, Err(otp::Error::RateLimited)));

    // Other phone numbers are not affected.
    let other = PhoneNumber::parse("+996701234568").unwrap();
    otp.generate_at(&db, &other, now).await.unwrap();

    // Once the window has passed, codes are issued again.
    otp.generate_at(&db, &phone(), now + Duration::minutes(6))
        .await
        .unwrap();
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn used_codes_still_count_towards_the_rate_limit(db: Database) {
    let otp = setup(&db).await;
    let now = Utc::now();
    for i in 0..3 {
        let at = now + Duration::seconds(10 * i);
        let token = otp.generate_at(&db, &phone(), at).await.unwrap();
        assert!(otp::verify_at(&db, &phone(), &token.code, at).await.unwrap());
    }

    // Neither the purge on issuance nor the sweeper forgets codes issued within the window.
    otp::cleanup_expired_at(&db, otp.policy(), now + Duration::seconds(40)).await;
    let result = otp.generate_at(&db, &phone(), now + Duration::seconds(50)).await;
    assert!(matches!(result, Err(otp::Error::RateLimited)));

    otp.generate_at(&db, &phone(), now + Duration::minutes(6))
        .await
        .unwrap();
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn code_is_accepted_at_most_once(db: Database) {
    let otp = setup(&db).await;
    let now = Utc::now();
    let token = otp.generate_at(&db, &phone(), now).await.unwrap();

    let wrong = Code::parse(if token.code.as_str() == "000000" { "111111" } else { "000000" }).unwrap();
    assert!(!otp::verify_at(&db, &phone(), &wrong, now).await.unwrap());

    assert!(otp::verify_at(&db, &phone(), &token.code, now).await.unwrap());
    assert!(!otp::verify_at(&db, &phone(), &token.code, now).await.unwrap());
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn concurrent_verification_has_exactly_one_winner(db: Database) {
    let otp = setup(&db).await;
    let now = Utc::now();
    let token = otp.generate_at(&db, &phone(), now).await.unwrap();

    let attempts = (0..8).map(|_| {
        let db = db.clone();
        let code = token.code.clone();
        tokio::spawn(async move { otp::verify_at(&db, &phone(), &code, now).await.unwrap() })
    });
    let mut accepted = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        if attempt.await.unwrap() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn code_expires_after_five_minutes(db: Database) {
    let otp = setup(&db).await;
    let now = Utc::now();
    let token = otp.generate_at(&db, &phone(), now).await.unwrap();
    assert_eq!(token.expires - token.created, Duration::minutes(5));

    let after_expiry = token.expires + Duration::seconds(1);
    assert!(!otp::verify_at(&db, &phone(), &token.code, after_expiry).await.unwrap());

    let before_expiry = token.expires - Duration::seconds(1);
    assert!(otp::verify_at(&db, &phone(), &token.code, before_expiry).await.unwrap());
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn sweep_removes_spent_codes(db: Database) {
    let otp = setup(&db).await;
    let long_ago = Utc::now() - Duration::hours(1);
    let token = otp.generate_at(&db, &phone(), long_ago).await.unwrap();

    otp::cleanup_expired(&db, otp.policy()).await;

    assert!(!otp::verify_at(&db, &phone(), &token.code, long_ago).await.unwrap());
}
