use app::{
    cashback::Cashback,
    catalog::{self, Backend},
    ledger,
    login::{self, Login},
    otp::{self, LogMessenger, Otp},
};
use rocket::{
    http::{ContentType, Header, Status},
    local::asynchronous::Client,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};

/// A client whose database is never reached: every request here fails validation or the admin
/// guard before any query runs.
async fn client() -> Client {
    let db = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(100))
        .connect_lazy("postgres://nobody@localhost:1/nothing")
        .unwrap();
    let login = Login::new(
        Otp::new(otp::Policy::default(), Arc::new(LogMessenger)),
        login::Policy::default(),
    );
    let cashback = Cashback::new(
        catalog::from_backend(Backend::Database, db.clone()),
        ledger::Policy::default(),
    );
    let rocket = api::register(
        rocket::build(),
        db,
        login,
        cashback,
        api::RateLimit::new(10, Duration::from_secs(60)),
    );
    Client::tracked(rocket).await.unwrap()
}

async fn post(client: &Client, uri: &'static str, body: Value) -> (Status, Value) {
    let response = client
        .post(uri)
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    let status = response.status();
    (status, response.into_json().await.unwrap())
}

async fn get(client: &Client, uri: &'static str) -> (Status, Value) {
    let response = client.get(uri).dispatch().await;
    let status = response.status();
    (status, response.into_json().await.unwrap())
}

fn error_status(body: &Value) -> &str {
    body["error"]["status"].as_str().unwrap()
}

#[tokio::test]
async fn malformed_phone_number_is_rejected() {
    let client = client().await;
    let (status, body) = post(
        &client,
        "/auth/login/initiate",
        json!({ "phoneNumber": "0700123456", "name": "Aida" }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(error_status(&body), "INVALID_PHONE_NUMBER");
    assert_eq!(body["error"]["code"], 400);
}

#[tokio::test]
async fn blank_name_is_rejected() {
    let client = client().await;
    let (status, body) = post(
        &client,
        "/auth/login/initiate",
        json!({ "phoneNumber": "+996700123456", "name": "   " }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(error_status(&body), "NAME_REQUIRED");
}

#[tokio::test]
async fn otp_must_be_six_digits() {
    let client = client().await;
    for code in ["12345", "1234567", "12a456"] {
        let (status, body) = post(
            &client,
            "/auth/verify-otp",
            json!({ "phoneNumber": "+996700123456", "otpCode": code }),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(error_status(&body), "INVALID_OTP_FORMAT");
    }
}

#[tokio::test]
async fn anonymous_admin_registration_is_refused() {
    let client = client().await;
    let (status, body) = post(
        &client,
        "/auth/registration/admin",
        json!({ "phoneNumber": "+996700123456", "password": "hunter2", "name": "Root" }),
    )
    .await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(error_status(&body), "UNAUTHORIZED");
}

#[tokio::test]
async fn privileged_routes_need_a_session_token() {
    let client = client().await;
    let (status, body) = post(
        &client,
        "/cashback/deduct",
        json!({ "phoneNumber": "+996700123456", "amount": 5 }),
    )
    .await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(error_status(&body), "UNAUTHORIZED");

    let (status, _) = post(
        &client,
        "/cashback/process",
        json!({ "phoneNumber": "+996700123456", "productIds": [{ "productId": "1" }] }),
    )
    .await;
    assert_eq!(status, Status::Unauthorized);

    let (status, _) = get(&client, "/cashback/products").await;
    assert_eq!(status, Status::Unauthorized);

    let response = client
        .post("/users/+996700123456/role")
        .header(ContentType::JSON)
        .body(json!({ "role": "ADMIN" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn user_reads_validate_input() {
    let client = client().await;
    let (status, body) = get(&client, "/users/not-a-phone/balance").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(error_status(&body), "INVALID_PHONE_NUMBER");

    let (status, body) = get(&client, "/users/+996700123456/transactions?limit=0").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(error_status(&body), "INVALID_LIMIT");

    let (status, body) = get(&client, "/users/+996700123456/transactions?offset=-5").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(error_status(&body), "INVALID_OFFSET");
}

#[tokio::test]
async fn malformed_body_gets_an_error_envelope() {
    let client = client().await;
    let (status, body) = post(&client, "/auth/verify-otp", json!({ "phone": "+996700123456" })).await;
    assert_eq!(status, Status::UnprocessableEntity);
    assert_eq!(error_status(&body), "INVALID_BODY");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let client = client().await;
    let response = client
        .get("/openapi.json")
        .header(Header::new("Accept", "application/json"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert!(body["paths"]["/cashback/process"].is_object());
}
