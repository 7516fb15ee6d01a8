//! Routes for querying users and their ledger.

use super::{parse_phone, Range, RangeError};
use crate::{
    access,
    error::{self, JsonResult},
    state::RocketState,
};
use app::{ledger, user};
use chrono::{DateTime, Utc};
use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum RoleModel {
    /// A customer collecting cashback.
    Client,
    /// Staff allowed to credit and deduct cashback.
    Admin,
}

impl RoleModel {
    fn from_entity(role: user::Role) -> Self {
        match role {
            user::Role::Client => RoleModel::Client,
            user::Role::Admin => RoleModel::Admin,
        }
    }

    fn into_entity(self) -> user::Role {
        match self {
            RoleModel::Client => user::Role::Client,
            RoleModel::Admin => user::Role::Admin,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct UserModel {
    /// Unique user identifier.
    id: Uuid,
    phone_number: String,
    /// Absent until the user tells us their name.
    name: Option<String>,
    role: RoleModel,
    /// Current cashback balance.
    balance: f64,
    created_at: DateTime<Utc>,
}

impl UserModel {
    pub(super) fn from_entity(user: &user::User) -> Self {
        Self {
            id: user.id.0,
            phone_number: user.phone.as_str().to_owned(),
            name: user.name.as_ref().map(|name| name.as_str().to_owned()),
            role: RoleModel::from_entity(user.role),
            balance: user.balance.as_f64(),
            created_at: user.created,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct TransactionModel {
    /// Unique transaction identifier.
    id: Uuid,
    /// Catalog product id, `DIRECT` for products priced by the caller and `DEDUCTION` for
    /// deductions.
    product_id: String,
    product_name: String,
    /// The price cashback was computed from.
    product_price: f64,
    /// The catalog price, if the product was charged at a different price.
    catalog_price: Option<f64>,
    /// Positive for accruals, negative for deductions.
    cashback_amount: f64,
    balance_before: f64,
    balance_after: f64,
    payment_type: Option<String>,
    created_at: DateTime<Utc>,
}

impl TransactionModel {
    pub(super) fn from_entity(entry: &ledger::Entry) -> Self {
        Self {
            id: entry.id.0,
            product_id: entry.charge.product_id.clone(),
            product_name: entry.charge.product_name.clone(),
            product_price: entry.charge.product_price.as_f64(),
            catalog_price: entry.charge.catalog_price.map(|price| price.as_f64()),
            cashback_amount: entry.amount.as_f64(),
            balance_before: entry.balance_before.as_f64(),
            balance_after: entry.balance_after.as_f64(),
            payment_type: entry.charge.payment_type.clone(),
            created_at: entry.created,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum Error {
    /// Unexpected error, please contact support.
    Unknown,
    /// The phone number is malformed.
    InvalidPhoneNumber,
    /// No user has this phone number.
    UserNotFound,
    /// Invalid limit.
    InvalidLimit,
    /// Invalid offset.
    InvalidOffset,
}

fn map_user_error(e: user::Error) -> error::JsonError<Error> {
    match e {
        user::Error::NotFound => error::not_found(Error::UserNotFound, "user not found".to_owned()),
        e => error::internal_server_error(Error::Unknown, e),
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct BalanceResponse {
    phone_number: String,
    balance: f64,
}

/// Get the cashback balance of a user.
#[openapi(tag = "Users")]
#[get("/users/<phone>/balance")]
pub(super) async fn balance(
    phone: &str,
    state: &State<RocketState>,
) -> JsonResult<BalanceResponse, Error> {
    let phone = parse_phone(phone, Error::InvalidPhoneNumber)?;
    let user = user::get(&state.db, &phone).await.map_err(map_user_error)?;
    Ok(Json(BalanceResponse {
        phone_number: user.phone.as_str().to_owned(),
        balance: user.balance.as_f64(),
    }))
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct TransactionsResponse {
    transactions: Vec<TransactionModel>,
}

/// List the ledger of a user, newest first.
#[openapi(tag = "Users")]
#[get("/users/<phone>/transactions?<range..>")]
pub(super) async fn transactions(
    phone: &str,
    range: Range,
    state: &State<RocketState>,
) -> JsonResult<TransactionsResponse, Error> {
    let phone = parse_phone(phone, Error::InvalidPhoneNumber)?;
    let range = range.query_range().map_err(|(_, Json(e))| {
        let error = match e.error.status {
            RangeError::InvalidLimit => Error::InvalidLimit,
            RangeError::InvalidOffset => Error::InvalidOffset,
        };
        error::bad_request(error, e.error.description)
    })?;
    let user = user::get(&state.db, &phone).await.map_err(map_user_error)?;
    let entries = ledger::list(&state.db, user.id, range)
        .await
        .map_err(|e| error::internal_server_error(Error::Unknown, e))?;
    Ok(Json(TransactionsResponse {
        transactions: entries.iter().map(TransactionModel::from_entity).collect(),
    }))
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct StatsModel {
    total_transactions: i64,
    total_accrued: f64,
    /// Total deducted, as a non-negative amount.
    total_deducted: f64,
    last_transaction_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct ProfileResponse {
    user: UserModel,
    stats: StatsModel,
}

/// Get a user together with totals over their ledger.
#[openapi(tag = "Users")]
#[get("/users/<phone>/profile")]
pub(super) async fn profile(
    phone: &str,
    state: &State<RocketState>,
) -> JsonResult<ProfileResponse, Error> {
    let phone = parse_phone(phone, Error::InvalidPhoneNumber)?;
    let profile = user::profile(&state.db, &phone)
        .await
        .map_err(map_user_error)?;
    Ok(Json(ProfileResponse {
        user: UserModel::from_entity(&profile.user),
        stats: StatsModel {
            total_transactions: profile.stats.transactions,
            total_accrued: profile.stats.accrued.as_f64(),
            total_deducted: profile.stats.deducted.as_f64(),
            last_transaction_at: profile.stats.last_transaction,
        },
    }))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct RoleRequest {
    role: RoleModel,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct UserResponse {
    user: UserModel,
}

/// Change the role of a user. Requires an admin session.
#[openapi(tag = "Users")]
#[post("/users/<phone>/role", data = "<req>")]
pub(super) async fn set_role(
    phone: &str,
    req: Json<RoleRequest>,
    guard: access::AdminGuard,
    state: &State<RocketState>,
) -> JsonResult<UserResponse, Error> {
    let phone = parse_phone(phone, Error::InvalidPhoneNumber)?;
    let user = user::set_role(guard.grant(), &state.db, &phone, req.role.into_entity())
        .await
        .map_err(map_user_error)?;
    Ok(Json(UserResponse {
        user: UserModel::from_entity(&user),
    }))
}
