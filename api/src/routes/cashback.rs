//! Crediting and deducting cashback, and browsing the product catalog.

use super::{
    parse_phone,
    users::{TransactionModel, UserModel},
};
use crate::{
    access,
    error::{self, JsonError, JsonResult},
    state::RocketState,
};
use app::{
    cashback::{self, BatchSummary, Item},
    catalog, ledger,
    money::{self, Cents, Tenths},
};
use chrono::{DateTime, Utc};
use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum Error {
    /// Unexpected error, please contact support.
    Unknown,
    /// The phone number is malformed.
    InvalidPhoneNumber,
    /// No user has this phone number.
    UserNotFound,
    /// No products were given.
    EmptyBatch,
    /// A price is not a valid non-negative amount.
    InvalidPrice,
    /// The amount is not a positive number with at most one decimal place.
    InvalidAmount,
    /// The balance is lower than the amount to deduct.
    InsufficientBalance,
    /// The product catalog can't be reached.
    CatalogUnavailable,
    /// The search query is missing or blank.
    MissingQuery,
}

fn map_cashback_error(e: cashback::Error) -> JsonError<Error> {
    let description = e.to_string();
    match e {
        cashback::Error::UserNotFound => error::not_found(Error::UserNotFound, description),
        cashback::Error::EmptyBatch => error::bad_request(Error::EmptyBatch, description),
        cashback::Error::Ledger(ledger::Error::InvalidAmount) => {
            error::bad_request(Error::InvalidAmount, description)
        }
        cashback::Error::Ledger(ledger::Error::InsufficientBalance(_)) => {
            error::bad_request(Error::InsufficientBalance, description)
        }
        cashback::Error::Ledger(ledger::Error::UserNotFound) => {
            error::not_found(Error::UserNotFound, description)
        }
        e => error::internal_server_error(Error::Unknown, e),
    }
}

fn map_catalog_error(e: catalog::Error) -> JsonError<Error> {
    match e {
        catalog::Error::Unavailable(_) | catalog::Error::InvalidProduct(_) => {
            log::warn!("product catalog failed: {}", e);
            error::bad_gateway(Error::CatalogUnavailable, e.to_string())
        }
        e => error::internal_server_error(Error::Unknown, e),
    }
}

fn parse_price(price: f64) -> Result<Cents, JsonError<Error>> {
    match Cents::from_f64(price) {
        Ok(cents) if !cents.is_negative() => Ok(cents),
        Ok(_) => Err(error::bad_request(
            Error::InvalidPrice,
            "price must not be negative".to_owned(),
        )),
        Err(e) => Err(error::bad_request(Error::InvalidPrice, e.to_string())),
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ItemResultModel {
    success: bool,
    /// Catalog product id, or the name of a product priced by the caller.
    product: String,
    /// Present on success.
    transaction: Option<TransactionModel>,
    /// Present on failure.
    error: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct BatchResponse {
    /// The user after all products were processed.
    user: UserModel,
    /// One result per product, in request order.
    results: Vec<ItemResultModel>,
    total_items: usize,
    successful_transactions: usize,
    failed_transactions: usize,
    total_cashback: f64,
    cashback_percent: i64,
}

impl BatchResponse {
    fn from_summary(summary: &BatchSummary) -> Self {
        Self {
            user: UserModel::from_entity(&summary.user),
            results: summary
                .results
                .iter()
                .map(|result| match result {
                    Ok(entry) => ItemResultModel {
                        success: true,
                        product: entry.charge.product_id.clone(),
                        transaction: Some(TransactionModel::from_entity(entry)),
                        error: None,
                    },
                    Err(failure) => ItemResultModel {
                        success: false,
                        product: failure.reference.clone(),
                        transaction: None,
                        error: Some(failure.error.clone()),
                    },
                })
                .collect(),
            total_items: summary.total_items,
            successful_transactions: summary.successful,
            failed_transactions: summary.failed,
            total_cashback: summary.total_cashback.as_f64(),
            cashback_percent: money::CASHBACK_PERCENT,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct CatalogItemRequest {
    product_id: String,
    /// Charge this price instead of the catalog price.
    custom_price: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProcessRequest {
    phone_number: String,
    product_ids: Vec<CatalogItemRequest>,
    payment_type: Option<String>,
}

/// Credit cashback for catalog products. Each product is credited on its own; a failing product
/// is reported in the results and does not affect the others. Requires an admin session.
#[openapi(tag = "Cashback")]
#[post("/cashback/process", data = "<req>")]
pub(super) async fn process(
    state: &State<RocketState>,
    req: Json<ProcessRequest>,
    guard: access::AdminGuard,
) -> JsonResult<BatchResponse, Error> {
    let req = req.into_inner();
    let phone = parse_phone(&req.phone_number, Error::InvalidPhoneNumber)?;
    let items = req
        .product_ids
        .into_iter()
        .map(|item| -> Result<Item, JsonError<Error>> {
            Ok(Item::Catalog {
                product_id: item.product_id,
                custom_price: item.custom_price.map(parse_price).transpose()?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let summary = state
        .cashback
        .process_batch(guard.grant(), &state.db, &phone, items, req.payment_type)
        .await
        .map_err(map_cashback_error)?;
    Ok(Json(BatchResponse::from_summary(&summary)))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct DirectItemRequest {
    name: String,
    price: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProcessDirectRequest {
    phone_number: String,
    products: Vec<DirectItemRequest>,
    payment_type: Option<String>,
}

/// Credit cashback for products that are not in the catalog. Requires an admin session.
#[openapi(tag = "Cashback")]
#[post("/cashback/process-direct", data = "<req>")]
pub(super) async fn process_direct(
    state: &State<RocketState>,
    req: Json<ProcessDirectRequest>,
    guard: access::AdminGuard,
) -> JsonResult<BatchResponse, Error> {
    let req = req.into_inner();
    let phone = parse_phone(&req.phone_number, Error::InvalidPhoneNumber)?;
    let items = req
        .products
        .into_iter()
        .map(|item| -> Result<Item, JsonError<Error>> {
            Ok(Item::Inline {
                name: item.name,
                price: parse_price(item.price)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let summary = state
        .cashback
        .process_batch(guard.grant(), &state.db, &phone, items, req.payment_type)
        .await
        .map_err(map_cashback_error)?;
    Ok(Json(BatchResponse::from_summary(&summary)))
}

/// An amount given either as a JSON number or as a decimal string.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub(super) enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    fn parse(&self) -> Result<Tenths, money::AmountError> {
        match self {
            AmountInput::Number(amount) => Tenths::from_f64(*amount),
            AmountInput::Text(amount) => Tenths::parse(amount),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeductRequest {
    phone_number: String,
    amount: AmountInput,
    reason: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct DeductResponse {
    /// The user after the deduction.
    user: UserModel,
    transaction: TransactionModel,
}

/// Deduct cashback from a user's balance. Requires an admin session.
#[openapi(tag = "Cashback")]
#[post("/cashback/deduct", data = "<req>")]
pub(super) async fn deduct(
    state: &State<RocketState>,
    req: Json<DeductRequest>,
    guard: access::AdminGuard,
) -> JsonResult<DeductResponse, Error> {
    let req = req.into_inner();
    let phone = parse_phone(&req.phone_number, Error::InvalidPhoneNumber)?;
    let amount = req
        .amount
        .parse()
        .ok()
        .filter(Tenths::is_positive)
        .ok_or_else(|| {
            error::bad_request(
                Error::InvalidAmount,
                "amount must be a positive number with at most one decimal place".to_owned(),
            )
        })?;
    let deduction = state
        .cashback
        .deduct(guard.grant(), &state.db, &phone, amount, req.reason)
        .await
        .map_err(map_cashback_error)?;
    Ok(Json(DeductResponse {
        user: UserModel::from_entity(&deduction.user),
        transaction: TransactionModel::from_entity(&deduction.entry),
    }))
}

#[derive(Debug, Serialize, JsonSchema)]
struct ProductModel {
    id: String,
    name: String,
    price: f64,
    description: Option<String>,
    category: Option<String>,
}

impl ProductModel {
    fn from_entity(product: &catalog::Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price.as_f64(),
            description: product.description.clone(),
            category: product.category.clone(),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct ProductsResponse {
    products: Vec<ProductModel>,
}

/// List the product catalog. Requires an admin session.
#[openapi(tag = "Cashback")]
#[get("/cashback/products")]
pub(super) async fn list_products(
    state: &State<RocketState>,
    _guard: access::AdminGuard,
) -> JsonResult<ProductsResponse, Error> {
    let products = state
        .cashback
        .catalog()
        .list()
        .await
        .map_err(map_catalog_error)?;
    Ok(Json(ProductsResponse {
        products: products.iter().map(ProductModel::from_entity).collect(),
    }))
}

/// Search the product catalog by name. Requires an admin session.
#[openapi(tag = "Cashback")]
#[get("/cashback/products/search?<query>")]
pub(super) async fn search_products(
    state: &State<RocketState>,
    query: Option<String>,
    _guard: access::AdminGuard,
) -> JsonResult<ProductsResponse, Error> {
    let query = query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .ok_or_else(|| {
            error::bad_request(Error::MissingQuery, "query must not be empty".to_owned())
        })?;
    let products = state
        .cashback
        .catalog()
        .search(query)
        .await
        .map_err(map_catalog_error)?;
    Ok(Json(ProductsResponse {
        products: products.iter().map(ProductModel::from_entity).collect(),
    }))
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct HealthResponse {
    catalog_connected: bool,
    timestamp: DateTime<Utc>,
}

/// Check whether the product catalog is reachable.
#[openapi(tag = "Cashback")]
#[get("/cashback/health")]
pub(super) async fn health(state: &State<RocketState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        catalog_connected: state.cashback.catalog().is_healthy().await,
        timestamp: Utc::now(),
    })
}
