//! Add top-level routes as submodules here.

use crate::{
    error::{self, JsonError},
    state::RocketState,
};
use app::{phone::PhoneNumber, QueryRange};
use rocket::{Build, FromForm, Rocket};
use rocket_okapi::{
    openapi_get_routes,
    swagger_ui::{make_swagger_ui, DefaultModelRendering, SwaggerUIConfig},
};
use schemars::JsonSchema;
use serde::Serialize;

mod auth;
mod cashback;
mod users;

const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 250;

#[derive(FromForm, JsonSchema)]
struct Range {
    limit: Option<String>,
    offset: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeError {
    /// Invalid limit.
    InvalidLimit,
    /// Invalid offset.
    InvalidOffset,
}

impl Range {
    fn query_range(self) -> Result<QueryRange, JsonError<RangeError>> {
        Ok(QueryRange {
            limit: Self::parse_limit(self.limit)?,
            offset: Self::parse_offset(self.offset)?,
        })
    }

    fn parse_limit(s: Option<String>) -> Result<i64, JsonError<RangeError>> {
        let limit: i64 = s.as_deref().unwrap_or("100").parse().map_err(|_| {
            error::bad_request(RangeError::InvalidLimit, "limit is not a number".to_owned())
        })?;
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
            Err(error::bad_request(
                RangeError::InvalidLimit,
                format!("limit must be between {} and {}", MIN_LIMIT, MAX_LIMIT),
            ))
        } else {
            Ok(limit)
        }
    }

    fn parse_offset(s: Option<String>) -> Result<i64, JsonError<RangeError>> {
        let offset: i64 = s.as_deref().unwrap_or("0").parse().map_err(|_| {
            error::bad_request(
                RangeError::InvalidOffset,
                "offset is not a number".to_owned(),
            )
        })?;
        if offset < 0 {
            Err(error::bad_request(
                RangeError::InvalidOffset,
                "offset must not be negative".to_owned(),
            ))
        } else {
            Ok(offset)
        }
    }
}

/// Parses a phone number from a request, answering 400 with `error` if it is malformed.
fn parse_phone<E: Serialize>(raw: &str, error: E) -> Result<PhoneNumber, JsonError<E>> {
    PhoneNumber::parse(raw)
        .map_err(|e| error::bad_request(error, format!("{}, e.g. +996701234567", e)))
}

pub fn register(rocket: Rocket<Build>, state: RocketState) -> Rocket<Build> {
    let rocket = rocket.manage(state).register("/", error::catchers());
    let rocket = rocket.mount(
        "/",
        openapi_get_routes![
            auth::initiate_login,
            auth::verify_otp,
            auth::admin_login,
            auth::admin_registration,
            cashback::process,
            cashback::process_direct,
            cashback::deduct,
            cashback::list_products,
            cashback::search_products,
            cashback::health,
            users::balance,
            users::transactions,
            users::profile,
            users::set_role,
        ],
    );
    mount_swagger(rocket)
}

pub fn mount_swagger(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/swagger",
        make_swagger_ui(&SwaggerUIConfig {
            url: "../openapi.json".to_owned(),
            default_model_rendering: DefaultModelRendering::Model,
            show_extensions: true,
            ..Default::default()
        }),
    )
}
