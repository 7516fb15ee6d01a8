use rocket::{catch, catchers, http::Status, serde::json::Json, Catcher, Request};
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Serialize, JsonSchema)]
pub struct Error<E: Serialize> {
    pub error: Inner<E>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct Inner<E: Serialize> {
    pub code: u16,
    pub description: String,
    pub reason: Option<&'static str>,
    pub status: E,
}

impl<E: Serialize> Error<E> {
    fn new(http_status: Status, description: String, error: E) -> Self {
        Self {
            error: Inner {
                code: http_status.code,
                description,
                reason: http_status.reason(),
                status: error,
            },
        }
    }
}

pub type JsonError<E> = (Status, Json<Error<E>>);

pub type JsonResult<T, E> = Result<Json<T>, JsonError<E>>;

fn json_error<E: Serialize>(status: Status, error: E, description: String) -> JsonError<E> {
    (status, Json(Error::new(status, description, error)))
}

pub fn bad_request<E: Serialize>(error: E, description: String) -> JsonError<E> {
    json_error(Status::BadRequest, error, description)
}

pub fn unauthorized<E: Serialize>(error: E, description: String) -> JsonError<E> {
    json_error(Status::Unauthorized, error, description)
}

pub fn not_found<E: Serialize>(error: E, description: String) -> JsonError<E> {
    json_error(Status::NotFound, error, description)
}

pub fn conflict<E: Serialize>(error: E, description: String) -> JsonError<E> {
    json_error(Status::Conflict, error, description)
}

pub fn too_many_requests<E: Serialize>(error: E, description: String) -> JsonError<E> {
    json_error(Status::TooManyRequests, error, description)
}

pub fn bad_gateway<E: Serialize>(error: E, description: String) -> JsonError<E> {
    json_error(Status::BadGateway, error, description)
}

/// Logs `cause` and answers with a generic description, so no internals reach the caller.
pub fn internal_server_error<E: Serialize>(error: E, cause: impl Display) -> JsonError<E> {
    log::error!("request failed: {}", cause);
    json_error(
        Status::InternalServerError,
        error,
        "an unexpected error occurred, please contact support".to_owned(),
    )
}

/// Status of errors raised outside of route handlers, e.g. by guards or body parsing.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestError {
    /// The request was malformed.
    BadRequest,
    /// Missing or invalid `X-Auth-Token`.
    Unauthorized,
    /// Unknown route.
    NotFound,
    /// The request body did not have the expected shape.
    InvalidBody,
    /// Too many requests, try again later.
    RateLimited,
    /// Unexpected error, please contact support.
    Unknown,
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<Error<RequestError>>) {
    let error = match status.code {
        400 => RequestError::BadRequest,
        401 | 403 => RequestError::Unauthorized,
        404 => RequestError::NotFound,
        422 => RequestError::InvalidBody,
        429 => RequestError::RateLimited,
        _ => RequestError::Unknown,
    };
    let description = status.reason().unwrap_or("request failed").to_lowercase();
    (status, Json(Error::new(status, description, error)))
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}
