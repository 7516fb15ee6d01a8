//! Phone login with one-time codes, and admin registration and login.

use super::users::UserModel;
use crate::{
    access,
    error::{self, JsonError, JsonResult},
    state::RocketState,
};
use app::{login, otp, user};
use chrono::{DateTime, Utc};
use rocket::{post, serde::json::Json, State};
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
    /// The code is not six digits.
    InvalidOtpFormat,
    /// A name is required.
    NameRequired,
    /// A password is required.
    PasswordRequired,
    /// The code is wrong, already used, or expired.
    InvalidOtp,
    /// No user has this phone number.
    UserNotFound,
    /// The phone number is already registered.
    UserAlreadyExists,
    /// The phone number is registered under a different name.
    NameMismatch,
    /// The name belongs to a user with a different phone number.
    NameTaken,
    /// Too many codes requested for this phone number, try again later.
    RateLimited,
    /// Wrong phone number or password.
    InvalidCredentials,
    /// The user is not an admin.
    AdminRoleRequired,
}

fn map_login_error(e: login::Error) -> JsonError<Error> {
    let description = e.to_string();
    match e {
        login::Error::InvalidPhoneNumber => error::bad_request(
            Error::InvalidPhoneNumber,
            "invalid phone number format, e.g. +996701234567".to_owned(),
        ),
        login::Error::InvalidOtpFormat => error::bad_request(
            Error::InvalidOtpFormat,
            "OTP must be exactly 6 digits".to_owned(),
        ),
        login::Error::NameRequired => error::bad_request(Error::NameRequired, description),
        login::Error::PasswordRequired => error::bad_request(Error::PasswordRequired, description),
        login::Error::InvalidOtp => error::bad_request(Error::InvalidOtp, description),
        login::Error::UserNotFound => error::not_found(Error::UserNotFound, description),
        login::Error::InvalidCredentials => {
            error::unauthorized(Error::InvalidCredentials, description)
        }
        login::Error::AdminRoleRequired => {
            error::unauthorized(Error::AdminRoleRequired, description)
        }
        login::Error::User(user::Error::UserAlreadyExists) => {
            error::conflict(Error::UserAlreadyExists, description)
        }
        login::Error::User(user::Error::NameMismatch(_)) => {
            error::conflict(Error::NameMismatch, description)
        }
        login::Error::User(user::Error::NameTaken) => error::conflict(Error::NameTaken, description),
        login::Error::User(user::Error::NotFound) => {
            error::not_found(Error::UserNotFound, description)
        }
        login::Error::Otp(otp::Error::RateLimited) => error::too_many_requests(
            Error::RateLimited,
            "too many OTP requests, please try again in a few minutes".to_owned(),
        ),
        e => error::internal_server_error(Error::Unknown, e),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct InitiateLoginRequest {
    phone_number: String,
    name: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct InitiateLoginResponse {
    user: UserModel,
    /// A code was sent to the phone number.
    otp_issued: bool,
    /// When the code expires.
    otp_expires_at: DateTime<Utc>,
}

/// Start a login: registers the phone number if it is new and sends a one-time code to it.
#[openapi(tag = "Auth")]
#[post("/auth/login/initiate", data = "<req>")]
pub(super) async fn initiate_login(
    state: &State<RocketState>,
    req: Json<InitiateLoginRequest>,
) -> JsonResult<InitiateLoginResponse, Error> {
    let started = state
        .login
        .initiate(&state.db, &req.phone_number, req.name.as_deref())
        .await
        .map_err(map_login_error)?;
    Ok(Json(InitiateLoginResponse {
        user: UserModel::from_entity(&started.user),
        otp_issued: true,
        otp_expires_at: started.expires,
    }))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct VerifyOtpRequest {
    phone_number: String,
    otp_code: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct VerifyOtpResponse {
    user: UserModel,
    /// True if the user has not set a name yet.
    is_new_user: bool,
}

/// Finish a login with the one-time code. Each code is accepted once.
#[openapi(tag = "Auth")]
#[post("/auth/verify-otp", data = "<req>")]
pub(super) async fn verify_otp(
    state: &State<RocketState>,
    req: Json<VerifyOtpRequest>,
) -> JsonResult<VerifyOtpResponse, Error> {
    let verified = state
        .login
        .verify(&state.db, &req.phone_number, &req.otp_code)
        .await
        .map_err(map_login_error)?;
    Ok(Json(VerifyOtpResponse {
        user: UserModel::from_entity(&verified.user),
        is_new_user: verified.is_new_user,
    }))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct AdminLoginRequest {
    phone_number: String,
    password: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct AdminLoginResponse {
    user: UserModel,
    /// Session token, to be sent as `X-Auth-Token`. Valid for 12 hours.
    token: String,
}

/// Log in as an admin with phone number and password.
#[openapi(tag = "Auth")]
#[post("/auth/login/admin", data = "<req>")]
pub(super) async fn admin_login(
    state: &State<RocketState>,
    req: Json<AdminLoginRequest>,
) -> JsonResult<AdminLoginResponse, Error> {
    let session = login::admin_login(&state.db, &req.phone_number, &req.password)
        .await
        .map_err(map_login_error)?;
    Ok(Json(AdminLoginResponse {
        user: UserModel::from_entity(&session.user),
        token: session.token.as_str().to_owned(),
    }))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct AdminRegistrationRequest {
    phone_number: String,
    password: String,
    name: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct AdminRegistrationResponse {
    user: UserModel,
}

/// Register a new admin. Requires an admin session.
#[openapi(tag = "Auth")]
#[post("/auth/registration/admin", data = "<req>")]
pub(super) async fn admin_registration(
    state: &State<RocketState>,
    req: Json<AdminRegistrationRequest>,
    guard: access::AdminGuard,
) -> JsonResult<AdminRegistrationResponse, Error> {
    let user = login::register_admin(
        guard.grant(),
        &state.db,
        &req.phone_number,
        &req.password,
        &req.name,
    )
    .await
    .map_err(map_login_error)?;
    Ok(Json(AdminRegistrationResponse {
        user: UserModel::from_entity(&user),
    }))
}
