use app::auth::{self, AdminGrant};
use okapi::openapi3::{Object, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket::{
    async_trait,
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use rocket_okapi::{
    gen::OpenApiGenerator,
    request::{OpenApiFromRequest, RequestHeaderInput},
};
use thiserror::Error;

use crate::state::RocketState;

/// Only lets requests through that carry the session token of an admin.
pub struct AdminGuard(AdminGrant);

impl AdminGuard {
    pub fn grant(&self) -> &AdminGrant {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("access denied")]
    AccessDenied(#[from] auth::AccessDenied),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("internal error")]
    Internal,
}

const TOKEN_HEADER: &str = "X-Auth-Token";

#[async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = match req.headers().get_one(TOKEN_HEADER) {
            Some(token) => token,
            None => return Outcome::Error((Status::Unauthorized, auth::AccessDenied.into())),
        };
        let state = match req.rocket().state::<RocketState>() {
            Some(state) => state,
            None => {
                log::error!("rocket state is not managed");
                return Outcome::Error((Status::InternalServerError, Error::Internal));
            }
        };
        match auth::get_admin_grant(&state.db, token).await {
            Ok(grant) => {
                if state.rate_limit.limit(grant.user_id) {
                    log::info!("rate limiting admin {:?}", grant.user_id);
                    Outcome::Error((Status::TooManyRequests, Error::RateLimited))
                } else {
                    Outcome::Success(Self(grant))
                }
            }
            Err(auth::Error::AccessDenied(e)) => Outcome::Error((Status::Unauthorized, e.into())),
            Err(auth::Error::Database(e)) => {
                log::error!("failed to check session token: {}", e);
                Outcome::Error((Status::InternalServerError, Error::Internal))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(openapi_auth())
    }
}

fn openapi_auth() -> RequestHeaderInput {
    let security_scheme = SecurityScheme {
        description: Some(format!(
            "Requires the session token of an admin, as returned by admin login: \"{}\".",
            TOKEN_HEADER
        )),
        data: SecuritySchemeData::ApiKey {
            name: TOKEN_HEADER.to_owned(),
            location: "header".to_owned(),
        },
        extensions: Object::default(),
    };
    let mut security_req = SecurityRequirement::new();
    security_req.insert(TOKEN_HEADER.to_owned(), Vec::new());
    RequestHeaderInput::Security(TOKEN_HEADER.to_owned(), security_scheme, security_req)
}
