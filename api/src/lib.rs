//! This library contains definitions for the API layer.

use app::{cashback::Cashback, database::Database, login::Login};
use rocket::{Build, Rocket};
use state::RocketState;

mod access;
mod error;
mod rate_limit;
mod routes;
mod state;

pub use rate_limit::RateLimit;

pub fn register(
    rocket: Rocket<Build>,
    db: Database,
    login: Login,
    cashback: Cashback,
    rate_limit: RateLimit,
) -> Rocket<Build> {
    routes::register(
        rocket,
        RocketState {
            db,
            login,
            cashback,
            rate_limit,
        },
    )
}
