use app::{cashback::Cashback, database::Database, login::Login};

use crate::rate_limit::RateLimit;

pub struct RocketState {
    pub db: Database,
    pub login: Login,
    pub cashback: Cashback,
    pub rate_limit: RateLimit,
}
