use std::{fmt::Display, sync::Arc, time::Duration};

use app::{
    cashback::Cashback,
    catalog::{self, Backend},
    database::{self, run_migrations, seed_development_data},
    ledger,
    login::{self, Login},
    otp::{self, GatewayMessenger, LogMessenger, Messenger, Otp},
};
use rocket::{launch, Build, Rocket};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct Config {
    database_url: Url,
    catalog: CatalogConfig,
    messaging: MessagingConfig,
    #[serde(default)]
    otp: OtpConfig,
    #[serde(default)]
    ledger: LedgerConfig,
    #[serde(default)]
    login: LoginConfig,
    rate_limit: RateLimitConfig,
    /// Admin created on startup if its phone number is not registered yet. Further admins are
    /// registered by existing ones.
    bootstrap_admin: Option<BootstrapAdminConfig>,
}

#[derive(Debug, Deserialize)]
struct BootstrapAdminConfig {
    phone_number: String,
    password: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CatalogConfig {
    Database,
    Remote { url: Url, api_key: Option<String> },
}

impl CatalogConfig {
    fn into_backend(self) -> Backend {
        match self {
            CatalogConfig::Database => Backend::Database,
            CatalogConfig::Remote { url, api_key } => Backend::Remote { url, api_key },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum MessagingConfig {
    Log,
    Gateway { url: Url, api_key: String },
}

impl MessagingConfig {
    fn into_messenger(self) -> Arc<dyn Messenger> {
        match self {
            MessagingConfig::Log => Arc::new(LogMessenger),
            MessagingConfig::Gateway { url, api_key } => Arc::new(GatewayMessenger::new(url, api_key)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OtpConfig {
    ttl_secs: i64,
    window_secs: i64,
    max_codes_per_window: i64,
    sweep_interval_secs: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            window_secs: 300,
            max_codes_per_window: 3,
            sweep_interval_secs: 600,
        }
    }
}

impl OtpConfig {
    fn policy(&self) -> otp::Policy {
        otp::Policy {
            ttl: chrono::Duration::seconds(self.ttl_secs),
            window: chrono::Duration::seconds(self.window_secs),
            max_codes: self.max_codes_per_window,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LedgerConfig {
    deadline_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { deadline_ms: 5000 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LoginConfig {
    require_name: bool,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self { require_name: true }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitConfig {
    limit: usize,
    span_secs: u64,
}

impl RateLimitConfig {
    fn into_rate_limit(self) -> api::RateLimit {
        api::RateLimit::new(self.limit, Duration::from_secs(self.span_secs))
    }
}

#[launch]
async fn rocket() -> _ {
    start_server().await
}

async fn start_server() -> Rocket<Build> {
    env_logger::init();

    let rocket = Rocket::build();
    let config: Config = rocket
        .figment()
        .extract()
        .unwrap_or_else(|e| exit_with("invalid configuration", e));

    let db = database::connect(&config.database_url)
        .await
        .unwrap_or_else(|e| exit_with("failed to connect to the database", e));
    run_migrations(&db)
        .await
        .unwrap_or_else(|e| exit_with("failed to run migrations", e));
    #[cfg(debug_assertions)]
    seed_development_data(&db)
        .await
        .unwrap_or_else(|e| exit_with("failed to seed development data", e));

    if let Some(admin) = &config.bootstrap_admin {
        login::bootstrap_admin(&db, &admin.phone_number, &admin.password, &admin.name)
            .await
            .unwrap_or_else(|e| exit_with("failed to create the bootstrap admin", e));
    }

    otp::start_sweeper(
        db.clone(),
        config.otp.policy(),
        Duration::from_secs(config.otp.sweep_interval_secs),
    );

    let otp = Otp::new(config.otp.policy(), config.messaging.into_messenger());
    let login = Login::new(
        otp,
        login::Policy {
            require_name: config.login.require_name,
        },
    );
    let cashback = Cashback::new(
        catalog::from_backend(config.catalog.into_backend(), db.clone()),
        ledger::Policy {
            deadline: Duration::from_millis(config.ledger.deadline_ms),
        },
    );

    api::register(
        rocket,
        db,
        login,
        cashback,
        config.rate_limit.into_rate_limit(),
    )
}

fn exit_with(what: &str, e: impl Display) -> ! {
    log::error!("{}: {}", what, e);
    std::process::exit(1)
}
