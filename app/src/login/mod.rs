//! Phone login with one-time codes, and password login for admins.

use crate::{
    auth::{self, AdminGrant, PasswordHash, SessionToken},
    database::Database,
    otp::{self, Code, Otp},
    phone::PhoneNumber,
    user::{self, Name, Role, User},
};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid phone number format")]
    InvalidPhoneNumber,
    #[error("invalid OTP format")]
    InvalidOtpFormat,
    #[error("name is required")]
    NameRequired,
    #[error("password is required")]
    PasswordRequired,
    #[error("invalid or expired OTP")]
    InvalidOtp,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid phone number or password")]
    InvalidCredentials,
    #[error("access denied, admin role required")]
    AdminRoleRequired,
    #[error(transparent)]
    User(#[from] user::Error),
    #[error(transparent)]
    Otp(#[from] otp::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Whether starting a login requires a name.
    pub require_name: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self { require_name: true }
    }
}

#[derive(Debug)]
pub struct LoginStarted {
    pub user: User,
    /// When the code that was sent expires.
    pub expires: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LoginVerified {
    pub user: User,
    /// True while the user has no name yet.
    pub is_new_user: bool,
}

#[derive(Debug)]
pub struct AdminSession {
    pub user: User,
    pub token: SessionToken,
}

#[derive(Clone)]
pub struct Login {
    otp: Otp,
    policy: Policy,
}

impl Login {
    pub fn new(otp: Otp, policy: Policy) -> Self {
        Self { otp, policy }
    }

    /// Finds or creates the user behind `phone` and sends them a code.
    pub async fn initiate(
        &self,
        db: &Database,
        phone: &str,
        name: Option<&str>,
    ) -> Result<LoginStarted, Error> {
        let phone = parse_phone(phone)?;
        let name = name.and_then(Name::parse);
        if self.policy.require_name && name.is_none() {
            return Err(Error::NameRequired);
        }
        let user = user::find_or_create(db, &phone, name).await?;
        let token = self.otp.generate(db, &phone).await?;
        Ok(LoginStarted {
            user,
            expires: token.expires,
        })
    }

    pub async fn verify(&self, db: &Database, phone: &str, code: &str) -> Result<LoginVerified, Error> {
        let phone = parse_phone(phone)?;
        let code = Code::parse(code).map_err(|_| Error::InvalidOtpFormat)?;
        if !self.otp.verify(db, &phone, &code).await? {
            return Err(Error::InvalidOtp);
        }
        let user = user::find_by_phone(db, &phone)
            .await?
            .ok_or(Error::UserNotFound)?;
        log::info!("user {:?} logged in", user.id);
        Ok(LoginVerified {
            is_new_user: user.is_new(),
            user,
        })
    }
}

/// Registers another admin. Only admins can do this.
pub async fn register_admin(
    grant: &AdminGrant,
    db: &Database,
    phone: &str,
    password: &str,
    name: &str,
) -> Result<User, Error> {
    let user = create_admin(db, phone, password, name).await?;
    log::info!("admin {:?} registered admin {:?}", grant.user_id, user.id);
    Ok(user)
}

/// Creates the first admin from configuration. An already registered phone number is left as it
/// is, so this can run on every start.
pub async fn bootstrap_admin(
    db: &Database,
    phone: &str,
    password: &str,
    name: &str,
) -> Result<Option<User>, Error> {
    match create_admin(db, phone, password, name).await {
        Ok(user) => Ok(Some(user)),
        Err(Error::User(user::Error::UserAlreadyExists)) => {
            log::info!("bootstrap admin {} is already registered", phone);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn create_admin(db: &Database, phone: &str, password: &str, name: &str) -> Result<User, Error> {
    let phone = parse_phone(phone)?;
    let name = Name::parse(name).ok_or(Error::NameRequired)?;
    if password.is_empty() {
        return Err(Error::PasswordRequired);
    }
    Ok(user::create_admin(db, &phone, name, &PasswordHash::generate(password)).await?)
}

/// Checks the password of an admin and starts a session for them.
pub async fn admin_login(db: &Database, phone: &str, password: &str) -> Result<AdminSession, Error> {
    let phone = parse_phone(phone)?;
    let credentials = auth::get_credentials(db, &phone)
        .await?
        .ok_or(Error::InvalidCredentials)?;
    if credentials.role != Role::Admin {
        log::info!("password login refused for non-admin {:?}", credentials.user_id);
        return Err(Error::AdminRoleRequired);
    }
    let verified = credentials
        .password
        .map(|hash| hash.verify(password))
        .unwrap_or(false);
    if !verified {
        log::info!("wrong password for admin {:?}", credentials.user_id);
        return Err(Error::InvalidCredentials);
    }
    let token = auth::start_session(db, credentials.user_id).await?;
    let user = user::find_by_phone(db, &phone)
        .await?
        .ok_or(Error::InvalidCredentials)?;
    log::info!("admin {:?} logged in", user.id);
    Ok(AdminSession { user, token })
}

fn parse_phone(raw: &str) -> Result<PhoneNumber, Error> {
    PhoneNumber::parse(raw).map_err(|_| Error::InvalidPhoneNumber)
}
