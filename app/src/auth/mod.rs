//! Handles admin credentials, sessions, and grants. Authentication is proven by possession of a
//! session token; authorization is proven by possession of an [`AdminGrant`].

use crate::{database::Database, phone::PhoneNumber, user};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

mod entities;

pub(crate) use entities::Session;
pub use entities::{AccessDenied, AdminGrant, PasswordHash, SessionToken, TokenHash, TokenId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    AccessDenied(#[from] AccessDenied),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// What is stored about a user for password login.
#[derive(Debug)]
pub(crate) struct Credentials {
    pub user_id: user::Id,
    pub role: user::Role,
    pub password: Option<PasswordHash>,
}

pub async fn get_admin_grant(db: &Database, token: &str) -> Result<AdminGrant, Error> {
    let session = queries::get_session(db, &TokenHash::generate(token))
        .await?
        .ok_or(AccessDenied)?;
    Ok(session.admin_grant(Utc::now())?)
}

pub(crate) async fn get_credentials(
    db: &Database,
    phone: &PhoneNumber,
) -> Result<Option<Credentials>, sqlx::Error> {
    queries::get_credentials(db, phone).await
}

/// Starts a new session for `user_id` and returns the token that proves it.
pub(crate) async fn start_session(
    db: &Database,
    user_id: user::Id,
) -> Result<SessionToken, sqlx::Error> {
    let token = SessionToken::generate();
    let now = Utc::now();
    queries::insert_session(
        db,
        &Session {
            id: TokenId(Uuid::new_v4()),
            user_id,
            role: user::Role::Admin,
            expires: now + entities::session_lifetime(),
        },
        &TokenHash::generate(token.as_str()),
        now,
    )
    .await?;
    Ok(token)
}

mod queries {
    use super::{Credentials, PasswordHash, Session, TokenHash, TokenId};
    use crate::{database::Database, phone::PhoneNumber, user};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    pub(super) async fn get_session(
        db: &Database,
        token_hash: &TokenHash,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, SessionRow>(
            r#"SELECT t.id, t.user_id, u.role, t.expires FROM auth_tokens t
                JOIN users u ON u.id = t.user_id WHERE t.token_hash = $1"#,
        )
        .bind(token_hash.as_str())
        .fetch_optional(db)
        .await?
        .map(SessionRow::into_entity)
        .transpose()
    }

    pub(super) async fn insert_session(
        db: &Database,
        session: &Session,
        token_hash: &TokenHash,
        created: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO auth_tokens (id, user_id, token_hash, created, expires)
                VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(session.id.0)
        .bind(session.user_id.0)
        .bind(token_hash.as_str())
        .bind(created)
        .bind(session.expires)
        .execute(db)
        .await?;
        Ok(())
    }

    pub(super) async fn get_credentials(
        db: &Database,
        phone: &PhoneNumber,
    ) -> Result<Option<Credentials>, sqlx::Error> {
        sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, role, password_hash FROM users WHERE phone_number = $1",
        )
        .bind(phone.as_str())
        .fetch_optional(db)
        .await?
        .map(|row| {
            Ok::<_, sqlx::Error>(Credentials {
                user_id: user::Id(row.id),
                role: user::decode_role(&row.role)?,
                password: row.password_hash.map(PasswordHash::from_stored),
            })
        })
        .transpose()
    }

    #[derive(Debug, sqlx::FromRow)]
    struct SessionRow {
        id: Uuid,
        user_id: Uuid,
        role: String,
        expires: DateTime<Utc>,
    }

    impl SessionRow {
        fn into_entity(self) -> Result<Session, sqlx::Error> {
            Ok(Session {
                id: TokenId(self.id),
                user_id: user::Id(self.user_id),
                role: user::decode_role(&self.role)?,
                expires: self.expires,
            })
        }
    }

    #[derive(Debug, sqlx::FromRow)]
    struct CredentialsRow {
        id: Uuid,
        role: String,
        password_hash: Option<String>,
    }
}
