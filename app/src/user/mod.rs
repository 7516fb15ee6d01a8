//! The user directory. Users are identified by their phone number, which is unique. A user is
//! created the first time somebody starts a login with an unknown phone number, or when an admin
//! registers. Users are never deleted; their balance is only ever changed by the ledger.

use crate::{auth, database::Database, ledger, phone::PhoneNumber};

mod entities;

pub(crate) use entities::{resolve, Resolution};
pub(crate) use queries::decode_role;
pub use entities::{Error, Id, Name, Role, UnknownRole, User};

/// A user together with the totals of their ledger.
#[derive(Debug)]
pub struct Profile {
    pub user: User,
    pub stats: ledger::Stats,
}

pub async fn find_by_phone(db: &Database, phone: &PhoneNumber) -> Result<Option<User>, Error> {
    Ok(queries::get_by_phone(db, phone).await?)
}

pub async fn get(db: &Database, phone: &PhoneNumber) -> Result<User, Error> {
    find_by_phone(db, phone).await?.ok_or(Error::NotFound)
}

/// Returns the user registered under `phone`, creating a client if there is none. See
/// [`resolve`] for how a requested name is reconciled with existing users.
pub async fn find_or_create(
    db: &Database,
    phone: &PhoneNumber,
    name: Option<Name>,
) -> Result<User, Error> {
    let mut data_tx = db.begin().await?;
    // The second pass only happens when somebody else registered the same phone number between
    // our read and our insert.
    for _ in 0..2 {
        let by_phone = queries::get_by_phone(&mut *data_tx, phone).await?;
        let by_name = match (&by_phone, &name) {
            (None, Some(name)) => queries::get_by_name(&mut *data_tx, name).await?,
            _ => None,
        };
        let user = match resolve(by_phone, by_name, name.clone())? {
            Resolution::Existing(user) => user,
            Resolution::AssignName(mut user, name) => {
                log::info!("assigning a name to user {:?}", user.id);
                queries::set_name(&mut *data_tx, user.id, &name).await?;
                user.name = Some(name);
                user
            }
            Resolution::Create(name) => {
                let user = User::new(phone.clone(), name, Role::Client);
                if !queries::insert(&mut *data_tx, &user, None).await? {
                    continue;
                }
                log::info!("created user {:?}", user.id);
                user
            }
        };
        data_tx.commit().await?;
        return Ok(user);
    }
    Err(Error::UserAlreadyExists)
}

/// Creates an admin. Fails if the phone number is already registered, regardless of the role of
/// the existing user.
pub(crate) async fn create_admin(
    db: &Database,
    phone: &PhoneNumber,
    name: Name,
    password: &auth::PasswordHash,
) -> Result<User, Error> {
    let user = User::new(phone.clone(), Some(name), Role::Admin);
    if queries::insert(db, &user, Some(password)).await? {
        log::info!("created admin {:?}", user.id);
        Ok(user)
    } else {
        Err(Error::UserAlreadyExists)
    }
}

pub async fn set_role(
    grant: &auth::AdminGrant,
    db: &Database,
    phone: &PhoneNumber,
    role: Role,
) -> Result<User, Error> {
    let user = queries::set_role(db, phone, role)
        .await?
        .ok_or(Error::NotFound)?;
    log::info!(
        "admin {:?} set role of user {:?} to {}",
        grant.user_id,
        user.id,
        role.as_str()
    );
    Ok(user)
}

pub async fn profile(db: &Database, phone: &PhoneNumber) -> Result<Profile, Error> {
    let user = get(db, phone).await?;
    let stats = ledger::stats(db, user.id).await?;
    Ok(Profile { user, stats })
}

mod queries {
    use super::{Id, Name, Role, User};
    use crate::{auth, money, phone::PhoneNumber};
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use sqlx::PgExecutor;
    use uuid::Uuid;

    const COLUMNS: &str = "id, phone_number, name, role, balance_tenths, created";

    pub(super) async fn get_by_phone<'e>(
        executor: impl PgExecutor<'e>,
        phone: &PhoneNumber,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(formatcp!(
            "SELECT {} FROM users WHERE phone_number = $1",
            COLUMNS
        ))
        .bind(phone.as_str())
        .fetch_optional(executor)
        .await?
        .map(UserRow::into_entity)
        .transpose()
    }

    pub(super) async fn get_by_name<'e>(
        executor: impl PgExecutor<'e>,
        name: &Name,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(formatcp!(
            "SELECT {} FROM users WHERE LOWER(name) = LOWER($1) LIMIT 1",
            COLUMNS
        ))
        .bind(name.as_str())
        .fetch_optional(executor)
        .await?
        .map(UserRow::into_entity)
        .transpose()
    }

    /// Returns false if the phone number is already taken.
    pub(super) async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        user: &User,
        password: Option<&auth::PasswordHash>,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"INSERT INTO users (id, phone_number, name, role, password_hash, balance_tenths, created)
                VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (phone_number) DO NOTHING
                RETURNING id"#,
        )
        .bind(user.id.0)
        .bind(user.phone.as_str())
        .bind(user.name.as_ref().map(|name| name.as_str()))
        .bind(user.role.as_str())
        .bind(password.map(|password| password.as_str()))
        .bind(user.balance.0)
        .bind(user.created)
        .fetch_optional(executor)
        .await?;
        Ok(row.is_some())
    }

    pub(super) async fn set_name<'e>(
        executor: impl PgExecutor<'e>,
        id: Id,
        name: &Name,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET name = $1 WHERE id = $2")
            .bind(name.as_str())
            .bind(id.0)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub(super) async fn set_role<'e>(
        executor: impl PgExecutor<'e>,
        phone: &PhoneNumber,
        role: Role,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(formatcp!(
            "UPDATE users SET role = $1 WHERE phone_number = $2 RETURNING {}",
            COLUMNS
        ))
        .bind(role.as_str())
        .bind(phone.as_str())
        .fetch_optional(executor)
        .await?
        .map(UserRow::into_entity)
        .transpose()
    }

    #[derive(sqlx::FromRow, Debug)]
    struct UserRow {
        id: Uuid,
        phone_number: String,
        name: Option<String>,
        role: String,
        balance_tenths: i64,
        created: DateTime<Utc>,
    }

    impl UserRow {
        fn into_entity(self) -> Result<User, sqlx::Error> {
            Ok(User {
                id: Id(self.id),
                phone: PhoneNumber::from_trusted(self.phone_number),
                name: self.name.as_deref().and_then(Name::parse),
                role: decode_role(&self.role)?,
                balance: money::Tenths(self.balance_tenths),
                created: self.created,
            })
        }
    }

    /// Roles are stored as text, see [`Role::as_str`].
    pub(crate) fn decode_role(raw: &str) -> Result<Role, sqlx::Error> {
        raw.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }
}
