use chrono::{DateTime, Utc};
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

use crate::money;
use crate::phone::PhoneNumber;

#[derive(Debug, Error)]
pub enum Error {
    #[error("phone number {0} is registered under a different name")]
    NameMismatch(PhoneNumber),
    #[error("name is already used by another phone number")]
    NameTaken,
    #[error("user with this phone number already exists")]
    UserAlreadyExists,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLIENT" => Ok(Role::Client),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

/// A display name. Never blank, surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(String);

impl Name {
    /// Returns `None` for empty or blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names are compared case-insensitively.
    pub fn matches(&self, other: &Name) -> bool {
        self.0.to_lowercase() == other.0.to_lowercase()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Id,
    pub phone: PhoneNumber,
    pub name: Option<Name>,
    pub role: Role,
    pub balance: money::Tenths,
    pub created: DateTime<Utc>,
}

impl User {
    pub(crate) fn new(phone: PhoneNumber, name: Option<Name>, role: Role) -> Self {
        Self {
            id: Id(Uuid::new_v4()),
            phone,
            name,
            role,
            balance: money::Tenths::default(),
            created: Utc::now(),
        }
    }

    /// A user who has not told us their name yet is considered new.
    pub fn is_new(&self) -> bool {
        self.name.is_none()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// What has to happen to satisfy a find-or-create request.
#[derive(Debug)]
pub(crate) enum Resolution {
    Existing(User),
    AssignName(User, Name),
    Create(Option<Name>),
}

/// Decides how a find-or-create request is satisfied. `by_phone` is the user registered under the
/// requested phone number; `by_name` is any user whose name matches the requested one.
///
/// A requested name must agree with the name already on file for the phone number, and a new
/// phone number can't take over a name that belongs to somebody else.
pub(crate) fn resolve(
    by_phone: Option<User>,
    by_name: Option<User>,
    name: Option<Name>,
) -> Result<Resolution, Error> {
    match (by_phone, name) {
        (Some(user), None) => Ok(Resolution::Existing(user)),
        (Some(user), Some(name)) => {
            match user.name.as_ref().map(|existing| existing.matches(&name)) {
                Some(true) => Ok(Resolution::Existing(user)),
                Some(false) => Err(Error::NameMismatch(user.phone)),
                None => Ok(Resolution::AssignName(user, name)),
            }
        }
        (None, name) => match by_name {
            Some(_) if name.is_some() => Err(Error::NameTaken),
            _ => Ok(Resolution::Create(name)),
        },
    }
}
