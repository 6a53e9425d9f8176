use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_auth::Role;
use propdesk_core::{DomainResult, Entity, FieldErrors, Status, UserId};

use crate::MAX_PASSWORD_BYTES;

/// A registered user (property manager or administrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }
}

/// Registration input. The password is plain text until hashed by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub password: String,
    pub roles: Vec<Role>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub status: Option<Status>,
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Local mobile number: ten digits with a leading zero.
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.starts_with('0') && phone.bytes().all(|b| b.is_ascii_digit())
}

impl NewUser {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = FieldErrors::new();
        errs.require(&self.first_name, "first_name");
        errs.check(is_valid_phone(&self.phone), "phone", "must be 10 digits starting with 0");
        errs.check(
            self.password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            "must be at least 6 characters",
        );
        errs.check(
            self.password.len() <= MAX_PASSWORD_BYTES,
            "password",
            "must be at most 72 bytes",
        );
        errs.check(!self.roles.is_empty(), "roles", "at least one role is required");
        errs.into_result()
    }
}

impl UpdateUser {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = FieldErrors::new();
        if let Some(first_name) = &self.first_name {
            errs.require(first_name, "first_name");
        }
        if let Some(phone) = &self.phone {
            errs.check(is_valid_phone(phone), "phone", "must be 10 digits starting with 0");
        }
        if let Some(password) = &self.password {
            errs.check(
                password.chars().count() >= MIN_PASSWORD_LEN,
                "password",
                "must be at least 6 characters",
            );
            errs.check(password.len() <= MAX_PASSWORD_BYTES, "password", "must be at most 72 bytes");
        }
        errs.into_result()
    }
}
