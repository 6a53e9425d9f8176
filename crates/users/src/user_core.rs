use std::sync::Arc;

use chrono::{DateTime, Utc};

use propdesk_core::{DomainError, DomainResult, Repository, Status, StoreError, UnitOfWork, UserId};

use crate::{NewUser, PasswordError, PasswordHasher, UpdateUser, User, UserStore};

/// Business API for users.
#[derive(Clone)]
pub struct UserCore<S> {
    repo: Repository<S>,
    hasher: Arc<dyn PasswordHasher>,
}

fn store_err(e: StoreError) -> DomainError {
    match e {
        StoreError::NotFound(_) => DomainError::not_found("user"),
        StoreError::Conflict(_) => DomainError::conflict("phone is not unique"),
        other => DomainError::Store(other),
    }
}

fn hash_err(e: PasswordError) -> DomainError {
    tracing::error!(error = %e, "password hashing failed");
    DomainError::validation("password could not be hashed")
}

impl<S: UserStore> UserCore<S> {
    pub fn new(store: S, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            repo: Repository::new(store),
            hasher,
        }
    }

    pub fn store(&self) -> &S {
        self.repo.store()
    }

    /// New core whose store runs inside `uow`; `self` keeps using the pool.
    pub fn execute_under_transaction(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            repo: self.repo.bind(uow)?,
            hasher: self.hasher.clone(),
        })
    }

    pub async fn create(&self, nu: NewUser, now: DateTime<Utc>) -> DomainResult<User> {
        nu.validate()?;

        let user = User {
            id: UserId::new(),
            first_name: nu.first_name.trim().to_string(),
            last_name: nu.last_name.trim().to_string(),
            phone: nu.phone,
            password_hash: self.hasher.hash(&nu.password).map_err(hash_err)?,
            roles: nu.roles,
            status: Status::Created,
            created_at: now,
            updated_at: now,
        };

        self.repo.create(&user).await.map_err(store_err)?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn update(&self, mut user: User, uu: UpdateUser, now: DateTime<Utc>) -> DomainResult<User> {
        uu.validate()?;

        if let Some(first_name) = uu.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = uu.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(phone) = uu.phone {
            user.phone = phone;
        }
        if let Some(password) = uu.password {
            user.password_hash = self.hasher.hash(&password).map_err(hash_err)?;
        }
        if let Some(status) = uu.status {
            user.status = status;
        }
        user.updated_at = now;

        self.repo.update(&user).await.map_err(store_err)?;
        Ok(user)
    }

    /// Move a freshly registered user to `Active` after OTP verification.
    pub async fn activate(&self, user: User, now: DateTime<Utc>) -> DomainResult<User> {
        if user.status != Status::Created {
            return Err(DomainError::InvalidState(format!(
                "user is {}, expected {}",
                user.status,
                Status::Created
            )));
        }
        let uu = UpdateUser {
            status: Some(Status::Active),
            ..UpdateUser::default()
        };
        self.update(user, uu, now).await
    }

    /// Soft delete.
    pub async fn delete(&self, mut user: User, now: DateTime<Utc>) -> DomainResult<()> {
        user.status = Status::Deleted;
        user.updated_at = now;
        self.repo.update(&user).await.map_err(store_err)
    }

    pub async fn query_by_id(&self, id: UserId) -> DomainResult<User> {
        self.repo.query_by_id(id).await.map_err(store_err)
    }

    pub async fn query_by_phone(&self, phone: &str) -> DomainResult<User> {
        self.repo.query_by_phone(phone).await.map_err(store_err)
    }

    /// Look the user up by phone and check the password.
    ///
    /// An unknown phone is reported as not found; a wrong password as
    /// [`DomainError::AuthenticationFailed`].
    pub async fn authenticate(&self, phone: &str, password: &str) -> DomainResult<User> {
        let user = self.query_by_phone(phone).await?;
        if !self.hasher.verify(password, &user.password_hash) {
            return Err(DomainError::AuthenticationFailed);
        }
        Ok(user)
    }
}
