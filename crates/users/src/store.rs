use async_trait::async_trait;

use propdesk_core::{Rebind, StoreError, UserId};

use crate::User;

/// Persistence port for users.
///
/// Queries never return rows whose status is `Deleted`. A duplicate phone is
/// reported as [`StoreError::Conflict`].
#[async_trait]
pub trait UserStore: Rebind + Send + Sync {
    async fn create(&self, user: &User) -> Result<(), StoreError>;
    async fn update(&self, user: &User) -> Result<(), StoreError>;
    /// Hard delete.
    async fn delete(&self, user: &User) -> Result<(), StoreError>;
    async fn query_by_id(&self, id: UserId) -> Result<User, StoreError>;
    async fn query_by_phone(&self, phone: &str) -> Result<User, StoreError>;
}
