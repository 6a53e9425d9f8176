use async_trait::async_trait;
use tracing::instrument;

use propdesk_core::{StoreError, UserId};
use propdesk_users::{User, UserStore};

use super::rows::{UserRow, decode};
use super::{PgStore, one_row};

const USER_COLUMNS: &str =
    "id, first_name, last_name, phone, password_hash, roles, status, created_at, updated_at";

fn roles(user: &User) -> Vec<String> {
    user.roles.iter().map(|r| r.as_str().to_string()).collect()
}

#[async_trait]
impl UserStore for PgStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, phone, password_hash, roles, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(roles(user))
        .bind(user.status.as_str())
        .bind(user.created_at)
        .bind(user.updated_at);

        self.exec.execute("create_user", query).await?;
        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, phone = $4, password_hash = $5,
                roles = $6, status = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(roles(user))
        .bind(user.status.as_str())
        .bind(user.updated_at);

        one_row(self.exec.execute("update_user", query).await?, "user")
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn delete(&self, user: &User) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM users WHERE id = $1").bind(user.id.as_uuid());
        one_row(self.exec.execute("delete_user", query).await?, "user")
    }

    async fn query_by_id(&self, id: UserId) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND status <> 'DELETED'");
        let row = self
            .exec
            .fetch_optional("query_user_by_id", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .ok_or(StoreError::NotFound("user"))?;
        decode::<UserRow, User>(&row)
    }

    async fn query_by_phone(&self, phone: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1 AND status <> 'DELETED'");
        let row = self
            .exec
            .fetch_optional("query_user_by_phone", sqlx::query(&sql).bind(phone))
            .await?
            .ok_or(StoreError::NotFound("user"))?;
        decode::<UserRow, User>(&row)
    }
}
