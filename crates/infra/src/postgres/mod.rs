//! Postgres backend.
//!
//! [`PgDb`] owns the connection pool and opens units of work; [`PgStore`]
//! serves every entity port and runs against either the pool or the
//! transaction of the unit of work it was rebound to.
//!
//! Schema lives in `migrations/0001_init.sql` and is applied by
//! [`PgDb::migrate`].

mod properties;
mod rows;
mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::instrument;

use propdesk_core::{Beginner, Rebind, StoreError, TxHandle, UnitOfWork};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Connection pool plus the unit-of-work factory for Postgres.
#[derive(Debug, Clone)]
pub struct PgDb {
    pool: PgPool,
}

impl PgDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes that do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// A store running directly against the pool.
    pub fn store(&self) -> PgStore {
        PgStore {
            exec: PgExecutor::Pool(self.pool.clone()),
        }
    }
}

#[async_trait]
impl Beginner for PgDb {
    async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let uow = UnitOfWork::new(PgTx {
            tx: Mutex::new(Some(tx)),
        });
        tracing::debug!(uow_id = %uow.id(), "postgres transaction started");
        Ok(uow)
    }
}

/// Open Postgres transaction behind a unit of work.
///
/// The slot is emptied by commit or rollback.
pub struct PgTx {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

#[async_trait]
impl TxHandle for PgTx {
    async fn commit(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or(StoreError::TxClosed)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or(StoreError::TxClosed)?;
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

#[derive(Clone)]
enum PgExecutor {
    Pool(PgPool),
    Tx(Arc<PgTx>),
}

impl PgExecutor {
    async fn execute(&self, operation: &'static str, query: PgQuery<'_>) -> Result<u64, StoreError> {
        let result = match self {
            PgExecutor::Pool(pool) => query.execute(pool).await,
            PgExecutor::Tx(tx) => {
                let mut guard = tx.tx.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TxClosed)?;
                query.execute(&mut **conn).await
            }
        };
        result
            .map(|r| r.rows_affected())
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn fetch_optional(&self, operation: &'static str, query: PgQuery<'_>) -> Result<Option<PgRow>, StoreError> {
        let result = match self {
            PgExecutor::Pool(pool) => query.fetch_optional(pool).await,
            PgExecutor::Tx(tx) => {
                let mut guard = tx.tx.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TxClosed)?;
                query.fetch_optional(&mut **conn).await
            }
        };
        result.map_err(|e| map_sqlx_error(operation, e))
    }

    async fn fetch_all(&self, operation: &'static str, query: PgQuery<'_>) -> Result<Vec<PgRow>, StoreError> {
        let result = match self {
            PgExecutor::Pool(pool) => query.fetch_all(pool).await,
            PgExecutor::Tx(tx) => {
                let mut guard = tx.tx.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TxClosed)?;
                query.fetch_all(&mut **conn).await
            }
        };
        result.map_err(|e| map_sqlx_error(operation, e))
    }
}

/// One store value serving every entity port of the Postgres backend.
#[derive(Clone)]
pub struct PgStore {
    exec: PgExecutor,
}

impl PgStore {
    pub fn is_transactional(&self) -> bool {
        matches!(self.exec, PgExecutor::Tx(_))
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("transactional", &self.is_transactional())
            .finish()
    }
}

impl Rebind for PgStore {
    fn rebind(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            exec: PgExecutor::Tx(uow.handle::<PgTx>()?),
        })
    }
}

/// Exactly one row must have been touched, otherwise the entity is missing.
fn one_row(affected: u64, what: &'static str) -> Result<(), StoreError> {
    if affected == 0 {
        return Err(StoreError::NotFound(what));
    }
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::Backend(format!("no row returned in {operation}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
