//! Persistence primitives shared by every entity store.
//!
//! - [`UnitOfWork`]: request-scoped handle for one open transaction.
//! - [`Beginner`]: the backend side that opens units of work.
//! - [`Rebind`]: capability of a store to produce a sibling bound to a unit of
//!   work, leaving the original untouched.
//! - [`Repository`]: the generic holder every entity `Core` keeps its store in.
//!
//! Stores that were never rebound run directly against the connection pool.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a persistence port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness violation enforced by the backing store.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A capacity check the store performs together with a write failed.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("unit of work already committed or rolled back")]
    TxClosed,

    #[error("unit of work was opened by a different backend")]
    ForeignUnitOfWork,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Backend side of an open transaction.
///
/// Implemented by each backend (in-memory, Postgres). Stores of the same
/// backend recover their concrete handle through [`UnitOfWork::handle`].
#[async_trait]
pub trait TxHandle: Any + Send + Sync {
    async fn commit(&self) -> Result<(), StoreError>;
    async fn rollback(&self) -> Result<(), StoreError>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

type Hook = Box<dyn FnOnce() + Send>;

struct Inner {
    id: Uuid,
    tx: Arc<dyn TxHandle>,
    finished: AtomicBool,
    after_commit: Mutex<Vec<Hook>>,
}

/// Request-scoped handle for one open transaction.
///
/// Clones share the same transaction. `commit`/`rollback` finish it for every
/// clone; later store calls through any clone fail with
/// [`StoreError::TxClosed`].
#[derive(Clone)]
pub struct UnitOfWork {
    inner: Arc<Inner>,
}

impl UnitOfWork {
    pub fn new<T: TxHandle>(tx: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::now_v7(),
                tx: Arc::new(tx),
                finished: AtomicBool::new(false),
                after_commit: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Recover the backend-specific transaction handle.
    pub fn handle<T: TxHandle>(&self) -> Result<Arc<T>, StoreError> {
        if self.is_finished() {
            return Err(StoreError::TxClosed);
        }
        self.inner
            .tx
            .clone()
            .into_any()
            .downcast::<T>()
            .map_err(|_| StoreError::ForeignUnitOfWork)
    }

    /// Register a callback that runs only after a successful commit.
    pub fn after_commit(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self
            .inner
            .after_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        hooks.push(Box::new(hook));
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return Err(StoreError::TxClosed);
        }
        self.inner.tx.commit().await?;

        let hooks = std::mem::take(
            &mut *self
                .inner
                .after_commit
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return Err(StoreError::TxClosed);
        }
        self.inner
            .after_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.inner.tx.rollback().await
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.inner.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Opens units of work against a backing store.
#[async_trait]
pub trait Beginner: Send + Sync {
    async fn begin(&self) -> Result<UnitOfWork, StoreError>;
}

/// Produce a sibling value whose executor is the given unit of work.
///
/// Implementations allocate a new value; `self` keeps running against the pool.
pub trait Rebind: Sized {
    fn rebind(&self, uow: &UnitOfWork) -> Result<Self, StoreError>;
}

impl<S: Rebind> Rebind for Arc<S> {
    fn rebind(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Arc::new(self.as_ref().rebind(uow)?))
    }
}

/// Generic store holder used by every entity `Core`.
#[derive(Debug, Clone)]
pub struct Repository<S> {
    store: S,
}

impl<S> Repository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: Rebind> Repository<S> {
    /// New repository bound to `uow`; `self` is untouched.
    pub fn bind(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            store: self.store.rebind(uow)?,
        })
    }
}

impl<S> Deref for Repository<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
