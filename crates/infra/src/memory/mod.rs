//! In-memory backend for development and tests.
//!
//! All five entity tables live behind one lock. A unit of work copies the
//! tables when it begins, applies its writes to that copy and records them;
//! commit replays the recorded writes against the current tables and swaps
//! the result in, so a failing commit leaves nothing behind.

mod stores;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;

use propdesk_core::{Beginner, Entity, StoreError, TxHandle, UnitOfWork};
use propdesk_properties::{Block, Floor, Property, Unit};
use propdesk_users::User;

pub use stores::MemoryStore;

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) users: Vec<User>,
    pub(crate) properties: Vec<Property>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) floors: Vec<Floor>,
    pub(crate) units: Vec<Unit>,
}

/// Number of stored rows per table, soft-deleted rows included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub users: usize,
    pub properties: usize,
    pub blocks: usize,
    pub floors: usize,
    pub units: usize,
}

impl RowCounts {
    /// Rows of the asset hierarchy only.
    pub fn hierarchy(&self) -> usize {
        self.properties + self.blocks + self.floors + self.units
    }
}

pub(crate) fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// Shared in-memory database; clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store running directly against the shared tables.
    pub fn store(&self) -> MemoryStore {
        MemoryStore::new(self.tables.clone())
    }

    pub fn row_counts(&self) -> Result<RowCounts, StoreError> {
        let t = self.tables.read().map_err(poisoned)?;
        Ok(RowCounts {
            users: t.users.len(),
            properties: t.properties.len(),
            blocks: t.blocks.len(),
            floors: t.floors.len(),
            units: t.units.len(),
        })
    }
}

#[async_trait]
impl Beginner for MemoryDb {
    async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let working = self.tables.read().map_err(poisoned)?.clone();
        let uow = UnitOfWork::new(MemTx {
            shared: self.tables.clone(),
            state: Mutex::new(TxState {
                working,
                journal: Vec::new(),
                open: true,
            }),
        });
        tracing::debug!(uow_id = %uow.id(), "memory transaction started");
        Ok(uow)
    }
}

type Op = Box<dyn Fn(&mut Tables) -> Result<(), StoreError> + Send + Sync>;

struct TxState {
    working: Tables,
    journal: Vec<Op>,
    open: bool,
}

/// Transaction handle of the in-memory backend.
pub struct MemTx {
    shared: Arc<RwLock<Tables>>,
    state: Mutex<TxState>,
}

impl MemTx {
    fn lock_open(&self) -> Result<MutexGuard<'_, TxState>, StoreError> {
        let state = self.state.lock().map_err(poisoned)?;
        if !state.open {
            return Err(StoreError::TxClosed);
        }
        Ok(state)
    }

    pub(crate) fn belongs_to(&self, tables: &Arc<RwLock<Tables>>) -> bool {
        Arc::ptr_eq(&self.shared, tables)
    }
}

#[async_trait]
impl TxHandle for MemTx {
    async fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.lock_open()?;
        state.open = false;
        let journal = std::mem::take(&mut state.journal);

        let mut shared = self.shared.write().map_err(poisoned)?;
        let mut next = shared.clone();
        for op in &journal {
            op(&mut next)?;
        }
        *shared = next;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let mut state = self.lock_open()?;
        state.open = false;
        state.journal.clear();
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

/// Where a [`MemoryStore`] reads and writes.
#[derive(Clone)]
pub(crate) enum Executor {
    Shared(Arc<RwLock<Tables>>),
    Tx(Arc<MemTx>),
}

impl Executor {
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        match self {
            Executor::Shared(tables) => {
                let tables = tables.read().map_err(poisoned)?;
                Ok(f(&tables))
            }
            Executor::Tx(tx) => Ok(f(&tx.lock_open()?.working)),
        }
    }

    /// Apply `op`. Ops validate before mutating, so a failed op changes nothing.
    pub(crate) fn write(
        &self,
        op: impl Fn(&mut Tables) -> Result<(), StoreError> + Send + Sync + 'static,
    ) -> Result<(), StoreError> {
        match self {
            Executor::Shared(tables) => op(&mut *tables.write().map_err(poisoned)?),
            Executor::Tx(tx) => {
                let mut state = tx.lock_open()?;
                op(&mut state.working)?;
                state.journal.push(Box::new(op));
                Ok(())
            }
        }
    }
}

/// Append `new` rows, rejecting ids already present.
pub(crate) fn insert_all<T: Entity + Clone>(rows: &mut Vec<T>, new: &[T]) -> Result<(), StoreError> {
    let mut seen: HashSet<T::Id> = rows.iter().map(Entity::id).collect();
    for row in new {
        if !seen.insert(row.id()) {
            return Err(StoreError::Conflict(format!("duplicate id {:?}", row.id())));
        }
    }
    rows.extend_from_slice(new);
    Ok(())
}

pub(crate) fn replace<T: Entity + Clone>(rows: &mut [T], row: &T, what: &'static str) -> Result<(), StoreError> {
    let slot = rows
        .iter_mut()
        .find(|r| r.id() == row.id())
        .ok_or(StoreError::NotFound(what))?;
    *slot = row.clone();
    Ok(())
}

pub(crate) fn remove<T: Entity>(rows: &mut Vec<T>, id: T::Id, what: &'static str) -> Result<(), StoreError> {
    let pos = rows
        .iter()
        .position(|r| r.id() == id)
        .ok_or(StoreError::NotFound(what))?;
    rows.remove(pos);
    Ok(())
}

pub(crate) fn find_live<T: Entity + Clone>(rows: &[T], id: T::Id, what: &'static str) -> Result<T, StoreError> {
    rows.iter()
        .find(|r| r.id() == id && !r.is_deleted())
        .cloned()
        .ok_or(StoreError::NotFound(what))
}

pub(crate) fn live<T: Entity + Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().filter(|r| !r.is_deleted() && keep(r)).cloned().collect()
}

/// Reject rows whose parent is missing, as a foreign key would.
pub(crate) fn require_parents<I: Copy + Eq + std::hash::Hash + std::fmt::Debug>(
    parents: &HashSet<I>,
    wanted: impl IntoIterator<Item = I>,
    relation: &str,
) -> Result<(), StoreError> {
    for id in wanted {
        if !parents.contains(&id) {
            return Err(StoreError::Backend(format!("{relation} references missing row {id:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use propdesk_core::{PropertyId, Rebind, UserId};
    use propdesk_properties::{NewProperty, PropertyStore};

    fn property() -> Property {
        NewProperty {
            manager_id: UserId::new(),
            name: "Lotus".into(),
            address_level_1_id: 1,
            address_level_2_id: 1,
            address_level_3_id: 1,
            street: "1 Nguyen Hue".into(),
        }
        .into_property(PropertyId::new(), Utc::now())
    }

    #[tokio::test]
    async fn uncommitted_writes_stay_inside_the_unit_of_work() {
        let db = MemoryDb::new();
        let uow = db.begin().await.unwrap();
        let tx_store = db.store().rebind(&uow).unwrap();
        let p = property();

        PropertyStore::create(&tx_store, &p).await.unwrap();
        assert_eq!(PropertyStore::query_by_id(&tx_store, p.id).await.unwrap(), p);
        assert!(PropertyStore::query_by_id(&db.store(), p.id).await.is_err());

        uow.commit().await.unwrap();
        assert_eq!(PropertyStore::query_by_id(&db.store(), p.id).await.unwrap(), p);
    }

    #[tokio::test]
    async fn rollback_discards_the_journal() {
        let db = MemoryDb::new();
        let uow = db.begin().await.unwrap();
        let tx_store = db.store().rebind(&uow).unwrap();
        PropertyStore::create(&tx_store, &property()).await.unwrap();

        uow.rollback().await.unwrap();
        assert_eq!(db.row_counts().unwrap(), RowCounts::default());
    }

    #[tokio::test]
    async fn stores_rebound_to_a_finished_unit_fail() {
        let db = MemoryDb::new();
        let uow = db.begin().await.unwrap();
        let tx_store = db.store().rebind(&uow).unwrap();
        uow.clone().commit().await.unwrap();

        let err = PropertyStore::create(&tx_store, &property()).await.unwrap_err();
        assert_eq!(err, StoreError::TxClosed);
        assert_eq!(db.store().rebind(&uow).unwrap_err(), StoreError::TxClosed);
    }

    #[tokio::test]
    async fn unit_of_work_from_another_database_is_rejected() {
        let db = MemoryDb::new();
        let other = MemoryDb::new();
        let uow = other.begin().await.unwrap();
        assert_eq!(db.store().rebind(&uow).unwrap_err(), StoreError::ForeignUnitOfWork);
    }

    #[tokio::test]
    async fn commit_replays_against_concurrent_writes() {
        let db = MemoryDb::new();
        let uow = db.begin().await.unwrap();
        let tx_store = db.store().rebind(&uow).unwrap();

        let outside = property();
        PropertyStore::create(&db.store(), &outside).await.unwrap();
        let inside = property();
        PropertyStore::create(&tx_store, &inside).await.unwrap();

        uow.commit().await.unwrap();
        assert_eq!(db.row_counts().unwrap().properties, 2);
    }
}
