//! Read/write-through cache decorator for [`PropertyStore`].
//!
//! Keeps properties by id plus a manager → property ids index. The index is
//! only trusted for list queries after a full read-through filled it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use propdesk_core::{Entity, PropertyId, Rebind, StoreError, UnitOfWork, UserId};

use crate::{Property, PropertyStore};

#[derive(Debug, Default)]
struct OwnerIndex {
    ids: Vec<PropertyId>,
    complete: bool,
}

#[derive(Debug, Default)]
struct State {
    by_id: HashMap<PropertyId, Property>,
    by_manager: HashMap<UserId, OwnerIndex>,
    /// Bumped on every write; read-through results are only installed when no
    /// write happened while the wrapped store was being queried.
    version: u64,
}

impl State {
    fn put(&mut self, property: &Property) {
        if property.is_deleted() {
            self.evict(property);
            return;
        }
        let old_manager = self.by_id.get(&property.id).map(|p| p.manager_id);
        if let Some(old) = old_manager.filter(|m| *m != property.manager_id) {
            self.unindex(old, property.id);
        }
        let index = self.by_manager.entry(property.manager_id).or_default();
        if !index.ids.contains(&property.id) {
            index.ids.push(property.id);
        }
        self.by_id.insert(property.id, property.clone());
    }

    fn evict(&mut self, property: &Property) {
        if let Some(prev) = self.by_id.remove(&property.id) {
            self.unindex(prev.manager_id, property.id);
        }
        self.unindex(property.manager_id, property.id);
    }

    fn unindex(&mut self, manager_id: UserId, id: PropertyId) {
        if let Some(index) = self.by_manager.get_mut(&manager_id) {
            index.ids.retain(|i| *i != id);
        }
    }

    /// Forget everything known about a manager, including list completeness.
    fn forget(&mut self, property: &Property) {
        self.by_id.remove(&property.id);
        self.by_manager.remove(&property.manager_id);
    }

    fn owned_by(&self, manager_id: UserId) -> Option<Vec<Property>> {
        let index = self.by_manager.get(&manager_id)?;
        if !index.complete {
            return None;
        }
        index
            .ids
            .iter()
            .map(|id| self.by_id.get(id).cloned())
            .collect()
    }
}

/// Caching decorator around any [`PropertyStore`].
///
/// Rebinding to a unit of work yields a view sharing the same state that
/// bypasses it for reads and evicts on writes, once immediately and once after
/// commit.
#[derive(Clone)]
pub struct PropertyCache<S> {
    inner: S,
    state: Arc<RwLock<State>>,
    uow: Option<UnitOfWork>,
}

impl<S> PropertyCache<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Arc::new(RwLock::new(State::default())),
            uow: None,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn is_transactional(&self) -> bool {
        self.uow.is_some()
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether list queries for `manager_id` can be served from the index.
    pub fn is_index_complete(&self, manager_id: UserId) -> bool {
        self.read()
            .by_manager
            .get(&manager_id)
            .is_some_and(|i| i.complete)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn written(&self, property: &Property) {
        match &self.uow {
            None => {
                let mut state = self.write();
                state.version += 1;
                state.put(property);
            }
            Some(uow) => self.forget_now_and_after_commit(uow, property),
        }
    }

    fn removed(&self, property: &Property) {
        match &self.uow {
            None => {
                let mut state = self.write();
                state.version += 1;
                state.evict(property);
            }
            Some(uow) => self.forget_now_and_after_commit(uow, property),
        }
    }

    fn forget_now_and_after_commit(&self, uow: &UnitOfWork, property: &Property) {
        {
            let mut state = self.write();
            state.version += 1;
            state.forget(property);
        }

        let state = self.state.clone();
        let property = property.clone();
        uow.after_commit(move || {
            let mut state = state.write().unwrap_or_else(|e| e.into_inner());
            state.version += 1;
            state.forget(&property);
        });
    }
}

impl<S: Rebind> Rebind for PropertyCache<S> {
    fn rebind(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            inner: self.inner.rebind(uow)?,
            state: self.state.clone(),
            uow: Some(uow.clone()),
        })
    }
}

#[async_trait]
impl<S: PropertyStore> PropertyStore for PropertyCache<S> {
    async fn create(&self, property: &Property) -> Result<(), StoreError> {
        self.inner.create(property).await?;
        self.written(property);
        Ok(())
    }

    async fn create_limited(&self, property: &Property, limit: usize) -> Result<(), StoreError> {
        self.inner.create_limited(property, limit).await?;
        self.written(property);
        Ok(())
    }

    async fn update(&self, property: &Property) -> Result<(), StoreError> {
        self.inner.update(property).await?;
        self.written(property);
        Ok(())
    }

    async fn delete(&self, property: &Property) -> Result<(), StoreError> {
        self.inner.delete(property).await?;
        self.removed(property);
        Ok(())
    }

    async fn query_by_id(&self, id: PropertyId) -> Result<Property, StoreError> {
        if self.uow.is_some() {
            return self.inner.query_by_id(id).await;
        }
        let seen = {
            let state = self.read();
            if let Some(p) = state.by_id.get(&id) {
                return Ok(p.clone());
            }
            state.version
        };

        let property = self.inner.query_by_id(id).await?;

        let mut state = self.write();
        if state.version == seen {
            state.put(&property);
        }
        Ok(property)
    }

    async fn query_by_manager_id(&self, manager_id: UserId) -> Result<Vec<Property>, StoreError> {
        if self.uow.is_some() {
            return self.inner.query_by_manager_id(manager_id).await;
        }
        let seen = {
            let state = self.read();
            if let Some(owned) = state.owned_by(manager_id) {
                return Ok(owned);
            }
            state.version
        };

        let owned = self.inner.query_by_manager_id(manager_id).await?;

        let mut state = self.write();
        if state.version == seen {
            for p in &owned {
                state.by_id.insert(p.id, p.clone());
            }
            state.by_manager.insert(
                manager_id,
                OwnerIndex {
                    ids: owned.iter().map(|p| p.id).collect(),
                    complete: true,
                },
            );
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePropertyStore, NoopTx, property};
    use propdesk_core::Status;

    #[tokio::test]
    async fn create_then_read_costs_one_wrapped_call() {
        let backing = FakePropertyStore::default();
        let cache = PropertyCache::new(backing.clone());
        let p = property(UserId::new());

        cache.create(&p).await.unwrap();
        assert_eq!(cache.query_by_id(p.id).await.unwrap(), p);
        assert_eq!(backing.calls(), 1);
    }

    #[tokio::test]
    async fn delete_leaves_nothing_behind() {
        let backing = FakePropertyStore::default();
        let cache = PropertyCache::new(backing.clone());
        let p = property(UserId::new());
        cache.create(&p).await.unwrap();

        cache.delete(&p).await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.query_by_id(p.id).await, Err(StoreError::NotFound("property")));
        assert!(cache.query_by_manager_id(p.manager_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_index_falls_back_to_the_store() {
        let backing = FakePropertyStore::default();
        let manager = UserId::new();
        let existing = property(manager);
        backing.seed(existing.clone());

        let cache = PropertyCache::new(backing.clone());
        let created = property(manager);
        cache.create(&created).await.unwrap();
        assert!(!cache.is_index_complete(manager));

        let listed = cache.query_by_manager_id(manager).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(cache.is_index_complete(manager));

        // Served from the index now, and kept current by writes.
        let calls = backing.calls();
        let third = property(manager);
        cache.create(&third).await.unwrap();
        let listed = cache.query_by_manager_id(manager).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(backing.calls(), calls + 1);
    }

    #[tokio::test]
    async fn soft_delete_drops_property_from_the_index() {
        let backing = FakePropertyStore::default();
        let cache = PropertyCache::new(backing.clone());
        let manager = UserId::new();
        let mut p = property(manager);
        cache.create(&p).await.unwrap();
        cache.query_by_manager_id(manager).await.unwrap();

        p.status = Status::Deleted;
        cache.update(&p).await.unwrap();

        assert!(cache.query_by_manager_id(manager).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transactional_writes_invalidate_the_manager_index() {
        let backing = FakePropertyStore::default();
        let cache = PropertyCache::new(backing.clone());
        let manager = UserId::new();
        cache.query_by_manager_id(manager).await.unwrap();
        assert!(cache.is_index_complete(manager));

        let uow = UnitOfWork::new(NoopTx);
        let tx_view = cache.rebind(&uow).unwrap();
        let p = property(manager);
        tx_view.create(&p).await.unwrap();

        assert!(!cache.is_index_complete(manager));
        assert!(cache.is_empty());

        uow.commit().await.unwrap();
        let listed = cache.query_by_manager_id(manager).await.unwrap();
        assert_eq!(listed, vec![p]);
    }
}
