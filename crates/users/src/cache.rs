//! Read/write-through cache decorator for [`UserStore`].
//!
//! Entries are keyed by id, with a phone → id secondary index. The backing
//! store stays authoritative; the cache is unbounded and local to the process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use propdesk_core::{Entity, Rebind, StoreError, UnitOfWork, UserId};

use crate::{User, UserStore};

#[derive(Debug, Default)]
struct State {
    by_id: HashMap<UserId, User>,
    by_phone: HashMap<String, UserId>,
    /// Bumped on every write; read-through results are only installed when no
    /// write happened while the wrapped store was being queried.
    version: u64,
}

impl State {
    fn put(&mut self, user: &User) {
        if user.is_deleted() {
            self.evict(user);
            return;
        }
        let old_phone = self.by_id.get(&user.id).map(|u| u.phone.clone());
        if let Some(old) = old_phone.filter(|p| *p != user.phone) {
            self.by_phone.remove(&old);
        }
        self.by_phone.insert(user.phone.clone(), user.id);
        self.by_id.insert(user.id, user.clone());
    }

    fn evict(&mut self, user: &User) {
        if let Some(prev) = self.by_id.remove(&user.id) {
            self.by_phone.remove(&prev.phone);
        }
        if self.by_phone.get(&user.phone) == Some(&user.id) {
            self.by_phone.remove(&user.phone);
        }
    }
}

/// Caching decorator around any [`UserStore`].
///
/// A value rebound to a unit of work shares the cache state but never reads
/// from or populates it; its writes evict the touched keys immediately and
/// once more after the commit.
#[derive(Clone)]
pub struct UserCache<S> {
    inner: S,
    state: Arc<RwLock<State>>,
    uow: Option<UnitOfWork>,
}

impl<S> UserCache<S> {
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
        self.state.read().unwrap_or_else(|e| e.into_inner()).by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached user for `id`, or the state version to hand back to `populate`.
    fn lookup_id(&self, id: UserId) -> Result<User, u64> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.by_id.get(&id).cloned().ok_or(state.version)
    }

    fn lookup_phone(&self, phone: &str) -> Result<User, u64> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .by_phone
            .get(phone)
            .and_then(|id| state.by_id.get(id))
            .cloned()
            .ok_or(state.version)
    }

    fn populate(&self, user: &User, seen: u64) {
        let mut state = self.write();
        if state.version == seen {
            state.put(user);
        }
    }

    fn written(&self, user: &User) {
        match &self.uow {
            None => {
                let mut state = self.write();
                state.version += 1;
                state.put(user);
            }
            Some(uow) => self.evict_now_and_after_commit(uow, user),
        }
    }

    fn removed(&self, user: &User) {
        match &self.uow {
            None => {
                let mut state = self.write();
                state.version += 1;
                state.evict(user);
            }
            Some(uow) => self.evict_now_and_after_commit(uow, user),
        }
    }

    fn evict_now_and_after_commit(&self, uow: &UnitOfWork, user: &User) {
        {
            let mut state = self.write();
            state.version += 1;
            state.evict(user);
        }

        let state = self.state.clone();
        let user = user.clone();
        uow.after_commit(move || {
            let mut state = state.write().unwrap_or_else(|e| e.into_inner());
            state.version += 1;
            state.evict(&user);
        });
    }
}

impl<S: Rebind> Rebind for UserCache<S> {
    fn rebind(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            inner: self.inner.rebind(uow)?,
            state: self.state.clone(),
            uow: Some(uow.clone()),
        })
    }
}

#[async_trait]
impl<S: UserStore> UserStore for UserCache<S> {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        self.inner.create(user).await?;
        self.written(user);
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        self.inner.update(user).await?;
        self.written(user);
        Ok(())
    }

    async fn delete(&self, user: &User) -> Result<(), StoreError> {
        self.inner.delete(user).await?;
        self.removed(user);
        Ok(())
    }

    async fn query_by_id(&self, id: UserId) -> Result<User, StoreError> {
        if self.uow.is_some() {
            return self.inner.query_by_id(id).await;
        }
        let seen = match self.lookup_id(id) {
            Ok(user) => return Ok(user),
            Err(version) => version,
        };
        let user = self.inner.query_by_id(id).await?;
        self.populate(&user, seen);
        Ok(user)
    }

    async fn query_by_phone(&self, phone: &str) -> Result<User, StoreError> {
        if self.uow.is_some() {
            return self.inner.query_by_phone(phone).await;
        }
        let seen = match self.lookup_phone(phone) {
            Ok(user) => return Ok(user),
            Err(version) => version,
        };
        let user = self.inner.query_by_phone(phone).await?;
        self.populate(&user, seen);
        Ok(user)
    }
}
