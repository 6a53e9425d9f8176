//! `propdesk-properties`: the asset hierarchy.
//!
//! A property owned by one manager holds blocks, blocks hold floors, floors
//! hold units. Each entity has its own persistence port and business core;
//! [`Hierarchy`] ties the four together for nested operations.

pub mod block;
pub mod cache;
pub mod floor;
pub mod hierarchy;
pub mod property;
pub mod unit;

pub use block::{Block, BlockCore, BlockStore, NewBlock};
pub use cache::PropertyCache;
pub use floor::{Floor, FloorCore, FloorStore, NewFloor};
pub use hierarchy::{
    BlockDetail, FloorDetail, Hierarchy, NewBlockTree, NewFloorTree, NewPropertyTree, PlannedTree, PropertyDetail,
    assemble, check_limits, plan,
};
pub use property::{
    DEFAULT_MAX_PROPERTIES_PER_MANAGER, NewProperty, Property, PropertyCore, PropertyStore, UpdateProperty,
};
pub use unit::{NewUnit, Unit, UnitCore, UnitStore, UpdateUnit};

#[cfg(test)]
pub(crate) mod testing {
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use propdesk_core::{PropertyId, Rebind, Status, StoreError, TxHandle, UnitOfWork, UserId};

    use crate::{NewProperty, Property, PropertyStore};

    pub struct NoopTx;

    #[async_trait]
    impl TxHandle for NoopTx {
        async fn commit(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn rollback(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    pub fn new_property(manager_id: UserId) -> NewProperty {
        NewProperty {
            manager_id,
            name: "Sunrise".into(),
            address_level_1_id: 1,
            address_level_2_id: 2,
            address_level_3_id: 3,
            street: "12 Le Loi".into(),
        }
    }

    pub fn property(manager_id: UserId) -> Property {
        new_property(manager_id).into_property(PropertyId::new(), Utc::now())
    }

    /// Vec-backed store that counts calls and keeps insertion order.
    #[derive(Clone, Default)]
    pub struct FakePropertyStore {
        rows: Arc<Mutex<Vec<Property>>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakePropertyStore {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Insert without counting a call.
        pub fn seed(&self, property: Property) {
            self.rows.lock().unwrap().push(property);
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Rebind for FakePropertyStore {
        fn rebind(&self, _uow: &UnitOfWork) -> Result<Self, StoreError> {
            Ok(self.clone())
        }
    }

    #[async_trait]
    impl PropertyStore for FakePropertyStore {
        async fn create(&self, property: &Property) -> Result<(), StoreError> {
            self.tick();
            self.rows.lock().unwrap().push(property.clone());
            Ok(())
        }

        async fn create_limited(&self, property: &Property, limit: usize) -> Result<(), StoreError> {
            self.tick();
            let mut rows = self.rows.lock().unwrap();
            let owned = rows
                .iter()
                .filter(|p| p.manager_id == property.manager_id && p.status != Status::Deleted)
                .count();
            if owned >= limit {
                return Err(StoreError::LimitExceeded("properties per manager".into()));
            }
            rows.push(property.clone());
            Ok(())
        }

        async fn update(&self, property: &Property) -> Result<(), StoreError> {
            self.tick();
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|p| p.id == property.id)
                .ok_or(StoreError::NotFound("property"))?;
            *row = property.clone();
            Ok(())
        }

        async fn delete(&self, property: &Property) -> Result<(), StoreError> {
            self.tick();
            self.rows.lock().unwrap().retain(|p| p.id != property.id);
            Ok(())
        }

        async fn query_by_id(&self, id: PropertyId) -> Result<Property, StoreError> {
            self.tick();
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id && p.status != Status::Deleted)
                .cloned()
                .ok_or(StoreError::NotFound("property"))
        }

        async fn query_by_manager_id(&self, manager_id: UserId) -> Result<Vec<Property>, StoreError> {
            self.tick();
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.manager_id == manager_id && p.status != Status::Deleted)
                .cloned()
                .collect())
        }
    }
}
