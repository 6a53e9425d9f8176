use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use propdesk_core::{BlockId, Entity, FloorId, PropertyId, Rebind, StoreError, UnitId, UnitOfWork, UserId};
use propdesk_properties::{Block, BlockStore, Floor, FloorStore, Property, PropertyStore, Unit, UnitStore};
use propdesk_users::{User, UserStore};

use super::{Executor, MemTx, Tables, find_live, insert_all, live, remove, replace, require_parents};

/// One store value serving every entity port of the in-memory backend.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    exec: Executor,
}

impl MemoryStore {
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self {
            exec: Executor::Shared(tables.clone()),
            tables,
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self.exec, Executor::Tx(_))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("transactional", &self.is_transactional())
            .finish()
    }
}

impl Rebind for MemoryStore {
    fn rebind(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        let tx = uow.handle::<MemTx>()?;
        if !tx.belongs_to(&self.tables) {
            return Err(StoreError::ForeignUnitOfWork);
        }
        Ok(Self {
            tables: self.tables.clone(),
            exec: Executor::Tx(tx),
        })
    }
}

fn phone_taken(users: &[User], phone: &str, except: UserId) -> Result<(), StoreError> {
    if users.iter().any(|u| u.phone == phone && u.id != except) {
        return Err(StoreError::Conflict(format!("phone {phone} already registered")));
    }
    Ok(())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let user = user.clone();
        self.exec.write(move |t| {
            phone_taken(&t.users, &user.phone, user.id)?;
            insert_all(&mut t.users, std::slice::from_ref(&user))
        })
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let user = user.clone();
        self.exec.write(move |t| {
            phone_taken(&t.users, &user.phone, user.id)?;
            replace(&mut t.users, &user, "user")
        })
    }

    async fn delete(&self, user: &User) -> Result<(), StoreError> {
        let id = user.id;
        self.exec.write(move |t| remove(&mut t.users, id, "user"))
    }

    async fn query_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.exec.read(|t| find_live(&t.users, id, "user"))?
    }

    async fn query_by_phone(&self, phone: &str) -> Result<User, StoreError> {
        self.exec.read(|t| {
            t.users
                .iter()
                .find(|u| u.phone == phone && u.status != propdesk_core::Status::Deleted)
                .cloned()
                .ok_or(StoreError::NotFound("user"))
        })?
    }
}

#[async_trait]
impl PropertyStore for MemoryStore {
    async fn create(&self, property: &Property) -> Result<(), StoreError> {
        let property = property.clone();
        self.exec
            .write(move |t| insert_all(&mut t.properties, std::slice::from_ref(&property)))
    }

    async fn create_limited(&self, property: &Property, limit: usize) -> Result<(), StoreError> {
        let property = property.clone();
        // Replayed at commit, so a concurrent unit of work that filled the
        // quota first makes this commit fail.
        self.exec.write(move |t| {
            let owned = t
                .properties
                .iter()
                .filter(|p| p.manager_id == property.manager_id && !p.is_deleted())
                .count();
            if owned >= limit {
                return Err(StoreError::LimitExceeded(format!(
                    "manager {} already owns {owned} properties",
                    property.manager_id
                )));
            }
            insert_all(&mut t.properties, std::slice::from_ref(&property))
        })
    }

    async fn update(&self, property: &Property) -> Result<(), StoreError> {
        let property = property.clone();
        self.exec.write(move |t| replace(&mut t.properties, &property, "property"))
    }

    async fn delete(&self, property: &Property) -> Result<(), StoreError> {
        let id = property.id;
        self.exec.write(move |t| {
            if t.blocks.iter().any(|b| b.property_id == id) {
                return Err(StoreError::Backend("property still has blocks".into()));
            }
            remove(&mut t.properties, id, "property")
        })
    }

    async fn query_by_id(&self, id: PropertyId) -> Result<Property, StoreError> {
        self.exec.read(|t| find_live(&t.properties, id, "property"))?
    }

    async fn query_by_manager_id(&self, manager_id: UserId) -> Result<Vec<Property>, StoreError> {
        self.exec.read(|t| live(&t.properties, |p| p.manager_id == manager_id))
    }
}

fn insert_blocks(t: &mut Tables, blocks: &[Block]) -> Result<(), StoreError> {
    let parents: HashSet<PropertyId> = t.properties.iter().map(|p| p.id).collect();
    require_parents(&parents, blocks.iter().map(|b| b.property_id), "block")?;
    insert_all(&mut t.blocks, blocks)
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn batch_create(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let blocks = blocks.to_vec();
        self.exec.write(move |t| insert_blocks(t, &blocks))
    }

    async fn update(&self, block: &Block) -> Result<(), StoreError> {
        let block = block.clone();
        self.exec.write(move |t| replace(&mut t.blocks, &block, "block"))
    }

    async fn query_by_id(&self, id: BlockId) -> Result<Block, StoreError> {
        self.exec.read(|t| find_live(&t.blocks, id, "block"))?
    }

    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Block>, StoreError> {
        self.exec.read(|t| live(&t.blocks, |b| b.property_id == property_id))
    }
}

fn insert_floors(t: &mut Tables, floors: &[Floor]) -> Result<(), StoreError> {
    let parents: HashSet<BlockId> = t.blocks.iter().map(|b| b.id).collect();
    require_parents(&parents, floors.iter().map(|f| f.block_id), "floor")?;
    insert_all(&mut t.floors, floors)
}

#[async_trait]
impl FloorStore for MemoryStore {
    async fn batch_create(&self, floors: &[Floor]) -> Result<(), StoreError> {
        let floors = floors.to_vec();
        self.exec.write(move |t| insert_floors(t, &floors))
    }

    async fn update(&self, floor: &Floor) -> Result<(), StoreError> {
        let floor = floor.clone();
        self.exec.write(move |t| replace(&mut t.floors, &floor, "floor"))
    }

    async fn query_by_id(&self, id: FloorId) -> Result<Floor, StoreError> {
        self.exec.read(|t| find_live(&t.floors, id, "floor"))?
    }

    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Floor>, StoreError> {
        self.exec.read(|t| live(&t.floors, |f| f.property_id == property_id))
    }
}

fn insert_units(t: &mut Tables, units: &[Unit]) -> Result<(), StoreError> {
    let parents: HashSet<FloorId> = t.floors.iter().map(|f| f.id).collect();
    require_parents(&parents, units.iter().map(|u| u.floor_id), "unit")?;
    insert_all(&mut t.units, units)
}

#[async_trait]
impl UnitStore for MemoryStore {
    async fn create(&self, unit: &Unit) -> Result<(), StoreError> {
        let unit = unit.clone();
        self.exec.write(move |t| insert_units(t, std::slice::from_ref(&unit)))
    }

    async fn batch_create(&self, units: &[Unit]) -> Result<(), StoreError> {
        let units = units.to_vec();
        self.exec.write(move |t| insert_units(t, &units))
    }

    async fn update(&self, unit: &Unit) -> Result<(), StoreError> {
        let unit = unit.clone();
        self.exec.write(move |t| replace(&mut t.units, &unit, "unit"))
    }

    async fn delete(&self, unit: &Unit) -> Result<(), StoreError> {
        let id = unit.id;
        self.exec.write(move |t| remove(&mut t.units, id, "unit"))
    }

    async fn query_by_id(&self, id: UnitId) -> Result<Unit, StoreError> {
        self.exec.read(|t| find_live(&t.units, id, "unit"))?
    }

    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Unit>, StoreError> {
        self.exec.read(|t| live(&t.units, |u| u.property_id == property_id))
    }
}
