use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{
    BlockId, DomainError, DomainResult, Entity, FloorId, PropertyId, Rebind, Repository, Status, StoreError,
    UnitOfWork,
};

/// A floor inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub id: FloorId,
    pub property_id: PropertyId,
    pub block_id: BlockId,
    pub name: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Floor {
    type Id = FloorId;

    fn id(&self) -> FloorId {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFloor {
    pub property_id: PropertyId,
    pub block_id: BlockId,
    pub name: String,
}

impl NewFloor {
    pub fn into_floor(self, id: FloorId, now: DateTime<Utc>) -> Floor {
        Floor {
            id,
            property_id: self.property_id,
            block_id: self.block_id,
            name: self.name.trim().to_string(),
            status: Status::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait FloorStore: Rebind + Send + Sync {
    async fn batch_create(&self, floors: &[Floor]) -> Result<(), StoreError>;
    async fn update(&self, floor: &Floor) -> Result<(), StoreError>;
    async fn query_by_id(&self, id: FloorId) -> Result<Floor, StoreError>;
    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Floor>, StoreError>;
}

fn store_err(e: StoreError) -> DomainError {
    match e {
        StoreError::NotFound(_) => DomainError::not_found("floor"),
        other => DomainError::Store(other),
    }
}

#[derive(Debug, Clone)]
pub struct FloorCore<S> {
    repo: Repository<S>,
}

impl<S: FloorStore> FloorCore<S> {
    pub fn new(store: S) -> Self {
        Self {
            repo: Repository::new(store),
        }
    }

    pub fn execute_under_transaction(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            repo: self.repo.bind(uow)?,
        })
    }

    pub async fn batch_insert(&self, floors: &[Floor]) -> DomainResult<()> {
        if floors.is_empty() {
            return Ok(());
        }
        self.repo.batch_create(floors).await.map_err(store_err)
    }

    /// Soft delete.
    pub async fn delete(&self, mut floor: Floor, now: DateTime<Utc>) -> DomainResult<Floor> {
        floor.status = Status::Deleted;
        floor.updated_at = now;
        self.repo.update(&floor).await.map_err(store_err)?;
        Ok(floor)
    }

    pub async fn query_by_id(&self, id: FloorId) -> DomainResult<Floor> {
        self.repo.query_by_id(id).await.map_err(store_err)
    }

    pub async fn query_by_property_id(&self, property_id: PropertyId) -> DomainResult<Vec<Floor>> {
        self.repo.query_by_property_id(property_id).await.map_err(store_err)
    }
}
