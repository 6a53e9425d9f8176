use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{
    BlockId, DomainError, DomainResult, Entity, FieldErrors, FloorId, PropertyId, Rebind, Repository, Status,
    StoreError, UnitId, UnitOfWork,
};

/// A rentable unit on a floor.
///
/// `block_id` and `floor_id` always point at a block and floor of the same
/// property, and the floor belongs to that block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub property_id: PropertyId,
    pub block_id: BlockId,
    pub floor_id: FloorId,
    pub name: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Unit {
    type Id = UnitId;

    fn id(&self) -> UnitId {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnit {
    pub property_id: PropertyId,
    pub block_id: BlockId,
    pub floor_id: FloorId,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUnit {
    pub name: Option<String>,
    pub status: Option<Status>,
}

impl NewUnit {
    pub fn into_unit(self, id: UnitId, now: DateTime<Utc>) -> Unit {
        Unit {
            id,
            property_id: self.property_id,
            block_id: self.block_id,
            floor_id: self.floor_id,
            name: self.name.trim().to_string(),
            status: Status::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait UnitStore: Rebind + Send + Sync {
    async fn create(&self, unit: &Unit) -> Result<(), StoreError>;
    async fn batch_create(&self, units: &[Unit]) -> Result<(), StoreError>;
    async fn update(&self, unit: &Unit) -> Result<(), StoreError>;
    /// Hard delete.
    async fn delete(&self, unit: &Unit) -> Result<(), StoreError>;
    async fn query_by_id(&self, id: UnitId) -> Result<Unit, StoreError>;
    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Unit>, StoreError>;
}

fn store_err(e: StoreError) -> DomainError {
    match e {
        StoreError::NotFound(_) => DomainError::not_found("unit"),
        other => DomainError::Store(other),
    }
}

#[derive(Debug, Clone)]
pub struct UnitCore<S> {
    repo: Repository<S>,
}

impl<S: UnitStore> UnitCore<S> {
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

    pub async fn create(&self, nu: NewUnit, now: DateTime<Utc>) -> DomainResult<Unit> {
        let mut errs = FieldErrors::new();
        errs.require(&nu.name, "name");
        errs.into_result()?;

        let unit = nu.into_unit(UnitId::new(), now);
        self.repo.create(&unit).await.map_err(store_err)?;
        Ok(unit)
    }

    pub async fn batch_insert(&self, units: &[Unit]) -> DomainResult<()> {
        if units.is_empty() {
            return Ok(());
        }
        self.repo.batch_create(units).await.map_err(store_err)
    }

    pub async fn update(&self, mut unit: Unit, uu: UpdateUnit, now: DateTime<Utc>) -> DomainResult<Unit> {
        if let Some(name) = uu.name {
            let mut errs = FieldErrors::new();
            errs.require(&name, "name");
            errs.into_result()?;
            unit.name = name.trim().to_string();
        }
        if let Some(status) = uu.status {
            unit.status = status;
        }
        unit.updated_at = now;

        self.repo.update(&unit).await.map_err(store_err)?;
        Ok(unit)
    }

    /// Soft delete.
    pub async fn delete(&self, unit: Unit, now: DateTime<Utc>) -> DomainResult<Unit> {
        let uu = UpdateUnit {
            status: Some(Status::Deleted),
            ..UpdateUnit::default()
        };
        self.update(unit, uu, now).await
    }

    /// Remove the row for good.
    pub async fn purge(&self, unit: &Unit) -> DomainResult<()> {
        self.repo.delete(unit).await.map_err(store_err)
    }

    pub async fn query_by_id(&self, id: UnitId) -> DomainResult<Unit> {
        self.repo.query_by_id(id).await.map_err(store_err)
    }

    pub async fn query_by_property_id(&self, property_id: PropertyId) -> DomainResult<Vec<Unit>> {
        self.repo.query_by_property_id(property_id).await.map_err(store_err)
    }
}
