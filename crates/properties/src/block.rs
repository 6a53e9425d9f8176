use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{
    BlockId, DomainError, DomainResult, Entity, PropertyId, Rebind, Repository, Status, StoreError, UnitOfWork,
};

/// A building block inside a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub property_id: PropertyId,
    pub name: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Block {
    type Id = BlockId;

    fn id(&self) -> BlockId {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    pub property_id: PropertyId,
    pub name: String,
}

impl NewBlock {
    pub fn into_block(self, id: BlockId, now: DateTime<Utc>) -> Block {
        Block {
            id,
            property_id: self.property_id,
            name: self.name.trim().to_string(),
            status: Status::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait BlockStore: Rebind + Send + Sync {
    async fn batch_create(&self, blocks: &[Block]) -> Result<(), StoreError>;
    async fn update(&self, block: &Block) -> Result<(), StoreError>;
    async fn query_by_id(&self, id: BlockId) -> Result<Block, StoreError>;
    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Block>, StoreError>;
}

fn store_err(e: StoreError) -> DomainError {
    match e {
        StoreError::NotFound(_) => DomainError::not_found("block"),
        other => DomainError::Store(other),
    }
}

#[derive(Debug, Clone)]
pub struct BlockCore<S> {
    repo: Repository<S>,
}

impl<S: BlockStore> BlockCore<S> {
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

    pub async fn batch_insert(&self, blocks: &[Block]) -> DomainResult<()> {
        if blocks.is_empty() {
            return Ok(());
        }
        self.repo.batch_create(blocks).await.map_err(store_err)
    }

    /// Soft delete.
    pub async fn delete(&self, mut block: Block, now: DateTime<Utc>) -> DomainResult<Block> {
        block.status = Status::Deleted;
        block.updated_at = now;
        self.repo.update(&block).await.map_err(store_err)?;
        Ok(block)
    }

    pub async fn query_by_id(&self, id: BlockId) -> DomainResult<Block> {
        self.repo.query_by_id(id).await.map_err(store_err)
    }

    pub async fn query_by_property_id(&self, property_id: PropertyId) -> DomainResult<Vec<Block>> {
        self.repo.query_by_property_id(property_id).await.map_err(store_err)
    }
}
