//! Property → block → floor → unit tree: caps, nested creation, regrouping,
//! cascading soft delete and unit placement checks.
//!
//! Creation validates fields and caps before any store call, assigns every id
//! top-down, then inserts property, blocks, floors and units in that order.
//! Callers run it under one unit of work so a failure at any step leaves no
//! rows behind.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use propdesk_core::{
    BlockId, DomainError, DomainResult, FieldErrors, FloorId, PropertyId, Status, StoreError, UnitId, UnitOfWork,
};

use crate::{
    Block, BlockCore, BlockStore, Floor, FloorCore, FloorStore, NewBlock, NewFloor, NewProperty, NewUnit, Property,
    PropertyCore, PropertyStore, Unit, UnitCore, UnitStore,
};

pub const MAX_BLOCKS: usize = 5;
pub const MAX_FLOORS_PER_BLOCK: usize = 10;
/// Unit cap for a floor whose block has exactly one floor.
pub const MAX_UNITS_SINGLE_FLOOR: usize = 200;
pub const MAX_UNITS_PER_FLOOR: usize = 20;
/// Cap applied when units are added one at a time.
pub const MAX_UNITS_PER_PROPERTY: usize = 1000;

pub const ERR_MAX_BLOCKS: &str = "maximum number of blocks exceeded";
pub const ERR_MAX_FLOORS: &str = "maximum number of floors exceeded";
pub const ERR_MAX_UNITS: &str = "maximum number of units exceeded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPropertyTree {
    pub property: NewProperty,
    pub blocks: Vec<NewBlockTree>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlockTree {
    pub name: String,
    pub floors: Vec<NewFloorTree>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFloorTree {
    pub name: String,
    pub units: Vec<String>,
}

pub fn unit_cap(floors_in_block: usize) -> usize {
    if floors_in_block == 1 {
        MAX_UNITS_SINGLE_FLOOR
    } else {
        MAX_UNITS_PER_FLOOR
    }
}

/// Reject trees over the block, floor or unit caps.
pub fn check_limits(tree: &NewPropertyTree) -> DomainResult<()> {
    if tree.blocks.len() > MAX_BLOCKS {
        return Err(DomainError::limit(ERR_MAX_BLOCKS));
    }
    for block in &tree.blocks {
        if block.floors.len() > MAX_FLOORS_PER_BLOCK {
            return Err(DomainError::limit(ERR_MAX_FLOORS));
        }
    }
    for block in &tree.blocks {
        let cap = unit_cap(block.floors.len());
        if block.floors.iter().any(|f| f.units.len() > cap) {
            return Err(DomainError::limit(ERR_MAX_UNITS));
        }
    }
    Ok(())
}

impl NewPropertyTree {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = FieldErrors::new();
        self.property.check(&mut errs);
        for (b, block) in self.blocks.iter().enumerate() {
            errs.require(&block.name, &format!("blocks[{b}].name"));
            for (f, floor) in block.floors.iter().enumerate() {
                errs.require(&floor.name, &format!("blocks[{b}].floors[{f}].name"));
                for (u, unit) in floor.units.iter().enumerate() {
                    errs.require(unit, &format!("blocks[{b}].floors[{f}].units[{u}].name"));
                }
            }
        }
        errs.into_result()
    }

    pub fn unit_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| &b.floors)
            .map(|f| f.units.len())
            .sum()
    }
}

/// Flat rows of a tree with every id assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTree {
    pub property: Property,
    pub blocks: Vec<Block>,
    pub floors: Vec<Floor>,
    pub units: Vec<Unit>,
}

pub fn plan(tree: NewPropertyTree, now: DateTime<Utc>) -> PlannedTree {
    let property = tree.property.into_property(PropertyId::new(), now);
    let mut blocks = Vec::with_capacity(tree.blocks.len());
    let mut floors = Vec::new();
    let mut units = Vec::new();

    for nb in tree.blocks {
        let block = NewBlock {
            property_id: property.id,
            name: nb.name,
        }
        .into_block(BlockId::new(), now);

        for nf in nb.floors {
            let floor = NewFloor {
                property_id: property.id,
                block_id: block.id,
                name: nf.name,
            }
            .into_floor(FloorId::new(), now);

            units.extend(nf.units.into_iter().map(|name| {
                NewUnit {
                    property_id: property.id,
                    block_id: block.id,
                    floor_id: floor.id,
                    name,
                }
                .into_unit(UnitId::new(), now)
            }));
            floors.push(floor);
        }
        blocks.push(block);
    }

    PlannedTree {
        property,
        blocks,
        floors,
        units,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDetail {
    pub property: Property,
    pub blocks: Vec<BlockDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDetail {
    pub block: Block,
    pub floors: Vec<FloorDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorDetail {
    pub floor: Floor,
    pub units: Vec<Unit>,
}

/// Regroup flat rows: units by (block, floor), floors by block, blocks under
/// the property. Input order is kept at every level.
pub fn assemble(property: Property, blocks: Vec<Block>, floors: Vec<Floor>, units: Vec<Unit>) -> PropertyDetail {
    let mut units_by_floor: HashMap<(BlockId, FloorId), Vec<Unit>> = HashMap::new();
    for unit in units {
        units_by_floor
            .entry((unit.block_id, unit.floor_id))
            .or_default()
            .push(unit);
    }

    let mut floors_by_block: HashMap<BlockId, Vec<FloorDetail>> = HashMap::new();
    for floor in floors {
        let units = units_by_floor.remove(&(floor.block_id, floor.id)).unwrap_or_default();
        floors_by_block
            .entry(floor.block_id)
            .or_default()
            .push(FloorDetail { floor, units });
    }

    let blocks = blocks
        .into_iter()
        .map(|block| {
            let floors = floors_by_block.remove(&block.id).unwrap_or_default();
            BlockDetail { block, floors }
        })
        .collect();

    PropertyDetail { property, blocks }
}

/// The four entity cores used together.
#[derive(Debug, Clone)]
pub struct Hierarchy<P, B, F, U> {
    property: PropertyCore<P>,
    block: BlockCore<B>,
    floor: FloorCore<F>,
    unit: UnitCore<U>,
}

impl<P, B, F, U> Hierarchy<P, B, F, U>
where
    P: PropertyStore,
    B: BlockStore,
    F: FloorStore,
    U: UnitStore,
{
    pub fn new(property: PropertyCore<P>, block: BlockCore<B>, floor: FloorCore<F>, unit: UnitCore<U>) -> Self {
        Self {
            property,
            block,
            floor,
            unit,
        }
    }

    pub fn property(&self) -> &PropertyCore<P> {
        &self.property
    }

    pub fn block(&self) -> &BlockCore<B> {
        &self.block
    }

    pub fn floor(&self) -> &FloorCore<F> {
        &self.floor
    }

    pub fn unit(&self) -> &UnitCore<U> {
        &self.unit
    }

    /// Rebind all four cores to `uow`.
    pub fn execute_under_transaction(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            property: self.property.execute_under_transaction(uow)?,
            block: self.block.execute_under_transaction(uow)?,
            floor: self.floor.execute_under_transaction(uow)?,
            unit: self.unit.execute_under_transaction(uow)?,
        })
    }

    #[tracing::instrument(skip_all, fields(manager_id = %tree.property.manager_id, blocks = tree.blocks.len()))]
    pub async fn create(&self, tree: NewPropertyTree, now: DateTime<Utc>) -> DomainResult<PropertyDetail> {
        check_limits(&tree)?;
        tree.validate()?;

        let planned = plan(tree, now);
        self.property.insert(&planned.property).await?;
        self.block.batch_insert(&planned.blocks).await?;
        self.floor.batch_insert(&planned.floors).await?;
        self.unit.batch_insert(&planned.units).await?;

        tracing::info!(
            property_id = %planned.property.id,
            floors = planned.floors.len(),
            units = planned.units.len(),
            "property hierarchy created"
        );
        Ok(assemble(planned.property, planned.blocks, planned.floors, planned.units))
    }

    pub async fn detail(&self, property: Property) -> DomainResult<PropertyDetail> {
        let blocks = self.block.query_by_property_id(property.id).await?;
        let floors = self.floor.query_by_property_id(property.id).await?;
        let units = self.unit.query_by_property_id(property.id).await?;
        Ok(assemble(property, blocks, floors, units))
    }

    /// Soft-delete the property and every live block, floor and unit under it.
    pub async fn delete(&self, property: Property, now: DateTime<Utc>) -> DomainResult<Property> {
        for unit in self.unit.query_by_property_id(property.id).await? {
            self.unit.delete(unit, now).await?;
        }
        for floor in self.floor.query_by_property_id(property.id).await? {
            self.floor.delete(floor, now).await?;
        }
        for block in self.block.query_by_property_id(property.id).await? {
            self.block.delete(block, now).await?;
        }
        self.property.delete(property, now).await
    }

    /// Add one unit to an existing floor of `property`.
    ///
    /// The block and floor must belong to the property and the floor to the
    /// block; otherwise the missing one is reported as not found.
    pub async fn add_unit(
        &self,
        property: &Property,
        block_id: BlockId,
        floor_id: FloorId,
        name: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Unit> {
        let existing = self.unit.query_by_property_id(property.id).await?;
        if existing.len() >= MAX_UNITS_PER_PROPERTY {
            return Err(DomainError::limit(ERR_MAX_UNITS));
        }

        let block = self.block.query_by_id(block_id).await?;
        if block.property_id != property.id {
            return Err(DomainError::not_found("block"));
        }
        let floor = self.floor.query_by_id(floor_id).await?;
        if floor.property_id != property.id || floor.block_id != block.id {
            return Err(DomainError::not_found("floor"));
        }

        let nu = NewUnit {
            property_id: property.id,
            block_id,
            floor_id,
            name,
        };
        self.unit.create(nu, now).await
    }

    /// Load a unit, treating units of other properties as missing.
    pub async fn unit_in_property(&self, property: &Property, unit_id: UnitId) -> DomainResult<Unit> {
        let unit = self.unit.query_by_id(unit_id).await?;
        if unit.property_id != property.id || unit.status == Status::Deleted {
            return Err(DomainError::not_found("unit"));
        }
        Ok(unit)
    }
}
