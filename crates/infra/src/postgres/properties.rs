use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use propdesk_core::{BlockId, FloorId, PropertyId, StoreError, UnitId, UserId};
use propdesk_properties::{Block, BlockStore, Floor, FloorStore, Property, PropertyStore, Unit, UnitStore};

use super::rows::{NodeRow, PropertyRow, decode, decode_all};
use super::{PgExecutor, PgStore, map_sqlx_error, one_row};

const PROPERTY_COLUMNS: &str = "id, manager_id, name, address_level_1_id, address_level_2_id, \
     address_level_3_id, street, status, created_at, updated_at";
const BLOCK_COLUMNS: &str = "id, property_id, name, status, created_at, updated_at";
const FLOOR_COLUMNS: &str = "id, property_id, block_id, name, status, created_at, updated_at";
const UNIT_COLUMNS: &str = "id, property_id, block_id, floor_id, name, status, created_at, updated_at";

/// Rows per multi-row INSERT; keeps bind parameters well under the 65535 limit.
const INSERT_CHUNK: usize = 1000;

/// Count and insert on one connection that holds the manager's row lock.
///
/// Under READ COMMITTED the count runs with a snapshot taken after the lock
/// was granted, so it sees properties committed by the previous lock holder.
async fn insert_limited(conn: &mut PgConnection, property: &Property, limit: usize) -> Result<(), StoreError> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(property.manager_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("lock_manager", e))?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO properties (
            id, manager_id, name, address_level_1_id, address_level_2_id,
            address_level_3_id, street, status, created_at, updated_at
        )
        SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
        WHERE (
            SELECT count(*) FROM properties WHERE manager_id = $2 AND status <> 'DELETED'
        ) < $11
        "#,
    )
    .bind(property.id.as_uuid())
    .bind(property.manager_id.as_uuid())
    .bind(&property.name)
    .bind(i64::from(property.address_level_1_id))
    .bind(i64::from(property.address_level_2_id))
    .bind(i64::from(property.address_level_3_id))
    .bind(&property.street)
    .bind(property.status.as_str())
    .bind(property.created_at)
    .bind(property.updated_at)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("create_property_limited", e))?
    .rows_affected();

    if inserted == 0 {
        return Err(StoreError::LimitExceeded(format!(
            "manager {} already owns {limit} properties",
            property.manager_id
        )));
    }
    Ok(())
}

#[async_trait]
impl PropertyStore for PgStore {
    #[instrument(skip(self, property), fields(property_id = %property.id), err)]
    async fn create(&self, property: &Property) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO properties (
                id, manager_id, name, address_level_1_id, address_level_2_id,
                address_level_3_id, street, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(property.id.as_uuid())
        .bind(property.manager_id.as_uuid())
        .bind(&property.name)
        .bind(i64::from(property.address_level_1_id))
        .bind(i64::from(property.address_level_2_id))
        .bind(i64::from(property.address_level_3_id))
        .bind(&property.street)
        .bind(property.status.as_str())
        .bind(property.created_at)
        .bind(property.updated_at);

        self.exec.execute("create_property", query).await?;
        Ok(())
    }

    #[instrument(skip(self, property), fields(property_id = %property.id, manager_id = %property.manager_id), err)]
    async fn create_limited(&self, property: &Property, limit: usize) -> Result<(), StoreError> {
        match &self.exec {
            PgExecutor::Pool(pool) => {
                let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
                insert_limited(&mut tx, property, limit).await?;
                tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
            }
            PgExecutor::Tx(tx) => {
                let mut guard = tx.tx.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TxClosed)?;
                insert_limited(conn, property, limit).await
            }
        }
    }

    #[instrument(skip(self, property), fields(property_id = %property.id), err)]
    async fn update(&self, property: &Property) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE properties
            SET name = $2, address_level_1_id = $3, address_level_2_id = $4,
                address_level_3_id = $5, street = $6, status = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(property.id.as_uuid())
        .bind(&property.name)
        .bind(i64::from(property.address_level_1_id))
        .bind(i64::from(property.address_level_2_id))
        .bind(i64::from(property.address_level_3_id))
        .bind(&property.street)
        .bind(property.status.as_str())
        .bind(property.updated_at);

        one_row(self.exec.execute("update_property", query).await?, "property")
    }

    #[instrument(skip(self, property), fields(property_id = %property.id), err)]
    async fn delete(&self, property: &Property) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM properties WHERE id = $1").bind(property.id.as_uuid());
        one_row(self.exec.execute("delete_property", query).await?, "property")
    }

    async fn query_by_id(&self, id: PropertyId) -> Result<Property, StoreError> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1 AND status <> 'DELETED'");
        let row = self
            .exec
            .fetch_optional("query_property_by_id", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .ok_or(StoreError::NotFound("property"))?;
        decode::<PropertyRow, Property>(&row)
    }

    async fn query_by_manager_id(&self, manager_id: UserId) -> Result<Vec<Property>, StoreError> {
        let sql = format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties \
             WHERE manager_id = $1 AND status <> 'DELETED' ORDER BY created_at"
        );
        let rows = self
            .exec
            .fetch_all("query_properties_by_manager", sqlx::query(&sql).bind(manager_id.as_uuid()))
            .await?;
        decode_all::<PropertyRow, Property>(&rows)
    }
}

fn insert_blocks(blocks: &[Block]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new("INSERT INTO blocks (id, property_id, name, status, created_at, updated_at) ");
    builder.push_values(blocks, |mut row, block| {
        row.push_bind(block.id.as_uuid())
            .push_bind(block.property_id.as_uuid())
            .push_bind(&block.name)
            .push_bind(block.status.as_str())
            .push_bind(block.created_at)
            .push_bind(block.updated_at);
    });
    builder
}

fn insert_floors(floors: &[Floor]) -> QueryBuilder<'_, Postgres> {
    let mut builder =
        QueryBuilder::new("INSERT INTO floors (id, property_id, block_id, name, status, created_at, updated_at) ");
    builder.push_values(floors, |mut row, floor| {
        row.push_bind(floor.id.as_uuid())
            .push_bind(floor.property_id.as_uuid())
            .push_bind(floor.block_id.as_uuid())
            .push_bind(&floor.name)
            .push_bind(floor.status.as_str())
            .push_bind(floor.created_at)
            .push_bind(floor.updated_at);
    });
    builder
}

fn insert_units(units: &[Unit]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO units (id, property_id, block_id, floor_id, name, status, created_at, updated_at) ",
    );
    builder.push_values(units, |mut row, unit| {
        row.push_bind(unit.id.as_uuid())
            .push_bind(unit.property_id.as_uuid())
            .push_bind(unit.block_id.as_uuid())
            .push_bind(unit.floor_id.as_uuid())
            .push_bind(&unit.name)
            .push_bind(unit.status.as_str())
            .push_bind(unit.created_at)
            .push_bind(unit.updated_at);
    });
    builder
}

#[async_trait]
impl BlockStore for PgStore {
    #[instrument(skip(self, blocks), fields(count = blocks.len()), err)]
    async fn batch_create(&self, blocks: &[Block]) -> Result<(), StoreError> {
        for chunk in blocks.chunks(INSERT_CHUNK) {
            self.exec.execute("create_blocks", insert_blocks(chunk).build()).await?;
        }
        Ok(())
    }

    async fn update(&self, block: &Block) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE blocks SET name = $2, status = $3, updated_at = $4 WHERE id = $1")
            .bind(block.id.as_uuid())
            .bind(&block.name)
            .bind(block.status.as_str())
            .bind(block.updated_at);
        one_row(self.exec.execute("update_block", query).await?, "block")
    }

    async fn query_by_id(&self, id: BlockId) -> Result<Block, StoreError> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = $1 AND status <> 'DELETED'");
        let row = self
            .exec
            .fetch_optional("query_block_by_id", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .ok_or(StoreError::NotFound("block"))?;
        decode::<NodeRow, Block>(&row)
    }

    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Block>, StoreError> {
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE property_id = $1 AND status <> 'DELETED' ORDER BY created_at, id"
        );
        let rows = self
            .exec
            .fetch_all("query_blocks_by_property", sqlx::query(&sql).bind(property_id.as_uuid()))
            .await?;
        decode_all::<NodeRow, Block>(&rows)
    }
}

#[async_trait]
impl FloorStore for PgStore {
    #[instrument(skip(self, floors), fields(count = floors.len()), err)]
    async fn batch_create(&self, floors: &[Floor]) -> Result<(), StoreError> {
        for chunk in floors.chunks(INSERT_CHUNK) {
            self.exec.execute("create_floors", insert_floors(chunk).build()).await?;
        }
        Ok(())
    }

    async fn update(&self, floor: &Floor) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE floors SET name = $2, status = $3, updated_at = $4 WHERE id = $1")
            .bind(floor.id.as_uuid())
            .bind(&floor.name)
            .bind(floor.status.as_str())
            .bind(floor.updated_at);
        one_row(self.exec.execute("update_floor", query).await?, "floor")
    }

    async fn query_by_id(&self, id: FloorId) -> Result<Floor, StoreError> {
        let sql = format!("SELECT {FLOOR_COLUMNS} FROM floors WHERE id = $1 AND status <> 'DELETED'");
        let row = self
            .exec
            .fetch_optional("query_floor_by_id", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .ok_or(StoreError::NotFound("floor"))?;
        decode::<NodeRow, Floor>(&row)
    }

    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Floor>, StoreError> {
        let sql = format!(
            "SELECT {FLOOR_COLUMNS} FROM floors WHERE property_id = $1 AND status <> 'DELETED' ORDER BY created_at, id"
        );
        let rows = self
            .exec
            .fetch_all("query_floors_by_property", sqlx::query(&sql).bind(property_id.as_uuid()))
            .await?;
        decode_all::<NodeRow, Floor>(&rows)
    }
}

#[async_trait]
impl UnitStore for PgStore {
    async fn create(&self, unit: &Unit) -> Result<(), StoreError> {
        UnitStore::batch_create(self, std::slice::from_ref(unit)).await
    }

    #[instrument(skip(self, units), fields(count = units.len()), err)]
    async fn batch_create(&self, units: &[Unit]) -> Result<(), StoreError> {
        for chunk in units.chunks(INSERT_CHUNK) {
            self.exec.execute("create_units", insert_units(chunk).build()).await?;
        }
        Ok(())
    }

    async fn update(&self, unit: &Unit) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE units SET name = $2, status = $3, updated_at = $4 WHERE id = $1")
            .bind(unit.id.as_uuid())
            .bind(&unit.name)
            .bind(unit.status.as_str())
            .bind(unit.updated_at);
        one_row(self.exec.execute("update_unit", query).await?, "unit")
    }

    async fn delete(&self, unit: &Unit) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM units WHERE id = $1").bind(unit.id.as_uuid());
        one_row(self.exec.execute("delete_unit", query).await?, "unit")
    }

    async fn query_by_id(&self, id: UnitId) -> Result<Unit, StoreError> {
        let sql = format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = $1 AND status <> 'DELETED'");
        let row = self
            .exec
            .fetch_optional("query_unit_by_id", sqlx::query(&sql).bind(id.as_uuid()))
            .await?
            .ok_or(StoreError::NotFound("unit"))?;
        decode::<NodeRow, Unit>(&row)
    }

    async fn query_by_property_id(&self, property_id: PropertyId) -> Result<Vec<Unit>, StoreError> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM units WHERE property_id = $1 AND status <> 'DELETED' ORDER BY created_at, id"
        );
        let rows = self
            .exec
            .fetch_all("query_units_by_property", sqlx::query(&sql).bind(property_id.as_uuid()))
            .await?;
        decode_all::<NodeRow, Unit>(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use propdesk_core::Status;

    #[test]
    fn unit_chunk_is_one_multi_row_statement() {
        let now = Utc::now();
        let units: Vec<Unit> = (0..3)
            .map(|i| Unit {
                id: UnitId::new(),
                property_id: PropertyId::new(),
                block_id: BlockId::new(),
                floor_id: FloorId::new(),
                name: format!("10{i}"),
                status: Status::Active,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let builder = insert_units(&units);
        let sql = builder.sql();

        assert!(sql.starts_with("INSERT INTO units (id, property_id, block_id, floor_id, name, status"));
        assert_eq!(sql.matches("), (").count(), 2);
        assert!(sql.ends_with("$24)"));
    }
}
