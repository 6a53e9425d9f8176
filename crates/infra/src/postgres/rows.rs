//! Raw rows as stored, and their conversion into domain entities.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use propdesk_auth::Role;
use propdesk_core::{Status, StoreError};
use propdesk_properties::{Block, Floor, Property, Unit};
use propdesk_users::User;

fn decode_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {e}"))
}

fn status(raw: &str) -> Result<Status, StoreError> {
    raw.parse().map_err(decode_err)
}

fn address_id(raw: i64) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(decode_err)
}

pub(super) struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    phone: String,
    password_hash: String,
    roles: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone: row.try_get("phone")?,
            password_hash: row.try_get("password_hash")?,
            roles: row.try_get("roles")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let roles = row
            .roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err)?;
        Ok(User {
            id: row.id.into(),
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            password_hash: row.password_hash,
            roles,
            status: status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) struct PropertyRow {
    id: Uuid,
    manager_id: Uuid,
    name: String,
    address_level_1_id: i64,
    address_level_2_id: i64,
    address_level_3_id: i64,
    street: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for PropertyRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PropertyRow {
            id: row.try_get("id")?,
            manager_id: row.try_get("manager_id")?,
            name: row.try_get("name")?,
            address_level_1_id: row.try_get("address_level_1_id")?,
            address_level_2_id: row.try_get("address_level_2_id")?,
            address_level_3_id: row.try_get("address_level_3_id")?,
            street: row.try_get("street")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<PropertyRow> for Property {
    type Error = StoreError;

    fn try_from(row: PropertyRow) -> Result<Self, Self::Error> {
        Ok(Property {
            id: row.id.into(),
            manager_id: row.manager_id.into(),
            name: row.name,
            address_level_1_id: address_id(row.address_level_1_id)?,
            address_level_2_id: address_id(row.address_level_2_id)?,
            address_level_3_id: address_id(row.address_level_3_id)?,
            street: row.street,
            status: status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Shared shape of blocks, floors and units; absent parent columns are `None`.
pub(super) struct NodeRow {
    id: Uuid,
    property_id: Uuid,
    block_id: Option<Uuid>,
    floor_id: Option<Uuid>,
    name: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for NodeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let optional = |col: &str| -> Result<Option<Uuid>, sqlx::Error> {
            match row.try_get(col) {
                Ok(v) => Ok(Some(v)),
                Err(sqlx::Error::ColumnNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        };
        Ok(NodeRow {
            id: row.try_get("id")?,
            property_id: row.try_get("property_id")?,
            block_id: optional("block_id")?,
            floor_id: optional("floor_id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn parent(id: Option<Uuid>, column: &str) -> Result<Uuid, StoreError> {
    id.ok_or_else(|| decode_err(format!("missing column {column}")))
}

impl TryFrom<NodeRow> for Block {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        Ok(Block {
            id: row.id.into(),
            property_id: row.property_id.into(),
            name: row.name,
            status: status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<NodeRow> for Floor {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        Ok(Floor {
            id: row.id.into(),
            property_id: row.property_id.into(),
            block_id: parent(row.block_id, "block_id")?.into(),
            name: row.name,
            status: status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<NodeRow> for Unit {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        Ok(Unit {
            id: row.id.into(),
            property_id: row.property_id.into(),
            block_id: parent(row.block_id, "block_id")?.into(),
            floor_id: parent(row.floor_id, "floor_id")?.into(),
            name: row.name,
            status: status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Decode one row into a domain entity.
pub(super) fn decode<R, T>(row: &PgRow) -> Result<T, StoreError>
where
    R: for<'r> sqlx::FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    R::from_row(row).map_err(decode_err)?.try_into()
}

pub(super) fn decode_all<R, T>(rows: &[PgRow]) -> Result<Vec<T>, StoreError>
where
    R: for<'r> sqlx::FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    rows.iter().map(decode::<R, T>).collect()
}
