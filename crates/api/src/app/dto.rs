use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use propdesk_auth::Role;
use propdesk_core::{DomainError, Status, UserId};
use propdesk_properties::{
    BlockDetail, FloorDetail, NewBlockTree, NewFloorTree, NewProperty, NewPropertyTree, Property, PropertyDetail,
    Unit, UpdateProperty, UpdateUnit,
};
use propdesk_users::{NewUser, UpdateUser, User};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub phone: String,
    pub password: String,
}

impl RegisterRequest {
    /// Self-registration always yields a plain user.
    pub fn into_new_user(self) -> NewUser {
        NewUser {
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            password: self.password,
            roles: vec![Role::User],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub user_id: String,
    pub otp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

impl From<UpdateUserRequest> for UpdateUser {
    fn from(r: UpdateUserRequest) -> Self {
        UpdateUser {
            first_name: r.first_name,
            last_name: r.last_name,
            phone: r.phone,
            password: r.password,
            status: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewPropertyRequest {
    pub name: String,
    #[serde(rename = "addressLevel1ID")]
    pub address_level_1_id: u32,
    #[serde(rename = "addressLevel2ID")]
    pub address_level_2_id: u32,
    #[serde(rename = "addressLevel3ID")]
    pub address_level_3_id: u32,
    pub street: String,
    #[serde(default)]
    pub blocks: Vec<NewBlockRequest>,
}

#[derive(Debug, Deserialize)]
pub struct NewBlockRequest {
    pub name: String,
    #[serde(default)]
    pub floors: Vec<NewFloorRequest>,
}

#[derive(Debug, Deserialize)]
pub struct NewFloorRequest {
    pub name: String,
    #[serde(default)]
    pub units: Vec<NamedRequest>,
}

#[derive(Debug, Deserialize)]
pub struct NamedRequest {
    pub name: String,
}

impl NewPropertyRequest {
    pub fn into_tree(self, manager_id: UserId) -> NewPropertyTree {
        NewPropertyTree {
            property: NewProperty {
                manager_id,
                name: self.name,
                address_level_1_id: self.address_level_1_id,
                address_level_2_id: self.address_level_2_id,
                address_level_3_id: self.address_level_3_id,
                street: self.street,
            },
            blocks: self
                .blocks
                .into_iter()
                .map(|b| NewBlockTree {
                    name: b.name,
                    floors: b
                        .floors
                        .into_iter()
                        .map(|f| NewFloorTree {
                            name: f.name,
                            units: f.units.into_iter().map(|u| u.name).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePropertyRequest {
    pub name: Option<String>,
    #[serde(rename = "addressLevel1ID")]
    pub address_level_1_id: Option<u32>,
    #[serde(rename = "addressLevel2ID")]
    pub address_level_2_id: Option<u32>,
    #[serde(rename = "addressLevel3ID")]
    pub address_level_3_id: Option<u32>,
    pub street: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<UpdatePropertyRequest> for UpdateProperty {
    type Error = DomainError;

    fn try_from(r: UpdatePropertyRequest) -> Result<Self, Self::Error> {
        Ok(UpdateProperty {
            name: r.name,
            address_level_1_id: r.address_level_1_id,
            address_level_2_id: r.address_level_2_id,
            address_level_3_id: r.address_level_3_id,
            street: r.street,
            status: r.status.as_deref().map(str::parse).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct NewUnitRequest {
    pub name: String,
    #[serde(rename = "blockID")]
    pub block_id: String,
    #[serde(rename = "floorID")]
    pub floor_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUnitRequest {
    pub name: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<UpdateUnitRequest> for UpdateUnit {
    type Error = DomainError;

    fn try_from(r: UpdateUnitRequest) -> Result<Self, Self::Error> {
        let status: Option<Status> = r.status.as_deref().map(str::parse).transpose()?;
        Ok(UpdateUnit { name: r.name, status })
    }
}

// -------------------------
// Response mapping
// -------------------------

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Never includes the password hash.
pub fn user_to_json(u: &User) -> Value {
    json!({
        "id": u.id.to_string(),
        "first_name": u.first_name,
        "last_name": u.last_name,
        "phone": u.phone,
        "roles": u.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "status": u.status.as_str(),
        "created_at": timestamp(u.created_at),
        "updated_at": timestamp(u.updated_at),
    })
}

pub fn property_to_json(p: &Property) -> Value {
    json!({
        "id": p.id.to_string(),
        "managerID": p.manager_id.to_string(),
        "name": p.name,
        "addressLevel1ID": p.address_level_1_id,
        "addressLevel2ID": p.address_level_2_id,
        "addressLevel3ID": p.address_level_3_id,
        "street": p.street,
        "status": p.status.as_str(),
        "createdAt": timestamp(p.created_at),
        "updatedAt": timestamp(p.updated_at),
    })
}

pub fn unit_to_json(u: &Unit) -> Value {
    json!({
        "id": u.id.to_string(),
        "propertyID": u.property_id.to_string(),
        "blockID": u.block_id.to_string(),
        "floorID": u.floor_id.to_string(),
        "name": u.name,
        "status": u.status.as_str(),
        "createdAt": timestamp(u.created_at),
        "updatedAt": timestamp(u.updated_at),
    })
}

fn floor_to_json(f: &FloorDetail) -> Value {
    json!({
        "id": f.floor.id.to_string(),
        "name": f.floor.name,
        "propertyID": f.floor.property_id.to_string(),
        "blockID": f.floor.block_id.to_string(),
        "status": f.floor.status.as_str(),
        "createdAt": timestamp(f.floor.created_at),
        "updatedAt": timestamp(f.floor.updated_at),
        "units": f.units.iter().map(unit_to_json).collect::<Vec<_>>(),
    })
}

fn block_to_json(b: &BlockDetail) -> Value {
    json!({
        "id": b.block.id.to_string(),
        "propertyID": b.block.property_id.to_string(),
        "name": b.block.name,
        "status": b.block.status.as_str(),
        "createdAt": timestamp(b.block.created_at),
        "updatedAt": timestamp(b.block.updated_at),
        "floors": b.floors.iter().map(floor_to_json).collect::<Vec<_>>(),
    })
}

/// Property fields plus the nested `blocks` tree.
pub fn detail_to_json(d: &PropertyDetail) -> Value {
    let mut out = property_to_json(&d.property);
    out["blocks"] = Value::Array(d.blocks.iter().map(block_to_json).collect());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_request_keeps_order_and_names() {
        let body = json!({
            "name": "Sunrise",
            "addressLevel1ID": 1,
            "addressLevel2ID": 2,
            "addressLevel3ID": 3,
            "street": "12 Le Loi",
            "blocks": [
                {"name": "A", "floors": [{"name": "1", "units": [{"name": "101"}, {"name": "102"}]}]},
                {"name": "B"}
            ]
        });
        let req: NewPropertyRequest = serde_json::from_value(body).unwrap();
        let manager = UserId::new();
        let tree = req.into_tree(manager);

        assert_eq!(tree.property.manager_id, manager);
        assert_eq!(tree.blocks.len(), 2);
        assert_eq!(tree.blocks[0].floors[0].units, vec!["101", "102"]);
        assert!(tree.blocks[1].floors.is_empty());
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let req = UpdateUnitRequest {
            name: None,
            status: Some("ARCHIVED".into()),
        };
        assert!(matches!(UpdateUnit::try_from(req), Err(DomainError::Validation(_))));
    }
}
