use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{
    DomainError, DomainResult, Entity, FieldErrors, PropertyId, Rebind, Repository, Status, StoreError,
    UnitOfWork, UserId,
};

/// Root of the asset hierarchy, owned by one manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub manager_id: UserId,
    pub name: String,
    pub address_level_1_id: u32,
    pub address_level_2_id: u32,
    pub address_level_3_id: u32,
    pub street: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Property {
    type Id = PropertyId;

    fn id(&self) -> PropertyId {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProperty {
    pub manager_id: UserId,
    pub name: String,
    pub address_level_1_id: u32,
    pub address_level_2_id: u32,
    pub address_level_3_id: u32,
    pub street: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProperty {
    pub name: Option<String>,
    pub address_level_1_id: Option<u32>,
    pub address_level_2_id: Option<u32>,
    pub address_level_3_id: Option<u32>,
    pub street: Option<String>,
    pub status: Option<Status>,
}

impl NewProperty {
    pub(crate) fn check(&self, errs: &mut FieldErrors) {
        errs.require(&self.name, "name");
        errs.check(self.address_level_1_id >= 1, "addressLevel1ID", "must be at least 1");
        errs.check(self.address_level_2_id >= 1, "addressLevel2ID", "must be at least 1");
        errs.check(self.address_level_3_id >= 1, "addressLevel3ID", "must be at least 1");
        errs.require(&self.street, "street");
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = FieldErrors::new();
        self.check(&mut errs);
        errs.into_result()
    }

    pub fn into_property(self, id: PropertyId, now: DateTime<Utc>) -> Property {
        Property {
            id,
            manager_id: self.manager_id,
            name: self.name.trim().to_string(),
            address_level_1_id: self.address_level_1_id,
            address_level_2_id: self.address_level_2_id,
            address_level_3_id: self.address_level_3_id,
            street: self.street.trim().to_string(),
            status: Status::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

impl UpdateProperty {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = FieldErrors::new();
        if let Some(name) = &self.name {
            errs.require(name, "name");
        }
        for (value, field) in [
            (self.address_level_1_id, "addressLevel1ID"),
            (self.address_level_2_id, "addressLevel2ID"),
            (self.address_level_3_id, "addressLevel3ID"),
        ] {
            if let Some(v) = value {
                errs.check(v >= 1, field, "must be at least 1");
            }
        }
        if let Some(street) = &self.street {
            errs.require(street, "street");
        }
        // Deleting goes through `delete` so the tree follows the property.
        errs.check(self.status != Some(Status::Deleted), "status", "cannot be set to DELETED");
        errs.into_result()
    }
}

/// Persistence port for properties.
///
/// Queries skip rows whose status is `Deleted`.
#[async_trait]
pub trait PropertyStore: Rebind + Send + Sync {
    async fn create(&self, property: &Property) -> Result<(), StoreError>;
    /// Insert unless the manager already owns `limit` live properties. The
    /// count and the insert are atomic with respect to concurrent writers;
    /// a full manager is reported as [`StoreError::LimitExceeded`].
    async fn create_limited(&self, property: &Property, limit: usize) -> Result<(), StoreError>;
    async fn update(&self, property: &Property) -> Result<(), StoreError>;
    /// Hard delete.
    async fn delete(&self, property: &Property) -> Result<(), StoreError>;
    async fn query_by_id(&self, id: PropertyId) -> Result<Property, StoreError>;
    async fn query_by_manager_id(&self, manager_id: UserId) -> Result<Vec<Property>, StoreError>;
}

pub const DEFAULT_MAX_PROPERTIES_PER_MANAGER: usize = 1;

const ERR_MAX_PROPERTIES: &str = "maximum number of properties exceeded";

fn store_err(e: StoreError) -> DomainError {
    match e {
        StoreError::NotFound(_) => DomainError::not_found("property"),
        StoreError::LimitExceeded(_) => DomainError::limit(ERR_MAX_PROPERTIES),
        other => DomainError::Store(other),
    }
}

#[derive(Debug, Clone)]
pub struct PropertyCore<S> {
    repo: Repository<S>,
    max_per_manager: usize,
}

impl<S: PropertyStore> PropertyCore<S> {
    pub fn new(store: S, max_per_manager: usize) -> Self {
        Self {
            repo: Repository::new(store),
            max_per_manager,
        }
    }

    pub fn store(&self) -> &S {
        self.repo.store()
    }

    pub fn execute_under_transaction(&self, uow: &UnitOfWork) -> Result<Self, StoreError> {
        Ok(Self {
            repo: self.repo.bind(uow)?,
            max_per_manager: self.max_per_manager,
        })
    }

    /// Persist an already built property. Fails with `LimitExceeded` once the
    /// manager owns the maximum number of live properties.
    pub async fn insert(&self, property: &Property) -> DomainResult<()> {
        self.repo
            .create_limited(property, self.max_per_manager)
            .await
            .map_err(store_err)
    }

    pub async fn create(&self, np: NewProperty, now: DateTime<Utc>) -> DomainResult<Property> {
        np.validate()?;

        let property = np.into_property(PropertyId::new(), now);
        self.insert(&property).await?;
        Ok(property)
    }

    pub async fn update(&self, mut property: Property, up: UpdateProperty, now: DateTime<Utc>) -> DomainResult<Property> {
        up.validate()?;

        if let Some(name) = up.name {
            property.name = name.trim().to_string();
        }
        if let Some(v) = up.address_level_1_id {
            property.address_level_1_id = v;
        }
        if let Some(v) = up.address_level_2_id {
            property.address_level_2_id = v;
        }
        if let Some(v) = up.address_level_3_id {
            property.address_level_3_id = v;
        }
        if let Some(street) = up.street {
            property.street = street.trim().to_string();
        }
        if let Some(status) = up.status {
            property.status = status;
        }
        property.updated_at = now;

        self.repo.update(&property).await.map_err(store_err)?;
        Ok(property)
    }

    /// Soft delete.
    pub async fn delete(&self, mut property: Property, now: DateTime<Utc>) -> DomainResult<Property> {
        property.status = Status::Deleted;
        property.updated_at = now;
        self.repo.update(&property).await.map_err(store_err)?;
        Ok(property)
    }

    pub async fn query_by_id(&self, id: PropertyId) -> DomainResult<Property> {
        self.repo.query_by_id(id).await.map_err(store_err)
    }

    pub async fn query_by_manager_id(&self, manager_id: UserId) -> DomainResult<Vec<Property>> {
        self.repo.query_by_manager_id(manager_id).await.map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePropertyStore, new_property};

    #[tokio::test]
    async fn second_property_hits_the_manager_limit() {
        let core = PropertyCore::new(FakePropertyStore::default(), DEFAULT_MAX_PROPERTIES_PER_MANAGER);
        let manager = UserId::new();

        let p = core.create(new_property(manager), Utc::now()).await.unwrap();
        assert_eq!(p.status, Status::Created);

        let err = core.create(new_property(manager), Utc::now()).await.unwrap_err();
        assert_eq!(err, DomainError::limit(ERR_MAX_PROPERTIES));

        // Another manager is unaffected.
        assert!(core.create(new_property(UserId::new()), Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn soft_deleted_property_frees_the_quota() {
        let core = PropertyCore::new(FakePropertyStore::default(), 1);
        let manager = UserId::new();
        let p = core.create(new_property(manager), Utc::now()).await.unwrap();

        core.delete(p.clone(), Utc::now()).await.unwrap();

        assert!(core.query_by_id(p.id).await.unwrap_err().is_not_found());
        assert!(core.create(new_property(manager), Utc::now()).await.is_ok());
    }

    #[test]
    fn address_ids_start_at_one() {
        let mut np = new_property(UserId::new());
        np.address_level_2_id = 0;
        np.street = String::new();
        match np.validate() {
            Err(DomainError::Fields(fields)) => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["addressLevel2ID", "street"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let core = PropertyCore::new(FakePropertyStore::default(), 1);
        let p = core.create(new_property(UserId::new()), Utc::now()).await.unwrap();

        let up = UpdateProperty {
            name: Some("Renamed".into()),
            ..UpdateProperty::default()
        };
        let updated = core.update(p.clone(), up, Utc::now()).await.unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.street, p.street);
        assert_eq!(core.query_by_id(p.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn update_cannot_soft_delete() {
        let core = PropertyCore::new(FakePropertyStore::default(), 1);
        let p = core.create(new_property(UserId::new()), Utc::now()).await.unwrap();

        let up = UpdateProperty {
            status: Some(Status::Deleted),
            ..UpdateProperty::default()
        };
        match core.update(p.clone(), up, Utc::now()).await {
            Err(DomainError::Fields(fields)) => assert_eq!(fields[0].field, "status"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(core.query_by_id(p.id).await.unwrap().status, Status::Created);
    }
}
