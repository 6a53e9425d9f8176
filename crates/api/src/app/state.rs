use std::sync::Arc;

use propdesk_auth::{KeyError, KeyMaterial, KeyStore, TokenService};
use propdesk_core::Beginner;
use propdesk_properties::{
    BlockCore, BlockStore, FloorCore, FloorStore, Hierarchy, PropertyCache, PropertyCore, PropertyStore, UnitCore,
    UnitStore,
};
use propdesk_users::{BcryptHasher, OtpSender, PasswordHasher, UserCache, UserCore, UserStore};

use crate::app::errors::ApiError;
use crate::config::Config;
use crate::context::RequestContext;

/// A store type that serves every entity table.
pub trait Backend:
    UserStore + PropertyStore + BlockStore + FloorStore + UnitStore + Clone + Send + Sync + 'static
{
}

impl<T> Backend for T where
    T: UserStore + PropertyStore + BlockStore + FloorStore + UnitStore + Clone + Send + Sync + 'static
{
}

pub type Users<S> = UserCore<UserCache<S>>;
pub type Properties<S> = Hierarchy<PropertyCache<S>, S, S, S>;

/// Everything the handlers share, built once at startup.
pub struct AppState<S> {
    pub tokens: TokenService,
    /// Key id new tokens are signed with.
    pub active_kid: String,
    pub token_ttl: chrono::Duration,
    pub beginner: Arc<dyn Beginner>,
    pub users: Users<S>,
    pub properties: Properties<S>,
    pub otp: Arc<dyn OtpSender>,
}

impl<S: Backend> AppState<S> {
    pub fn new(
        config: &Config,
        store: S,
        beginner: Arc<dyn Beginner>,
        otp: Arc<dyn OtpSender>,
    ) -> Result<Self, KeyError> {
        let keys = Arc::new(KeyStore::new());
        keys.insert(config.active_kid.clone(), KeyMaterial::hmac(config.jwt_secret.as_bytes()));
        if let Some(dir) = &config.keys_dir {
            let loaded = keys.load_dir(dir)?;
            tracing::info!(dir = %dir.display(), loaded, "signing keys loaded");
        }
        tracing::info!(kids = ?keys.kids(), active = %config.active_kid, "key store ready");

        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(config.password_cost));
        let users = UserCore::new(UserCache::new(store.clone()), hasher);
        let properties = Hierarchy::new(
            PropertyCore::new(PropertyCache::new(store.clone()), config.max_properties_per_manager),
            BlockCore::new(store.clone()),
            FloorCore::new(store.clone()),
            UnitCore::new(store),
        );

        Ok(Self {
            tokens: TokenService::new(keys, config.issuer.clone()),
            active_kid: config.active_kid.clone(),
            token_ttl: config.token_ttl,
            beginner,
            users,
            properties,
            otp,
        })
    }

    /// User core bound to the request's unit of work, if it has one.
    pub fn users_for(&self, ctx: &RequestContext) -> Result<Users<S>, ApiError> {
        match &ctx.unit_of_work {
            Some(uow) => Ok(self.users.execute_under_transaction(uow)?),
            None => Ok(self.users.clone()),
        }
    }

    /// Hierarchy bound to the request's unit of work, if it has one.
    pub fn properties_for(&self, ctx: &RequestContext) -> Result<Properties<S>, ApiError> {
        match &ctx.unit_of_work {
            Some(uow) => Ok(self.properties.execute_under_transaction(uow)?),
            None => Ok(self.properties.clone()),
        }
    }
}
