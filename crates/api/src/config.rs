//! Process configuration read from the environment.
//!
//! Every setting has a typed default so the service starts with nothing set;
//! insecure defaults are reported through `tracing` at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use propdesk_properties::DEFAULT_MAX_PROPERTIES_PER_MANAGER;
use propdesk_users::{DEFAULT_PASSWORD_COST, MAX_PASSWORD_COST, MIN_PASSWORD_COST};

pub const DEV_JWT_SECRET: &str = "propdesk-dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// `None` selects the in-memory backend.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    /// Directory of `<kid>.pem` / `<kid>.pub.pem` RSA keys.
    pub keys_dir: Option<PathBuf>,
    /// Key id used to sign new tokens.
    pub active_kid: String,
    pub issuer: String,
    pub token_ttl: chrono::Duration,
    pub request_timeout: Duration,
    pub max_properties_per_manager: usize,
    /// bcrypt work factor for stored passwords.
    pub password_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            db_max_connections: 10,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            keys_dir: None,
            active_kid: "dev".to_string(),
            issuer: "propdesk".to_string(),
            token_ttl: chrono::Duration::hours(24 * 30),
            request_timeout: Duration::from_secs(30),
            max_properties_per_manager: DEFAULT_MAX_PROPERTIES_PER_MANAGER,
            password_cost: DEFAULT_PASSWORD_COST,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.warn_insecure();
        Ok(config)
    }

    /// Build from an arbitrary variable source; unset or empty values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            addr: parse(&get, "PROPDESK_ADDR", defaults.addr)?,
            database_url: get("DATABASE_URL"),
            db_max_connections: parse(&get, "PROPDESK_DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            jwt_secret: get("PROPDESK_JWT_SECRET").unwrap_or(defaults.jwt_secret),
            keys_dir: get("PROPDESK_KEYS_DIR").map(PathBuf::from),
            active_kid: get("PROPDESK_ACTIVE_KID").unwrap_or(defaults.active_kid),
            issuer: get("PROPDESK_ISSUER").unwrap_or(defaults.issuer),
            token_ttl: token_ttl(&get)?,
            request_timeout: Duration::from_secs(parse(&get, "PROPDESK_REQUEST_TIMEOUT_SECS", 30)?),
            max_properties_per_manager: parse(
                &get,
                "PROPDESK_MAX_PROPERTIES_PER_MANAGER",
                defaults.max_properties_per_manager,
            )?,
            password_cost: password_cost(&get, defaults.password_cost)?,
        })
    }

    fn warn_insecure(&self) {
        if self.jwt_secret == DEV_JWT_SECRET {
            tracing::warn!("PROPDESK_JWT_SECRET not set; using insecure dev default");
        }
        if self.database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; data lives in memory and is lost on exit");
        }
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

const TOKEN_TTL_VAR: &str = "PROPDESK_TOKEN_TTL_HOURS";
const PASSWORD_COST_VAR: &str = "PROPDESK_PASSWORD_COST";

/// Positive hours that fit a `chrono::Duration`.
fn token_ttl(get: &impl Fn(&str) -> Option<String>) -> Result<chrono::Duration, ConfigError> {
    let hours: i64 = parse(get, TOKEN_TTL_VAR, 24 * 30)?;
    chrono::Duration::try_hours(hours)
        .filter(|ttl| *ttl > chrono::Duration::zero())
        .ok_or_else(|| ConfigError::Invalid {
            var: TOKEN_TTL_VAR,
            value: hours.to_string(),
        })
}

fn password_cost(get: &impl Fn(&str) -> Option<String>, default: u32) -> Result<u32, ConfigError> {
    let cost: u32 = parse(get, PASSWORD_COST_VAR, default)?;
    if (MIN_PASSWORD_COST..=MAX_PASSWORD_COST).contains(&cost) {
        Ok(cost)
    } else {
        Err(ConfigError::Invalid {
            var: PASSWORD_COST_VAR,
            value: cost.to_string(),
        })
    }
}
