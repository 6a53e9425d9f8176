//! HTTP API application wiring (Axum router + shared state).
//!
//! - `state.rs`: cores, caches, token service and the unit-of-work factory
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON response mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use propdesk_auth::KeyError;
use propdesk_infra::{MemoryDb, MemoryStore, PgDb, PgStore};
use propdesk_users::OtpSender;

use crate::config::Config;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod state;

pub use state::{AppState, Backend};

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app<S: Backend>(state: AppState<S>, request_timeout: Duration) -> Router {
    let app = Arc::new(state);

    Router::new()
        .nest("/v1", routes::router(&app))
        .layer(Extension(app))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

/// State over the in-memory backend; `db` stays usable for inspection.
pub fn memory_state(
    config: &Config,
    db: &MemoryDb,
    otp: Arc<dyn OtpSender>,
) -> Result<AppState<MemoryStore>, KeyError> {
    AppState::new(config, db.store(), Arc::new(db.clone()), otp)
}

pub fn postgres_state(config: &Config, db: &PgDb, otp: Arc<dyn OtpSender>) -> Result<AppState<PgStore>, KeyError> {
    AppState::new(config, db.store(), Arc::new(db.clone()), otp)
}
