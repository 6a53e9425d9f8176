use std::sync::Arc;

use axum::{Router, routing::get};

use crate::app::state::{AppState, Backend};

pub mod properties;
pub mod system;
pub mod units;
pub mod users;

/// Every `/v1` endpoint. Each area installs its own auth layers.
pub fn router<S: Backend>(app: &Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/readiness", get(system::readiness))
        .route("/liveness", get(system::liveness))
        .merge(users::router(app))
        .merge(properties::router(app))
}
