//! Unit handlers nested under a property. Missing units, blocks and floors
//! are answered with 204.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
};
use chrono::Utc;
use serde_json::Value;

use propdesk_core::{BlockId, FloorId, UnitId};
use propdesk_properties::UpdateUnit;

use crate::app::dto::{self, NewUnitRequest, UpdateUnitRequest};
use crate::app::errors::ApiError;
use crate::app::routes::properties::preloaded;
use crate::app::state::{AppState, Backend};
use crate::context::RequestContext;

fn unit_id(params: &HashMap<String, String>) -> Result<UnitId, ApiError> {
    let raw = params
        .get("unit_id")
        .ok_or_else(|| ApiError::Validation("missing unit id".into()))?;
    Ok(raw.parse()?)
}

pub async fn create<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<NewUnitRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let property = preloaded(&ctx)?;
    let block_id: BlockId = req.block_id.parse()?;
    let floor_id: FloorId = req.floor_id.parse()?;

    let unit = app
        .properties_for(&ctx)?
        .add_unit(&property, block_id, floor_id, req.name, Utc::now())
        .await
        .map_err(|e| ApiError::from(e).or_no_content())?;
    Ok(Json(dto::unit_to_json(&unit)))
}

pub async fn update<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
    Path(params): Path<HashMap<String, String>>,
    payload: Result<Json<UpdateUnitRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let property = preloaded(&ctx)?;
    let id = unit_id(&params)?;

    let hierarchy = app.properties_for(&ctx)?;
    let unit = hierarchy
        .unit_in_property(&property, id)
        .await
        .map_err(|e| ApiError::from(e).or_no_content())?;
    let unit = hierarchy
        .unit()
        .update(unit, UpdateUnit::try_from(req)?, Utc::now())
        .await
        .map_err(|e| ApiError::from(e).or_no_content())?;
    Ok(Json(dto::unit_to_json(&unit)))
}

/// Soft delete.
pub async fn delete<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
    Path(params): Path<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let property = preloaded(&ctx)?;
    let id = unit_id(&params)?;

    let hierarchy = app.properties_for(&ctx)?;
    let unit = hierarchy
        .unit_in_property(&property, id)
        .await
        .map_err(|e| ApiError::from(e).or_no_content())?;
    let unit = hierarchy
        .unit()
        .delete(unit, Utc::now())
        .await
        .map_err(|e| ApiError::from(e).or_no_content())?;
    Ok(Json(dto::unit_to_json(&unit)))
}
