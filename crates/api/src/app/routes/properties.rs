use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::rejection::JsonRejection,
    handler::Handler,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::Value;

use propdesk_auth::Rule;
use propdesk_properties::{Property, UpdateProperty};

use crate::app::dto::{self, NewPropertyRequest, UpdatePropertyRequest};
use crate::app::errors::ApiError;
use crate::app::routes::units;
use crate::app::state::{AppState, Backend};
use crate::authz::{self, OwnerGuard, RuleGuard};
use crate::context::RequestContext;
use crate::middleware;

pub fn router<S: Backend>(app: &Arc<AppState<S>>) -> Router {
    let tx = from_fn_with_state(app.beginner.clone(), middleware::transaction);

    let collection = Router::new()
        .route("/properties", get(list::<S>).post(create::<S>.layer(tx.clone())))
        .route_layer(from_fn_with_state(
            RuleGuard {
                tokens: app.tokens.clone(),
                rule: Rule::UserOnly,
            },
            authz::authorize,
        ));

    let owned = Router::new()
        .route(
            "/properties/:property_id",
            get(detail::<S>).put(update::<S>).delete(delete::<S>.layer(tx.clone())),
        )
        .route("/properties/:property_id/units", post(units::create::<S>))
        .route(
            "/properties/:property_id/units/:unit_id",
            put(units::update::<S>).delete(units::delete::<S>.layer(tx)),
        )
        .route_layer(from_fn_with_state(
            OwnerGuard {
                app: app.clone(),
                rule: Rule::AdminOrSubject,
            },
            authz::authorize_property::<S>,
        ));

    collection
        .merge(owned)
        .route_layer(from_fn_with_state(app.tokens.clone(), middleware::authenticate))
}

/// Preloaded by the property owner guard.
pub(crate) fn preloaded(ctx: &RequestContext) -> Result<Property, ApiError> {
    ctx.property
        .clone()
        .ok_or_else(|| ApiError::internal("property not preloaded"))
}

fn subject(ctx: &RequestContext) -> Result<propdesk_core::UserId, ApiError> {
    ctx.subject_id
        .ok_or_else(|| ApiError::Unauthenticated("missing subject".into()))
}

/// Properties managed by the caller.
pub async fn list<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let manager_id = subject(&ctx)?;
    let properties = app.properties.property().query_by_manager_id(manager_id).await?;
    Ok(Json(properties.iter().map(dto::property_to_json).collect()))
}

/// Create a property with its whole block/floor/unit tree, owned by the caller.
pub async fn create<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<NewPropertyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;
    let manager_id = subject(&ctx)?;

    let hierarchy = app.properties_for(&ctx)?;
    let detail = hierarchy.create(req.into_tree(manager_id), Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(dto::detail_to_json(&detail))))
}

pub async fn detail<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Value>, ApiError> {
    let property = preloaded(&ctx)?;
    let detail = app.properties_for(&ctx)?.detail(property).await?;
    Ok(Json(dto::detail_to_json(&detail)))
}

pub async fn update<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<UpdatePropertyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let property = preloaded(&ctx)?;

    let hierarchy = app.properties_for(&ctx)?;
    let updated = hierarchy
        .property()
        .update(property, UpdateProperty::try_from(req)?, Utc::now())
        .await?;
    Ok(Json(dto::property_to_json(&updated)))
}

/// Soft-delete the property and everything under it.
pub async fn delete<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Value>, ApiError> {
    let property = preloaded(&ctx)?;
    let deleted = app.properties_for(&ctx)?.delete(property, Utc::now()).await?;
    Ok(Json(dto::property_to_json(&deleted)))
}
