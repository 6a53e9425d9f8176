//! Authorization layers run after authentication.
//!
//! [`authorize`] checks a rule against the caller alone. The owner variants
//! first load the entity named by the path, store it in the request context
//! and check the rule against its owner. A missing entity ends the request
//! with 204.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use propdesk_auth::{Rule, TokenService};
use propdesk_core::{PropertyId, UserId};

use crate::app::errors::ApiError;
use crate::app::state::{AppState, Backend};
use crate::context::RequestContext;

#[derive(Clone)]
pub struct RuleGuard {
    pub tokens: TokenService,
    pub rule: Rule,
}

/// Rule plus access to the stores the owner loaders read from.
pub struct OwnerGuard<S> {
    pub app: Arc<AppState<S>>,
    pub rule: Rule,
}

impl<S> Clone for OwnerGuard<S> {
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
            rule: self.rule,
        }
    }
}

fn context(req: &mut Request) -> Result<&mut RequestContext, ApiError> {
    req.extensions_mut()
        .get_mut::<RequestContext>()
        .ok_or_else(|| ApiError::internal("request context missing; authentication layer not installed"))
}

pub async fn authorize(State(guard): State<RuleGuard>, mut req: Request, next: Next) -> Response {
    let checked = context(&mut req).and_then(|ctx| {
        guard
            .tokens
            .authorize(ctx.claims.as_ref(), None, guard.rule)
            .map_err(ApiError::from)
    });
    match checked {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

pub async fn authorize_user<S: Backend>(
    State(guard): State<OwnerGuard<S>>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Response {
    match load_user(&guard, &params, &mut req).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

async fn load_user<S: Backend>(
    guard: &OwnerGuard<S>,
    params: &HashMap<String, String>,
    req: &mut Request,
) -> Result<(), ApiError> {
    let ctx = context(req)?;
    let owner = match params.get("user_id") {
        Some(raw) => {
            let id: UserId = raw.parse()?;
            let user = guard
                .app
                .users
                .query_by_id(id)
                .await
                .map_err(|e| ApiError::from(e).or_no_content())?;
            ctx.user = Some(user);
            Some(id)
        }
        None => None,
    };
    guard.app.tokens.authorize(ctx.claims.as_ref(), owner, guard.rule)?;
    Ok(())
}

pub async fn authorize_property<S: Backend>(
    State(guard): State<OwnerGuard<S>>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Response {
    match load_property(&guard, &params, &mut req).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

async fn load_property<S: Backend>(
    guard: &OwnerGuard<S>,
    params: &HashMap<String, String>,
    req: &mut Request,
) -> Result<(), ApiError> {
    let ctx = context(req)?;
    let owner = match params.get("property_id") {
        Some(raw) => {
            let id: PropertyId = raw.parse()?;
            let property = guard
                .app
                .properties
                .property()
                .query_by_id(id)
                .await
                .map_err(|e| ApiError::from(e).or_no_content())?;
            let manager_id = property.manager_id;
            ctx.property = Some(property);
            Some(manager_id)
        }
        None => None,
    };
    guard.app.tokens.authorize(ctx.claims.as_ref(), owner, guard.rule)?;
    Ok(())
}
