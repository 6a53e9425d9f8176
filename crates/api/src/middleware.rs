use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::FutureExt;

use propdesk_auth::TokenService;
use propdesk_core::{Beginner, StoreError, UnitOfWork};

use crate::app::errors::{ApiError, HandlerFailed};
use crate::context::RequestContext;

/// Verify the bearer token and start the request context.
///
/// Any failure ends the request with 401 before later layers run.
pub async fn authenticate(State(tokens): State<TokenService>, mut req: Request, next: Next) -> Response {
    let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let claims = match tokens.authenticate(header, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => return ApiError::from(e).into_response(),
    };

    tracing::debug!(subject_id = %claims.sub, "authenticated");
    req.extensions_mut().insert(RequestContext::authenticated(claims));
    next.run(req).await
}

/// Run the rest of the request inside one unit of work.
///
/// Commits when the handler produced a success response without an error
/// marker, rolls back otherwise. A panic rolls back and becomes a 500.
pub async fn transaction(State(beginner): State<Arc<dyn Beginner>>, mut req: Request, next: Next) -> Response {
    let uow = match beginner.begin().await {
        Ok(uow) => uow,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let extensions = req.extensions_mut();
    match extensions.get_mut::<RequestContext>() {
        Some(ctx) => ctx.unit_of_work = Some(uow.clone()),
        None => {
            extensions.insert(RequestContext {
                unit_of_work: Some(uow.clone()),
                ..RequestContext::default()
            });
        }
    }

    let outcome = AssertUnwindSafe(next.run(req)).catch_unwind().await;
    match outcome {
        Ok(response) if response.status().is_success() && response.extensions().get::<HandlerFailed>().is_none() => {
            match uow.commit().await {
                Ok(()) => response,
                // A store check replayed at commit can still reject the work.
                Err(StoreError::LimitExceeded(msg)) => ApiError::LimitExceeded(msg).into_response(),
                Err(e) => ApiError::internal(format!("commit: {e}")).into_response(),
            }
        }
        Ok(response) => {
            rollback(uow).await;
            response
        }
        Err(panic) => {
            rollback(uow).await;
            tracing::error!(panic = panic_message(&*panic), "handler panicked; transaction rolled back");
            ApiError::internal("handler panicked").into_response()
        }
    }
}

async fn rollback(uow: UnitOfWork) {
    let id = uow.id();
    if let Err(e) = uow.rollback().await {
        tracing::error!(uow_id = %id, error = %e, "rollback failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
