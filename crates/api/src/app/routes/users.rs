use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde_json::{Value, json};

use propdesk_auth::{Claims, Rule};
use propdesk_core::{Status, UserId};

use crate::app::dto::{self, RegisterRequest, UpdateUserRequest, VerifyOtpRequest};
use crate::app::errors::ApiError;
use crate::app::state::{AppState, Backend};
use crate::authz::{self, OwnerGuard};
use crate::context::RequestContext;
use crate::middleware;

pub fn router<S: Backend>(app: &Arc<AppState<S>>) -> Router {
    let public = Router::new()
        .route("/users/register", post(register::<S>))
        .route("/users/verify-otp", post(verify_otp::<S>))
        .route("/users/token", get(token::<S>));

    let owned = Router::new()
        .route("/users/:user_id", put(update::<S>))
        .route_layer(from_fn_with_state(
            OwnerGuard {
                app: app.clone(),
                rule: Rule::AdminOrSubject,
            },
            authz::authorize_user::<S>,
        ))
        .route_layer(from_fn_with_state(app.tokens.clone(), middleware::authenticate));

    public.merge(owned)
}

/// Create a user in `CREATED` state and send the activation code.
pub async fn register<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;
    let user = app.users.create(req.into_new_user(), Utc::now()).await?;

    let message_id = app.otp.send_otp(&user.phone).await?;
    tracing::info!(user_id = %user.id, %message_id, "activation code sent");

    Ok((StatusCode::CREATED, Json(dto::user_to_json(&user))))
}

pub async fn verify_otp<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let user_id: UserId = req.user_id.parse()?;

    let user = app.users.query_by_id(user_id).await?;
    if user.status != Status::Created {
        return Err(ApiError::Validation(format!("user is {}, not awaiting activation", user.status)));
    }
    app.otp.check_otp(&user.phone, &req.otp).await?;

    let user = app.users.activate(user, Utc::now()).await?;
    Ok(Json(dto::user_to_json(&user)))
}

/// Issue a bearer token for HTTP Basic `phone:password` credentials.
pub async fn token<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let (phone, password) = basic_credentials(&headers)?;
    let user = app.users.authenticate(&phone, &password).await?;

    let now = Utc::now();
    let claims = Claims::new(user.id, user.roles.clone(), app.tokens.issuer(), now, app.token_ttl);
    let token = app.tokens.generate_token(&app.active_kid, &claims)?;

    Ok(Json(json!({ "token": token })))
}

pub async fn update<S: Backend>(
    Extension(app): Extension<Arc<AppState<S>>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let user = ctx
        .user
        .clone()
        .ok_or_else(|| ApiError::internal("user not preloaded"))?;

    let user = app.users_for(&ctx)?.update(user, req.into(), Utc::now()).await?;
    Ok(Json(dto::user_to_json(&user)))
}

fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
    let missing = || ApiError::Unauthenticated("must provide phone and password in Basic auth".into());

    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(missing)?;
    let (scheme, encoded) = value.trim().split_once(' ').ok_or_else(missing)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(missing());
    }

    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| missing())?;
    let decoded = String::from_utf8(decoded).map_err(|_| missing())?;
    let (phone, password) = decoded.split_once(':').ok_or_else(missing)?;
    Ok((phone.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn basic_credentials_split_on_first_colon() {
        let encoded = STANDARD.encode("0911111111:pa:ss");
        let (phone, password) = basic_credentials(&headers(&format!("Basic {encoded}"))).unwrap();
        assert_eq!(phone, "0911111111");
        assert_eq!(password, "pa:ss");
    }

    #[test]
    fn bearer_or_garbage_is_rejected() {
        assert!(basic_credentials(&HeaderMap::new()).is_err());
        assert!(basic_credentials(&headers("Bearer abc")).is_err());
        assert!(basic_credentials(&headers("Basic !!!")).is_err());
    }
}
