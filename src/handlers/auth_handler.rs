use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::AuthError;
use crate::middleware::auth::Identity;
use crate::models::user::{LoginRequest, RefreshRequest, RegisterRequest};
use crate::AppState;

/// 用户注册
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    payload
        .validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let created = state.sessions.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User registered successfully",
            "data": created,
        })),
    ))
}

/// 用户登录（用户名或邮箱）
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let session = state
        .sessions
        .login(&payload.identifier, &payload.password)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "data": session,
    })))
}

/// 用 Refresh Token 换取新的 Access Token
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let refreshed = state.sessions.refresh(&payload.refresh_token).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Token refreshed successfully",
        "data": refreshed,
    })))
}

/// 登出：吊销 Refresh Token
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .sessions
        .logout(&payload.refresh_token)
        .await
        .map_err(|e| match e {
            AuthError::TokenNotFound => AuthError::NotFound("Refresh token not found".into()),
            other => other,
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully",
    })))
}

/// 当前登录用户资料
pub async fn me(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, AuthError> {
    let profile = state.store.find_user_by_id(identity.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "user_id": identity.user_id,
            "email": identity.email,
            "roles": identity.roles,
            "profile": profile,
        }
    })))
}
