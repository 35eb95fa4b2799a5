use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::AuthError;
use crate::middleware::auth::Identity;
use crate::models::role::Role;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
}

/// 管理员：用户及其角色，可用 `?role=` 过滤
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, AuthError> {
    let users = state.store.list_users(query.role).await?;
    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "data": users,
    })))
}

/// 管理员：所有卖家
pub async fn list_sellers(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AuthError> {
    let sellers = state.store.list_users(Some(Role::Seller)).await?;
    Ok(Json(json!({
        "success": true,
        "count": sellers.len(),
        "data": sellers,
    })))
}

/// 管理员：授予卖家角色，下一次刷新令牌时生效
pub async fn grant_seller(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(user_id): Path<i32>,
) -> Result<impl IntoResponse, AuthError> {
    if state.store.find_user_by_id(user_id).await?.is_none() {
        return Err(AuthError::NotFound(format!("user {} not found", user_id)));
    }

    state.store.grant_role(user_id, Role::Seller).await?;
    tracing::info!(admin_id = identity.user_id, user_id, "已授予卖家角色");

    Ok(Json(json!({
        "success": true,
        "message": "Seller role assigned successfully",
    })))
}

/// 管理员：移除卖家角色
pub async fn revoke_seller(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(user_id): Path<i32>,
) -> Result<impl IntoResponse, AuthError> {
    let removed = state.store.remove_role(user_id, Role::Seller).await?;
    if removed == 0 {
        return Err(AuthError::NotFound(format!(
            "user {} does not hold the seller role",
            user_id
        )));
    }
    tracing::info!(admin_id = identity.user_id, user_id, "已移除卖家角色");

    Ok(Json(json!({
        "success": true,
        "message": "Seller role removed successfully",
    })))
}

/// 卖家后台入口
pub async fn seller_dashboard(identity: Identity) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Welcome to seller dashboard!",
        "data": identity,
    }))
}
