use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin_handler, auth_handler};
use crate::middleware::auth::{guard, require_role, RequiredRoles};
use crate::models::role::Role;
use crate::AppState;

const SELLER_AREA: RequiredRoles = RequiredRoles(&[Role::Seller, Role::Admin]);
const ADMIN_AREA: RequiredRoles = RequiredRoles(&[Role::Admin]);

/// 健康检查：探测凭证存储连通性
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "up", "database": "connected" })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: database error: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "down", "error": "database_error" })),
            )
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 公开路由
    let public_routes = Router::new()
        .route("/register", post(auth_handler::register))
        .route("/login", post(auth_handler::login))
        .route("/refresh", post(auth_handler::refresh))
        .route("/logout", post(auth_handler::logout));

    // 需要登录；layer 后加先执行，guard 必须最后挂
    let protected_routes = Router::new()
        .route("/me", get(auth_handler::me))
        .route_layer(from_fn_with_state(state.clone(), guard));

    let seller_routes = Router::new()
        .route("/dashboard", get(admin_handler::seller_dashboard))
        .route_layer(from_fn_with_state(SELLER_AREA, require_role))
        .route_layer(from_fn_with_state(state.clone(), guard));

    let admin_routes = Router::new()
        .route("/users", get(admin_handler::list_users))
        .route("/sellers", get(admin_handler::list_sellers))
        .route(
            "/users/:id/seller",
            post(admin_handler::grant_seller).delete(admin_handler::revoke_seller),
        )
        .route_layer(from_fn_with_state(ADMIN_AREA, require_role))
        .route_layer(from_fn_with_state(state.clone(), guard));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", public_routes.merge(protected_routes))
        .nest("/api/seller", seller_routes)
        .nest("/api/admin", admin_routes)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
