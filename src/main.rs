use anyhow::Context;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 声明子模块
mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;

use config::{AdminBootstrap, AppConfig};
use models::role::Role;
use models::user::RegisterRequest;
use services::session::SessionManager;
use services::store::{CredentialStore, PgCredentialStore};
use services::token::TokenCodec;

// 定义全局状态：只读签名密钥 + 存储句柄，请求之间不共享其他可变状态
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub codec: Arc<TokenCodec>,
    pub sessions: SessionManager,
}

/// 按配置确保管理员账号存在
async fn ensure_default_admin(
    sessions: &SessionManager,
    store: &dyn CredentialStore,
    admin: &AdminBootstrap,
) -> anyhow::Result<()> {
    let user_id = match store.find_user_by_identifier(&admin.username).await? {
        Some(user) => user.id,
        None => {
            tracing::info!("未检测到管理员账号，正在创建: {}", admin.username);
            sessions
                .register(RegisterRequest {
                    username: admin.username.clone(),
                    email: admin.email.clone(),
                    password: admin.password.clone(),
                    fullname: Some("Administrator".into()),
                    phone: None,
                })
                .await
                .context("无法创建管理员账号")?
                .user_id
        }
    };

    store.grant_role(user_id, Role::Admin).await?;
    tracing::info!("管理员账号就绪: id={}", user_id);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 初始化环境变量与日志
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "认证服务启动中... 当前级别: {}",
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())
    );

    // 2. 读取配置，缺少签名密钥直接退出
    let config = AppConfig::from_env().context("配置加载失败")?;

    // 3. 初始化数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to create database connection pool")?;

    let pg_store = PgCredentialStore::new(pool);
    pg_store.bootstrap_schema().await?;

    let store: Arc<dyn CredentialStore> = Arc::new(pg_store);
    let codec = Arc::new(TokenCodec::new(&config.jwt_secret));
    let sessions = SessionManager::new(store.clone(), codec.clone());

    // 4. 执行启动预热逻辑
    if let Some(admin) = &config.admin {
        ensure_default_admin(&sessions, store.as_ref(), admin).await?;
    }

    let shared_state = Arc::new(AppState {
        store,
        codec,
        sessions,
    });

    // 5. 组合路由并启动
    let app = routes::router(shared_state);

    tracing::info!("🚀 Server deployed successfully at http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("无法监听 {}", config.bind_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
