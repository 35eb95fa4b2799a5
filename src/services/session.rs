//! 会话管理：登录、刷新、登出、注册。
//!
//! 状态按会话推进：未认证 → 已认证(有效) → 已认证(已吊销)。吊销不可逆。

use chrono::{Duration, Utc};
use std::sync::Arc;

use super::password::{burn_verification, hash_password, verify_password};
use super::store::{CredentialStore, StoreError};
use super::token::{issue_refresh_token, TokenCodec};
use crate::error::AuthError;
use crate::models::role;
use crate::models::user::{
    LoginResponse, NewUser, RefreshResponse, RegisterRequest, RegisteredUser, UserWithRoles,
};

/// Refresh Token 有效期
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    /// 角色为空时补全为 `["user"]`
    pub async fn resolve_roles(&self, user_id: i32) -> Result<Vec<String>, AuthError> {
        let roles = self.store.find_user_roles(user_id).await?;
        Ok(role::resolve_default(roles))
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let user = match self.store.find_user_by_identifier(identifier).await? {
            Some(user) => user,
            None => {
                burn_verification(password);
                tracing::debug!("登录失败: 账号不存在");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash) {
            tracing::debug!(user_id = user.id, "登录失败: 密码错误");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            tracing::debug!(user_id = user.id, "登录失败: 账号已停用");
            return Err(AuthError::InvalidCredentials);
        }

        let roles = self.resolve_roles(user.id).await?;
        let access_token = self.codec.issue_access_token(user.id, &user.email, &roles)?;
        let refresh_token = issue_refresh_token()?;

        let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);
        self.store
            .insert_refresh_token(user.id, &refresh_token, expires_at)
            .await?;

        tracing::info!(user_id = user.id, roles = ?roles, "用户登录成功");

        Ok(LoginResponse {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE,
            expires_in: self.codec.access_ttl(),
            user: UserWithRoles { user, roles },
        })
    }

    /// 只签发新的 Access Token，Refresh Token 不轮换也不续期
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        let record = self
            .store
            .find_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if record.is_revoked {
            return Err(AuthError::TokenRevoked);
        }
        if Utc::now() > record.expires_at {
            return Err(AuthError::TokenExpired);
        }

        // 用户已被删除时记录会随外键级联消失，这里按找不到处理
        let user = self
            .store
            .find_user_by_id(record.user_id)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        // 停用账号不能再续签，与登录一致
        if !user.is_active {
            tracing::debug!(user_id = user.id, "刷新失败: 账号已停用");
            return Err(AuthError::TokenRevoked);
        }

        // 每次刷新都重新读取当前角色
        let roles = self.resolve_roles(user.id).await?;
        let access_token = self.codec.issue_access_token(user.id, &user.email, &roles)?;

        tracing::info!(user_id = user.id, roles = ?roles, "Access Token 已刷新");

        Ok(RefreshResponse {
            access_token,
            token_type: TOKEN_TYPE,
            expires_in: self.codec.access_ttl(),
        })
    }

    /// 吊销 Refresh Token；对已吊销的令牌重复调用仍然成功
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let affected = self.store.revoke_refresh_token(refresh_token).await?;
        if affected == 0 {
            return Err(AuthError::TokenNotFound);
        }
        tracing::info!("Refresh Token 已吊销");
        Ok(())
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisteredUser, AuthError> {
        let (username_taken, email_taken) = self
            .store
            .username_or_email_taken(&req.username, &req.email)
            .await?;
        if email_taken {
            return Err(AuthError::Conflict("This email is already registered".into()));
        }
        if username_taken {
            return Err(AuthError::Conflict("This username is already taken".into()));
        }

        let password_hash = hash_password(&req.password)?;
        let user = self
            .store
            .create_user(NewUser {
                username: req.username,
                email: req.email,
                password_hash,
                fullname: req.fullname,
                phone: req.phone,
            })
            .await
            .map_err(|e| match e {
                // 并发注册在唯一约束上冲突
                StoreError::Conflict(_) => {
                    AuthError::Conflict("Username or email already registered".into())
                }
                other => AuthError::Store(other),
            })?;

        tracing::info!(user_id = user.id, username = %user.username, "新用户注册成功");

        Ok(RegisteredUser {
            user_id: user.id,
            username: user.username,
            email: user.email,
        })
    }
}
