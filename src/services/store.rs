//! 凭证存储边界：用户、角色、刷新令牌。
//!
//! 会话层只依赖 [`CredentialStore`]，生产环境注入 [`PgCredentialStore`]。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, Transaction};

use crate::models::role::Role;
use crate::models::user::{NewUser, RefreshTokenRecord, User, UserWithRoles};

const SCHEMA_SQL: &str = include_str!("../../schema.sql");

const USER_COLUMNS: &str = "id, username, email, password_hash, fullname, phone, \
     is_active, email_verified, avatar_url, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 按用户名或邮箱精确匹配，邮箱命中优先
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError>;

    /// 用户当前持有的角色名，未做默认角色补全
    async fn find_user_roles(&self, user_id: i32) -> Result<Vec<String>, StoreError>;

    async fn insert_refresh_token(
        &self,
        user_id: i32,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, token: &str)
        -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// 返回受影响行数
    async fn revoke_refresh_token(&self, token: &str) -> Result<u64, StoreError>;

    /// (用户名已占用, 邮箱已占用)，两个值都要同时对照用户名列和邮箱列
    async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<(bool, bool), StoreError>;

    /// 创建用户并授予默认 `user` 角色
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// 角色不存在时自动创建；重复授予无副作用
    async fn grant_role(&self, user_id: i32, role: Role) -> Result<(), StoreError>;

    async fn remove_role(&self, user_id: i32, role: Role) -> Result<u64, StoreError>;

    /// `role` 为 `Some` 时只返回持有该角色的用户
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserWithRoles>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(FromRow)]
struct UserRolesRow {
    #[sqlx(flatten)]
    user: User,
    roles: Vec<String>,
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 幂等执行 schema.sql
    pub async fn bootstrap_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.lines().all(|l| l.trim_start().starts_with("--")))
        {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("数据表结构检查完毕");
        Ok(())
    }

    async fn ensure_role(
        tx: &mut Transaction<'_, Postgres>,
        role: Role,
    ) -> Result<i32, StoreError> {
        sqlx::query("INSERT INTO roles (name, description) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
            .bind(role.as_str())
            .bind(role.description())
            .execute(&mut **tx)
            .await?;

        let role_id = sqlx::query_scalar::<_, i32>("SELECT id FROM roles WHERE name = $1")
            .bind(role.as_str())
            .fetch_one(&mut **tx)
            .await?;
        Ok(role_id)
    }

    async fn assign_role(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i32,
        role: Role,
    ) -> Result<(), StoreError> {
        let role_id = Self::ensure_role(tx, role).await?;
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE username = $1 OR email = $1 \
             ORDER BY (email = $1) DESC, id LIMIT 1",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_roles(&self, user_id: i32) -> Result<Vec<String>, StoreError> {
        let roles = sqlx::query_scalar::<_, String>(
            r#"SELECT r.name FROM roles r
               INNER JOIN user_roles ur ON r.id = ur.role_id
               WHERE ur.user_id = $1
               ORDER BY r.id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i32,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, expires_at, is_revoked) VALUES ($1, $2, $3, false)",
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT user_id, expires_at, is_revoked FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE refresh_tokens SET is_revoked = true WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<(bool, bool), StoreError> {
        let taken = sqlx::query_as::<_, (bool, bool)>(
            r#"SELECT
                 EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $1),
                 EXISTS(SELECT 1 FROM users WHERE email = $2 OR username = $2)"#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO users (username, email, password_hash, fullname, phone) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.fullname)
            .bind(&new_user.phone)
            .fetch_one(&mut *tx)
            .await?;

        Self::assign_role(&mut tx, user.id, Role::User).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn grant_role(&self, user_id: i32, role: Role) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::assign_role(&mut tx, user_id, role).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_role(&self, user_id: i32, role: Role) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"DELETE FROM user_roles
               WHERE user_id = $1
                 AND role_id = (SELECT id FROM roles WHERE name = $2)"#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserWithRoles>, StoreError> {
        let rows = sqlx::query_as::<_, UserRolesRow>(
            r#"SELECT u.id, u.username, u.email, u.password_hash, u.fullname, u.phone,
                      u.is_active, u.email_verified, u.avatar_url, u.created_at, u.updated_at,
                      COALESCE(ARRAY_AGG(r.name::TEXT ORDER BY r.id) FILTER (WHERE r.name IS NOT NULL),
                               '{}') AS roles
               FROM users u
               LEFT JOIN user_roles ur ON u.id = ur.user_id
               LEFT JOIN roles r ON ur.role_id = r.id
               WHERE $1::TEXT IS NULL OR EXISTS (
                   SELECT 1 FROM user_roles fur
                   INNER JOIN roles fr ON fr.id = fur.role_id
                   WHERE fur.user_id = u.id AND fr.name = $1)
               GROUP BY u.id
               ORDER BY u.id"#,
        )
        .bind(role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserWithRoles {
                user: row.user,
                roles: row.roles,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
