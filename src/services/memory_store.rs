//! 测试用内存凭证存储，语义与 Postgres 实现保持一致。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::store::{CredentialStore, StoreError};
use crate::models::role::Role;
use crate::models::user::{NewUser, RefreshTokenRecord, User, UserWithRoles};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    /// user_id -> 角色名（按授予顺序）
    user_roles: HashMap<i32, Vec<String>>,
    /// 角色表，按创建顺序
    roles: Vec<String>,
    tokens: HashMap<String, RefreshTokenRecord>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的所有调用都返回 StoreError
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// 直接写入一个用户，不授予任何角色
    pub fn insert_user_without_roles(&self, username: &str, email: &str, password_hash: &str) -> i32 {
        let mut inner = self.inner.lock();
        let user = build_user(inner.users.len() as i32 + 1, username, email, password_hash);
        let id = user.id;
        inner.users.push(user);
        id
    }

    pub fn deactivate(&self, user_id: i32) {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) {
            user.is_active = false;
        }
    }

    pub fn refresh_token(&self, token: &str) -> Option<RefreshTokenRecord> {
        self.inner.lock().tokens.get(token).cloned()
    }

    pub fn token_count(&self) -> usize {
        self.inner.lock().tokens.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

fn build_user(id: i32, username: &str, email: &str, password_hash: &str) -> User {
    let now = Utc::now();
    User {
        id,
        username: username.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        fullname: None,
        phone: None,
        is_active: true,
        email_verified: false,
        avatar_url: None,
        created_at: now,
        updated_at: now,
    }
}

impl Inner {
    fn assign(&mut self, user_id: i32, role: Role) {
        let name = role.as_str().to_string();
        if !self.roles.contains(&name) {
            self.roles.push(name.clone());
        }
        let held = self.user_roles.entry(user_id).or_default();
        if !held.contains(&name) {
            held.push(name);
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        self.check()?;
        let inner = self.inner.lock();
        let by_email = inner.users.iter().find(|u| u.email == identifier);
        Ok(by_email
            .or_else(|| inner.users.iter().find(|u| u.username == identifier))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_roles(&self, user_id: i32) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let inner = self.inner.lock();
        let mut roles = inner.user_roles.get(&user_id).cloned().unwrap_or_default();
        // 与 SQL 的 ORDER BY r.id 一致
        roles.sort_by_key(|r| inner.roles.iter().position(|known| known == r));
        Ok(roles)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i32,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock();
        if inner.tokens.contains_key(token) {
            return Err(StoreError::Conflict("refresh_tokens_token_key".into()));
        }
        inner.tokens.insert(
            token.to_string(),
            RefreshTokenRecord {
                user_id,
                expires_at,
                is_revoked: false,
            },
        );
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().tokens.get(token).cloned())
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<u64, StoreError> {
        self.check()?;
        match self.inner.lock().tokens.get_mut(token) {
            Some(record) => {
                record.is_revoked = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<(bool, bool), StoreError> {
        self.check()?;
        let inner = self.inner.lock();
        let taken = |value: &str| inner.users.iter().any(|u| u.username == value || u.email == value);
        Ok((taken(username), taken(email)))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock();
        if inner
            .users
            .iter()
            .any(|u| u.username == new_user.username || u.email == new_user.email)
        {
            return Err(StoreError::Conflict("users_username_key".into()));
        }

        let mut user = build_user(
            inner.users.len() as i32 + 1,
            &new_user.username,
            &new_user.email,
            &new_user.password_hash,
        );
        user.fullname = new_user.fullname;
        user.phone = new_user.phone;

        inner.users.push(user.clone());
        inner.assign(user.id, Role::User);
        Ok(user)
    }

    async fn grant_role(&self, user_id: i32, role: Role) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().assign(user_id, role);
        Ok(())
    }

    async fn remove_role(&self, user_id: i32, role: Role) -> Result<u64, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock();
        let Some(held) = inner.user_roles.get_mut(&user_id) else {
            return Ok(0);
        };
        let before = held.len();
        held.retain(|r| r != role.as_str());
        Ok((before - held.len()) as u64)
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserWithRoles>, StoreError> {
        self.check()?;
        let users = self.inner.lock().users.clone();
        let mut listed = Vec::with_capacity(users.len());
        for user in users {
            let roles = self.find_user_roles(user.id).await?;
            if let Some(role) = role {
                if !roles.iter().any(|r| r == role.as_str()) {
                    continue;
                }
            }
            listed.push(UserWithRoles { user, roles });
        }
        Ok(listed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}
