use serde::{Deserialize, Serialize};
use std::fmt;

/// 系统内置角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Seller,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::User => "Default user role",
            Role::Seller => "Can list and sell notes",
            Role::Admin => "Marketplace administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 没有任何角色记录的用户按 `user` 处理
pub fn resolve_default(mut roles: Vec<String>) -> Vec<String> {
    if roles.is_empty() {
        roles.push(Role::User.as_str().to_string());
    }
    roles
}

/// 角色集合是否与允许列表有交集
pub fn intersects(held: &[String], allowed: &[Role]) -> bool {
    held.iter()
        .any(|r| allowed.iter().any(|a| a.as_str() == r.as_str()))
}
