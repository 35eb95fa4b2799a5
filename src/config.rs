use std::fmt;
use std::net::SocketAddr;

/// 签名密钥的最小推荐长度（字节）
const RECOMMENDED_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// 启动时可选创建的管理员账号
#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub admin: Option<AdminBootstrap>,
}

// 密钥和密码不进日志
impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[REDACTED]")
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("db_max_connections", &self.db_max_connections)
            .field("admin", &self.admin)
            .finish()
    }
}

impl AppConfig {
    /// 从进程环境读取配置，只在启动时调用一次
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = non_empty("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                "JWT_SECRET 长度仅 {} 字节，建议至少 {} 字节",
                jwt_secret.len(),
                RECOMMENDED_SECRET_LEN
            );
        }

        let database_url = non_empty("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_addr = match non_empty("BIND_ADDR") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let db_max_connections = match non_empty("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                reason: e.to_string(),
            })?,
            None => 20,
        };

        let admin = non_empty("ADMIN_PASSWORD").map(|password| AdminBootstrap {
            username: non_empty("ADMIN_USERNAME").unwrap_or_else(|| "admin".into()),
            email: non_empty("ADMIN_EMAIL").unwrap_or_else(|| "admin@localhost".into()),
            password,
        });

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            db_max_connections,
            admin,
        })
    }
}
