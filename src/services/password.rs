use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    HashingFailed(String),
}

/// 用户不存在时用于等时校验的占位哈希
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("dummy-password-for-timing").unwrap_or_default());

/// Argon2id 哈希，盐内嵌在 PHC 字符串中
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// 校验密码，任何失败（包括哈希格式错误）都返回 false
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// 对占位哈希做一次校验并丢弃结果
pub fn burn_verification(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("TestPassword123!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("TestPassword123!", &hash));
        assert!(!verify_password("WrongPassword123!", &hash));
    }

    #[test]
    fn test_same_password_different_salts() {
        let h1 = hash_password("Password1").unwrap();
        let h2 = hash_password("Password1").unwrap();
        assert_ne!(h1, h2);
        assert!(verify_password("Password1", &h1));
        assert!(verify_password("Password1", &h2));
    }

    #[test]
    fn test_malformed_digest_is_false() {
        assert!(!verify_password("password", "not-a-valid-hash"));
        assert!(!verify_password("password", ""));
    }

    #[test]
    fn test_unicode_password() {
        let hash = hash_password("รหัสผ่าน123").unwrap();
        assert!(verify_password("รหัสผ่าน123", &hash));
    }
}
