//! Session Token
//!
//! OTP 验证成功后签发的不透明字符串。Token 本身不携带任何声明，
//! 也不是签名凭证；角色、标识符和签发时间只作为本地元数据返回给调用方。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::passwordless::identifier::Role;
use crate::random::generate_session_token;

/// Token 前缀
pub const TOKEN_PREFIX: &str = "pht_";

/// 验证成功后签发的 session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// 不透明的 token 字符串
    pub token: String,

    /// 登录角色
    pub role: Role,

    /// 登录标识符（手机号或邮箱）
    pub identifier: String,

    /// 签发时间
    pub issued_at: DateTime<Utc>,
}

impl SessionToken {
    /// 为指定角色和标识符签发新 token
    ///
    /// # Example
    ///
    /// ```rust
    /// use pothole_auth::passwordless::Role;
    /// use pothole_auth::token::SessionToken;
    ///
    /// let token = SessionToken::mint(Role::Citizen, "9876543210").unwrap();
    /// assert!(token.as_str().starts_with("pht_"));
    /// assert!(!token.as_str().contains("9876543210"));
    /// ```
    pub fn mint(role: Role, identifier: impl Into<String>) -> Result<Self> {
        let random = generate_session_token()?;
        Ok(Self {
            token: format!("{}{}", TOKEN_PREFIX, random),
            role,
            identifier: identifier.into(),
            issued_at: Utc::now(),
        })
    }

    /// token 字符串
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// 取出 token 字符串
    pub fn into_string(self) -> String {
        self.token
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}
