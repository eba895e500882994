//! 统一错误类型模块
//!
//! 提供 pothole-auth 库中所有操作的错误类型定义。
//!
//! 所有错误都是可恢复的：调用方（通常是表单处理逻辑）通过
//! [`Error::user_message`] 取得面向用户的提示文本，而不是让进程失败。

use std::fmt;
use std::time::Duration;

use crate::passwordless::identifier::Role;
use crate::passwordless::otp::ceil_seconds;

/// pothole-auth 库的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// pothole-auth 库的错误类型
#[derive(Debug)]
pub enum Error {
    /// OTP / 登录流程错误
    Otp(OtpError),

    /// 配置错误
    Config(ConfigError),

    /// 存储错误
    Storage(StorageError),

    /// 加密错误
    Crypto(CryptoError),

    /// 验证码投递失败
    Delivery(String),
}

impl Error {
    /// 创建一个投递错误
    pub fn delivery(msg: impl Into<String>) -> Self {
        Error::Delivery(msg.into())
    }

    /// 返回 OTP 错误（如果是）
    pub fn as_otp(&self) -> Option<&OtpError> {
        match self {
            Error::Otp(e) => Some(e),
            _ => None,
        }
    }

    /// 面向用户的提示文本
    pub fn user_message(&self) -> String {
        match self {
            Error::Otp(e) => e.user_message(),
            Error::Delivery(_) => "Failed to send OTP. Please try again.".to_string(),
            Error::Config(_) | Error::Storage(_) | Error::Crypto(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

/// OTP 及登录流程相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    /// 标识符格式不符合角色要求
    InvalidFormat { role: Role, reason: String },
    /// 邮箱未登记为机构
    NotRegistered,
    /// 没有找到对应的 OTP
    NotFound,
    /// OTP 已过期
    Expired,
    /// 验证码不匹配
    Mismatch { remaining_attempts: u32 },
    /// 尝试次数已用尽
    AttemptsExhausted,
    /// 重新发送过于频繁
    ResendTooSoon { retry_after: Duration },
    /// 机构 Auth ID 无效
    InvalidAuthId,
    /// CAPTCHA 不匹配
    CaptchaMismatch,
    /// CAPTCHA 已过期
    CaptchaExpired,
    /// 当前流程步骤不允许该操作
    InvalidStep { expected: &'static str, actual: &'static str },
}

impl OtpError {
    /// 面向用户的提示文本
    pub fn user_message(&self) -> String {
        match self {
            OtpError::InvalidFormat { role: Role::Citizen, .. } => {
                "Invalid phone number format. Use 10 digits.".to_string()
            }
            OtpError::InvalidFormat { role: Role::Authority, .. } => {
                "Invalid email format".to_string()
            }
            OtpError::NotRegistered => {
                "This email is not registered as an authority. Please contact admin.".to_string()
            }
            OtpError::NotFound | OtpError::Expired => {
                "OTP expired or not found. Please request a new one.".to_string()
            }
            OtpError::Mismatch { .. } => "Invalid OTP. Please try again.".to_string(),
            OtpError::AttemptsExhausted => {
                "Too many invalid attempts. Please request a new OTP.".to_string()
            }
            OtpError::ResendTooSoon { retry_after } => {
                format!("Resend in {}s", ceil_seconds(*retry_after).max(1))
            }
            OtpError::InvalidAuthId => "Invalid Auth ID. Please contact admin.".to_string(),
            OtpError::CaptchaMismatch => "CAPTCHA does not match.".to_string(),
            OtpError::CaptchaExpired => "CAPTCHA expired. Please try the new one.".to_string(),
            OtpError::InvalidStep { .. } => "Please complete the previous step first.".to_string(),
        }
    }

    /// 是否属于“未找到或已过期”这一类
    pub fn is_not_found_or_expired(&self) -> bool {
        matches!(self, OtpError::NotFound | OtpError::Expired)
    }
}

/// 配置相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 无效的配置值
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// 存储相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 锁被污染（持有锁的线程 panic）
    Poisoned(String),
}

/// 加密相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// 随机数生成失败
    RngFailed(String),
}

// ============================================================================
// Display 实现
// ============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Otp(e) => write!(f, "OTP error: {}", e),
            Error::Config(e) => write!(f, "Config error: {}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::Crypto(e) => write!(f, "Crypto error: {}", e),
            Error::Delivery(msg) => write!(f, "Delivery error: {}", msg),
        }
    }
}

impl fmt::Display for OtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtpError::InvalidFormat { role, reason } => {
                write!(f, "invalid {} identifier: {}", role, reason)
            }
            OtpError::NotRegistered => write!(f, "email not registered as an authority"),
            OtpError::NotFound => write!(f, "no OTP found for this identifier"),
            OtpError::Expired => write!(f, "OTP has expired"),
            OtpError::Mismatch { remaining_attempts } => {
                write!(f, "invalid OTP, {} attempts remaining", remaining_attempts)
            }
            OtpError::AttemptsExhausted => write!(f, "maximum attempts exceeded"),
            OtpError::ResendTooSoon { retry_after } => {
                write!(f, "resend too soon, retry after {:?}", retry_after)
            }
            OtpError::InvalidAuthId => write!(f, "invalid auth ID"),
            OtpError::CaptchaMismatch => write!(f, "captcha mismatch"),
            OtpError::CaptchaExpired => write!(f, "captcha expired"),
            OtpError::InvalidStep { expected, actual } => {
                write!(f, "invalid step: expected {}, currently {}", expected, actual)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, message } => {
                write!(f, "invalid configuration value for '{}': {}", key, message)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Poisoned(what) => write!(f, "storage lock poisoned: {}", what),
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::RngFailed(msg) => write!(f, "random number generation failed: {}", msg),
        }
    }
}

// ============================================================================
// std::error::Error 实现
// ============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Otp(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Storage(e) => Some(e),
            Error::Crypto(e) => Some(e),
            Error::Delivery(_) => None,
        }
    }
}

impl std::error::Error for OtpError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
impl std::error::Error for CryptoError {}

// ============================================================================
// From 实现 - 方便错误转换
// ============================================================================

impl From<OtpError> for Error {
    fn from(err: OtpError) -> Self {
        Error::Otp(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::Crypto(err)
    }
}
