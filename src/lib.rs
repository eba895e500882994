//! # pothole-auth
//!
//! 道路坑洼上报系统的登录认证库。
//!
//! 两类用户都通过一次性验证码（OTP）登录：
//!
//! - **市民**：10 位手机号，验证码通过短信发送，表单上另有 CAPTCHA
//! - **机构**：已登记的官方邮箱，先核对 Auth ID，再通过邮件发送验证码
//!
//! ## 功能特性
//!
//! - **OTP 会话管理**: 按 (角色, 标识符) 签发、覆盖、过期、一次性消费
//! - **标识符校验**: 手机号和邮箱格式检查，日志中脱敏
//! - **会话 Token**: 验证成功后签发的不透明 token
//! - **机构目录**: 邮箱与 Auth ID 的登记表
//! - **CAPTCHA**: 定时更换、每次校验后轮换的字符验证码
//! - **登录流程**: 市民与机构的分步状态机
//! - **审计日志**: 签发、验证、失败等安全事件
//!
//! ## OTP 示例
//!
//! ```rust
//! use pothole_auth::passwordless::{OtpManager, OtpConfig, Role};
//!
//! let manager = OtpManager::new(OtpConfig::default());
//!
//! let issued = manager.issue(Role::Citizen, "9876543210").unwrap();
//! assert_eq!(issued.code.len(), 6);
//!
//! let token = manager.verify(Role::Citizen, "9876543210", &issued.code).unwrap();
//! assert!(token.as_str().starts_with("pht_"));
//!
//! // 验证码只能使用一次
//! assert!(manager.verify(Role::Citizen, "9876543210", &issued.code).is_err());
//! ```
//!
//! ## 表单接口示例
//!
//! ```rust
//! use pothole_auth::delivery::InMemoryOutbox;
//! use pothole_auth::passwordless::{OtpConfig, Role};
//! use pothole_auth::service::{AuthService, OtpRequest, OtpVerify};
//!
//! let outbox = InMemoryOutbox::new();
//! let service = AuthService::new(OtpConfig::default()).with_delivery(outbox.clone());
//!
//! let sent = service.send_otp(&OtpRequest::new(Role::Citizen, "9876543210"));
//! assert!(sent.success);
//! assert_eq!(sent.message, "OTP sent to your phone number");
//!
//! let code = outbox.last_code_for(Role::Citizen, "9876543210").unwrap();
//! let verified = service.verify_otp(&OtpVerify::new(Role::Citizen, "9876543210", code));
//! assert!(verified.success);
//! assert!(verified.token.is_some());
//! ```

pub mod audit;
pub mod authority;
pub mod delivery;
pub mod error;
pub mod flow;
pub mod passwordless;
pub mod random;
pub mod security;
pub mod service;
pub mod token;

pub use error::{Error, Result};

// ============================================================================
// OTP 相关导出
// ============================================================================

pub use passwordless::{
    InMemoryOtpStore, IssuedOtp, OtpConfig, OtpKey, OtpManager, OtpStore, Role, StoredOtp,
    VerifyOutcome, is_valid_email, is_valid_phone, mask_identifier, validate_identifier,
};
pub use token::SessionToken;

// ============================================================================
// 随机数生成函数导出
// ============================================================================

pub use random::{
    constant_time_compare, constant_time_compare_str, generate_numeric_code,
    generate_random_base64_url, generate_random_bytes, generate_random_hex,
    generate_session_token,
};

// ============================================================================
// 机构与投递相关导出
// ============================================================================

pub use authority::{AuthorityDirectory, AuthorityRecord, InMemoryAuthorityDirectory};
pub use delivery::{InMemoryOutbox, LogDelivery, OtpDelivery};

// ============================================================================
// 登录流程相关导出
// ============================================================================

pub use flow::{AuthorityLogin, AuthorityStep, CitizenLogin, CitizenStep};
pub use service::{
    AuthIdCheck, AuthService, AuthorityLookup, OtpRequest, OtpResponse, OtpVerify, VerifyResponse,
};

// ============================================================================
// 安全防护相关导出
// ============================================================================

pub use security::captcha::{Captcha, CaptchaChallenge, CaptchaConfig};

// ============================================================================
// 审计日志相关导出
// ============================================================================

pub use audit::{
    AuditLogger, EventSeverity, EventType, InMemoryAuditLogger, NoOpAuditLogger, SecurityEvent,
    TracingAuditLogger,
};
