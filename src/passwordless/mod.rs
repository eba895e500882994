//! 无密码认证模块
//!
//! 市民使用手机号 + OTP 登录，机构使用邮箱 + OTP 登录。
//!
//! ## 子模块
//!
//! - **identifier**: 角色定义与手机号/邮箱格式校验
//! - **otp**: OTP 签发、保存与验证
//!
//! 本模块只负责验证码的生成和校验，**不包含**实际的短信/邮件发送，
//! 发送由 [`crate::delivery`] 中的投递通道完成。
//!
//! ## 示例
//!
//! ```rust
//! use pothole_auth::passwordless::{OtpManager, OtpConfig, Role};
//!
//! let manager = OtpManager::new(OtpConfig::default());
//!
//! let otp = manager.issue(Role::Citizen, "9876543210").unwrap();
//! // send_sms("9876543210", &otp.code);
//!
//! match manager.verify(Role::Citizen, "9876543210", &otp.code) {
//!     Ok(token) => println!("登录成功: {}", token),
//!     Err(e) => println!("验证失败: {}", e.user_message()),
//! }
//! ```

pub mod identifier;
pub mod otp;

pub use identifier::{Role, is_valid_email, is_valid_phone, mask_identifier, validate_identifier};
pub use otp::{
    InMemoryOtpStore, IssuedOtp, OtpConfig, OtpKey, OtpManager, OtpStore, StoredOtp,
    VerifyOutcome,
};
