//! 安全防护模块
//!
//! ## 子模块
//!
//! - **captcha**: 市民登录表单的字符验证码
//!
//! OTP 重发频率限制由 [`crate::passwordless::OtpConfig::resend_cooldown`] 控制。
//!
//! ## CAPTCHA 示例
//!
//! ```rust
//! use pothole_auth::security::captcha::{Captcha, CaptchaConfig};
//!
//! let mut captcha = Captcha::new(CaptchaConfig::default()).unwrap();
//! println!("请输入: {}", captcha.current().value);
//! ```

pub mod captcha;

pub use captcha::{Captcha, CaptchaChallenge, CaptchaConfig};
