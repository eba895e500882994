//! CAPTCHA 挑战
//!
//! 市民登录表单上的字符验证码。
//!
//! - 字符集去掉了容易混淆的 `I`、`O`、`0`、`1`
//! - 默认 6 位，60 秒后自动更换（读取时判断，不依赖定时器）
//! - 每次校验后都会更换挑战，同一个答案不能重复使用
//!
//! ## 示例
//!
//! ```rust
//! use pothole_auth::security::captcha::{Captcha, CaptchaConfig};
//!
//! let mut captcha = Captcha::new(CaptchaConfig::default()).unwrap();
//! let shown = captcha.current().value.clone();
//!
//! // 用户照着输入
//! assert!(captcha.verify(&shown).is_ok());
//!
//! // 校验后已更换，旧答案失效
//! assert!(captcha.verify(&shown).is_err());
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, OtpError, Result};
use crate::random::{constant_time_compare_str, generate_from_charset};

/// 默认字符集
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// CAPTCHA 配置
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// 字符数
    pub length: usize,
    /// 自动更换间隔
    pub refresh_after: Duration,
    /// 字符集（仅 ASCII）
    pub alphabet: String,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            length: 6,
            refresh_after: Duration::from_secs(60),
            alphabet: DEFAULT_ALPHABET.to_string(),
        }
    }
}

impl CaptchaConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置字符数
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// 设置自动更换间隔
    pub fn with_refresh_after(mut self, refresh_after: Duration) -> Self {
        self.refresh_after = refresh_after;
        self
    }

    /// 设置字符集
    pub fn with_alphabet(mut self, alphabet: impl Into<String>) -> Self {
        self.alphabet = alphabet.into();
        self
    }

    /// 检查配置是否有效
    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(ConfigError::invalid("length", "must be at least 1").into());
        }
        if self.alphabet.is_empty() || !self.alphabet.is_ascii() {
            return Err(ConfigError::invalid("alphabet", "must be non-empty ASCII").into());
        }
        if self.refresh_after.is_zero() {
            return Err(ConfigError::invalid("refresh_after", "must be greater than zero").into());
        }
        TimeDelta::from_std(self.refresh_after)
            .map_err(|e| ConfigError::invalid("refresh_after", e.to_string()))?;
        Ok(())
    }
}

/// 一次 CAPTCHA 挑战
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    /// 展示给用户的字符串
    pub value: String,
    /// 生成时间
    pub issued_at: DateTime<Utc>,
    /// 自动更换时间
    pub expires_at: DateTime<Utc>,
}

impl CaptchaChallenge {
    /// 在给定时间点是否已过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// 距离自动更换的剩余秒数
    pub fn remaining_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// 单个表单持有的 CAPTCHA 状态
#[derive(Debug, Clone)]
pub struct Captcha {
    config: CaptchaConfig,
    refresh_after: TimeDelta,
    challenge: CaptchaChallenge,
}

impl Captcha {
    /// 创建并生成第一个挑战
    pub fn new(config: CaptchaConfig) -> Result<Self> {
        config.validate()?;
        let refresh_after = TimeDelta::from_std(config.refresh_after)
            .map_err(|e| ConfigError::invalid("refresh_after", e.to_string()))?;
        let challenge = generate(&config, refresh_after);
        Ok(Self {
            config,
            refresh_after,
            challenge,
        })
    }

    /// 使用默认配置创建
    pub fn with_default_config() -> Result<Self> {
        Self::new(CaptchaConfig::default())
    }

    /// 当前挑战，过期时先自动更换
    pub fn current(&mut self) -> &CaptchaChallenge {
        if self.challenge.is_expired_at(Utc::now()) {
            self.refresh();
        }
        &self.challenge
    }

    /// 立即更换挑战
    pub fn refresh(&mut self) -> &CaptchaChallenge {
        self.challenge = generate(&self.config, self.refresh_after);
        &self.challenge
    }

    /// 校验用户输入
    ///
    /// 区分大小写、常量时间比较。无论成功与否都会更换挑战。
    ///
    /// # Errors
    ///
    /// - `CaptchaExpired`：挑战已过期
    /// - `CaptchaMismatch`：输入不匹配
    pub fn verify(&mut self, answer: &str) -> Result<()> {
        let expired = self.challenge.is_expired_at(Utc::now());
        let matched = constant_time_compare_str(answer, &self.challenge.value);
        self.refresh();

        if expired {
            debug!("captcha expired before submission");
            return Err(OtpError::CaptchaExpired.into());
        }
        if !matched {
            debug!("captcha mismatch");
            return Err(OtpError::CaptchaMismatch.into());
        }
        Ok(())
    }

    /// 获取配置
    pub fn config(&self) -> &CaptchaConfig {
        &self.config
    }
}

fn generate(config: &CaptchaConfig, refresh_after: TimeDelta) -> CaptchaChallenge {
    let issued_at = Utc::now();
    CaptchaChallenge {
        value: generate_from_charset(config.alphabet.as_bytes(), config.length),
        issued_at,
        expires_at: issued_at + refresh_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::thread::sleep;

    #[test]
    fn test_challenge_shape() {
        let mut captcha = Captcha::with_default_config().unwrap();
        let challenge = captcha.current().clone();

        assert_eq!(challenge.value.len(), 6);
        assert!(challenge.value.chars().all(|c| DEFAULT_ALPHABET.contains(c)));
        for confusing in ['I', 'O', '0', '1'] {
            assert!(!DEFAULT_ALPHABET.contains(confusing));
        }
        assert!(challenge.remaining_seconds() > 55);
    }

    #[test]
    fn test_verify_correct_answer() {
        let mut captcha = Captcha::with_default_config().unwrap();
        let answer = captcha.current().value.clone();
        assert!(captcha.verify(&answer).is_ok());
    }

    #[test]
    fn test_verify_is_case_sensitive() {
        let config = CaptchaConfig::default().with_alphabet("ABCDEFGH");
        let mut captcha = Captcha::new(config).unwrap();
        let answer = captcha.current().value.to_lowercase();

        let err = captcha.verify(&answer).unwrap_err();
        assert!(matches!(err, Error::Otp(OtpError::CaptchaMismatch)));
    }

    #[test]
    fn test_failed_verify_rotates_challenge() {
        let config = CaptchaConfig::default().with_length(16);
        let mut captcha = Captcha::new(config).unwrap();
        let before = captcha.current().value.clone();

        assert!(captcha.verify("WRONG").is_err());

        let after = captcha.current().value.clone();
        assert_ne!(before, after);
        // 旧答案不再有效
        assert!(captcha.verify(&before).is_err());
    }

    #[test]
    fn test_expired_challenge_is_rejected_and_refreshed() {
        let config = CaptchaConfig::default()
            .with_length(16)
            .with_refresh_after(Duration::from_millis(100));
        let mut captcha = Captcha::new(config).unwrap();
        let answer = captcha.current().value.clone();

        sleep(Duration::from_millis(150));

        let err = captcha.verify(&answer).unwrap_err();
        assert!(matches!(err, Error::Otp(OtpError::CaptchaExpired)));
    }

    #[test]
    fn test_current_refreshes_after_interval() {
        let config = CaptchaConfig::default()
            .with_length(16)
            .with_refresh_after(Duration::from_millis(100));
        let mut captcha = Captcha::new(config).unwrap();
        let first = captcha.current().value.clone();

        sleep(Duration::from_millis(150));

        let second = captcha.current().value.clone();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_config() {
        assert!(Captcha::new(CaptchaConfig::default().with_length(0)).is_err());
        assert!(Captcha::new(CaptchaConfig::default().with_alphabet("")).is_err());
        assert!(Captcha::new(CaptchaConfig::default().with_alphabet("ÄÖÜ")).is_err());
        assert!(
            Captcha::new(CaptchaConfig::default().with_refresh_after(Duration::ZERO)).is_err()
        );
    }
}
