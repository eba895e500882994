//! OTP (One-Time Password) 会话管理
//!
//! 为 `(角色, 标识符)` 签发一次性数字验证码，在有效期内保存，并校验用户提交的验证码。
//!
//! ## 工作流程
//!
//! 1. 用户输入手机号（市民）或邮箱（机构）
//! 2. 校验标识符格式，生成随机数字验证码
//! 3. 应用层通过短信/邮件把验证码发给用户
//! 4. 用户提交验证码
//! 5. 验证码正确且未过期时签发 session token，并删除该验证码
//!
//! 过期通过记录里的 `expires_at` 在读取时判断，没有定时器。
//! 同一个键重新签发会直接覆盖旧记录，旧验证码随之失效；
//! 只有 [`OtpManager::resend`] 受 `resend_cooldown` 限制。
//!
//! ## 示例
//!
//! ```rust
//! use pothole_auth::passwordless::{OtpConfig, OtpManager, Role};
//!
//! let manager = OtpManager::new(OtpConfig::default());
//!
//! let otp = manager.issue(Role::Authority, "a@gov.in").unwrap();
//! assert_eq!(otp.message(), "OTP sent to your email");
//!
//! // 错误的验证码
//! assert!(manager.verify(Role::Authority, "a@gov.in", "000000").is_err());
//!
//! // 正确的验证码
//! let token = manager.verify(Role::Authority, "a@gov.in", &otp.code).unwrap();
//! println!("token: {}", token);
//! ```
//!
//! ## 自定义配置
//!
//! ```rust
//! use pothole_auth::passwordless::OtpConfig;
//! use std::time::Duration;
//!
//! let config = OtpConfig::default()
//!     .with_code_length(4)
//!     .with_ttl(Duration::from_secs(120))
//!     .with_max_attempts(3)
//!     .with_resend_cooldown(None);
//! assert!(config.validate().is_ok());
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, OtpError, Result, StorageError};
use crate::passwordless::identifier::{Role, mask_identifier, validate_identifier};
use crate::random::{constant_time_compare_str, generate_numeric_code, sha256_hex};
use crate::token::SessionToken;

// ============================================================================
// 配置
// ============================================================================

/// OTP 配置
#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// 验证码长度（数字位数，4..=10）
    pub code_length: usize,

    /// 验证码有效期
    pub ttl: Duration,

    /// 最大尝试次数（用尽后需要重新获取）
    pub max_attempts: u32,

    /// [`OtpManager::resend`] 的最小间隔，[`OtpManager::issue`] 不受限制
    pub resend_cooldown: Option<Duration>,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            ttl: Duration::from_secs(5 * 60), // 5 分钟
            max_attempts: 5,
            resend_cooldown: Some(Duration::from_secs(30)),
        }
    }
}

impl OtpConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置验证码长度
    pub fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    /// 设置有效期
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// 设置最大尝试次数
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// 设置重新发送的冷却时间（只作用于 `resend`）
    pub fn with_resend_cooldown(mut self, cooldown: Option<Duration>) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    /// 市民表单配置
    ///
    /// - 4 位验证码
    /// - 5 分钟过期
    /// - 30 秒重发间隔
    pub fn citizen_form() -> Self {
        Self {
            code_length: 4,
            ..Self::default()
        }
    }

    /// 宽松配置（适用于开发/测试）
    ///
    /// - 6 位验证码
    /// - 30 分钟过期
    /// - 10 次尝试
    /// - 无重发间隔限制
    pub fn relaxed() -> Self {
        Self {
            code_length: 6,
            ttl: Duration::from_secs(30 * 60),
            max_attempts: 10,
            resend_cooldown: None,
        }
    }

    /// 检查配置是否有效
    pub fn validate(&self) -> Result<()> {
        if !(4..=10).contains(&self.code_length) {
            return Err(ConfigError::invalid("code_length", "must be between 4 and 10").into());
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid("ttl", "must be greater than zero").into());
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1").into());
        }
        TimeDelta::from_std(self.ttl).map_err(|e| ConfigError::invalid("ttl", e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// 数据结构
// ============================================================================

/// OTP 存储键：每个 `(角色, 标识符)` 最多一条有效记录
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OtpKey {
    /// 角色
    pub role: Role,
    /// 手机号或邮箱
    pub identifier: String,
}

impl OtpKey {
    /// 创建存储键
    pub fn new(role: Role, identifier: impl Into<String>) -> Self {
        Self {
            role,
            identifier: identifier.into(),
        }
    }
}

/// 签发结果
///
/// `code` 需要由应用层投递给用户，库内不保存明文。
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    /// 生成的验证码
    pub code: String,

    /// 角色
    pub role: Role,

    /// 关联的标识符
    pub identifier: String,

    /// 签发时间
    pub issued_at: DateTime<Utc>,

    /// 过期时间
    pub expires_at: DateTime<Utc>,

    /// 剩余尝试次数
    pub remaining_attempts: u32,
}

impl IssuedOtp {
    /// 检查是否已过期
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// 获取剩余有效时间（秒）
    pub fn remaining_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }

    /// 面向用户的发送提示
    pub fn message(&self) -> &'static str {
        self.role.sent_message()
    }
}

/// 存储中的 OTP 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOtp {
    /// 验证码的 SHA-256 摘要（十六进制）
    pub code_digest: String,

    /// 签发时间
    pub issued_at: DateTime<Utc>,

    /// 过期时间
    pub expires_at: DateTime<Utc>,

    /// 剩余尝试次数
    pub remaining_attempts: u32,
}

impl StoredOtp {
    /// 在给定时间点是否已过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ============================================================================
// 存储接口
// ============================================================================

/// [`OtpStore::consume`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// 没有记录
    NotFound,
    /// 记录已过期
    Expired,
    /// 剩余次数已为 0
    AttemptsExhausted,
    /// 摘要不匹配
    Mismatch { remaining_attempts: u32 },
    /// 匹配成功，记录已被消费
    Matched,
}

/// OTP 存储接口
///
/// 实现此 trait 以提供自定义的存储后端（如 Redis、数据库等）
pub trait OtpStore: Send + Sync {
    /// 保存记录，覆盖同键的旧记录
    fn save(&self, key: &OtpKey, record: StoredOtp) -> Result<()>;

    /// 获取记录
    fn get(&self, key: &OtpKey) -> Result<Option<StoredOtp>>;

    /// 用提交的摘要校验并消费记录
    ///
    /// 检查和删除必须在同一次加锁中完成：同一条记录最多返回一次 `Matched`。
    /// 过期、次数用尽和匹配成功时删除记录；不匹配时剩余次数减一，减到 0 时删除。
    fn consume(
        &self,
        key: &OtpKey,
        code_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome>;

    /// 删除记录，返回是否存在
    fn delete(&self, key: &OtpKey) -> Result<bool>;

    /// 清理在 `now` 之前过期的记录，返回清理数量
    fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

// ============================================================================
// 内存存储实现
// ============================================================================

/// 内存存储实现
///
/// 克隆后共享同一份数据，调用方可以在交给管理器的同时保留一个句柄用于检查。
#[derive(Debug, Clone, Default)]
pub struct InMemoryOtpStore {
    records: Arc<RwLock<HashMap<OtpKey, StoredOtp>>>,
}

impl InMemoryOtpStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前存储的记录数量
    pub fn len(&self) -> usize {
        self.read().map(|records| records.len()).unwrap_or(0)
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<OtpKey, StoredOtp>>> {
        self.records
            .read()
            .map_err(|_| StorageError::Poisoned("otp records".to_string()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<OtpKey, StoredOtp>>> {
        self.records
            .write()
            .map_err(|_| StorageError::Poisoned("otp records".to_string()).into())
    }
}

impl OtpStore for InMemoryOtpStore {
    fn save(&self, key: &OtpKey, record: StoredOtp) -> Result<()> {
        self.write()?.insert(key.clone(), record);
        Ok(())
    }

    fn get(&self, key: &OtpKey) -> Result<Option<StoredOtp>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn consume(
        &self,
        key: &OtpKey,
        code_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome> {
        let mut records = self.write()?;
        let Some(record) = records.get_mut(key) else {
            return Ok(VerifyOutcome::NotFound);
        };

        if record.is_expired_at(now) {
            records.remove(key);
            return Ok(VerifyOutcome::Expired);
        }
        if record.remaining_attempts == 0 {
            records.remove(key);
            return Ok(VerifyOutcome::AttemptsExhausted);
        }
        if constant_time_compare_str(code_digest, &record.code_digest) {
            records.remove(key);
            return Ok(VerifyOutcome::Matched);
        }

        record.remaining_attempts -= 1;
        let remaining = record.remaining_attempts;
        if remaining == 0 {
            records.remove(key);
        }
        Ok(VerifyOutcome::Mismatch {
            remaining_attempts: remaining,
        })
    }

    fn delete(&self, key: &OtpKey) -> Result<bool> {
        Ok(self.write()?.remove(key).is_some())
    }

    fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok(before - records.len())
    }
}

// ============================================================================
// OTP 管理器
// ============================================================================

/// OTP 管理器
///
/// 存储通过构造函数传入，不使用全局状态，每个管理器（以及每个测试）拥有独立的数据。
pub struct OtpManager<S: OtpStore = InMemoryOtpStore> {
    store: S,
    config: OtpConfig,
}

impl OtpManager<InMemoryOtpStore> {
    /// 使用新的内存存储创建管理器
    pub fn new(config: OtpConfig) -> Self {
        Self {
            store: InMemoryOtpStore::new(),
            config,
        }
    }

    /// 使用默认配置创建管理器
    pub fn with_default_config() -> Self {
        Self::new(OtpConfig::default())
    }
}

impl<S: OtpStore> OtpManager<S> {
    /// 使用自定义存储创建管理器
    pub fn with_store(store: S, config: OtpConfig) -> Self {
        Self { store, config }
    }

    /// 签发 OTP
    ///
    /// 总是覆盖同键的旧记录，旧验证码立即失效。重发间隔由 [`OtpManager::resend`] 控制。
    ///
    /// # Errors
    ///
    /// - 标识符格式不符合角色要求（无副作用）
    /// - 配置无效或存储失败
    ///
    /// # Example
    ///
    /// ```rust
    /// use pothole_auth::passwordless::{OtpConfig, OtpManager, Role};
    ///
    /// let manager = OtpManager::new(OtpConfig::default());
    /// let otp = manager.issue(Role::Citizen, "9876543210").unwrap();
    /// assert_eq!(otp.code.len(), 6);
    /// assert_eq!(otp.message(), "OTP sent to your phone number");
    /// ```
    pub fn issue(&self, role: Role, identifier: &str) -> Result<IssuedOtp> {
        self.config.validate()?;
        validate_identifier(role, identifier)?;

        let key = OtpKey::new(role, identifier);
        let now = Utc::now();

        let code = generate_numeric_code(self.config.code_length)?;
        let ttl = TimeDelta::from_std(self.config.ttl)
            .map_err(|e| ConfigError::invalid("ttl", e.to_string()))?;
        let expires_at = now + ttl;

        // 覆盖同键旧记录
        self.store.save(
            &key,
            StoredOtp {
                code_digest: sha256_hex(&code),
                issued_at: now,
                expires_at,
                remaining_attempts: self.config.max_attempts,
            },
        )?;

        info!(
            role = %role,
            identifier = %mask_identifier(role, identifier),
            expires_at = %expires_at,
            "otp issued"
        );

        Ok(IssuedOtp {
            code,
            role,
            identifier: key.identifier,
            issued_at: now,
            expires_at,
            remaining_attempts: self.config.max_attempts,
        })
    }

    /// 验证 OTP，成功时签发 session token
    ///
    /// 使用常量时间比较验证码摘要。校验和删除由 [`OtpStore::consume`] 一次完成，
    /// 同一个验证码只能用一次，并发提交时也只有一个请求成功。
    ///
    /// # Errors
    ///
    /// - `NotFound`：没有记录（从未签发、已使用或已撤销）
    /// - `Expired`：记录已过期（同时被删除）
    /// - `Mismatch`：验证码错误，剩余次数减一；次数用尽时记录被删除
    /// - `AttemptsExhausted`：记录的剩余次数已为 0
    pub fn verify(&self, role: Role, identifier: &str, code: &str) -> Result<SessionToken> {
        let key = OtpKey::new(role, identifier);
        let masked = mask_identifier(role, identifier);

        match self.store.consume(&key, &sha256_hex(code), Utc::now())? {
            VerifyOutcome::Matched => {
                let token = SessionToken::mint(role, identifier)?;
                info!(role = %role, identifier = %masked, "otp verified");
                Ok(token)
            }
            VerifyOutcome::NotFound => {
                debug!(role = %role, identifier = %masked, "otp not found");
                Err(OtpError::NotFound.into())
            }
            VerifyOutcome::Expired => {
                debug!(role = %role, identifier = %masked, "otp expired");
                Err(OtpError::Expired.into())
            }
            VerifyOutcome::AttemptsExhausted => Err(OtpError::AttemptsExhausted.into()),
            VerifyOutcome::Mismatch { remaining_attempts } => {
                warn!(
                    role = %role,
                    identifier = %masked,
                    remaining_attempts,
                    "otp mismatch"
                );
                Err(OtpError::Mismatch { remaining_attempts }.into())
            }
        }
    }

    /// 重新发送 OTP
    ///
    /// 距上次签发不足 `resend_cooldown` 时返回 `ResendTooSoon`（无副作用），
    /// 否则等同于 [`OtpManager::issue`]。
    pub fn resend(&self, role: Role, identifier: &str) -> Result<IssuedOtp> {
        self.config.validate()?;
        validate_identifier(role, identifier)?;

        let key = OtpKey::new(role, identifier);
        if let Some(retry_after) = self.resend_wait(&key, Utc::now())? {
            debug!(
                role = %role,
                identifier = %mask_identifier(role, identifier),
                retry_after_secs = ceil_seconds(retry_after),
                "otp resend throttled"
            );
            return Err(OtpError::ResendTooSoon { retry_after }.into());
        }

        self.issue(role, identifier)
    }

    /// 检查是否可以重新签发
    pub fn can_resend(&self, role: Role, identifier: &str) -> Result<bool> {
        let key = OtpKey::new(role, identifier);
        Ok(self.resend_wait(&key, Utc::now())?.is_none())
    }

    /// 获取距离可以重新签发的剩余秒数（向上取整）
    pub fn seconds_until_resend(&self, role: Role, identifier: &str) -> Result<u64> {
        let key = OtpKey::new(role, identifier);
        Ok(self
            .resend_wait(&key, Utc::now())?
            .map(ceil_seconds)
            .unwrap_or(0))
    }

    /// 撤销 OTP，返回是否存在
    pub fn revoke(&self, role: Role, identifier: &str) -> Result<bool> {
        self.store.delete(&OtpKey::new(role, identifier))
    }

    /// 清理过期的 OTP
    pub fn cleanup(&self) -> Result<usize> {
        let removed = self.store.cleanup_expired(Utc::now())?;
        if removed > 0 {
            debug!(removed, "expired otp records cleaned up");
        }
        Ok(removed)
    }

    /// 获取配置
    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// 获取存储
    pub fn store(&self) -> &S {
        &self.store
    }

    /// 距离冷却结束还需等待的时间，`None` 表示可以立即签发
    fn resend_wait(&self, key: &OtpKey, now: DateTime<Utc>) -> Result<Option<Duration>> {
        let Some(cooldown) = self.config.resend_cooldown else {
            return Ok(None);
        };
        let Some(stored) = self.store.get(key)? else {
            return Ok(None);
        };
        if stored.is_expired_at(now) {
            return Ok(None);
        }

        // 时钟回拨时按刚签发处理
        let elapsed = (now - stored.issued_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= cooldown {
            Ok(None)
        } else {
            Ok(Some(cooldown - elapsed))
        }
    }
}

/// 向上取整到秒
pub(crate) fn ceil_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
