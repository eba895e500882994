//! 审计日志模块
//!
//! 记录登录相关的安全事件：OTP 签发、验证成功/失败、重发限流、CAPTCHA 失败、
//! 机构邮箱/Auth ID 校验失败。
//!
//! 事件里的标识符在构造时就被遮蔽，原始手机号和邮箱不会进入审计日志。
//!
//! ## 使用示例
//!
//! ```rust
//! use pothole_auth::audit::{AuditLogger, EventType, InMemoryAuditLogger, SecurityEvent};
//! use pothole_auth::passwordless::Role;
//!
//! let logger = InMemoryAuditLogger::new();
//!
//! logger.log(SecurityEvent::otp_issued(Role::Citizen, "9876543210"));
//! logger.log(SecurityEvent::otp_failed(Role::Citizen, "9876543210", "mismatch"));
//!
//! assert_eq!(logger.event_count(), 2);
//! assert_eq!(logger.get_events_by_type(&EventType::OtpFailed).len(), 1);
//! assert_eq!(logger.get_events()[0].identifier.as_deref(), Some("******3210"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::passwordless::identifier::{Role, mask_identifier};

/// 事件严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventSeverity {
    /// 调试信息
    Debug,
    /// 一般信息
    #[default]
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSeverity::Debug => write!(f, "DEBUG"),
            EventSeverity::Info => write!(f, "INFO"),
            EventSeverity::Warning => write!(f, "WARNING"),
            EventSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// 安全事件类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// OTP 签发并投递
    OtpIssued,
    /// OTP 验证成功
    OtpVerified,
    /// OTP 验证失败
    OtpFailed,
    /// OTP 重发被限流
    OtpResendThrottled,
    /// OTP 投递失败
    OtpDeliveryFailed,
    /// CAPTCHA 校验失败
    CaptchaFailed,
    /// 邮箱未登记为机构
    AuthorityNotRegistered,
    /// Auth ID 校验失败
    AuthIdRejected,
    /// 自定义事件
    Custom(String),
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::OtpIssued => write!(f, "otp_issued"),
            EventType::OtpVerified => write!(f, "otp_verified"),
            EventType::OtpFailed => write!(f, "otp_failed"),
            EventType::OtpResendThrottled => write!(f, "otp_resend_throttled"),
            EventType::OtpDeliveryFailed => write!(f, "otp_delivery_failed"),
            EventType::CaptchaFailed => write!(f, "captcha_failed"),
            EventType::AuthorityNotRegistered => write!(f, "authority_not_registered"),
            EventType::AuthIdRejected => write!(f, "auth_id_rejected"),
            EventType::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// 安全事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 事件 ID
    pub id: String,
    /// 事件类型
    pub event_type: EventType,
    /// 严重程度
    pub severity: EventSeverity,
    /// 角色（如果适用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// 遮蔽后的标识符（如果适用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// 事件消息/描述
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 额外详情
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
    /// 事件时间
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// 创建新的安全事件
    pub fn new(event_type: EventType, severity: EventSeverity) -> Self {
        Self {
            id: generate_event_id(),
            event_type,
            severity,
            role: None,
            identifier: None,
            message: None,
            details: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// 创建自定义事件
    pub fn custom(name: impl Into<String>, severity: EventSeverity) -> Self {
        Self::new(EventType::Custom(name.into()), severity)
    }

    // ========================================================================
    // 便捷构造方法
    // ========================================================================

    /// OTP 已签发
    pub fn otp_issued(role: Role, identifier: &str) -> Self {
        Self::new(EventType::OtpIssued, EventSeverity::Info).with_subject(role, identifier)
    }

    /// OTP 验证成功
    pub fn otp_verified(role: Role, identifier: &str) -> Self {
        Self::new(EventType::OtpVerified, EventSeverity::Info).with_subject(role, identifier)
    }

    /// OTP 验证失败
    pub fn otp_failed(role: Role, identifier: &str, reason: impl Into<String>) -> Self {
        Self::new(EventType::OtpFailed, EventSeverity::Warning)
            .with_subject(role, identifier)
            .with_message(reason)
    }

    /// OTP 重发被限流
    pub fn otp_resend_throttled(role: Role, identifier: &str, retry_after_secs: u64) -> Self {
        Self::new(EventType::OtpResendThrottled, EventSeverity::Info)
            .with_subject(role, identifier)
            .with_detail("retry_after_secs", retry_after_secs.to_string())
    }

    /// OTP 投递失败
    pub fn otp_delivery_failed(role: Role, identifier: &str, reason: impl Into<String>) -> Self {
        Self::new(EventType::OtpDeliveryFailed, EventSeverity::Error)
            .with_subject(role, identifier)
            .with_message(reason)
    }

    /// CAPTCHA 校验失败
    pub fn captcha_failed(role: Role, identifier: &str, reason: impl Into<String>) -> Self {
        Self::new(EventType::CaptchaFailed, EventSeverity::Warning)
            .with_subject(role, identifier)
            .with_message(reason)
    }

    /// 邮箱未登记为机构
    pub fn authority_not_registered(email: &str) -> Self {
        Self::new(EventType::AuthorityNotRegistered, EventSeverity::Warning)
            .with_subject(Role::Authority, email)
    }

    /// Auth ID 校验失败
    pub fn auth_id_rejected(email: &str) -> Self {
        Self::new(EventType::AuthIdRejected, EventSeverity::Warning)
            .with_subject(Role::Authority, email)
    }

    // ========================================================================
    // Builder 方法
    // ========================================================================

    /// 设置角色和标识符（标识符会被遮蔽）
    pub fn with_subject(mut self, role: Role, identifier: &str) -> Self {
        self.role = Some(role);
        self.identifier = Some(mask_identifier(role, identifier));
        self
    }

    /// 设置消息
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 添加详情
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// 设置严重程度
    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// 获取事件类型名称
    pub fn event_name(&self) -> String {
        self.event_type.to_string()
    }

    /// 是否为失败类事件
    pub fn is_failure(&self) -> bool {
        matches!(
            self.event_type,
            EventType::OtpFailed
                | EventType::OtpDeliveryFailed
                | EventType::CaptchaFailed
                | EventType::AuthorityNotRegistered
                | EventType::AuthIdRejected
        )
    }
}

/// 生成事件 ID
fn generate_event_id() -> String {
    use crate::random::generate_random_hex;
    format!(
        "evt_{}",
        generate_random_hex(16).unwrap_or_else(|_| "unknown".to_string())
    )
}

// ============================================================================
// AuditLogger Trait
// ============================================================================

/// 审计日志记录器 trait
pub trait AuditLogger: Send + Sync {
    /// 记录安全事件
    fn log(&self, event: SecurityEvent);
}

// ============================================================================
// InMemoryAuditLogger
// ============================================================================

/// 内存审计日志记录器
///
/// 用于测试和开发环境，将事件存储在内存中。克隆后共享同一份事件列表。
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLogger {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
    max_events: Option<usize>,
}

impl InMemoryAuditLogger {
    /// 创建新的内存日志记录器
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带有最大事件数限制的日志记录器
    pub fn with_max_events(max: usize) -> Self {
        Self {
            events: Arc::default(),
            max_events: Some(max),
        }
    }

    /// 获取所有事件
    pub fn get_events(&self) -> Vec<SecurityEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 获取事件数量
    pub fn event_count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 按事件类型获取事件
    pub fn get_events_by_type(&self, event_type: &EventType) -> Vec<SecurityEvent> {
        self.filter(|e| &e.event_type == event_type)
    }

    /// 按严重程度获取事件
    pub fn get_events_by_severity(&self, severity: EventSeverity) -> Vec<SecurityEvent> {
        self.filter(|e| e.severity == severity)
    }

    /// 获取失败类事件
    pub fn get_failures(&self) -> Vec<SecurityEvent> {
        self.filter(SecurityEvent::is_failure)
    }

    /// 清空所有事件
    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn filter(&self, predicate: impl Fn(&SecurityEvent) -> bool) -> Vec<SecurityEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(*e))
            .cloned()
            .collect()
    }
}

impl AuditLogger for InMemoryAuditLogger {
    fn log(&self, event: SecurityEvent) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);

        // 超过上限时删除最旧的事件
        if let Some(max) = self.max_events {
            while !events.is_empty() && events.len() >= max {
                events.remove(0);
            }
        }

        events.push(event);
    }
}

// ============================================================================
// TracingAuditLogger
// ============================================================================

/// 把审计事件转发到 `tracing`
///
/// 级别与严重程度对应，target 为 `pothole_auth::audit`。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

impl TracingAuditLogger {
    /// 创建新的 tracing 日志记录器
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: SecurityEvent) {
        let name = event.event_name();
        let role = event.role.map(|r| r.as_str()).unwrap_or("-");
        let identifier = event.identifier.as_deref().unwrap_or("-");
        let message = event.message.as_deref().unwrap_or("");

        match event.severity {
            EventSeverity::Debug => tracing::debug!(
                target: "pothole_auth::audit",
                event_id = %event.id, kind = %name, role, identifier, message
            ),
            EventSeverity::Info => tracing::info!(
                target: "pothole_auth::audit",
                event_id = %event.id, kind = %name, role, identifier, message
            ),
            EventSeverity::Warning => tracing::warn!(
                target: "pothole_auth::audit",
                event_id = %event.id, kind = %name, role, identifier, message
            ),
            EventSeverity::Error => tracing::error!(
                target: "pothole_auth::audit",
                event_id = %event.id, kind = %name, role, identifier, message
            ),
        }
    }
}

// ============================================================================
// NoOpAuditLogger
// ============================================================================

/// 空操作日志记录器
///
/// 不执行任何操作，用于禁用审计日志
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAuditLogger;

impl NoOpAuditLogger {
    /// 创建新的空操作日志记录器
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for NoOpAuditLogger {
    fn log(&self, _event: SecurityEvent) {}
}

// ============================================================================
// 测试
// ============================================================================
