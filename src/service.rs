//! 认证服务
//!
//! 把 OTP 管理器、机构目录、投递通道和审计日志组合在一起，供表单处理逻辑直接调用。
//!
//! 提供两层接口：
//!
//! - 类型化接口（[`AuthService::issue_otp`]、[`AuthService::verify`] 等）返回 [`Result`]，
//!   供登录流程和需要区分错误类型的调用方使用
//! - 表单接口（[`AuthService::send_otp`]、[`AuthService::verify_otp`] 等）返回
//!   `{success, message, token?}` 结构，错误被转换成面向用户的提示文本，不会向外抛出
//!
//! ## 示例
//!
//! ```rust
//! use pothole_auth::delivery::InMemoryOutbox;
//! use pothole_auth::passwordless::{OtpConfig, Role};
//! use pothole_auth::service::{AuthService, OtpRequest, OtpVerify};
//!
//! let outbox = InMemoryOutbox::new();
//! let service = AuthService::new(OtpConfig::default()).with_delivery(outbox.clone());
//!
//! let sent = service.send_otp(&OtpRequest::new(Role::Authority, "a@gov.in"));
//! assert!(sent.success);
//! assert_eq!(sent.message, "OTP sent to your email");
//!
//! let code = outbox.last_code_for(Role::Authority, "a@gov.in").unwrap();
//! let verified = service.verify_otp(&OtpVerify::new(Role::Authority, "a@gov.in", code));
//! assert!(verified.success);
//! assert!(verified.token.is_some());
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audit::{AuditLogger, NoOpAuditLogger, SecurityEvent};
use crate::authority::{AuthorityDirectory, AuthorityRecord, InMemoryAuthorityDirectory};
use crate::delivery::{LogDelivery, OtpDelivery};
use crate::error::{Error, OtpError, Result};
use crate::passwordless::identifier::{Role, is_valid_email, mask_identifier};
use crate::passwordless::otp::{
    InMemoryOtpStore, IssuedOtp, OtpConfig, OtpManager, OtpStore, ceil_seconds,
};
use crate::token::SessionToken;

// ============================================================================
// 请求 / 响应
// ============================================================================

/// 发送 OTP 请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRequest {
    /// 手机号或邮箱
    pub identifier: String,
    /// 角色
    #[serde(rename = "type")]
    pub role: Role,
}

impl OtpRequest {
    /// 创建请求
    pub fn new(role: Role, identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            role,
        }
    }
}

/// 验证 OTP 请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpVerify {
    /// 手机号或邮箱
    pub identifier: String,
    /// 用户输入的验证码
    pub otp: String,
    /// 角色
    #[serde(rename = "type")]
    pub role: Role,
}

impl OtpVerify {
    /// 创建请求
    pub fn new(role: Role, identifier: impl Into<String>, otp: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            otp: otp.into(),
            role,
        }
    }
}

/// 发送 OTP 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpResponse {
    /// 是否成功
    pub success: bool,
    /// 提示文本
    pub message: String,
}

/// 验证 OTP 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// 是否成功
    pub success: bool,
    /// 提示文本
    pub message: String,
    /// 成功时签发的 token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// 机构邮箱查询结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityLookup {
    /// 是否已登记
    pub exists: bool,
    /// 机构名称
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_name: Option<String>,
}

/// Auth ID 校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdCheck {
    /// 是否有效
    pub valid: bool,
    /// 提示文本
    pub message: String,
}

/// 验证成功提示
pub const VERIFIED_MESSAGE: &str = "OTP verified successfully";

// ============================================================================
// AuthService
// ============================================================================

/// 认证服务
pub struct AuthService<S: OtpStore = InMemoryOtpStore> {
    otp: OtpManager<S>,
    directory: Arc<dyn AuthorityDirectory>,
    delivery: Arc<dyn OtpDelivery>,
    audit: Arc<dyn AuditLogger>,
}

impl AuthService<InMemoryOtpStore> {
    /// 使用内存存储创建服务
    ///
    /// 机构目录为空，投递通道为 [`LogDelivery`]，不记录审计日志。
    pub fn new(config: OtpConfig) -> Self {
        Self::with_manager(OtpManager::new(config))
    }

    /// 演示用服务：预置三个机构，验证码写入日志
    pub fn demo() -> Self {
        Self::new(OtpConfig::default()).with_directory(InMemoryAuthorityDirectory::demo())
    }
}

impl<S: OtpStore> AuthService<S> {
    /// 使用已有的 OTP 管理器创建服务
    pub fn with_manager(otp: OtpManager<S>) -> Self {
        Self {
            otp,
            directory: Arc::new(InMemoryAuthorityDirectory::new()),
            delivery: Arc::new(LogDelivery),
            audit: Arc::new(NoOpAuditLogger),
        }
    }

    /// 设置机构目录
    pub fn with_directory(mut self, directory: impl AuthorityDirectory + 'static) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    /// 设置投递通道
    pub fn with_delivery(mut self, delivery: impl OtpDelivery + 'static) -> Self {
        self.delivery = Arc::new(delivery);
        self
    }

    /// 设置审计日志记录器
    pub fn with_audit_logger(mut self, audit: impl AuditLogger + 'static) -> Self {
        self.audit = Arc::new(audit);
        self
    }

    /// OTP 管理器
    pub fn otp_manager(&self) -> &OtpManager<S> {
        &self.otp
    }

    // ========================================================================
    // 类型化接口
    // ========================================================================

    /// 签发并投递 OTP
    ///
    /// 覆盖同一标识符的旧验证码，不受重发间隔限制。
    /// 投递失败时撤销刚签发的验证码并返回 `Delivery` 错误。
    pub fn issue_otp(&self, role: Role, identifier: &str) -> Result<IssuedOtp> {
        let issued = self.otp.issue(role, identifier)?;
        self.deliver_issued(role, identifier, issued)
    }

    /// 重新发送 OTP
    ///
    /// 距上次签发不足 `resend_cooldown` 时返回 `ResendTooSoon` 并记录审计事件，
    /// 原验证码保持有效。
    pub fn resend_otp(&self, role: Role, identifier: &str) -> Result<IssuedOtp> {
        let issued = match self.otp.resend(role, identifier) {
            Ok(issued) => issued,
            Err(Error::Otp(OtpError::ResendTooSoon { retry_after })) => {
                self.audit.log(SecurityEvent::otp_resend_throttled(
                    role,
                    identifier,
                    ceil_seconds(retry_after),
                ));
                return Err(OtpError::ResendTooSoon { retry_after }.into());
            }
            Err(e) => return Err(e),
        };
        self.deliver_issued(role, identifier, issued)
    }

    fn deliver_issued(&self, role: Role, identifier: &str, issued: IssuedOtp) -> Result<IssuedOtp> {
        if let Err(e) = self.delivery.deliver(role, identifier, &issued.code) {
            warn!(
                role = %role,
                identifier = %mask_identifier(role, identifier),
                error = %e,
                "otp delivery failed"
            );
            self.otp.revoke(role, identifier)?;
            self.audit.log(SecurityEvent::otp_delivery_failed(
                role,
                identifier,
                e.to_string(),
            ));
            return Err(match e {
                Error::Delivery(msg) => Error::Delivery(msg),
                other => Error::delivery(other.to_string()),
            });
        }

        self.audit.log(SecurityEvent::otp_issued(role, identifier));
        Ok(issued)
    }

    /// 验证 OTP 并签发 token
    pub fn verify(&self, role: Role, identifier: &str, code: &str) -> Result<SessionToken> {
        match self.otp.verify(role, identifier, code) {
            Ok(token) => {
                self.audit.log(SecurityEvent::otp_verified(role, identifier));
                Ok(token)
            }
            Err(e) => {
                self.audit
                    .log(SecurityEvent::otp_failed(role, identifier, e.to_string()));
                Err(e)
            }
        }
    }

    /// 查找已登记的机构
    ///
    /// # Errors
    ///
    /// - `InvalidFormat`：邮箱格式不正确
    /// - `NotRegistered`：邮箱未登记为机构
    pub fn find_authority(&self, email: &str) -> Result<AuthorityRecord> {
        if !is_valid_email(email) {
            return Err(OtpError::InvalidFormat {
                role: Role::Authority,
                reason: "expected an address like name@domain.tld".to_string(),
            }
            .into());
        }

        match self.directory.check_email(email)? {
            Some(record) => {
                debug!(identifier = %mask_identifier(Role::Authority, email), "authority found");
                Ok(record)
            }
            None => {
                self.audit.log(SecurityEvent::authority_not_registered(email));
                Err(OtpError::NotRegistered.into())
            }
        }
    }

    /// 检查 Auth ID 是否属于该机构邮箱
    pub fn check_auth_id(&self, email: &str, auth_id: &str) -> Result<()> {
        if self.directory.validate_auth_id_for(email, auth_id)? {
            Ok(())
        } else {
            self.audit.log(SecurityEvent::auth_id_rejected(email));
            Err(OtpError::InvalidAuthId.into())
        }
    }

    /// 记录 CAPTCHA 失败
    pub(crate) fn record_captcha_failure(&self, role: Role, identifier: &str, error: &Error) {
        self.audit.log(SecurityEvent::captcha_failed(
            role,
            identifier,
            error.to_string(),
        ));
    }

    // ========================================================================
    // 表单接口
    // ========================================================================

    /// 发送 OTP（表单接口）
    pub fn send_otp(&self, request: &OtpRequest) -> OtpResponse {
        match self.issue_otp(request.role, &request.identifier) {
            Ok(issued) => OtpResponse {
                success: true,
                message: issued.message().to_string(),
            },
            Err(e) => OtpResponse {
                success: false,
                message: e.user_message(),
            },
        }
    }

    /// 验证 OTP（表单接口）
    pub fn verify_otp(&self, request: &OtpVerify) -> VerifyResponse {
        match self.verify(request.role, &request.identifier, &request.otp) {
            Ok(token) => VerifyResponse {
                success: true,
                message: VERIFIED_MESSAGE.to_string(),
                token: Some(token.into_string()),
            },
            Err(e) => VerifyResponse {
                success: false,
                message: e.user_message(),
                token: None,
            },
        }
    }

    /// 查询邮箱是否属于已登记机构（表单接口）
    pub fn check_authority_email(&self, email: &str) -> AuthorityLookup {
        match self.directory.check_email(email) {
            Ok(Some(record)) => AuthorityLookup {
                exists: true,
                authority_name: Some(record.name),
            },
            Ok(None) => AuthorityLookup {
                exists: false,
                authority_name: None,
            },
            Err(e) => {
                warn!(error = %e, "authority directory lookup failed");
                AuthorityLookup {
                    exists: false,
                    authority_name: None,
                }
            }
        }
    }

    /// 校验 Auth ID 是否存在（表单接口）
    pub fn validate_auth_id(&self, auth_id: &str) -> AuthIdCheck {
        match self.directory.validate_auth_id(auth_id) {
            Ok(true) => AuthIdCheck {
                valid: true,
                message: "Auth ID is valid".to_string(),
            },
            Ok(false) => AuthIdCheck {
                valid: false,
                message: OtpError::InvalidAuthId.user_message(),
            },
            Err(e) => AuthIdCheck {
                valid: false,
                message: e.user_message(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{EventType, InMemoryAuditLogger};
    use crate::delivery::InMemoryOutbox;

    struct FailingDelivery;

    impl OtpDelivery for FailingDelivery {
        fn deliver(&self, _role: Role, _identifier: &str, _code: &str) -> Result<()> {
            Err(Error::delivery("gateway unavailable"))
        }
    }

    fn service() -> (AuthService, InMemoryOutbox, InMemoryAuditLogger) {
        let outbox = InMemoryOutbox::new();
        let audit = InMemoryAuditLogger::new();
        let service = AuthService::new(OtpConfig::default().with_resend_cooldown(None))
            .with_directory(InMemoryAuthorityDirectory::demo())
            .with_delivery(outbox.clone())
            .with_audit_logger(audit.clone());
        (service, outbox, audit)
    }

    #[test]
    fn test_send_otp_invalid_phone() {
        let (service, outbox, _) = service();

        let response = service.send_otp(&OtpRequest::new(Role::Citizen, "12345"));
        assert!(!response.success);
        assert_eq!(
            response.message,
            "Invalid phone number format. Use 10 digits."
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_send_otp_accepts_any_valid_email() {
        let (service, outbox, audit) = service();

        let response = service.send_otp(&OtpRequest::new(Role::Authority, "someone@city.gov"));
        assert!(response.success);
        assert_eq!(response.message, "OTP sent to your email");
        assert_eq!(outbox.len(), 1);
        assert_eq!(audit.get_events_by_type(&EventType::OtpIssued).len(), 1);
    }

    #[test]
    fn test_verify_otp_messages() {
        let (service, outbox, audit) = service();
        service.send_otp(&OtpRequest::new(Role::Citizen, "9876543210"));
        let code = outbox.last_code_for(Role::Citizen, "9876543210").unwrap();

        let wrong = service.verify_otp(&OtpVerify::new(Role::Citizen, "9876543210", "bad"));
        assert!(!wrong.success);
        assert_eq!(wrong.message, "Invalid OTP. Please try again.");
        assert!(wrong.token.is_none());

        let right = service.verify_otp(&OtpVerify::new(Role::Citizen, "9876543210", &code));
        assert!(right.success);
        assert_eq!(right.message, VERIFIED_MESSAGE);
        assert!(right.token.is_some());

        let again = service.verify_otp(&OtpVerify::new(Role::Citizen, "9876543210", &code));
        assert!(!again.success);
        assert_eq!(
            again.message,
            "OTP expired or not found. Please request a new one."
        );

        assert_eq!(audit.get_events_by_type(&EventType::OtpFailed).len(), 2);
        assert_eq!(audit.get_events_by_type(&EventType::OtpVerified).len(), 1);
    }

    #[test]
    fn test_delivery_failure_revokes_code() {
        let audit = InMemoryAuditLogger::new();
        let service = AuthService::new(OtpConfig::default())
            .with_delivery(FailingDelivery)
            .with_audit_logger(audit.clone());

        let err = service.issue_otp(Role::Citizen, "9876543210").unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
        assert!(service.otp_manager().store().is_empty());
        assert_eq!(
            audit
                .get_events_by_type(&EventType::OtpDeliveryFailed)
                .len(),
            1
        );

        let response = service.send_otp(&OtpRequest::new(Role::Citizen, "9876543210"));
        assert!(!response.success);
        assert_eq!(response.message, "Failed to send OTP. Please try again.");
    }

    #[test]
    fn test_resend_throttled_is_audited() {
        let audit = InMemoryAuditLogger::new();
        let service = AuthService::new(OtpConfig::default())
            .with_delivery(InMemoryOutbox::new())
            .with_audit_logger(audit.clone());

        assert!(service.issue_otp(Role::Citizen, "9876543210").is_ok());
        let err = service.resend_otp(Role::Citizen, "9876543210").unwrap_err();
        assert_eq!(err.user_message(), "Resend in 30s");
        assert_eq!(
            audit
                .get_events_by_type(&EventType::OtpResendThrottled)
                .len(),
            1
        );
    }

    #[test]
    fn test_issue_otp_overwrites_with_default_config() {
        let outbox = InMemoryOutbox::new();
        let service = AuthService::new(OtpConfig::default()).with_delivery(outbox.clone());

        let first = service.issue_otp(Role::Citizen, "9876543210").unwrap();
        let second = service.issue_otp(Role::Citizen, "9876543210").unwrap();
        assert_eq!(outbox.len(), 2);
        assert_eq!(service.otp_manager().store().len(), 1);

        if first.code != second.code {
            assert!(service.verify(Role::Citizen, "9876543210", &first.code).is_err());
        }
        assert!(service.verify(Role::Citizen, "9876543210", &second.code).is_ok());
    }

    #[test]
    fn test_check_authority_email() {
        let (service, _, _) = service();

        let found = service.check_authority_email("traffic@example.com");
        assert!(found.exists);
        assert_eq!(found.authority_name.as_deref(), Some("Traffic Department"));

        let missing = service.check_authority_email("nobody@example.com");
        assert!(!missing.exists);
        assert!(missing.authority_name.is_none());
    }

    #[test]
    fn test_validate_auth_id() {
        let (service, _, _) = service();

        let ok = service.validate_auth_id("AUTH002");
        assert!(ok.valid);
        assert_eq!(ok.message, "Auth ID is valid");

        let bad = service.validate_auth_id("AUTH404");
        assert!(!bad.valid);
        assert_eq!(bad.message, "Invalid Auth ID. Please contact admin.");
    }

    #[test]
    fn test_find_authority_errors() {
        let (service, _, audit) = service();

        let err = service.find_authority("not-an-email").unwrap_err();
        assert!(matches!(
            err,
            Error::Otp(OtpError::InvalidFormat {
                role: Role::Authority,
                ..
            })
        ));

        let err = service.find_authority("nobody@example.com").unwrap_err();
        assert_eq!(
            err.user_message(),
            "This email is not registered as an authority. Please contact admin."
        );
        assert_eq!(
            audit
                .get_events_by_type(&EventType::AuthorityNotRegistered)
                .len(),
            1
        );

        assert!(service.check_auth_id("police@example.com", "AUTH001").is_ok());
        assert!(service.check_auth_id("police@example.com", "AUTH003").is_err());
    }
}
