//! 登录流程
//!
//! 表单的分步状态机，建立在 [`AuthService`] 之上：
//!
//! - 市民：`EnterPhone → AwaitingOtp → Authenticated`，提交验证码时同时校验 CAPTCHA
//! - 机构：`EnterEmail → EnterAuthId → AwaitingOtp → Authenticated`
//!
//! 每一步都返回 [`Result`]，错误通过 [`crate::Error::user_message`] 转换成提示文本。
//! 步骤不对时返回 `InvalidStep`，状态保持不变。
//!
//! ## 示例
//!
//! ```rust
//! use pothole_auth::delivery::InMemoryOutbox;
//! use pothole_auth::flow::{AuthorityLogin, AuthorityStep};
//! use pothole_auth::passwordless::{OtpConfig, Role};
//! use pothole_auth::authority::InMemoryAuthorityDirectory;
//! use pothole_auth::service::AuthService;
//!
//! let outbox = InMemoryOutbox::new();
//! let service = AuthService::new(OtpConfig::default())
//!     .with_directory(InMemoryAuthorityDirectory::demo())
//!     .with_delivery(outbox.clone());
//!
//! let mut login = AuthorityLogin::new(&service);
//! let authority = login.submit_email("police@example.com").unwrap();
//! assert_eq!(authority.name, "City Police Department");
//!
//! login.submit_auth_id("auth001").unwrap();
//! assert_eq!(login.step(), AuthorityStep::AwaitingOtp);
//!
//! let code = outbox.last_code_for(Role::Authority, "police@example.com").unwrap();
//! let token = login.submit_otp(&code).unwrap();
//! assert_eq!(login.step(), AuthorityStep::Authenticated);
//! assert!(!token.as_str().is_empty());
//! ```

use tracing::debug;

use crate::authority::AuthorityRecord;
use crate::error::{OtpError, Result};
use crate::passwordless::identifier::{Role, mask_identifier, validate_identifier};
use crate::passwordless::otp::OtpStore;
use crate::security::captcha::{Captcha, CaptchaChallenge, CaptchaConfig};
use crate::service::AuthService;
use crate::token::SessionToken;

// ============================================================================
// 市民登录
// ============================================================================

/// 市民登录步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CitizenStep {
    /// 输入手机号
    EnterPhone,
    /// 等待输入验证码和 CAPTCHA
    AwaitingOtp,
    /// 已登录
    Authenticated,
}

impl CitizenStep {
    /// 步骤名称
    pub fn as_str(&self) -> &'static str {
        match self {
            CitizenStep::EnterPhone => "enter_phone",
            CitizenStep::AwaitingOtp => "awaiting_otp",
            CitizenStep::Authenticated => "authenticated",
        }
    }
}

/// 市民登录流程
pub struct CitizenLogin<'a, S: OtpStore> {
    service: &'a AuthService<S>,
    captcha: Captcha,
    phone: Option<String>,
    step: CitizenStep,
}

impl<'a, S: OtpStore> CitizenLogin<'a, S> {
    /// 开始新的市民登录
    pub fn new(service: &'a AuthService<S>, captcha: CaptchaConfig) -> Result<Self> {
        Ok(Self {
            service,
            captcha: Captcha::new(captcha)?,
            phone: None,
            step: CitizenStep::EnterPhone,
        })
    }

    /// 当前步骤
    pub fn step(&self) -> CitizenStep {
        self.step
    }

    /// 已提交的手机号
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// 当前 CAPTCHA
    pub fn captcha(&mut self) -> &CaptchaChallenge {
        self.captcha.current()
    }

    /// 提交手机号并发送 OTP
    ///
    /// 成功后更换 CAPTCHA 并进入 `AwaitingOtp`，返回发送提示。
    pub fn submit_phone(&mut self, phone: &str) -> Result<&'static str> {
        self.ensure_step(CitizenStep::EnterPhone)?;
        validate_identifier(Role::Citizen, phone)?;

        let issued = self.service.issue_otp(Role::Citizen, phone)?;
        self.phone = Some(phone.to_string());
        self.captcha.refresh();
        self.step = CitizenStep::AwaitingOtp;
        debug!(identifier = %mask_identifier(Role::Citizen, phone), "citizen login awaiting otp");
        Ok(issued.message())
    }

    /// 重新发送 OTP
    pub fn resend(&mut self) -> Result<&'static str> {
        self.ensure_step(CitizenStep::AwaitingOtp)?;
        let phone = self.current_phone()?;
        let issued = self.service.resend_otp(Role::Citizen, &phone)?;
        Ok(issued.message())
    }

    /// 提交验证码和 CAPTCHA
    ///
    /// 先校验 CAPTCHA，再校验验证码。任一失败都停留在 `AwaitingOtp`。
    pub fn submit(&mut self, otp: &str, captcha_answer: &str) -> Result<SessionToken> {
        self.ensure_step(CitizenStep::AwaitingOtp)?;
        let phone = self.current_phone()?;

        if let Err(e) = self.captcha.verify(captcha_answer) {
            self.service.record_captcha_failure(Role::Citizen, &phone, &e);
            return Err(e);
        }

        let token = match self.service.verify(Role::Citizen, &phone, otp) {
            Ok(token) => token,
            Err(e) => {
                // 失败后换一个 CAPTCHA
                self.captcha.refresh();
                return Err(e);
            }
        };

        self.step = CitizenStep::Authenticated;
        debug!(identifier = %mask_identifier(Role::Citizen, &phone), "citizen login authenticated");
        Ok(token)
    }

    /// 返回输入手机号的步骤，撤销未使用的验证码
    pub fn change_phone(&mut self) -> Result<()> {
        self.ensure_step(CitizenStep::AwaitingOtp)?;
        if let Some(phone) = self.phone.take() {
            self.service.otp_manager().revoke(Role::Citizen, &phone)?;
        }
        self.step = CitizenStep::EnterPhone;
        Ok(())
    }

    fn current_phone(&self) -> Result<String> {
        self.phone.clone().ok_or_else(|| {
            OtpError::InvalidStep {
                expected: CitizenStep::AwaitingOtp.as_str(),
                actual: CitizenStep::EnterPhone.as_str(),
            }
            .into()
        })
    }

    fn ensure_step(&self, expected: CitizenStep) -> Result<()> {
        if self.step == expected {
            Ok(())
        } else {
            Err(OtpError::InvalidStep {
                expected: expected.as_str(),
                actual: self.step.as_str(),
            }
            .into())
        }
    }
}

// ============================================================================
// 机构登录
// ============================================================================

/// 机构登录步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityStep {
    /// 输入官方邮箱
    EnterEmail,
    /// 输入 Auth ID
    EnterAuthId,
    /// 等待输入验证码
    AwaitingOtp,
    /// 已登录
    Authenticated,
}

impl AuthorityStep {
    /// 步骤名称
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityStep::EnterEmail => "enter_email",
            AuthorityStep::EnterAuthId => "enter_auth_id",
            AuthorityStep::AwaitingOtp => "awaiting_otp",
            AuthorityStep::Authenticated => "authenticated",
        }
    }
}

/// 机构登录流程
pub struct AuthorityLogin<'a, S: OtpStore> {
    service: &'a AuthService<S>,
    authority: Option<AuthorityRecord>,
    step: AuthorityStep,
}

impl<'a, S: OtpStore> AuthorityLogin<'a, S> {
    /// 开始新的机构登录
    pub fn new(service: &'a AuthService<S>) -> Self {
        Self {
            service,
            authority: None,
            step: AuthorityStep::EnterEmail,
        }
    }

    /// 当前步骤
    pub fn step(&self) -> AuthorityStep {
        self.step
    }

    /// 已确认的机构
    pub fn authority(&self) -> Option<&AuthorityRecord> {
        self.authority.as_ref()
    }

    /// 提交官方邮箱
    ///
    /// 邮箱必须格式正确且已登记，成功后进入 `EnterAuthId`。
    pub fn submit_email(&mut self, email: &str) -> Result<AuthorityRecord> {
        self.ensure_step(AuthorityStep::EnterEmail)?;
        let record = self.service.find_authority(email)?;
        self.authority = Some(record.clone());
        self.step = AuthorityStep::EnterAuthId;
        debug!(
            identifier = %mask_identifier(Role::Authority, email),
            "authority login awaiting auth id"
        );
        Ok(record)
    }

    /// 提交 Auth ID，校验通过后发送 OTP
    pub fn submit_auth_id(&mut self, auth_id: &str) -> Result<&'static str> {
        self.ensure_step(AuthorityStep::EnterAuthId)?;
        let email = self.current_email()?;

        self.service.check_auth_id(&email, auth_id)?;
        let issued = self.service.issue_otp(Role::Authority, &email)?;
        self.step = AuthorityStep::AwaitingOtp;
        debug!(
            identifier = %mask_identifier(Role::Authority, &email),
            "authority login awaiting otp"
        );
        Ok(issued.message())
    }

    /// 重新发送 OTP
    pub fn resend(&mut self) -> Result<&'static str> {
        self.ensure_step(AuthorityStep::AwaitingOtp)?;
        let email = self.current_email()?;
        let issued = self.service.resend_otp(Role::Authority, &email)?;
        Ok(issued.message())
    }

    /// 提交验证码
    pub fn submit_otp(&mut self, otp: &str) -> Result<SessionToken> {
        self.ensure_step(AuthorityStep::AwaitingOtp)?;
        let email = self.current_email()?;

        let token = self.service.verify(Role::Authority, &email, otp)?;
        self.step = AuthorityStep::Authenticated;
        debug!(
            identifier = %mask_identifier(Role::Authority, &email),
            "authority login authenticated"
        );
        Ok(token)
    }

    /// 返回上一步
    ///
    /// - `EnterAuthId` → `EnterEmail`（清除已确认的机构）
    /// - `AwaitingOtp` → `EnterAuthId`（已发送的验证码保持有效）
    pub fn back(&mut self) -> Result<AuthorityStep> {
        self.step = match self.step {
            AuthorityStep::EnterAuthId => {
                self.authority = None;
                AuthorityStep::EnterEmail
            }
            AuthorityStep::AwaitingOtp => AuthorityStep::EnterAuthId,
            other => {
                return Err(OtpError::InvalidStep {
                    expected: AuthorityStep::EnterAuthId.as_str(),
                    actual: other.as_str(),
                }
                .into());
            }
        };
        Ok(self.step)
    }

    fn current_email(&self) -> Result<String> {
        self.authority
            .as_ref()
            .map(|record| record.email.clone())
            .ok_or_else(|| {
                OtpError::InvalidStep {
                    expected: AuthorityStep::EnterAuthId.as_str(),
                    actual: AuthorityStep::EnterEmail.as_str(),
                }
                .into()
            })
    }

    fn ensure_step(&self, expected: AuthorityStep) -> Result<()> {
        if self.step == expected {
            Ok(())
        } else {
            Err(OtpError::InvalidStep {
                expected: expected.as_str(),
                actual: self.step.as_str(),
            }
            .into())
        }
    }
}
