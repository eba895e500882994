//! OTP 投递通道
//!
//! 库本身不发送短信或邮件。应用层实现 [`OtpDelivery`] 接入真实的短信/邮件服务；
//! 库内提供两个实现：
//!
//! - [`LogDelivery`]：把验证码写到 `tracing` 的 debug 日志（开发环境）
//! - [`InMemoryOutbox`]：把投递记录保存在内存中（测试和演示）

use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::error::Result;
use crate::passwordless::identifier::{Role, mask_identifier};

/// OTP 投递接口
pub trait OtpDelivery: Send + Sync {
    /// 把验证码发送给标识符对应的用户
    fn deliver(&self, role: Role, identifier: &str, code: &str) -> Result<()>;
}

/// 写日志的投递通道
///
/// 验证码以 debug 级别输出，只适合开发环境。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

impl OtpDelivery for LogDelivery {
    fn deliver(&self, role: Role, identifier: &str, code: &str) -> Result<()> {
        let channel = match role {
            Role::Citizen => "sms",
            Role::Authority => "email",
        };
        debug!(
            channel,
            identifier = %mask_identifier(role, identifier),
            code,
            "otp delivered"
        );
        Ok(())
    }
}

/// 一条投递记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredOtp {
    /// 角色
    pub role: Role,
    /// 标识符
    pub identifier: String,
    /// 验证码
    pub code: String,
    /// 投递时间
    pub delivered_at: DateTime<Utc>,
}

/// 内存投递箱
///
/// 克隆后共享同一份记录，测试可以保留一个句柄读取发出的验证码。
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutbox {
    messages: Arc<RwLock<Vec<DeliveredOtp>>>,
}

impl InMemoryOutbox {
    /// 创建空投递箱
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部投递记录
    pub fn messages(&self) -> Vec<DeliveredOtp> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 某个标识符最近一次收到的验证码
    pub fn last_code_for(&self, role: Role, identifier: &str) -> Option<String> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|m| m.role == role && m.identifier == identifier)
            .map(|m| m.code.clone())
    }

    /// 投递次数
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OtpDelivery for InMemoryOutbox {
    fn deliver(&self, role: Role, identifier: &str, code: &str) -> Result<()> {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DeliveredOtp {
                role,
                identifier: identifier.to_string(),
                code: code.to_string(),
                delivered_at: Utc::now(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_records_latest_code() {
        let outbox = InMemoryOutbox::new();
        assert!(outbox.is_empty());

        outbox.deliver(Role::Citizen, "9876543210", "1111").unwrap();
        outbox.deliver(Role::Citizen, "9876543210", "2222").unwrap();
        outbox.deliver(Role::Authority, "a@gov.in", "3333").unwrap();

        assert_eq!(outbox.len(), 3);
        assert_eq!(
            outbox.last_code_for(Role::Citizen, "9876543210").as_deref(),
            Some("2222")
        );
        assert_eq!(
            outbox.last_code_for(Role::Authority, "a@gov.in").as_deref(),
            Some("3333")
        );
        assert!(outbox.last_code_for(Role::Authority, "9876543210").is_none());
    }

    #[test]
    fn test_log_delivery_succeeds() {
        assert!(LogDelivery.deliver(Role::Authority, "a@gov.in", "123456").is_ok());
    }
}
