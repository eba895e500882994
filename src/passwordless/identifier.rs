//! 账户角色与标识符校验
//!
//! - 市民 (`Citizen`) 使用 10 位数字手机号
//! - 机构 (`Authority`) 使用邮箱
//!
//! 标识符按字节比较，不做去空格或大小写转换。

use serde::{Deserialize, Serialize};

use crate::error::{OtpError, Result};

/// 账户角色
///
/// 同一个标识符在不同角色下的 OTP 相互独立。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 市民（手机号 + OTP）
    Citizen,
    /// 机构（邮箱 + OTP）
    Authority,
}

impl Role {
    /// 角色名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Authority => "authority",
        }
    }

    /// 发送成功后给用户的提示
    pub fn sent_message(&self) -> &'static str {
        match self {
            Role::Citizen => "OTP sent to your phone number",
            Role::Authority => "OTP sent to your email",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 按角色校验标识符格式
///
/// # Example
///
/// ```rust
/// use pothole_auth::passwordless::{Role, validate_identifier};
///
/// assert!(validate_identifier(Role::Citizen, "9876543210").is_ok());
/// assert!(validate_identifier(Role::Citizen, "98765").is_err());
/// assert!(validate_identifier(Role::Authority, "a@gov.in").is_ok());
/// ```
pub fn validate_identifier(role: Role, identifier: &str) -> Result<()> {
    let reason = match role {
        Role::Citizen if !is_valid_phone(identifier) => "expected exactly 10 digits",
        Role::Authority if !is_valid_email(identifier) => "expected an address like name@domain.tld",
        _ => return Ok(()),
    };
    Err(OtpError::InvalidFormat {
        role,
        reason: reason.to_string(),
    }
    .into())
}

/// 10 位 ASCII 数字
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.bytes().all(|b| b.is_ascii_digit())
}

/// 宽松的邮箱格式校验
///
/// 等价于 `^[^\s@]+@[^\s@]+\.[^\s@]+$`：恰好一个 `@`，不含空白，
/// 域名部分至少有一个前后都有字符的 `.`。
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(is_regex_space) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// 正则 `\s` 匹配的字符
///
/// Unicode 空白再加上 U+FEFF，但不含 U+0085。
fn is_regex_space(c: char) -> bool {
    c == '\u{feff}' || (c.is_whitespace() && c != '\u{85}')
}

/// 遮蔽标识符，用于日志和审计
///
/// - 手机号只保留后 4 位：`******3210`
/// - 邮箱保留首字符和域名：`p***@example.com`
pub fn mask_identifier(role: Role, identifier: &str) -> String {
    match role {
        Role::Citizen => {
            let chars: Vec<char> = identifier.chars().collect();
            let keep = chars.len().min(4);
            let hidden = chars.len() - keep;
            let tail: String = chars[hidden..].iter().collect();
            format!("{}{}", "*".repeat(hidden), tail)
        }
        Role::Authority => match identifier.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{}***@{}", first, domain)
            }
            None => "***".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_valid_phones() {
        assert!(is_valid_phone("9876543210"));
        assert!(is_valid_phone("0000000000"));
    }

    #[test]
    fn test_invalid_phones() {
        assert!(!is_valid_phone(""));
        assert!(!is_valid_phone("987654321"));
        assert!(!is_valid_phone("98765432101"));
        assert!(!is_valid_phone("98765-4321"));
        assert!(!is_valid_phone(" 9876543210"));
        assert!(!is_valid_phone("+919876543"));
        // 全角数字不算
        assert!(!is_valid_phone("９８７６５４３２１０"));
    }

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("a@gov.in"));
        assert!(is_valid_email("police@example.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
        assert!(is_valid_email("x@a.b"));
        assert!(is_valid_email("x@a..b"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("@gov.in"));
        assert!(!is_valid_email("a@gov"));
        assert!(!is_valid_email("a@.in"));
        assert!(!is_valid_email("a@gov."));
        assert!(!is_valid_email("a@@gov.in"));
        assert!(!is_valid_email("a@b@gov.in"));
        assert!(!is_valid_email("a b@gov.in"));
        assert!(!is_valid_email("a@gov.in "));
    }

    #[test]
    fn test_email_rejects_byte_order_mark() {
        assert!(!is_valid_email("a\u{feff}b@x.io"));
        assert!(!is_valid_email("\u{feff}police@example.com"));
        assert!(!is_valid_email("a@gov\u{2028}.in"));
        assert!(!is_valid_email("a@gov.in\u{a0}"));
        // U+0085 不属于 `\s`
        assert!(is_valid_email("a\u{85}b@x.io"));
    }

    #[test]
    fn test_validate_identifier_reports_role() {
        let err = validate_identifier(Role::Authority, "not-an-email").unwrap_err();
        match err {
            Error::Otp(OtpError::InvalidFormat { role, .. }) => assert_eq!(role, Role::Authority),
            other => panic!("unexpected error: {other:?}"),
        }

        // 邮箱不是合法的市民标识符
        assert!(validate_identifier(Role::Citizen, "a@gov.in").is_err());
        // 手机号不是合法的机构标识符
        assert!(validate_identifier(Role::Authority, "9876543210").is_err());
    }

    #[test]
    fn test_mask_identifier() {
        assert_eq!(mask_identifier(Role::Citizen, "9876543210"), "******3210");
        assert_eq!(mask_identifier(Role::Citizen, "12"), "12");
        assert_eq!(
            mask_identifier(Role::Authority, "police@example.com"),
            "p***@example.com"
        );
        assert_eq!(mask_identifier(Role::Authority, "broken"), "***");
    }

    #[test]
    fn test_role_serde_and_display() {
        assert_eq!(Role::Citizen.to_string(), "citizen");
        assert_eq!(Role::Authority.as_str(), "authority");
        assert_eq!(Role::Citizen.sent_message(), "OTP sent to your phone number");
        assert_eq!(Role::Authority.sent_message(), "OTP sent to your email");
    }
}
