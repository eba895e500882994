//! OTP 会话管理集成测试
//!
//! 覆盖签发、覆盖、过期、一次性消费以及两种角色的标识符规则。

use pothole_auth::error::{Error, OtpError};
use pothole_auth::passwordless::{OtpConfig, OtpKey, OtpManager, OtpStore, Role};
use std::sync::Barrier;
use std::thread::{self, sleep};
use std::time::Duration;

fn manager() -> OtpManager {
    OtpManager::new(OtpConfig::default().with_resend_cooldown(None))
}

fn otp_error(err: Error) -> OtpError {
    match err {
        Error::Otp(e) => e,
        other => panic!("expected OTP error, got {other:?}"),
    }
}

// ============================================================================
// 签发测试
// ============================================================================

/// 测试任意 10 位数字手机号都能签发，且只产生一条记录
#[test]
fn test_any_ten_digit_phone_issues_one_record() {
    let manager = manager();
    let phones = ["0000000000", "1234567890", "9876543210", "5555555555"];

    for (i, phone) in phones.iter().enumerate() {
        let issued = manager.issue(Role::Citizen, phone).unwrap();
        assert_eq!(issued.message(), "OTP sent to your phone number");
        assert_eq!(manager.store().len(), i + 1);

        let record = manager
            .store()
            .get(&OtpKey::new(Role::Citizen, *phone))
            .unwrap();
        assert!(record.is_some());
    }
}

/// 测试格式不正确的标识符不会留下任何记录
#[test]
fn test_invalid_identifiers_rejected_without_side_effects() {
    let manager = manager();

    for phone in ["", "987654321", "98765432100", "98765-43210", "abcdefghij"] {
        let err = otp_error(manager.issue(Role::Citizen, phone).unwrap_err());
        assert_eq!(
            err.user_message(),
            "Invalid phone number format. Use 10 digits."
        );
    }
    for email in ["", "plainaddress", "a@b", "a b@example.com", "@example.com"] {
        let err = otp_error(manager.issue(Role::Authority, email).unwrap_err());
        assert_eq!(err.user_message(), "Invalid email format");
    }

    assert!(manager.store().is_empty());
}

/// 测试机构邮箱签发后用同一验证码登录
#[test]
fn test_authority_email_round_trip() {
    let manager = manager();

    let issued = manager.issue(Role::Authority, "ward7@city.gov.in").unwrap();
    assert_eq!(issued.message(), "OTP sent to your email");
    assert_eq!(issued.code.len(), 6);
    assert!(issued.code.chars().all(|c| c.is_ascii_digit()));

    let token = manager
        .verify(Role::Authority, "ward7@city.gov.in", &issued.code)
        .unwrap();
    assert_eq!(token.role, Role::Authority);
    assert_eq!(token.identifier, "ward7@city.gov.in");
}

// ============================================================================
// 验证测试
// ============================================================================

/// 测试验证码只能使用一次
#[test]
fn test_code_is_single_use() {
    let manager = manager();
    let issued = manager.issue(Role::Citizen, "9876543210").unwrap();

    assert!(manager.verify(Role::Citizen, "9876543210", &issued.code).is_ok());

    let err = otp_error(
        manager
            .verify(Role::Citizen, "9876543210", &issued.code)
            .unwrap_err(),
    );
    assert_eq!(err, OtpError::NotFound);
    assert_eq!(
        err.user_message(),
        "OTP expired or not found. Please request a new one."
    );
}

/// 测试重新签发后旧验证码失效
#[test]
fn test_reissue_replaces_previous_code() {
    let manager = manager();
    let first = manager.issue(Role::Citizen, "9876543210").unwrap();
    let second = manager.issue(Role::Citizen, "9876543210").unwrap();
    assert_eq!(manager.store().len(), 1);

    if first.code != second.code {
        let err = otp_error(
            manager
                .verify(Role::Citizen, "9876543210", &first.code)
                .unwrap_err(),
        );
        assert!(matches!(err, OtpError::Mismatch { .. }));
    }
    assert!(manager.verify(Role::Citizen, "9876543210", &second.code).is_ok());
}

/// 测试默认配置下重新签发同样覆盖旧验证码
#[test]
fn test_default_config_reissue_replaces_previous_code() {
    let manager = OtpManager::with_default_config();
    let first = manager.issue(Role::Authority, "police@example.com").unwrap();
    let second = manager.issue(Role::Authority, "police@example.com").unwrap();
    assert_eq!(manager.store().len(), 1);

    if first.code != second.code {
        assert!(
            manager
                .verify(Role::Authority, "police@example.com", &first.code)
                .is_err()
        );
    }
    assert!(
        manager
            .verify(Role::Authority, "police@example.com", &second.code)
            .is_ok()
    );
}

/// 测试并发提交同一个验证码只有一个成功
#[test]
fn test_concurrent_verify_consumes_once() {
    const THREADS: usize = 8;
    let manager = manager();

    for _ in 0..100 {
        let issued = manager.issue(Role::Citizen, "9876543210").unwrap();
        let barrier = Barrier::new(THREADS);
        let (manager, barrier, code) = (&manager, &barrier, issued.code.as_str());

        let tokens = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        manager.verify(Role::Citizen, "9876543210", code)
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap().ok())
                .count()
        });

        assert_eq!(tokens, 1);
        assert!(manager.store().is_empty());
    }
}

/// 测试过期后即使验证码正确也无法登录
#[test]
fn test_expired_code_rejected() {
    let manager = OtpManager::new(
        OtpConfig::default()
            .with_ttl(Duration::from_millis(100))
            .with_resend_cooldown(None),
    );
    let issued = manager.issue(Role::Citizen, "9876543210").unwrap();

    sleep(Duration::from_millis(150));

    let err = otp_error(
        manager
            .verify(Role::Citizen, "9876543210", &issued.code)
            .unwrap_err(),
    );
    assert_eq!(err, OtpError::Expired);
    assert!(manager.store().is_empty());
}

/// 测试错误验证码不会消耗记录，正确验证码仍可使用
#[test]
fn test_wrong_code_then_right_code() {
    let manager = manager();
    let issued = manager.issue(Role::Citizen, "9876543210").unwrap();

    let err = otp_error(
        manager
            .verify(Role::Citizen, "9876543210", "000000x")
            .unwrap_err(),
    );
    assert_eq!(err, OtpError::Mismatch { remaining_attempts: 4 });
    assert_eq!(err.user_message(), "Invalid OTP. Please try again.");

    assert!(manager.verify(Role::Citizen, "9876543210", &issued.code).is_ok());
}

/// 测试尝试次数用尽后记录被删除
#[test]
fn test_attempts_exhausted() {
    let manager = OtpManager::new(
        OtpConfig::default()
            .with_max_attempts(2)
            .with_resend_cooldown(None),
    );
    let issued = manager.issue(Role::Citizen, "9876543210").unwrap();

    assert!(manager.verify(Role::Citizen, "9876543210", "bad").is_err());
    let err = otp_error(
        manager
            .verify(Role::Citizen, "9876543210", "bad")
            .unwrap_err(),
    );
    assert_eq!(err, OtpError::Mismatch { remaining_attempts: 0 });

    let err = otp_error(
        manager
            .verify(Role::Citizen, "9876543210", &issued.code)
            .unwrap_err(),
    );
    assert_eq!(err, OtpError::NotFound);
}

/// 测试两种角色的记录互不影响
#[test]
fn test_same_identifier_under_different_roles() {
    let manager = manager();
    let citizen = manager.issue(Role::Citizen, "9876543210").unwrap();

    // 手机号不是合法邮箱，机构侧无法使用
    assert!(
        manager
            .verify(Role::Authority, "9876543210", &citizen.code)
            .is_err()
    );
    assert!(manager.verify(Role::Citizen, "9876543210", &citizen.code).is_ok());
}

// ============================================================================
// 重发与清理测试
// ============================================================================

/// 测试重发间隔
#[test]
fn test_resend_cooldown() {
    let manager = OtpManager::new(
        OtpConfig::citizen_form().with_resend_cooldown(Some(Duration::from_millis(200))),
    );
    let issued = manager.issue(Role::Citizen, "9876543210").unwrap();
    assert_eq!(issued.code.len(), 4);

    let err = otp_error(manager.resend(Role::Citizen, "9876543210").unwrap_err());
    assert!(matches!(err, OtpError::ResendTooSoon { .. }));
    assert!(!manager.can_resend(Role::Citizen, "9876543210").unwrap());

    // 被拒绝的重发不影响当前验证码
    let key = OtpKey::new(Role::Citizen, "9876543210");
    let before = manager.store().get(&key).unwrap().unwrap();

    // 其他号码不受影响
    assert!(manager.resend(Role::Citizen, "0123456789").is_ok());

    sleep(Duration::from_millis(250));
    assert!(manager.can_resend(Role::Citizen, "9876543210").unwrap());
    let resent = manager.resend(Role::Citizen, "9876543210").unwrap();
    let after = manager.store().get(&key).unwrap().unwrap();
    assert!(after.issued_at > before.issued_at);
    assert!(manager.verify(Role::Citizen, "9876543210", &resent.code).is_ok());
}

/// 测试清理过期记录
#[test]
fn test_cleanup_removes_only_expired() {
    let short = OtpManager::new(
        OtpConfig::default()
            .with_ttl(Duration::from_millis(100))
            .with_resend_cooldown(None),
    );
    short.issue(Role::Citizen, "9876543210").unwrap();
    short.issue(Role::Authority, "police@example.com").unwrap();

    sleep(Duration::from_millis(150));
    short.issue(Role::Citizen, "0123456789").unwrap();

    assert_eq!(short.cleanup().unwrap(), 2);
    assert_eq!(short.store().len(), 1);
}
