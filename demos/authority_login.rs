//! 机构登录示例
//!
//! 展示官方邮箱 → Auth ID → 验证码的三步登录流程。
//!
//! 运行: cargo run --example authority_login
//! 查看日志: RUST_LOG=pothole_auth=debug cargo run --example authority_login

use pothole_auth::{
    AuthService, AuthorityLogin, InMemoryAuditLogger, InMemoryOutbox, Role,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pothole_auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== 机构登录示例 ===\n");

    let outbox = InMemoryOutbox::new();
    let audit = InMemoryAuditLogger::new();
    let service = AuthService::demo()
        .with_delivery(outbox.clone())
        .with_audit_logger(audit.clone());

    let mut login = AuthorityLogin::new(&service);

    // 1. 未登记的邮箱
    println!("📧 输入邮箱 someone@example.com...");
    if let Err(e) = login.submit_email("someone@example.com") {
        println!("   ❌ {}\n", e.user_message());
    }

    // 2. 已登记的邮箱
    let email = "police@example.com";
    println!("📧 输入邮箱 {}...", email);
    match login.submit_email(email) {
        Ok(record) => println!("   ✅ {}\n", record.name),
        Err(e) => {
            println!("   ❌ {}\n", e.user_message());
            return;
        }
    }

    // 3. 错误的 Auth ID
    println!("🪪 输入 Auth ID AUTH002...");
    if let Err(e) = login.submit_auth_id("AUTH002") {
        println!("   ❌ {}\n", e.user_message());
    }

    // 4. 正确的 Auth ID
    println!("🪪 输入 Auth ID AUTH001...");
    match login.submit_auth_id("AUTH001") {
        Ok(message) => println!("   ✅ {}\n", message),
        Err(e) => {
            println!("   ❌ {}\n", e.user_message());
            return;
        }
    }

    // 5. 输入验证码
    let code = outbox.last_code_for(Role::Authority, email).unwrap();
    println!("🔐 输入验证码 {}...", code);
    match login.submit_otp(&code) {
        Ok(token) => println!("   ✅ 登录成功，token: {}\n", token),
        Err(e) => println!("   ❌ {}\n", e.user_message()),
    }

    // 6. 同一个验证码不能再次使用
    println!("🔐 再次提交验证码 {}...", code);
    match service.verify(Role::Authority, email, &code) {
        Ok(_) => println!("   ✅ 登录成功\n"),
        Err(e) => println!("   ❌ {}\n", e.user_message()),
    }

    // 7. 审计日志
    println!("📋 审计日志:");
    for event in audit.get_events() {
        println!(
            "   [{:?}] {} {}",
            event.severity,
            event.event_name(),
            event.message.as_deref().unwrap_or("")
        );
    }
}
