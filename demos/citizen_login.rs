//! 市民登录示例
//!
//! 展示手机号 + 验证码 + CAPTCHA 的登录流程。
//!
//! 运行: cargo run --example citizen_login
//! 查看日志: RUST_LOG=pothole_auth=debug cargo run --example citizen_login

use pothole_auth::{
    AuthService, CaptchaConfig, CitizenLogin, InMemoryOutbox, OtpConfig, Role,
    TracingAuditLogger,
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

    println!("=== 市民登录示例 ===\n");

    let outbox = InMemoryOutbox::new();
    let service = AuthService::new(OtpConfig::citizen_form())
        .with_delivery(outbox.clone())
        .with_audit_logger(TracingAuditLogger);

    let mut login = CitizenLogin::new(&service, CaptchaConfig::default()).unwrap();

    // 1. 手机号格式错误
    println!("📱 输入手机号 98765...");
    if let Err(e) = login.submit_phone("98765") {
        println!("   ❌ {}\n", e.user_message());
    }

    // 2. 正确的手机号
    let phone = "9876543210";
    println!("📱 输入手机号 {}...", phone);
    match login.submit_phone(phone) {
        Ok(message) => println!("   ✅ {}\n", message),
        Err(e) => {
            println!("   ❌ {}\n", e.user_message());
            return;
        }
    }

    // 3. 立即重发会被限制
    println!("🔁 重新发送...");
    if let Err(e) = login.resend() {
        println!("   ❌ {}\n", e.user_message());
    }

    // 4. 输错 CAPTCHA
    let code = outbox.last_code_for(Role::Citizen, phone).unwrap();
    println!("🔐 输入验证码 {} 和错误的 CAPTCHA...", code);
    if let Err(e) = login.submit(&code, "XXXXXX") {
        println!("   ❌ {}\n", e.user_message());
    }

    // 5. 输入正确的 CAPTCHA
    let captcha = login.captcha().value.clone();
    println!("🔐 输入验证码 {} 和 CAPTCHA {}...", code, captcha);
    match login.submit(&code, &captcha) {
        Ok(token) => println!("   ✅ 登录成功，token: {}\n", token),
        Err(e) => println!("   ❌ {}\n", e.user_message()),
    }

    println!("当前步骤: {}", login.step().as_str());
}
