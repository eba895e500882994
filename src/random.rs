//! 安全随机数生成模块
//!
//! 提供验证码、CAPTCHA、session token 等随机值的生成，以及常量时间比较和摘要工具。

use rand::{Rng, TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::error::{ConfigError, CryptoError, Error, Result};

/// 生成指定长度的随机字节数组
///
/// 使用操作系统提供的密码学安全随机数生成器 (CSPRNG)
///
/// # Example
///
/// ```rust
/// use pothole_auth::random::generate_random_bytes;
///
/// let bytes = generate_random_bytes(32).unwrap();
/// assert_eq!(bytes.len(), 32);
/// ```
pub fn generate_random_bytes(length: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Crypto(CryptoError::RngFailed(format!("{:?}", e))))?;
    Ok(bytes)
}

/// 生成指定长度的十六进制随机字符串
///
/// 最终字符串长度为字节数的两倍。
pub fn generate_random_hex(byte_length: usize) -> Result<String> {
    let bytes = generate_random_bytes(byte_length)?;
    Ok(hex_encode(&bytes))
}

/// 生成 Base64 URL 安全随机字符串（不含填充）
///
/// # Example
///
/// ```rust
/// use pothole_auth::random::generate_random_base64_url;
///
/// let token = generate_random_base64_url(32).unwrap();
/// assert!(!token.contains('+'));
/// assert!(!token.contains('/'));
/// ```
pub fn generate_random_base64_url(byte_length: usize) -> Result<String> {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    let bytes = generate_random_bytes(byte_length)?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}

/// 数字验证码的最大位数（`u64` 能表示的范围）
pub const MAX_NUMERIC_CODE_DIGITS: usize = 19;

/// 生成指定位数的数字验证码
///
/// 首位不为 0，例如 6 位验证码落在 `100000..=999999` 之间。
///
/// # Errors
///
/// `digits` 不在 `1..=19` 之间时返回 `Config` 错误。
///
/// # Example
///
/// ```rust
/// use pothole_auth::random::generate_numeric_code;
///
/// let code = generate_numeric_code(6).unwrap();
/// assert_eq!(code.len(), 6);
/// assert!(!code.starts_with('0'));
///
/// assert!(generate_numeric_code(0).is_err());
/// ```
pub fn generate_numeric_code(digits: usize) -> Result<String> {
    if !(1..=MAX_NUMERIC_CODE_DIGITS).contains(&digits) {
        return Err(ConfigError::invalid("digits", "must be between 1 and 19").into());
    }
    let min = 10u64.pow((digits - 1) as u32);
    let max = 10u64.pow(digits as u32);
    Ok(rand::rng().random_range(min..max).to_string())
}

/// 从给定字符集中随机取字符组成字符串
///
/// `charset` 必须只包含 ASCII 字符且不能为空，由调用方的配置校验保证。
pub(crate) fn generate_from_charset(charset: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}

/// 生成 session token 的随机部分
///
/// 32 字节（256 位）随机数据，Base64 URL 编码。
pub fn generate_session_token() -> Result<String> {
    generate_random_base64_url(32)
}

/// 计算 SHA-256 摘要，返回十六进制字符串
///
/// 用于保存验证码摘要而不是明文。
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex_encode(&digest)
}

/// 将字节数组编码为十六进制字符串
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 常量时间比较两个字节切片
///
/// # Example
///
/// ```rust
/// use pothole_auth::random::constant_time_compare;
///
/// assert!(constant_time_compare(b"482913", b"482913"));
/// assert!(!constant_time_compare(b"482913", b"482914"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// 常量时间比较两个字符串
pub fn constant_time_compare_str(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}
