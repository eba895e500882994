//! 机构目录
//!
//! 保存已登记的机构账户（邮箱、机构名称、Auth ID），供机构登录流程查询。
//!
//! ## 示例
//!
//! ```rust
//! use pothole_auth::authority::{AuthorityDirectory, InMemoryAuthorityDirectory};
//!
//! let directory = InMemoryAuthorityDirectory::demo();
//!
//! let record = directory.check_email("police@example.com").unwrap().unwrap();
//! assert_eq!(record.name, "City Police Department");
//!
//! assert!(directory.validate_auth_id("auth001").unwrap());
//! assert!(!directory.validate_auth_id_for("police@example.com", "AUTH002").unwrap());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Result, StorageError};

/// 机构账户记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityRecord {
    /// 官方邮箱
    pub email: String,
    /// 机构名称
    pub name: String,
    /// Auth ID（大写）
    pub auth_id: String,
}

impl AuthorityRecord {
    /// 创建记录，Auth ID 统一转为大写
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        auth_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            auth_id: normalize_auth_id(&auth_id.into()),
        }
    }
}

/// Auth ID 规范化：去掉首尾空白并转为大写
pub fn normalize_auth_id(auth_id: &str) -> String {
    auth_id.trim().to_ascii_uppercase()
}

/// 机构目录接口
pub trait AuthorityDirectory: Send + Sync {
    /// 按邮箱查找（精确匹配）
    fn find_by_email(&self, email: &str) -> Result<Option<AuthorityRecord>>;

    /// 按 Auth ID 查找（参数已规范化）
    fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<AuthorityRecord>>;

    /// 检查邮箱是否属于已登记的机构
    fn check_email(&self, email: &str) -> Result<Option<AuthorityRecord>> {
        self.find_by_email(email)
    }

    /// 检查 Auth ID 是否存在
    fn validate_auth_id(&self, auth_id: &str) -> Result<bool> {
        Ok(self.find_by_auth_id(&normalize_auth_id(auth_id))?.is_some())
    }

    /// 检查 Auth ID 是否属于该邮箱对应的机构
    fn validate_auth_id_for(&self, email: &str, auth_id: &str) -> Result<bool> {
        let auth_id = normalize_auth_id(auth_id);
        Ok(self
            .find_by_email(email)?
            .is_some_and(|record| record.auth_id == auth_id))
    }
}

/// 内存机构目录
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthorityDirectory {
    /// email -> 记录
    records: Arc<RwLock<HashMap<String, AuthorityRecord>>>,
}

impl InMemoryAuthorityDirectory {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 演示用目录，包含三个机构
    pub fn demo() -> Self {
        Self::from_records([
            AuthorityRecord::new("police@example.com", "City Police Department", "AUTH001"),
            AuthorityRecord::new("municipal@example.com", "Municipal Corporation", "AUTH002"),
            AuthorityRecord::new("traffic@example.com", "Traffic Department", "AUTH003"),
        ])
    }

    /// 从记录列表创建目录
    pub fn from_records(records: impl IntoIterator<Item = AuthorityRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.email.clone(), record))
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// 登记机构，同一邮箱会被覆盖
    pub fn insert(&self, record: AuthorityRecord) -> Result<()> {
        self.records
            .write()
            .map_err(|_| StorageError::Poisoned("authority directory".to_string()))?
            .insert(record.email.clone(), record);
        Ok(())
    }

    /// 登记的机构数量
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuthorityDirectory for InMemoryAuthorityDirectory {
    fn find_by_email(&self, email: &str) -> Result<Option<AuthorityRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::Poisoned("authority directory".to_string()))?;
        Ok(records.get(email).cloned())
    }

    fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<AuthorityRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::Poisoned("authority directory".to_string()))?;
        Ok(records.values().find(|r| r.auth_id == auth_id).cloned())
    }
}
