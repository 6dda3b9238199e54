//! 邮箱账号资源：登记、分配给 Worker、释放
//!
//! 只有 active 账号可以分配；仍被任何 Worker 使用的账号不能删除。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Blocked,
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAccount {
    pub id: String,
    pub email: String,
    pub status: AccountStatus,
    /// 当前持有该账号的 Worker
    pub assigned_to: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl EmailAccount {
    pub fn in_use(&self) -> bool {
        !self.assigned_to.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct AccountBook {
    accounts: HashMap<String, EmailAccount>,
}

impl AccountBook {
    pub fn add(&mut self, email: impl Into<String>) -> String {
        let id = format!("account_{}", uuid::Uuid::new_v4());
        self.accounts.insert(
            id.clone(),
            EmailAccount {
                id: id.clone(),
                email: email.into(),
                status: AccountStatus::Active,
                assigned_to: Vec::new(),
                last_used_at: None,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<&EmailAccount> {
        self.accounts.get(id)
    }

    pub fn set_status(&mut self, id: &str, status: AccountStatus) -> bool {
        match self.accounts.get_mut(id) {
            Some(account) => {
                account.status = status;
                true
            }
            None => false,
        }
    }

    /// 把账号挂到 worker 上；账号不存在、非 active 或已挂载时返回 None
    pub fn assign(&mut self, id: &str, worker_id: &str) -> Option<String> {
        let account = self.accounts.get_mut(id)?;
        if account.status != AccountStatus::Active
            || account.assigned_to.iter().any(|w| w == worker_id)
        {
            return None;
        }
        account.assigned_to.push(worker_id.to_string());
        account.last_used_at = Some(Utc::now());
        Some(account.email.clone())
    }

    /// 从 worker 上解除账号；返回账号邮箱
    pub fn release(&mut self, id: &str, worker_id: &str) -> Option<String> {
        let account = self.accounts.get_mut(id)?;
        let before = account.assigned_to.len();
        account.assigned_to.retain(|w| w != worker_id);
        (account.assigned_to.len() < before).then(|| account.email.clone())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.accounts.get(id) {
            Some(account) if !account.in_use() => self.accounts.remove(id).is_some(),
            _ => false,
        }
    }
}
