//! 健康度推导：由 CPU / 配额消耗与代理状态计算，分为 healthy(≥90) / warning(70-89) / critical(<70)

use serde::{Deserialize, Serialize};

use super::types::{Consumption, ProxyStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            90..=u8::MAX => HealthStatus::Healthy,
            70..=89 => HealthStatus::Warning,
            _ => HealthStatus::Critical,
        }
    }
}

const CPU_WEIGHT: f64 = 0.3;
const QUOTA_WEIGHT: f64 = 0.2;

fn proxy_penalty(status: ProxyStatus) -> f64 {
    match status {
        ProxyStatus::Active | ProxyStatus::Unknown => 0.0,
        ProxyStatus::Inactive => 5.0,
        ProxyStatus::Expired => 25.0,
    }
}

/// 100 - (cpu*0.3 + quota*0.2) - 代理惩罚，截断到 0..=100
pub fn derive_health(consumption: &Consumption, proxy_status: ProxyStatus) -> u8 {
    let cpu = consumption.cpu.clamp(0.0, 100.0);
    let quota = consumption.quota.clamp(0.0, 100.0);
    let score = 100.0 - cpu * CPU_WEIGHT - quota * QUOTA_WEIGHT - proxy_penalty(proxy_status);
    score.clamp(0.0, 100.0).round() as u8
}
