//! 代理记录与健康判定

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 成功率必须严格高于该阈值才可被选中
pub const MIN_SUCCESS_RATE: f64 = 0.8;

/// 成功率指数滑动平均中旧值的权重
const EMA_RETAIN: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// host:port
    pub address: String,
    pub region: String,
    pub latency_ms: u64,
    /// 0..=1
    pub success_rate: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub blacklisted: bool,
}

impl ProxyRecord {
    pub fn new(
        address: impl Into<String>,
        region: impl Into<String>,
        latency_ms: u64,
        success_rate: f64,
    ) -> Self {
        Self {
            address: address.into(),
            region: region.into(),
            latency_ms,
            success_rate: success_rate.clamp(0.0, 1.0),
            last_used_at: None,
            blacklisted: false,
        }
    }

    /// 未拉黑且成功率 > 0.8
    pub fn is_eligible(&self) -> bool {
        !self.blacklisted && self.success_rate > MIN_SUCCESS_RATE
    }

    /// rate = rate*0.9 + (success ? 0.1 : 0)
    pub fn record_outcome(&mut self, success: bool) -> f64 {
        let sample = if success { 1.0 - EMA_RETAIN } else { 0.0 };
        self.success_rate = (self.success_rate * EMA_RETAIN + sample).clamp(0.0, 1.0);
        self.success_rate
    }
}
