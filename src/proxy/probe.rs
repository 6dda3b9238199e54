//! 延迟探测：经由代理请求探测地址并计时

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::core::ProxyError;

#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// 经由 address 发起一次请求，返回耗时（毫秒）
    async fn measure(&self, address: &str) -> Result<u64, ProxyError>;
}

/// 通过 reqwest 代理发 GET 请求计时
pub struct HttpLatencyProbe {
    probe_url: String,
    timeout: Duration,
}

impl HttpLatencyProbe {
    pub fn new(probe_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            probe_url: probe_url.into(),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }
}

impl Default for HttpLatencyProbe {
    fn default() -> Self {
        Self::new("https://api.ipify.org", 10)
    }
}

#[async_trait]
impl LatencyProbe for HttpLatencyProbe {
    async fn measure(&self, address: &str) -> Result<u64, ProxyError> {
        let probe_error = |reason: String| ProxyError::Probe {
            address: address.to_string(),
            reason,
        };

        let proxy = reqwest::Proxy::all(format!("http://{}", address))
            .map_err(|e| probe_error(e.to_string()))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()
            .map_err(|e| probe_error(e.to_string()))?;

        let started = Instant::now();
        let resp = client
            .get(&self.probe_url)
            .send()
            .await
            .map_err(|e| probe_error(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(probe_error(format!("HTTP {}", resp.status())));
        }
        Ok(started.elapsed().as_millis() as u64)
    }
}
