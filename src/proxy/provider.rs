//! 代理供应商：静态列表 / TOML 文件 / HTTP 接口
//!
//! 供应商只负责拉取候选列表；合并、拉黑与选择由 ProxyPool 负责。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::record::ProxyRecord;
use crate::config::ProxySection;
use crate::core::ProxyError;

/// 未给出延迟时的默认值（毫秒）
const DEFAULT_LATENCY_MS: u64 = 100;

#[async_trait]
pub trait ProxyProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProxyError>;
}

/// 固定列表
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    records: Vec<ProxyRecord>,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, records: Vec<ProxyRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// 由 host:port 列表构造，区域记为 static
    pub fn from_addresses(addresses: &[String]) -> Self {
        let records = addresses
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(|a| ProxyRecord::new(a, "static", DEFAULT_LATENCY_MS, 1.0))
            .collect();
        Self::new("static", records)
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new("static", Vec::new())
    }
}

#[async_trait]
impl ProxyProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProxyError> {
        Ok(self.records.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ProxyFile {
    #[serde(default)]
    proxies: Vec<ProxyFileEntry>,
}

#[derive(Debug, Deserialize)]
struct ProxyFileEntry {
    address: String,
    #[serde(default = "default_region")]
    region: String,
    #[serde(default = "default_latency_ms")]
    latency_ms: u64,
    #[serde(default = "default_file_success_rate")]
    success_rate: f64,
}

fn default_region() -> String {
    "unknown".to_string()
}

fn default_latency_ms() -> u64 {
    DEFAULT_LATENCY_MS
}

fn default_file_success_rate() -> f64 {
    1.0
}

/// 从 TOML 文件读取 `[[proxies]]` 列表，每次 fetch 重新读文件
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn error(&self, reason: impl ToString) -> ProxyError {
        ProxyError::Provider {
            provider: format!("file:{}", self.path.display()),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ProxyProvider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProxyError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        let file: ProxyFile = toml::from_str(&raw).map_err(|e| self.error(e))?;
        Ok(file
            .proxies
            .into_iter()
            .map(|p| ProxyRecord::new(p.address, p.region, p.latency_ms, p.success_rate))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ProxyListResponse {
    #[serde(default)]
    proxies: Vec<ProxyListEntry>,
}

#[derive(Debug, Deserialize)]
struct ProxyListEntry {
    ip: String,
    port: Option<u16>,
    country: Option<String>,
    city: Option<String>,
    response_time: Option<u64>,
    success_rate: Option<f64>,
}

impl ProxyListEntry {
    fn into_record(self) -> ProxyRecord {
        let address = match self.port {
            Some(port) => format!("{}:{}", self.ip, port),
            None => self.ip,
        };
        let region = match (self.country, self.city) {
            (Some(country), Some(city)) => format!("{}-{}", country, city),
            (Some(country), None) => country,
            (None, Some(city)) => city,
            (None, None) => default_region(),
        };
        ProxyRecord::new(
            address,
            region,
            self.response_time.unwrap_or(DEFAULT_LATENCY_MS),
            self.success_rate.unwrap_or(0.9),
        )
    }
}

/// 商业代理接口：GET endpoint，Bearer 认证，返回 `{"proxies":[...]}`
pub struct HttpProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// API Key 从环境变量读取
    pub fn from_env(endpoint: impl Into<String>, api_key_env: &str, timeout_secs: u64) -> Self {
        Self::new(endpoint, std::env::var(api_key_env).ok(), timeout_secs)
    }

    fn error(&self, reason: impl ToString) -> ProxyError {
        ProxyError::Provider {
            provider: format!("http:{}", self.endpoint),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ProxyProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProxyError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| self.error("missing API key"))?;

        let resp = self
            .client
            .get(&self.endpoint)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| self.error(e))?;
        if !resp.status().is_success() {
            return Err(self.error(format!("HTTP {}", resp.status())));
        }
        let body: ProxyListResponse = resp.json().await.map_err(|e| self.error(e))?;
        Ok(body.proxies.into_iter().map(ProxyListEntry::into_record).collect())
    }
}

/// 按 [proxy] 配置创建供应商
pub fn create_provider_from_config(
    section: &ProxySection,
) -> Result<Arc<dyn ProxyProvider>, ProxyError> {
    match section.provider.to_lowercase().as_str() {
        "static" => Ok(Arc::new(StaticProvider::from_addresses(&section.addresses))),
        "file" => {
            let path = section.file.clone().ok_or_else(|| ProxyError::Provider {
                provider: "file".to_string(),
                reason: "proxy.file is not set".to_string(),
            })?;
            Ok(Arc::new(FileProvider::new(path)))
        }
        "http" => {
            let endpoint = section.endpoint.clone().ok_or_else(|| ProxyError::Provider {
                provider: "http".to_string(),
                reason: "proxy.endpoint is not set".to_string(),
            })?;
            Ok(Arc::new(HttpProvider::from_env(
                endpoint,
                &section.api_key_env,
                section.probe_timeout_secs,
            )))
        }
        other => Err(ProxyError::Provider {
            provider: other.to_string(),
            reason: "unknown provider kind".to_string(),
        }),
    }
}
