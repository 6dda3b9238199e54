//! 编排器构建器：按配置装配代理池、注册表、工厂与会话监管
//!
//! 供应商 / 探测 / 自动化后端都可注入，未注入时按配置创建默认实现。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{load_config, AppConfig};
use crate::core::{HiveError, Orchestrator, SessionSupervisor};
use crate::fleet::WorkerFactory;
use crate::proxy::{create_provider_from_config, HttpLatencyProbe, LatencyProbe, ProxyPool, ProxyProvider};
use crate::session::{NoopSessionBackend, SessionBackend};
use crate::worker::{RegistrySettings, WorkerRegistry};

pub struct OrchestratorBuilder {
    config: AppConfig,
    provider: Option<Arc<dyn ProxyProvider>>,
    probe: Option<Arc<dyn LatencyProbe>>,
    backend: Option<Arc<dyn SessionBackend>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            provider: None,
            probe: None,
            backend: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ProxyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn LatencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 装配编排器；load_on_start 时立即加载代理，加载失败只记录警告
    pub async fn build(self) -> Result<Orchestrator, HiveError> {
        let provider = match self.provider {
            Some(provider) => provider,
            None => create_provider_from_config(&self.config.proxy)?,
        };
        let probe = self.probe.unwrap_or_else(|| {
            Arc::new(HttpLatencyProbe::new(
                self.config.proxy.probe_url.clone(),
                self.config.proxy.probe_timeout_secs,
            ))
        });
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(NoopSessionBackend::new()));

        let pool = Arc::new(ProxyPool::new(provider, probe));
        if self.config.proxy.load_on_start {
            let provider = pool.provider_name().await;
            match pool.load().await {
                Ok(n) => tracing::info!(proxies = n, provider = %provider, "Proxy pool ready"),
                Err(e) => tracing::warn!(provider = %provider, error = %e, "Proxy pool starts empty"),
            }
        }

        let registry = Arc::new(WorkerRegistry::new(
            pool,
            RegistrySettings::from(&self.config.registry),
        ));
        let factory = WorkerFactory::new(registry.clone(), &self.config.fleet);
        let supervisor = SessionSupervisor::new(registry.clone(), backend, &self.config.session);

        tracing::info!(
            backend = supervisor.backend_name(),
            max_workers = self.config.registry.max_workers,
            "Orchestrator built"
        );
        Ok(Orchestrator::new(
            registry,
            factory,
            supervisor,
            self.config.fleet.auto_start,
        ))
    }
}

/// 便捷函数：从默认路径加载配置并创建构建器
pub fn create_orchestrator_builder(config_path: Option<PathBuf>) -> OrchestratorBuilder {
    let config = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    OrchestratorBuilder::new(config)
}
