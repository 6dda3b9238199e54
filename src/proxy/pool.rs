//! 代理池：加载、健康代理选择、成功率 EMA、黑名单、延迟探测
//!
//! 选择规则：在未拉黑且成功率 > 0.8 的代理中取延迟最低者，延迟相同取最久未用者（从未使用最优先），
//! 再相同按地址排序；选中后更新 last_used_at。黑名单独立于记录保存，重新加载后依旧生效。
//!
//! 锁：地址表读写锁只在加载 / 插入时取写锁；每条记录各自一把互斥锁，EMA 与黑名单更新按记录原子进行。
//! 加锁顺序固定为 地址表 → 黑名单集合 → 记录。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use super::probe::LatencyProbe;
use super::provider::ProxyProvider;
use super::record::ProxyRecord;
use crate::core::ProxyError;

/// 自定义代理的初始延迟（毫秒）
const CUSTOM_PROXY_LATENCY_MS: u64 = 100;

type RecordMap = HashMap<String, Arc<Mutex<ProxyRecord>>>;

pub struct ProxyPool {
    records: RwLock<RecordMap>,
    banned: RwLock<HashSet<String>>,
    provider: RwLock<Arc<dyn ProxyProvider>>,
    probe: Arc<dyn LatencyProbe>,
}

impl ProxyPool {
    pub fn new(provider: Arc<dyn ProxyProvider>, probe: Arc<dyn LatencyProbe>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            banned: RwLock::new(HashSet::new()),
            provider: RwLock::new(provider),
            probe,
        }
    }

    pub async fn provider_name(&self) -> String {
        self.provider.read().await.name().to_string()
    }

    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProxyError> {
        let provider = self.provider.read().await.clone();
        match provider.fetch().await {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "Proxy provider fetch failed, pool unchanged");
                Err(e)
            }
        }
    }

    async fn record(&self, address: &str) -> Option<Arc<Mutex<ProxyRecord>>> {
        self.records.read().await.get(address).cloned()
    }

    /// 从供应商拉取并合并：已有代理保留成功率、最近使用时间
    pub async fn load(&self) -> Result<usize, ProxyError> {
        let fetched = self.fetch().await?;
        let mut records = self.records.write().await;
        let banned = self.banned.read().await;
        for mut incoming in fetched {
            incoming.blacklisted = banned.contains(&incoming.address);
            match records.get(&incoming.address) {
                Some(existing) => {
                    let mut existing = existing.lock().await;
                    existing.region = incoming.region;
                    existing.latency_ms = incoming.latency_ms;
                    existing.blacklisted = incoming.blacklisted;
                }
                None => {
                    records.insert(incoming.address.clone(), Arc::new(Mutex::new(incoming)));
                }
            }
        }
        tracing::info!(total = records.len(), "Proxy pool loaded");
        Ok(records.len())
    }

    /// 从供应商拉取并整体替换；黑名单保留
    pub async fn reload(&self) -> Result<usize, ProxyError> {
        let fetched = self.fetch().await?;
        let mut records = self.records.write().await;
        let banned = self.banned.read().await;
        *records = fetched
            .into_iter()
            .map(|mut r| {
                r.blacklisted = banned.contains(&r.address);
                (r.address.clone(), Arc::new(Mutex::new(r)))
            })
            .collect();
        tracing::info!(total = records.len(), "Proxy pool reloaded");
        Ok(records.len())
    }

    /// 切换供应商并立即重新加载
    pub async fn set_provider(&self, provider: Arc<dyn ProxyProvider>) -> Result<usize, ProxyError> {
        tracing::info!(provider = provider.name(), "Switching proxy provider");
        *self.provider.write().await = provider;
        self.reload().await
    }

    /// 插入或覆盖单条记录
    pub async fn insert(&self, mut record: ProxyRecord) {
        let mut records = self.records.write().await;
        record.blacklisted = self.banned.read().await.contains(&record.address);
        records.insert(record.address.clone(), Arc::new(Mutex::new(record)));
    }

    /// 添加用户自定义代理，返回地址
    pub async fn add_custom_proxy(&self, host: &str, port: u16) -> String {
        let address = format!("{}:{}", host.trim(), port);
        self.insert(ProxyRecord::new(
            address.clone(),
            "custom",
            CUSTOM_PROXY_LATENCY_MS,
            1.0,
        ))
        .await;
        tracing::info!(address = %address, "Custom proxy added");
        address
    }

    /// 选出当前最优的健康代理并标记使用时间；无可用代理返回 None。
    /// 池为空时先尝试从供应商加载一次。
    pub async fn select_healthy(&self) -> Option<String> {
        if self.is_empty().await {
            tracing::debug!("Proxy pool empty, loading from provider");
            // 失败已在 fetch 中记录，池保持为空
            let _ = self.load().await;
        }

        let records = self.records.read().await;
        let mut candidates = Vec::new();
        for (address, record) in records.iter() {
            let record = record.lock().await;
            if record.is_eligible() {
                candidates.push((record.latency_ms, record.last_used_at, address.clone()));
            }
        }
        candidates.sort();

        // 排序后到加锁前记录可能被并发拉黑或降级，逐个复核
        for (_, _, address) in candidates {
            let Some(record) = records.get(&address) else {
                continue;
            };
            let mut record = record.lock().await;
            if record.is_eligible() {
                record.last_used_at = Some(Utc::now());
                return Some(address);
            }
        }
        None
    }

    /// 为某个 Worker 轮换代理
    pub async fn rotate(&self, worker_id: &str) -> Option<String> {
        match self.select_healthy().await {
            Some(address) => {
                tracing::info!(worker_id, address = %address, "Proxy rotated");
                Some(address)
            }
            None => {
                tracing::warn!(worker_id, "{}", ProxyError::Unavailable);
                None
            }
        }
    }

    /// 记录一次使用结果，返回新的成功率
    pub async fn update_success_rate(&self, address: &str, success: bool) -> Result<f64, ProxyError> {
        let record = self
            .record(address)
            .await
            .ok_or_else(|| ProxyError::UnknownProxy(address.to_string()))?;
        let rate = record.lock().await.record_outcome(success);
        Ok(rate)
    }

    /// 拉黑地址；地址不在池中时也会记住，之后加载时生效
    pub async fn blacklist(&self, address: &str) {
        self.banned.write().await.insert(address.to_string());
        if let Some(record) = self.record(address).await {
            record.lock().await.blacklisted = true;
        }
        tracing::info!(address, "Proxy blacklisted");
    }

    pub async fn unblacklist(&self, address: &str) -> bool {
        let removed = self.banned.write().await.remove(address);
        if let Some(record) = self.record(address).await {
            record.lock().await.blacklisted = false;
        }
        removed
    }

    pub async fn clear_blacklist(&self) {
        self.banned.write().await.clear();
        let records = self.records.read().await;
        for record in records.values() {
            record.lock().await.blacklisted = false;
        }
    }

    /// 经由代理探测延迟；成功只更新延迟，失败记一次失败样本
    pub async fn test_latency(&self, address: &str) -> Result<u64, ProxyError> {
        let record = self
            .record(address)
            .await
            .ok_or_else(|| ProxyError::UnknownProxy(address.to_string()))?;

        // 探测期间不持有锁
        let measured = self.probe.measure(address).await;

        let mut record = record.lock().await;
        match measured {
            Ok(latency_ms) => {
                record.latency_ms = latency_ms;
                Ok(latency_ms)
            }
            Err(e) => {
                record.record_outcome(false);
                tracing::debug!(address, error = %e, "Latency probe failed");
                Err(e)
            }
        }
    }

    pub async fn get(&self, address: &str) -> Option<ProxyRecord> {
        let record = self.record(address).await?;
        let snapshot = record.lock().await.clone();
        Some(snapshot)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn healthy_count(&self) -> usize {
        let records = self.records.read().await;
        let mut count = 0;
        for record in records.values() {
            if record.lock().await.is_eligible() {
                count += 1;
            }
        }
        count
    }

    pub async fn blacklisted_count(&self) -> usize {
        self.banned.read().await.len()
    }

    /// 按地址排序的全量快照
    pub async fn snapshot(&self) -> Vec<ProxyRecord> {
        let records = self.records.read().await;
        let mut out = Vec::with_capacity(records.len());
        for record in records.values() {
            out.push(record.lock().await.clone());
        }
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::provider::StaticProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FixedProbe(Result<u64, ()>);

    #[async_trait]
    impl LatencyProbe for FixedProbe {
        async fn measure(&self, address: &str) -> Result<u64, ProxyError> {
            self.0.map_err(|_| ProxyError::Probe {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    /// 前 down_calls 次失败，之后恢复的供应商
    struct RecoveringProvider {
        records: Vec<ProxyRecord>,
        down_calls: AtomicUsize,
    }

    #[async_trait]
    impl ProxyProvider for RecoveringProvider {
        fn name(&self) -> &str {
            "recovering"
        }

        async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProxyError> {
            let remaining = self.down_calls.load(Ordering::SeqCst);
            if remaining > 0 {
                self.down_calls.store(remaining - 1, Ordering::SeqCst);
                return Err(ProxyError::Provider {
                    provider: "recovering".into(),
                    reason: "connection refused".into(),
                });
            }
            Ok(self.records.clone())
        }
    }

    /// 第一次成功，之后失败的供应商
    struct FlakyProvider {
        records: Vec<ProxyRecord>,
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl ProxyProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProxyError> {
            if self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(ProxyError::Provider {
                    provider: "flaky".into(),
                    reason: "503".into(),
                });
            }
            Ok(self.records.clone())
        }
    }

    fn pool_of(records: Vec<ProxyRecord>) -> ProxyPool {
        ProxyPool::new(
            Arc::new(StaticProvider::new("static", records)),
            Arc::new(FixedProbe(Ok(42))),
        )
    }

    #[tokio::test]
    async fn test_selects_lowest_latency_eligible() {
        let pool = pool_of(vec![
            ProxyRecord::new("p1:80", "us", 50, 0.95),
            ProxyRecord::new("p2:80", "us", 30, 0.75),
            ProxyRecord::new("p3:80", "uk", 80, 0.90),
        ]);
        pool.load().await.unwrap();
        assert_eq!(pool.select_healthy().await.as_deref(), Some("p1:80"));

        pool.blacklist("p1:80").await;
        assert_eq!(pool.select_healthy().await.as_deref(), Some("p3:80"));
    }

    #[tokio::test]
    async fn test_never_selects_ineligible() {
        let pool = pool_of(vec![
            ProxyRecord::new("low:80", "us", 1, 0.5),
            ProxyRecord::new("edge:80", "us", 2, 0.8),
        ]);
        pool.load().await.unwrap();
        pool.insert(ProxyRecord::new("banned:80", "us", 0, 1.0)).await;
        pool.blacklist("banned:80").await;

        for _ in 0..5 {
            assert_eq!(pool.select_healthy().await, None);
        }
        assert_eq!(pool.rotate("worker_x").await, None);
        assert_eq!(pool.healthy_count().await, 0);
    }

    #[tokio::test]
    async fn test_equal_latency_prefers_least_recently_used() {
        let pool = pool_of(vec![
            ProxyRecord::new("a:80", "us", 40, 0.95),
            ProxyRecord::new("b:80", "us", 40, 0.95),
        ]);
        pool.load().await.unwrap();

        let first = pool.select_healthy().await.unwrap();
        let second = pool.select_healthy().await.unwrap();
        let third = pool.select_healthy().await.unwrap();
        assert_eq!(first, "a:80");
        assert_eq!(second, "b:80");
        assert_eq!(third, "a:80");
    }

    #[tokio::test]
    async fn test_failures_lower_rate_until_ineligible() {
        let pool = pool_of(vec![ProxyRecord::new("p:80", "us", 40, 0.95)]);
        pool.load().await.unwrap();
        let before = pool.get("p:80").await.unwrap().success_rate;
        let after = pool.update_success_rate("p:80", false).await.unwrap();
        assert!(after < before);
        assert_eq!(pool.select_healthy().await.as_deref(), Some("p:80"));

        pool.update_success_rate("p:80", false).await.unwrap();
        assert_eq!(pool.select_healthy().await, None);
        assert!(matches!(
            pool.update_success_rate("missing:80", true).await,
            Err(ProxyError::UnknownProxy(_))
        ));
    }

    #[tokio::test]
    async fn test_prefers_lower_latency_over_higher_rate() {
        let pool = pool_of(vec![
            ProxyRecord::new("a:80", "us", 50, 0.90),
            ProxyRecord::new("b:80", "us", 80, 0.95),
        ]);
        pool.load().await.unwrap();
        assert_eq!(pool.select_healthy().await.as_deref(), Some("a:80"));
    }

    #[tokio::test]
    async fn test_provider_error_leaves_pool_unchanged() {
        let pool = ProxyPool::new(
            Arc::new(FlakyProvider {
                records: vec![ProxyRecord::new("p:80", "us", 40, 0.95)],
                failed_once: AtomicBool::new(false),
            }),
            Arc::new(FixedProbe(Ok(1))),
        );
        assert_eq!(pool.load().await, Ok(1));
        assert!(pool.reload().await.is_err());
        assert_eq!(pool.len().await, 1);
        assert_eq!(pool.select_healthy().await.as_deref(), Some("p:80"));
    }

    #[tokio::test]
    async fn test_blacklist_survives_reload() {
        let pool = pool_of(vec![ProxyRecord::new("p:80", "us", 40, 0.95)]);
        pool.load().await.unwrap();
        pool.blacklist("p:80").await;
        pool.reload().await.unwrap();
        assert!(pool.get("p:80").await.unwrap().blacklisted);
        assert_eq!(pool.select_healthy().await, None);

        pool.clear_blacklist().await;
        assert_eq!(pool.select_healthy().await.as_deref(), Some("p:80"));
    }

    #[tokio::test]
    async fn test_load_merges_and_keeps_rate() {
        let pool = pool_of(vec![ProxyRecord::new("p:80", "us", 40, 0.95)]);
        pool.load().await.unwrap();
        pool.update_success_rate("p:80", false).await.unwrap();
        let degraded = pool.get("p:80").await.unwrap().success_rate;
        pool.load().await.unwrap();
        assert_eq!(pool.get("p:80").await.unwrap().success_rate, degraded);

        pool.reload().await.unwrap();
        assert_eq!(pool.get("p:80").await.unwrap().success_rate, 0.95);
    }

    #[tokio::test]
    async fn test_set_provider_replaces_records() {
        let pool = pool_of(vec![ProxyRecord::new("old:80", "us", 40, 0.95)]);
        pool.load().await.unwrap();
        let count = pool
            .set_provider(Arc::new(StaticProvider::new(
                "second",
                vec![ProxyRecord::new("new:80", "ca", 20, 0.99)],
            )))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(pool.provider_name().await, "second");
        assert!(pool.get("old:80").await.is_none());
    }

    #[tokio::test]
    async fn test_custom_proxy_is_selectable() {
        let pool = pool_of(vec![]);
        let address = pool.add_custom_proxy("192.168.1.10", 3128).await;
        assert_eq!(address, "192.168.1.10:3128");
        let record = pool.get(&address).await.unwrap();
        assert_eq!(record.region, "custom");
        assert_eq!(pool.select_healthy().await, Some(address));
    }

    #[tokio::test]
    async fn test_latency_probe_updates_record() {
        let pool = pool_of(vec![ProxyRecord::new("p:80", "us", 400, 0.9)]);
        pool.load().await.unwrap();
        assert_eq!(pool.test_latency("p:80").await, Ok(42));
        assert_eq!(pool.get("p:80").await.unwrap().latency_ms, 42);
        assert!(matches!(
            pool.test_latency("missing:80").await,
            Err(ProxyError::UnknownProxy(_))
        ));
    }

    #[tokio::test]
    async fn test_successful_probe_keeps_success_rate() {
        let pool = pool_of(vec![ProxyRecord::new("p:80", "us", 400, 0.79)]);
        pool.load().await.unwrap();
        assert_eq!(pool.select_healthy().await, None);

        assert_eq!(pool.test_latency("p:80").await, Ok(42));
        let record = pool.get("p:80").await.unwrap();
        assert_eq!(record.success_rate, 0.79);
        assert_eq!(record.latency_ms, 42);
        // 探测成功不会把不合格代理拉回轮换
        assert_eq!(pool.select_healthy().await, None);
    }

    #[tokio::test]
    async fn test_failed_probe_records_failure() {
        let pool = ProxyPool::new(
            Arc::new(StaticProvider::new(
                "static",
                vec![ProxyRecord::new("p:80", "us", 40, 0.9)],
            )),
            Arc::new(FixedProbe(Err(()))),
        );
        pool.load().await.unwrap();
        assert!(matches!(
            pool.test_latency("p:80").await,
            Err(ProxyError::Probe { .. })
        ));
        let record = pool.get("p:80").await.unwrap();
        assert!(record.success_rate < 0.9);
        assert_eq!(record.latency_ms, 40);
    }

    #[tokio::test]
    async fn test_concurrent_selection_is_safe() {
        let pool = Arc::new(pool_of(
            (0..4)
                .map(|i| ProxyRecord::new(format!("p{}:80", i), "us", 10, 0.95))
                .collect(),
        ));
        pool.load().await.unwrap();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.select_healthy().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_empty_pool_loads_once_provider_recovers() {
        let pool = ProxyPool::new(
            Arc::new(RecoveringProvider {
                records: vec![ProxyRecord::new("p:80", "us", 40, 0.95)],
                down_calls: AtomicUsize::new(2),
            }),
            Arc::new(FixedProbe(Ok(1))),
        );
        // 启动时供应商不可用
        assert!(pool.load().await.is_err());
        assert!(pool.is_empty().await);
        assert_eq!(pool.rotate("worker_a").await, None);

        assert_eq!(pool.rotate("worker_a").await.as_deref(), Some("p:80"));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_rate_updates_are_not_lost() {
        let pool = Arc::new(pool_of(vec![ProxyRecord::new("p:80", "us", 10, 1.0)]));
        pool.load().await.unwrap();
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.update_success_rate("p:80", false).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        // 每次失败都乘以 0.9，丢失任何一次更新都会让结果偏大
        let rate = pool.get("p:80").await.unwrap().success_rate;
        assert!((rate - 0.9f64.powi(50)).abs() < 1e-12);
    }
}
