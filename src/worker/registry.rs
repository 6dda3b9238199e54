//! Worker 生命周期注册表
//!
//! 独占所有 Worker 记录：创建、启动 / 停止 / 暂停、部分更新配置、代理轮换、消耗上报与健康度推导；
//! 每条活动日志同时通过 broadcast 推送给订阅者（UI、测试）。未知 ID 的更新操作返回 false，不 panic。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use super::accounts::{AccountBook, AccountStatus, EmailAccount};
use super::health::HealthStatus;
use super::types::{
    ActivityEntry, ActivityKind, ConfigPatch, Consumption, ProxyPolicyPatch, ProxyStatus,
    SchedulePatch, Worker, WorkerEvent, WorkerFilter, WorkerId, WorkerSpec, WorkerStatus,
    WorkerView,
};
use crate::config::RegistrySection;
use crate::core::{AllocationError, RegistryError};
use crate::proxy::ProxyPool;

/// 注册表容量与日志设置
#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    pub max_workers: usize,
    pub max_running: usize,
    pub activity_log_cap: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&RegistrySection::default())
    }
}

impl From<&RegistrySection> for RegistrySettings {
    fn from(section: &RegistrySection) -> Self {
        Self {
            max_workers: section.max_workers,
            max_running: section.max_running,
            activity_log_cap: section.activity_log_cap,
        }
    }
}

/// 状态流转结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 状态已改变；epoch 为新的运行代次
    Applied { epoch: u64 },
    /// 当前状态下无需改变（幂等空操作）
    Unchanged,
}

#[derive(Default)]
struct RegistryState {
    workers: HashMap<WorkerId, Worker>,
    accounts: AccountBook,
}

pub struct WorkerRegistry {
    state: RwLock<RegistryState>,
    pool: Arc<ProxyPool>,
    settings: RegistrySettings,
    events: broadcast::Sender<WorkerEvent>,
}

impl WorkerRegistry {
    pub fn new(pool: Arc<ProxyPool>, settings: RegistrySettings) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(RegistryState::default()),
            pool,
            settings,
            events,
        }
    }

    /// 订阅活动日志事件
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn settings(&self) -> RegistrySettings {
        self.settings
    }

    fn emit(&self, worker: &Worker, entry: ActivityEntry) {
        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = self.events.send(WorkerEvent {
            worker_id: worker.id.clone(),
            status: worker.status,
            health_percentage: worker.health_percentage,
            entry,
        });
    }

    fn record(&self, worker: &mut Worker, kind: ActivityKind, description: impl Into<String>) {
        let entry = worker.record(kind, description, self.settings.activity_log_cap);
        self.emit(worker, entry);
    }

    /// 注册新 Worker 并分配 ID；容量已满时返回 AllocationError
    pub async fn create(&self, spec: WorkerSpec) -> Result<WorkerId, AllocationError> {
        let mut state = self.state.write().await;
        if state.workers.len() >= self.settings.max_workers {
            tracing::warn!(
                limit = self.settings.max_workers,
                name = %spec.name,
                "Worker registration refused: capacity exhausted"
            );
            return Err(AllocationError::CapacityExhausted {
                limit: self.settings.max_workers,
            });
        }

        let id = format!("worker_{}", uuid::Uuid::new_v4());
        let worker = Worker::from_spec(id.clone(), spec);
        tracing::info!(worker_id = %id, name = %worker.name, "Worker registered");
        state.workers.insert(id.clone(), worker);
        Ok(id)
    }

    /// 追加一条活动日志
    pub async fn log_activity(
        &self,
        id: &str,
        kind: ActivityKind,
        description: impl Into<String>,
    ) -> bool {
        let mut state = self.state.write().await;
        match state.workers.get_mut(id) {
            Some(worker) => {
                self.record(worker, kind, description);
                true
            }
            None => false,
        }
    }

    /// idle / paused / error → running；已在 running 时为空操作，不写日志
    pub async fn start(&self, id: &str) -> Result<Transition, RegistryError> {
        let mut state = self.state.write().await;
        let running = state
            .workers
            .values()
            .filter(|w| w.status == WorkerStatus::Running)
            .count();
        let worker = state
            .workers
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWorker(id.to_string()))?;

        if !worker.status.can_start() {
            return Ok(Transition::Unchanged);
        }
        if running >= self.settings.max_running {
            self.record(
                worker,
                ActivityKind::Error,
                "Cannot start worker: maximum concurrent operations reached",
            );
            return Err(RegistryError::ConcurrencyLimit {
                limit: self.settings.max_running,
            });
        }

        worker.status = WorkerStatus::Running;
        worker.run_epoch += 1;
        worker.last_active = Some(Utc::now());
        self.record(worker, ActivityKind::Start, "Worker started");
        tracing::info!(worker_id = %id, "Worker started");
        Ok(Transition::Applied {
            epoch: worker.run_epoch,
        })
    }

    /// running / paused → idle；其它状态为空操作
    pub async fn stop(&self, id: &str) -> Result<Transition, RegistryError> {
        self.halt(id, WorkerStatus::Idle).await
    }

    /// running → paused；其它状态为空操作
    pub async fn pause(&self, id: &str) -> Result<Transition, RegistryError> {
        self.halt(id, WorkerStatus::Paused).await
    }

    async fn halt(&self, id: &str, target: WorkerStatus) -> Result<Transition, RegistryError> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWorker(id.to_string()))?;

        let allowed = match target {
            WorkerStatus::Paused => worker.status == WorkerStatus::Running,
            _ => matches!(worker.status, WorkerStatus::Running | WorkerStatus::Paused),
        };
        if !allowed {
            return Ok(Transition::Unchanged);
        }

        worker.status = target;
        worker.run_epoch += 1;
        worker.session_id = None;
        let description = if target == WorkerStatus::Paused {
            "Worker paused"
        } else {
            "Worker stopped"
        };
        self.record(worker, ActivityKind::Stop, description);
        tracing::info!(worker_id = %id, status = ?target, "Worker halted");
        Ok(Transition::Applied {
            epoch: worker.run_epoch,
        })
    }

    /// 外部自动化层报告致命错误
    pub async fn mark_error(&self, id: &str, reason: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(id) else {
            return false;
        };
        worker.status = WorkerStatus::Error;
        worker.run_epoch += 1;
        worker.session_id = None;
        self.record(worker, ActivityKind::Error, format!("Worker encountered an error: {reason}"));
        tracing::warn!(worker_id = %id, reason, "Worker marked as error");
        true
    }

    pub async fn update_config(&self, id: &str, patch: ConfigPatch) -> bool {
        self.update(id, "Configuration updated", |w| patch.apply(&mut w.config))
            .await
    }

    pub async fn update_schedule(&self, id: &str, patch: SchedulePatch) -> bool {
        self.update(id, "Schedule updated", |w| patch.apply(&mut w.schedule))
            .await
    }

    pub async fn update_proxy_policy(&self, id: &str, patch: ProxyPolicyPatch) -> bool {
        self.update(id, "Proxy settings updated", |w| {
            patch.apply(&mut w.proxy_policy)
        })
        .await
    }

    async fn update(&self, id: &str, description: &str, apply: impl FnOnce(&mut Worker)) -> bool {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(id) else {
            tracing::debug!(worker_id = %id, "Update ignored: unknown worker");
            return false;
        };
        apply(worker);
        self.record(worker, ActivityKind::Config, description);
        true
    }

    /// 向代理池申请新地址；池中无可用代理时保留原分配并记录失败，Worker 状态不变
    pub async fn rotate_proxy_for(&self, id: &str) -> Result<Option<String>, RegistryError> {
        self.rotate_guarded(id, None).await
    }

    /// 后台周期轮换用：Worker 必须仍在 epoch 这一轮运行中，否则返回 RunEnded 且不触碰代理池
    pub async fn rotate_proxy_in_run(
        &self,
        id: &str,
        epoch: u64,
    ) -> Result<Option<String>, RegistryError> {
        self.rotate_guarded(id, Some(epoch)).await
    }

    /// 检查 Worker 是否仍处于 epoch 这一轮运行
    pub async fn is_current_run(&self, id: &str, epoch: u64) -> bool {
        self.state
            .read()
            .await
            .workers
            .get(id)
            .is_some_and(|w| w.in_run(epoch))
    }

    async fn rotate_guarded(
        &self,
        id: &str,
        epoch: Option<u64>,
    ) -> Result<Option<String>, RegistryError> {
        {
            let state = self.state.read().await;
            let worker = state
                .workers
                .get(id)
                .ok_or_else(|| RegistryError::UnknownWorker(id.to_string()))?;
            if epoch.is_some_and(|e| !worker.in_run(e)) {
                return Err(RegistryError::RunEnded(id.to_string()));
            }
        }

        // 不持有注册表锁等待代理池
        let selected = self.pool.rotate(id).await;

        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWorker(id.to_string()))?;
        // 等待代理池期间可能已被停止
        if epoch.is_some_and(|e| !worker.in_run(e)) {
            return Err(RegistryError::RunEnded(id.to_string()));
        }

        match selected {
            Some(address) => {
                worker.assigned_proxy = Some(address.clone());
                worker.proxy_status = ProxyStatus::Active;
                worker.refresh_health();
                self.record(worker, ActivityKind::IpRotation, format!("IP rotated to {address}"));
                Ok(Some(address))
            }
            None => {
                worker.proxy_status = ProxyStatus::Expired;
                worker.refresh_health();
                self.record(
                    worker,
                    ActivityKind::IpRotation,
                    "IP rotation failed - no healthy proxies available",
                );
                Ok(None)
            }
        }
    }

    /// 上报资源消耗并重新推导健康度
    pub async fn report_consumption(&self, id: &str, consumption: Consumption) -> bool {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(id) else {
            return false;
        };
        worker.consumption = consumption;
        worker.refresh_health();
        true
    }

    /// 会话建立成功；仅当 Worker 仍处于同一运行代次时生效（stop 总是优先）
    pub async fn attach_session(&self, id: &str, epoch: u64, session_id: String) -> bool {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(id) else {
            return false;
        };
        if !worker.in_run(epoch) {
            tracing::debug!(worker_id = %id, "Stale session result discarded");
            return false;
        }
        self.record(worker, ActivityKind::Action, format!("Session established ({session_id})"));
        worker.session_id = Some(session_id);
        true
    }

    /// 会话建立失败，只写入日志，不改变状态
    pub async fn note_session_failure(&self, id: &str, epoch: u64, reason: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(id) else {
            return false;
        };
        if worker.run_epoch != epoch {
            return false;
        }
        self.record(worker, ActivityKind::Error, format!("Session setup failed: {reason}"));
        true
    }

    pub async fn get(&self, id: &str) -> Option<Worker> {
        self.state.read().await.workers.get(id).cloned()
    }

    pub async fn view(&self, id: &str) -> Option<WorkerView> {
        self.state.read().await.workers.get(id).map(Worker::view)
    }

    /// 按创建时间排序的过滤列表
    pub async fn list(&self, filter: &WorkerFilter) -> Vec<WorkerView> {
        let state = self.state.read().await;
        let mut workers: Vec<&Worker> = state.workers.values().filter(|w| filter.matches(w)).collect();
        workers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        workers.into_iter().map(Worker::view).collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.workers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn running_count(&self) -> usize {
        self.state
            .read()
            .await
            .workers
            .values()
            .filter(|w| w.status == WorkerStatus::Running)
            .count()
    }

    /// 各健康档位的 Worker 数
    pub async fn health_stats(&self) -> HashMap<HealthStatus, usize> {
        let state = self.state.read().await;
        let mut stats = HashMap::new();
        for worker in state.workers.values() {
            *stats.entry(worker.health).or_insert(0) += 1;
        }
        stats
    }

    /// 非 error 状态的 Worker 占比（百分比）；空注册表视为 100
    pub async fn fleet_health(&self) -> u8 {
        let state = self.state.read().await;
        let total = state.workers.len();
        if total == 0 {
            return 100;
        }
        let errored = state
            .workers
            .values()
            .filter(|w| w.status == WorkerStatus::Error)
            .count();
        (((total - errored) as f64 / total as f64) * 100.0).round() as u8
    }

    pub async fn add_account(&self, email: &str) -> String {
        self.state.write().await.accounts.add(email)
    }

    pub async fn set_account_status(&self, account_id: &str, status: AccountStatus) -> bool {
        self.state.write().await.accounts.set_status(account_id, status)
    }

    /// 把邮箱账号分配给 Worker
    pub async fn assign_account(&self, account_id: &str, worker_id: &str) -> bool {
        let mut state = self.state.write().await;
        let RegistryState { workers, accounts } = &mut *state;
        let Some(worker) = workers.get_mut(worker_id) else {
            return false;
        };
        let Some(email) = accounts.assign(account_id, worker_id) else {
            return false;
        };
        worker.email_accounts.push(account_id.to_string());
        self.record(worker, ActivityKind::Account, format!("Email account {email} assigned to worker"));
        true
    }

    pub async fn release_account(&self, account_id: &str, worker_id: &str) -> bool {
        let mut state = self.state.write().await;
        let RegistryState { workers, accounts } = &mut *state;
        let Some(worker) = workers.get_mut(worker_id) else {
            return false;
        };
        let Some(email) = accounts.release(account_id, worker_id) else {
            return false;
        };
        worker.email_accounts.retain(|a| a != account_id);
        self.record(worker, ActivityKind::Account, format!("Email account {email} removed from worker"));
        true
    }

    /// 删除未被使用的账号
    pub async fn remove_account(&self, account_id: &str) -> bool {
        self.state.write().await.accounts.remove(account_id)
    }

    pub async fn accounts_for(&self, worker_id: &str) -> Vec<EmailAccount> {
        let state = self.state.read().await;
        let Some(worker) = state.workers.get(worker_id) else {
            return Vec::new();
        };
        worker
            .email_accounts
            .iter()
            .filter_map(|id| state.accounts.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Action, Platform};
    use crate::proxy::{HttpLatencyProbe, ProxyRecord, StaticProvider};
    use crate::worker::{ProxyPolicy, Schedule, WorkerConfig};

    fn spec(name: &str) -> WorkerSpec {
        WorkerSpec {
            name: name.to_string(),
            description: "test worker".to_string(),
            platform: Platform::Youtube,
            action: Action::View,
            share: 100,
            target_url: None,
            config: WorkerConfig::template(),
            schedule: Schedule::for_window(Utc::now(), 1.0),
            proxy_policy: ProxyPolicy::default(),
        }
    }

    async fn registry_with(records: Vec<ProxyRecord>, settings: RegistrySettings) -> WorkerRegistry {
        let pool = ProxyPool::new(
            Arc::new(StaticProvider::new("static", records)),
            Arc::new(HttpLatencyProbe::default()),
        );
        let _ = pool.load().await;
        WorkerRegistry::new(Arc::new(pool), settings)
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let a = registry.create(spec("a")).await.unwrap();
        let b = registry.create(spec("b")).await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("worker_"));
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.get(&a).await.unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_create_fails_when_capacity_exhausted() {
        let settings = RegistrySettings {
            max_workers: 1,
            ..Default::default()
        };
        let registry = registry_with(vec![], settings).await;
        registry.create(spec("a")).await.unwrap();
        assert_eq!(
            registry.create(spec("b")).await,
            Err(AllocationError::CapacityExhausted { limit: 1 })
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();

        assert!(matches!(registry.start(&id).await, Ok(Transition::Applied { .. })));
        let after_first = registry.get(&id).await.unwrap().activity.len();
        assert_eq!(registry.start(&id).await, Ok(Transition::Unchanged));

        let worker = registry.get(&id).await.unwrap();
        assert_eq!(worker.status, WorkerStatus::Running);
        assert_eq!(worker.activity.len(), after_first);
        let started = worker
            .activity
            .iter()
            .filter(|e| e.kind == ActivityKind::Start)
            .count();
        assert_eq!(started, 1);
        assert!(worker.last_active.is_some());
    }

    #[tokio::test]
    async fn test_stop_and_pause_transitions() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();

        assert_eq!(registry.stop(&id).await, Ok(Transition::Unchanged));
        assert_eq!(registry.pause(&id).await, Ok(Transition::Unchanged));

        registry.start(&id).await.unwrap();
        assert!(matches!(registry.pause(&id).await, Ok(Transition::Applied { .. })));
        assert_eq!(registry.get(&id).await.unwrap().status, WorkerStatus::Paused);

        assert!(matches!(registry.start(&id).await, Ok(Transition::Applied { .. })));
        assert!(matches!(registry.stop(&id).await, Ok(Transition::Applied { .. })));
        assert_eq!(registry.get(&id).await.unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_start_from_error() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();
        assert!(registry.mark_error(&id, "captcha wall").await);
        assert_eq!(registry.fleet_health().await, 0);
        assert!(matches!(registry.start(&id).await, Ok(Transition::Applied { .. })));
        assert_eq!(registry.fleet_health().await, 100);
    }

    #[tokio::test]
    async fn test_unknown_worker() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        assert_eq!(
            registry.start("nope").await,
            Err(RegistryError::UnknownWorker("nope".into()))
        );
        assert!(!registry.update_config("nope", ConfigPatch::default()).await);
        assert!(!registry.update_schedule("nope", SchedulePatch::default()).await);
        assert!(!registry.update_proxy_policy("nope", ProxyPolicyPatch::default()).await);
        assert!(registry.rotate_proxy_for("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let settings = RegistrySettings {
            max_running: 1,
            ..Default::default()
        };
        let registry = registry_with(vec![], settings).await;
        let a = registry.create(spec("a")).await.unwrap();
        let b = registry.create(spec("b")).await.unwrap();
        registry.start(&a).await.unwrap();
        assert_eq!(
            registry.start(&b).await,
            Err(RegistryError::ConcurrencyLimit { limit: 1 })
        );
        let worker = registry.get(&b).await.unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert!(worker
            .activity
            .iter()
            .any(|e| e.description.contains("maximum concurrent operations")));
    }

    #[tokio::test]
    async fn test_partial_config_update() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();
        let patch = ConfigPatch {
            behavior_profile: Some("Night Owl".into()),
            ..Default::default()
        };
        assert!(registry.update_config(&id, patch).await);
        let worker = registry.get(&id).await.unwrap();
        assert_eq!(worker.config.behavior_profile, "Night Owl");
        assert_eq!(worker.config.action_delay_range, (1500, 3000));

        let policy = ProxyPolicyPatch {
            rotation_frequency_minutes: Some(15),
            ..Default::default()
        };
        assert!(registry.update_proxy_policy(&id, policy).await);
        let worker = registry.get(&id).await.unwrap();
        assert_eq!(worker.proxy_policy.rotation_frequency_minutes, 15);
        assert!(worker.proxy_policy.use_rotation);
    }

    #[tokio::test]
    async fn test_rotation_without_proxies_keeps_assignment() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();
        registry.start(&id).await.unwrap();

        assert_eq!(registry.rotate_proxy_for(&id).await, Ok(None));
        let worker = registry.get(&id).await.unwrap();
        assert_eq!(worker.assigned_proxy, None);
        assert_eq!(worker.status, WorkerStatus::Running);
        assert_eq!(worker.proxy_status, ProxyStatus::Expired);
        assert_eq!(
            worker.activity.back().unwrap().description,
            "IP rotation failed - no healthy proxies available"
        );
    }

    #[tokio::test]
    async fn test_rotation_assigns_healthy_proxy() {
        let registry = registry_with(
            vec![ProxyRecord::new("10.0.0.1:8080", "us", 50, 0.95)],
            RegistrySettings::default(),
        )
        .await;
        let id = registry.create(spec("a")).await.unwrap();
        assert_eq!(
            registry.rotate_proxy_for(&id).await,
            Ok(Some("10.0.0.1:8080".to_string()))
        );
        let worker = registry.get(&id).await.unwrap();
        assert_eq!(worker.assigned_proxy.as_deref(), Some("10.0.0.1:8080"));
        assert_eq!(worker.proxy_status, ProxyStatus::Active);
    }

    #[tokio::test]
    async fn test_run_rotation_refused_after_stop() {
        let registry = registry_with(
            vec![ProxyRecord::new("10.0.0.1:8080", "us", 50, 0.95)],
            RegistrySettings::default(),
        )
        .await;
        let id = registry.create(spec("a")).await.unwrap();
        let Transition::Applied { epoch } = registry.start(&id).await.unwrap() else {
            panic!("expected start to apply");
        };
        assert!(registry.is_current_run(&id, epoch).await);
        assert_eq!(
            registry.rotate_proxy_in_run(&id, epoch).await,
            Ok(Some("10.0.0.1:8080".to_string()))
        );

        registry.stop(&id).await.unwrap();
        let entries = registry.get(&id).await.unwrap().activity.len();
        assert!(!registry.is_current_run(&id, epoch).await);
        assert_eq!(
            registry.rotate_proxy_in_run(&id, epoch).await,
            Err(RegistryError::RunEnded(id.clone()))
        );
        assert_eq!(registry.get(&id).await.unwrap().activity.len(), entries);

        // 重新启动后旧代次依旧无效
        registry.start(&id).await.unwrap();
        assert!(registry.rotate_proxy_in_run(&id, epoch).await.is_err());
    }

    #[tokio::test]
    async fn test_health_follows_consumption() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();
        let heavy = Consumption {
            cpu: 95.0,
            quota: 90.0,
            ..Default::default()
        };
        assert!(registry.report_consumption(&id, heavy).await);
        let worker = registry.get(&id).await.unwrap();
        assert_eq!(worker.health, HealthStatus::Critical);
        assert_eq!(registry.health_stats().await.get(&HealthStatus::Critical), Some(&1));
    }

    #[tokio::test]
    async fn test_stale_session_is_discarded() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();
        let Transition::Applied { epoch } = registry.start(&id).await.unwrap() else {
            panic!("expected start to apply");
        };
        registry.stop(&id).await.unwrap();
        assert!(!registry.attach_session(&id, epoch, "sess-1".into()).await);
        assert!(registry.get(&id).await.unwrap().session_id.is_none());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let mut rx = registry.subscribe();
        let id = registry.create(spec("a")).await.unwrap();
        registry.start(&id).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.worker_id, id);
        assert_eq!(event.entry.kind, ActivityKind::Start);
        assert_eq!(event.status, WorkerStatus::Running);
    }

    #[tokio::test]
    async fn test_account_assignment() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let id = registry.create(spec("a")).await.unwrap();
        let account = registry.add_account("user1@example.com").await;

        assert!(registry.assign_account(&account, &id).await);
        assert_eq!(registry.accounts_for(&id).await.len(), 1);
        assert!(!registry.remove_account(&account).await);

        assert!(registry.release_account(&account, &id).await);
        assert!(registry.accounts_for(&id).await.is_empty());
        assert!(registry.remove_account(&account).await);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let registry = registry_with(vec![], RegistrySettings::default()).await;
        let a = registry.create(spec("YouTube Viewer Bot #1/2")).await.unwrap();
        registry.create(spec("YouTube Viewer Bot #2/2")).await.unwrap();
        registry.start(&a).await.unwrap();

        let running = WorkerFilter {
            statuses: vec![WorkerStatus::Running],
            ..Default::default()
        };
        let views = registry.list(&running).await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, a);
        assert_eq!(registry.list(&WorkerFilter::default()).await.len(), 2);
        assert_eq!(registry.running_count().await, 1);
    }
}
