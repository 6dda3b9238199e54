//! 会话监管：每个运行中的 Worker 一个子 CancellationToken
//!
//! 启动时派生两个后台任务：会话建立（受信号量限流与超时约束）与周期性代理轮换；
//! 停止 / 暂停取消该 Worker 的 token，关闭时取消根 token。会话结果与周期轮换都带运行代次，
//! 代次失效后不再写入注册表，stop 总是优先。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::SessionSection;
use crate::core::{RegistryError, SessionError};
use crate::session::{establish_session, SessionBackend, SessionOptions};
use crate::worker::{WorkerId, WorkerRegistry};

/// 周期轮换的最长间隔
const MAX_ROTATION_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// 轮换频率（分钟）转为轮换周期，上限 MAX_ROTATION_PERIOD
fn rotation_period(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60)).min(MAX_ROTATION_PERIOD)
}

/// 某个 Worker 一轮运行的后台任务句柄
struct RunHandle {
    epoch: u64,
    token: CancellationToken,
}

pub struct SessionSupervisor {
    /// 关闭时触发，所有 Worker token 都是它的子 token
    cancel_token: CancellationToken,
    runs: Mutex<HashMap<WorkerId, RunHandle>>,
    setup_slots: Arc<Semaphore>,
    setup_timeout: Duration,
    registry: Arc<WorkerRegistry>,
    backend: Arc<dyn SessionBackend>,
}

impl SessionSupervisor {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        backend: Arc<dyn SessionBackend>,
        settings: &SessionSection,
    ) -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            runs: Mutex::new(HashMap::new()),
            setup_slots: Arc::new(Semaphore::new(settings.max_concurrent_setups.max(1))),
            setup_timeout: Duration::from_secs(settings.setup_timeout_secs.max(1)),
            registry,
            backend,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 为刚进入 running 的 Worker 派生会话建立与轮换任务；epoch 为 start 返回的运行代次。
    /// Worker 已不在该代次运行时什么也不做。
    pub async fn launch(&self, worker_id: &str, epoch: u64) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        let Some(worker) = self.registry.get(worker_id).await else {
            return;
        };
        if !worker.in_run(epoch) {
            tracing::debug!(worker_id, epoch, "Launch skipped: run already ended");
            return;
        }

        let token = self.cancel_token.child_token();
        if let Some(previous) = self.runs.lock().await.insert(
            worker_id.to_string(),
            RunHandle {
                epoch,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        // 复核与登记之间可能发生 stop：那时 halt 找不到句柄，由这里收尾
        if !self.registry.is_current_run(worker_id, epoch).await {
            self.release(worker_id, epoch).await;
            tracing::debug!(worker_id, epoch, "Launch aborted: run ended during launch");
            return;
        }

        let options = SessionOptions {
            proxy: worker.assigned_proxy.clone(),
            ..Default::default()
        };
        self.spawn_setup(
            worker_id.to_string(),
            epoch,
            options,
            worker.target_url.clone(),
            token.clone(),
        );

        let policy = &worker.proxy_policy;
        if policy.use_rotation && policy.rotation_frequency_minutes > 0 {
            self.spawn_rotation(
                worker_id.to_string(),
                epoch,
                rotation_period(policy.rotation_frequency_minutes),
                token,
            );
        }
    }

    /// 取消并移除 epoch 对应的句柄；更新一轮的句柄不受影响
    async fn release(&self, worker_id: &str, epoch: u64) {
        let mut runs = self.runs.lock().await;
        if runs.get(worker_id).is_some_and(|run| run.epoch == epoch) {
            if let Some(run) = runs.remove(worker_id) {
                run.token.cancel();
            }
        }
    }

    fn spawn_setup(
        &self,
        worker_id: WorkerId,
        epoch: u64,
        options: SessionOptions,
        target_url: Option<String>,
        token: CancellationToken,
    ) {
        let registry = self.registry.clone();
        let backend = self.backend.clone();
        let slots = self.setup_slots.clone();
        let timeout = self.setup_timeout;

        tokio::spawn(async move {
            let setup = async {
                let _permit = slots
                    .acquire_owned()
                    .await
                    .map_err(|_| SessionError::SetupFailed("supervisor closed".to_string()))?;
                establish_session(backend.as_ref(), &options, target_url.as_deref(), timeout).await
            };

            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(worker_id = %worker_id, "Session setup cancelled");
                }
                result = setup => match result {
                    Ok(session_id) => {
                        if registry.attach_session(&worker_id, epoch, session_id.clone()).await {
                            tracing::info!(worker_id = %worker_id, session_id = %session_id, "Session established");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(worker_id = %worker_id, error = %e, "Session setup failed");
                        registry
                            .note_session_failure(&worker_id, epoch, &e.to_string())
                            .await;
                    }
                },
            }
        });
    }

    fn spawn_rotation(
        &self,
        worker_id: WorkerId,
        epoch: u64,
        period: Duration,
        token: CancellationToken,
    ) {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match registry.rotate_proxy_in_run(&worker_id, epoch).await {
                            Ok(_) => {}
                            Err(RegistryError::RunEnded(_)) => {
                                tracing::debug!(worker_id = %worker_id, epoch, "Run ended, rotation stops");
                                break;
                            }
                            Err(e) => {
                                tracing::debug!(worker_id = %worker_id, error = %e, "Rotation stops");
                                break;
                            }
                        }
                    }
                }
            }
            tracing::debug!(worker_id = %worker_id, "Rotation loop stopped");
        });
    }

    /// 取消某个 Worker 的所有后台任务
    pub async fn halt(&self, worker_id: &str) -> bool {
        match self.runs.lock().await.remove(worker_id) {
            Some(run) => {
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn active_count(&self) -> usize {
        self.runs
            .lock()
            .await
            .values()
            .filter(|run| !run.token.is_cancelled())
            .count()
    }

    /// 取消全部后台任务
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.runs.lock().await.clear();
        self.setup_slots.close();
        tracing::info!("Session supervisor shut down");
    }
}
