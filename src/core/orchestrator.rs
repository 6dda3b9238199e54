//! 编排器：指令入口
//!
//! submit_command 依次执行 解析 → 规划 → 并发注册 →（可选）自动启动；集群是否创建成功只取决于注册结果，
//! 会话建立在后台进行，失败只写入对应 Worker 的日志。

use std::sync::Arc;

use serde::Serialize;

use crate::command::CommandInterpreter;
use crate::core::{Disposition, ErrorPolicy, HiveError, RegistryError, SessionSupervisor};
use crate::fleet::{plan_fleet, WorkerFactory};
use crate::proxy::ProxyPool;
use crate::worker::{Transition, WorkerId, WorkerRegistry};

/// submit_command 的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    pub workers_created: usize,
    pub worker_ids: Vec<WorkerId>,
}

impl CommandOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            workers_created: 0,
            worker_ids: Vec::new(),
        }
    }
}

pub struct Orchestrator {
    interpreter: CommandInterpreter,
    registry: Arc<WorkerRegistry>,
    factory: WorkerFactory,
    supervisor: SessionSupervisor,
    policy: ErrorPolicy,
    auto_start: bool,
}

impl Orchestrator {
    pub(crate) fn new(
        registry: Arc<WorkerRegistry>,
        factory: WorkerFactory,
        supervisor: SessionSupervisor,
        auto_start: bool,
    ) -> Self {
        Self {
            interpreter: CommandInterpreter::new(),
            registry,
            factory,
            supervisor,
            policy: ErrorPolicy::new(),
            auto_start,
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        self.registry.pool()
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    /// 处理一条自然语言指令
    pub async fn submit_command(&self, command: &str) -> CommandOutcome {
        let task = match self.interpreter.interpret(command) {
            Ok(task) => task,
            Err(e) => {
                tracing::info!(command, error = %e, "Command rejected");
                return CommandOutcome::failure(e.to_string());
            }
        };
        tracing::info!(
            platform = %task.platform,
            action = %task.action,
            target = task.target_count,
            "Command interpreted"
        );

        let specs = plan_fleet(&task);
        let planned = specs.len();
        let realization = self.factory.realize(specs).await;

        if realization.created() == 0 {
            let reason = realization
                .skipped
                .first()
                .map(|(_, reason)| reason.clone())
                .unwrap_or_else(|| "no workers planned".to_string());
            tracing::warn!(planned, reason = %reason, "No workers created");
            return CommandOutcome::failure(format!("Command processing failed: {reason}"));
        }

        if self.auto_start {
            for id in &realization.worker_ids {
                if let Err(e) = self.start_worker(id).await {
                    // ConcurrencyLimit 等只记在 Worker 上，集群创建依旧成功
                    if self.policy.disposition(&e) != Disposition::LogOnWorker {
                        tracing::warn!(worker_id = %id, error = %e, "Auto start failed");
                    }
                }
            }
        }

        let created = realization.created();
        CommandOutcome {
            success: true,
            message: format!(
                "Command processed successfully. Created {created} of {planned} workers for the task."
            ),
            workers_created: created,
            worker_ids: realization.worker_ids,
        }
    }

    /// 启动 Worker 并在后台建立会话
    pub async fn start_worker(&self, id: &str) -> Result<bool, HiveError> {
        match self.registry.start(id).await? {
            Transition::Applied { epoch } => {
                self.supervisor.launch(id, epoch).await;
                Ok(true)
            }
            Transition::Unchanged => Ok(false),
        }
    }

    /// 先取消后台任务，再改注册表状态
    pub async fn stop_worker(&self, id: &str) -> Result<bool, HiveError> {
        self.supervisor.halt(id).await;
        Ok(matches!(
            self.registry.stop(id).await?,
            Transition::Applied { .. }
        ))
    }

    pub async fn pause_worker(&self, id: &str) -> Result<bool, HiveError> {
        self.supervisor.halt(id).await;
        Ok(matches!(
            self.registry.pause(id).await?,
            Transition::Applied { .. }
        ))
    }

    /// 手动轮换代理；返回新地址，池中无可用代理时为 None
    pub async fn rotate_proxy(&self, id: &str) -> Result<Option<String>, HiveError> {
        Ok(self.registry.rotate_proxy_for(id).await?)
    }

    /// 外部自动化层报告 Worker 出错
    pub async fn report_worker_error(&self, id: &str, reason: &str) -> Result<(), HiveError> {
        self.supervisor.halt(id).await;
        if self.registry.mark_error(id, reason).await {
            Ok(())
        } else {
            Err(RegistryError::UnknownWorker(id.to_string()).into())
        }
    }

    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        tracing::info!("Orchestrator shut down");
    }
}
