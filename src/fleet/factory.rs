//! Worker 工厂：把规划好的 WorkerSpec 并发注册进注册表
//!
//! 单个注册失败只跳过该 Worker；成功注册的 Worker 追加创建日志与目标日志，可选分配首个代理。

use std::sync::Arc;

use futures_util::future::join_all;

use crate::config::FleetSection;
use crate::core::{ErrorPolicy, HiveError};
use crate::worker::{ActivityKind, WorkerId, WorkerRegistry, WorkerSpec};

/// 一次集群创建的结果
#[derive(Debug, Clone, Default)]
pub struct Realization {
    pub worker_ids: Vec<WorkerId>,
    /// 被跳过的 Worker 及原因
    pub skipped: Vec<(String, String)>,
}

impl Realization {
    pub fn created(&self) -> usize {
        self.worker_ids.len()
    }
}

pub struct WorkerFactory {
    registry: Arc<WorkerRegistry>,
    policy: ErrorPolicy,
    assign_proxy_on_create: bool,
}

impl WorkerFactory {
    pub fn new(registry: Arc<WorkerRegistry>, fleet: &FleetSection) -> Self {
        Self {
            registry,
            policy: ErrorPolicy::new(),
            assign_proxy_on_create: fleet.assign_proxy_on_create,
        }
    }

    /// 并发注册全部 spec，等待全部完成后返回成功的 ID（按 spec 顺序）
    pub async fn realize(&self, specs: Vec<WorkerSpec>) -> Realization {
        let registrations = specs.into_iter().map(|spec| self.register_one(spec));
        let results = join_all(registrations).await;

        let mut realization = Realization::default();
        for (name, result) in results {
            match result {
                Ok(id) => realization.worker_ids.push(id),
                Err(e) => {
                    if self.policy.is_fatal(&e) {
                        tracing::error!(name = %name, error = %e, "Worker registration failed");
                    } else {
                        tracing::warn!(name = %name, error = %e, "Worker skipped");
                    }
                    realization.skipped.push((name, e.to_string()));
                }
            }
        }
        tracing::info!(
            created = realization.created(),
            skipped = realization.skipped.len(),
            "Fleet realized"
        );
        realization
    }

    async fn register_one(&self, spec: WorkerSpec) -> (String, Result<WorkerId, HiveError>) {
        let name = spec.name.clone();
        let target_entry = format!("target = {} {} on {}", spec.share, spec.action, spec.platform);

        let id = match self.registry.create(spec).await {
            Ok(id) => id,
            Err(e) => return (name, Err(e.into())),
        };

        self.registry
            .log_activity(&id, ActivityKind::Create, "Bot created")
            .await;
        self.registry
            .log_activity(&id, ActivityKind::Config, target_entry)
            .await;

        if self.assign_proxy_on_create {
            // 无可用代理时注册表只记日志，不影响创建结果
            if let Err(e) = self.registry.rotate_proxy_for(&id).await {
                tracing::warn!(worker_id = %id, error = %e, "Initial proxy assignment failed");
            }
        }

        (name, Ok(id))
    }
}
