//! 集群规划：由 Task 计算 Worker 数量、分摊目标并生成 WorkerSpec
//!
//! 纯函数，不触碰注册表；数量上限 5 是固定常量，不随配置变化。

use chrono::{DateTime, Utc};

use crate::command::{Action, Task};
use crate::worker::{ProxyPolicy, Schedule, WorkerConfig, WorkerSpec};

/// 单个集群的 Worker 上限
pub const MAX_FLEET_SIZE: u64 = 5;

/// 每个 Worker 负责的动作数
pub fn actions_per_worker(action: Action) -> u64 {
    match action {
        Action::Comment => 50,
        _ => 200,
    }
}

/// clamp(ceil(target / actions_per_worker), 1, 5)
pub fn worker_count(action: Action, target_count: u64) -> u64 {
    target_count
        .div_ceil(actions_per_worker(action))
        .clamp(1, MAX_FLEET_SIZE)
}

/// 每个 Worker 分摊的目标数（仅用于描述与日志）
pub fn share_per_worker(target_count: u64, count: u64) -> u64 {
    target_count.div_ceil(count.max(1))
}

fn worker_name(task: &Task, index: u64, total: u64) -> String {
    let base = format!(
        "{} {} Bot",
        task.platform.display_name(),
        task.action.noun()
    );
    if total > 1 {
        format!("{} #{}/{}", base, index, total)
    } else {
        base
    }
}

pub fn plan_fleet(task: &Task) -> Vec<WorkerSpec> {
    plan_fleet_at(task, Utc::now())
}

/// 以 now 作为日程起点生成 WorkerSpec 列表
pub fn plan_fleet_at(task: &Task, now: DateTime<Utc>) -> Vec<WorkerSpec> {
    let total = worker_count(task.action, task.target_count);
    let share = share_per_worker(task.target_count, total);
    let description = match &task.target_url {
        Some(url) => format!(
            "Automated {} worker for {} targeting {}",
            task.action,
            task.platform.display_name(),
            url
        ),
        None => format!(
            "Automated {} worker for {}",
            task.action,
            task.platform.display_name()
        ),
    };

    (1..=total)
        .map(|i| WorkerSpec {
            name: worker_name(task, i, total),
            description: description.clone(),
            platform: task.platform,
            action: task.action,
            share,
            target_url: task.target_url.clone(),
            config: WorkerConfig::template(),
            schedule: Schedule::for_window(now, task.estimated_duration_hours),
            proxy_policy: ProxyPolicy::default(),
        })
        .collect()
}
