//! 集群层：规划 Worker 数量与规格，并发注册

pub mod factory;
pub mod planner;

pub use factory::{Realization, WorkerFactory};
pub use planner::{
    actions_per_worker, plan_fleet, plan_fleet_at, share_per_worker, worker_count, MAX_FLEET_SIZE,
};
