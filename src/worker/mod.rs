//! Worker 模型与生命周期注册表

pub mod accounts;
pub mod health;
pub mod registry;
pub mod types;

pub use accounts::{AccountBook, AccountStatus, EmailAccount};
pub use health::{derive_health, HealthStatus};
pub use registry::{RegistrySettings, Transition, WorkerRegistry};
pub use types::{
    ActivityEntry, ActivityKind, ConfigPatch, Consumption, MouseMovement, ProxyPolicy,
    ProxyPolicyPatch, ProxyStatus, Schedule, SchedulePatch, ScrollStyle, Worker, WorkerConfig,
    WorkerEvent, WorkerFilter, WorkerId, WorkerSpec, WorkerStatus, WorkerView, ALL_WEEKDAYS,
    DEFAULT_PROXY_PROVIDER, DEFAULT_PROXY_REGIONS,
};
