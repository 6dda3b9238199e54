//! 编排错误类型
//!
//! 每个组件一个 thiserror 枚举，HiveError 汇总；与 ErrorPolicy 配合决定错误是上报用户、跳过 Worker 还是仅记入 Worker 日志。

use thiserror::Error;

/// 指令解析失败：终止性错误，原样返回给调用方，不自动重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretationError {
    #[error("platform-not-identified")]
    PlatformNotIdentified,
}

/// 注册表拒绝创建 Worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Worker capacity exhausted ({limit} workers)")]
    CapacityExhausted { limit: usize },
}

/// 代理池相关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyError {
    /// 没有可用代理；可恢复，只记入受影响 Worker 的日志
    #[error("No healthy proxies available")]
    Unavailable,

    #[error("Unknown proxy: {0}")]
    UnknownProxy(String),

    #[error("Proxy provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("Latency probe via {address} failed: {reason}")]
    Probe { address: String, reason: String },
}

/// 外部自动化层（会话建立 / 动作执行）错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session setup failed: {0}")]
    SetupFailed(String),

    #[error("Session setup timed out after {0}s")]
    Timeout(u64),

    #[error("Action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },
}

/// Worker 状态流转错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Maximum concurrent operations reached ({limit})")]
    ConcurrencyLimit { limit: usize },

    /// 该运行代次已被 stop / pause / error 结束
    #[error("Worker {0} is no longer running in this run")]
    RunEnded(String),
}

/// 编排层统一错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HiveError {
    #[error(transparent)]
    Interpretation(#[from] InterpretationError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
