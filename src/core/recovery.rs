//! 错误处置策略
//!
//! 根据 HiveError 类型返回 Disposition，供 Worker 工厂与编排器决定是整体失败、跳过单个 Worker，还是只写入该 Worker 的活动日志。

use crate::core::{HiveError, ProxyError, RegistryError};

/// 错误的处置方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 整条指令失败，原样提示用户，不重试
    SurfaceToUser,
    /// 跳过当前 Worker，集群其余部分继续
    SkipWorker,
    /// 仅记入对应 Worker 的活动日志，不改变其状态
    LogOnWorker,
}

/// 错误传播策略：单个 Worker 的错误不会中止兄弟 Worker 或整条指令
#[derive(Debug, Default)]
pub struct ErrorPolicy;

impl ErrorPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn disposition(&self, err: &HiveError) -> Disposition {
        match err {
            HiveError::Interpretation(_) => Disposition::SurfaceToUser,
            HiveError::Allocation(_) => Disposition::SkipWorker,
            HiveError::Proxy(ProxyError::UnknownProxy(_)) => Disposition::SurfaceToUser,
            HiveError::Proxy(_) => Disposition::LogOnWorker,
            HiveError::Session(_) => Disposition::LogOnWorker,
            HiveError::Registry(RegistryError::UnknownWorker(_)) => Disposition::SurfaceToUser,
            HiveError::Registry(RegistryError::ConcurrencyLimit { .. }) => Disposition::LogOnWorker,
            HiveError::Registry(RegistryError::RunEnded(_)) => Disposition::LogOnWorker,
        }
    }

    /// 该错误是否构成用户可见的指令失败
    pub fn is_fatal(&self, err: &HiveError) -> bool {
        self.disposition(err) == Disposition::SurfaceToUser
    }
}
