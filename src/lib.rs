//! Hive - 指令驱动的 Bot 集群编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与处置策略、会话监管、编排器与构建器
//! - **command**: 自然语言指令解析为 Task
//! - **fleet**: 集群规模计算与 Worker 并发注册
//! - **worker**: Worker 模型、健康度、邮箱账号与生命周期注册表
//! - **proxy**: 代理供应商、延迟探测与代理池
//! - **session**: 外部自动化后端与会话建立
//! - **observability**: 日志初始化

pub mod command;
pub mod config;
pub mod core;
pub mod fleet;
pub mod observability;
pub mod proxy;
pub mod session;
pub mod worker;

pub use crate::core::{CommandOutcome, HiveError, Orchestrator, OrchestratorBuilder};
