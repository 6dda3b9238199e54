//! 自动化后端抽象：创建浏览器会话、在会话中执行动作
//!
//! 具体后端（远程浏览器服务等）实现 SessionBackend；默认的 NoopSessionBackend 只生成会话 ID，不做任何外部调用。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 会话创建参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// host:port，None 表示直连
    pub proxy: Option<String>,
    pub user_agent: String,
    pub viewport: Viewport,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport::default(),
        }
    }
}

/// 会话内动作：kind 如 navigate / click / type / scroll，params 为动作参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAction {
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

impl SessionAction {
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    pub fn navigate(url: &str) -> Self {
        Self::new("navigate", json!({ "url": url }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// 创建会话，返回会话 ID
    async fn create_session(&self, options: &SessionOptions) -> Result<String, SessionError>;

    async fn execute_action(
        &self,
        action: &SessionAction,
        session_id: &str,
    ) -> Result<ActionOutcome, SessionError>;
}

/// 不连接任何外部服务的后端
#[derive(Debug, Default)]
pub struct NoopSessionBackend {
    next_id: AtomicU64,
}

impl NoopSessionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for NoopSessionBackend {
    fn name(&self) -> &str {
        "noop"
    }

    async fn create_session(&self, options: &SessionOptions) -> Result<String, SessionError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(proxy = ?options.proxy, "Noop session created");
        Ok(format!("session_{n}"))
    }

    async fn execute_action(
        &self,
        action: &SessionAction,
        session_id: &str,
    ) -> Result<ActionOutcome, SessionError> {
        tracing::debug!(session_id, action = %action.kind, "Noop action executed");
        Ok(ActionOutcome {
            success: true,
            data: json!({ "sessionId": session_id, "action": action.kind }),
        })
    }
}
