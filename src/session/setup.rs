//! 单个 Worker 的会话建立：创建会话并导航到目标地址，整体受超时约束

use std::time::Duration;

use super::backend::{SessionAction, SessionBackend, SessionOptions};
use crate::core::SessionError;

/// 创建会话；有 target_url 时导航过去。返回会话 ID
pub async fn establish_session(
    backend: &dyn SessionBackend,
    options: &SessionOptions,
    target_url: Option<&str>,
    timeout: Duration,
) -> Result<String, SessionError> {
    let work = async {
        let session_id = backend.create_session(options).await?;
        if let Some(url) = target_url {
            let outcome = backend
                .execute_action(&SessionAction::navigate(url), &session_id)
                .await?;
            if !outcome.success {
                return Err(SessionError::ActionFailed {
                    action: "navigate".to_string(),
                    reason: outcome.data.to_string(),
                });
            }
        }
        Ok(session_id)
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Timeout(timeout.as_secs())),
    }
}
