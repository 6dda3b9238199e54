//! 会话层：外部自动化后端与会话建立

pub mod backend;
pub mod setup;

pub use backend::{
    ActionOutcome, NoopSessionBackend, SessionAction, SessionBackend, SessionOptions, Viewport,
    DEFAULT_USER_AGENT,
};
pub use setup::establish_session;
