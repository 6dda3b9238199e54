//! 核心编排层：错误与处置策略、会话监管、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;

pub use builder::{create_orchestrator_builder, OrchestratorBuilder};
pub use error::{
    AllocationError, HiveError, InterpretationError, ProxyError, RegistryError, SessionError,
};
pub use orchestrator::{CommandOutcome, Orchestrator};
pub use recovery::{Disposition, ErrorPolicy};
pub use session_supervisor::SessionSupervisor;
