//! 指令层：关键词表驱动的意图解析

pub mod interpreter;
pub mod task;

pub use interpreter::{CommandInterpreter, DEFAULT_TARGET_COUNT};
pub use task::{estimate_duration_hours, Action, Platform, Task};
