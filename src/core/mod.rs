//! 核心编排层：错误与恢复、对话状态、会话监管、主控循环、多对话运行

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod runner;
pub mod session_supervisor;
pub mod state;

pub use error::{OrchestrationError, RecoveryAction};
pub use orchestrator::Orchestrator;
pub use recovery::RecoveryEngine;
pub use runner::ConversationRunner;
pub use session_supervisor::SessionSupervisor;
pub use state::{ConversationSnapshot, ConversationState, FailureReason, TerminationReason};
