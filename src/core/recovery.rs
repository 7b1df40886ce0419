//! 错误恢复引擎
//!
//! 根据 OrchestrationError 返回 RecoveryAction，供编排器决定是替换本轮、记录后继续，还是终止对话。

use crate::core::{OrchestrationError, RecoveryAction};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &OrchestrationError) -> RecoveryAction {
        match err {
            OrchestrationError::UnauthorizedTool { agent, tool } => RecoveryAction::ReplaceTurn(
                format!("Error: agent '{agent}' is not authorized to use tool '{tool}'. Turn discarded."),
            ),
            OrchestrationError::Memory(e) => RecoveryAction::Report(e.to_string()),
            OrchestrationError::NoEligibleSpeaker { .. }
            | OrchestrationError::DecisionFailed { .. }
            | OrchestrationError::Cancelled
            | OrchestrationError::TimedOut(_)
            | OrchestrationError::ConversationClosed
            | OrchestrationError::InvalidConfig(_)
            | OrchestrationError::UnknownOption(_) => RecoveryAction::FailConversation,
        }
    }

    pub fn is_fatal(&self, err: &OrchestrationError) -> bool {
        matches!(self.handle(err), RecoveryAction::FailConversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryError;
    use std::time::Duration;

    #[test]
    fn test_unauthorized_tool_replaces_turn() {
        let engine = RecoveryEngine::new();
        let err = OrchestrationError::UnauthorizedTool {
            agent: "liaison".into(),
            tool: "shell".into(),
        };
        match engine.handle(&err) {
            RecoveryAction::ReplaceTurn(msg) => {
                assert!(msg.contains("liaison"));
                assert!(msg.contains("shell"));
            }
            other => panic!("Expected ReplaceTurn, got {other:?}"),
        }
        assert!(!engine.is_fatal(&err));
    }

    #[test]
    fn test_memory_error_is_reported() {
        let engine = RecoveryEngine::new();
        let err = OrchestrationError::from(MemoryError::SectionTooLarge {
            section: "task".into(),
            size: 20,
            max_size: 10,
        });
        assert!(matches!(engine.handle(&err), RecoveryAction::Report(ref m) if m.contains("task")));
    }

    #[test]
    fn test_fatal_errors() {
        let engine = RecoveryEngine::new();
        assert!(engine.is_fatal(&OrchestrationError::NoEligibleSpeaker { turn: 3 }));
        assert!(engine.is_fatal(&OrchestrationError::DecisionFailed {
            agent: "a".into(),
            reason: "503".into()
        }));
        assert!(engine.is_fatal(&OrchestrationError::Cancelled));
        assert!(engine.is_fatal(&OrchestrationError::TimedOut(Duration::from_secs(1))));
    }

    #[test]
    fn test_closed_and_config_errors_are_fatal() {
        let engine = RecoveryEngine::new();
        assert!(engine.is_fatal(&OrchestrationError::ConversationClosed));
        assert!(engine.is_fatal(&OrchestrationError::InvalidConfig("max_turns".into())));
        assert!(engine.is_fatal(&OrchestrationError::UnknownOption("seed".into())));
    }
}
