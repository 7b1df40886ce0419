//! 编排错误与恢复动作
//!
//! 与 RecoveryEngine 配合：工具与记忆错误是局部、可恢复的（以数据形式回到对话中），
//! 调度失败、决策失败、取消与超时是致命的，把对话置为 Failed。

use std::time::Duration;

use thiserror::Error;

use crate::memory::MemoryError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    #[error("No eligible speaker at turn {turn}")]
    NoEligibleSpeaker { turn: usize },

    #[error("Agent '{agent}' is not authorized to use tool '{tool}'")]
    UnauthorizedTool { agent: String, tool: String },

    #[error("Decision failed for agent '{agent}': {reason}")]
    DecisionFailed { agent: String, reason: String },

    #[error("Conversation cancelled")]
    Cancelled,

    #[error("Conversation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Conversation is closed")]
    ConversationClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown configuration option: {0}")]
    UnknownOption(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// 恢复引擎根据错误类型给出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 丢弃本轮草稿，以编排器生成的错误消息替代，对话继续
    ReplaceTurn(String),
    /// 以数据形式交回 Agent（如记忆写入失败），对话继续
    Report(String),
    /// 对话进入 Failed
    FailConversation,
}
