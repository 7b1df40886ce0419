//! 对话状态：Active / Terminated / Failed，以及终止与失败原因
//!
//! ConversationSnapshot 是对话的轻量投影（供日志、运行器汇总与前端展示）。

use serde::Serialize;

use crate::core::OrchestrationError;

/// 终止原因（先匹配者生效）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// 消息以终止短语结尾
    PhraseMatched { phrase: String, sequence: u64 },
    /// 达到 max_turns
    MaxTurns { turns: usize },
    /// 参与者自定义的终止条件
    Participant { agent: String },
    /// HumanProxy 自动回复次数用尽
    AutoRepliesExhausted { agent: String },
}

/// 失败原因
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NoEligibleSpeaker { turn: usize },
    DecisionFailed { agent: String, reason: String },
    Cancelled,
    TimedOut { after_ms: u64 },
    Internal { detail: String },
}

impl From<&OrchestrationError> for FailureReason {
    fn from(err: &OrchestrationError) -> Self {
        match err {
            OrchestrationError::NoEligibleSpeaker { turn } => FailureReason::NoEligibleSpeaker { turn: *turn },
            OrchestrationError::DecisionFailed { agent, reason } => FailureReason::DecisionFailed {
                agent: agent.clone(),
                reason: reason.clone(),
            },
            OrchestrationError::Cancelled => FailureReason::Cancelled,
            OrchestrationError::TimedOut(d) => FailureReason::TimedOut {
                after_ms: d.as_millis() as u64,
            },
            other => FailureReason::Internal {
                detail: other.to_string(),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Active,
    Terminated { reason: TerminationReason },
    Failed { reason: FailureReason },
}

impl ConversationState {
    pub fn is_active(&self) -> bool {
        matches!(self, ConversationState::Active)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ConversationState::Terminated { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConversationState::Failed { .. })
    }

    /// 状态名（ACTIVE / TERMINATED / FAILED）
    pub fn label(&self) -> &'static str {
        match self {
            ConversationState::Active => "ACTIVE",
            ConversationState::Terminated { .. } => "TERMINATED",
            ConversationState::Failed { .. } => "FAILED",
        }
    }
}

/// 对话的轻量投影
#[derive(Clone, Debug, Serialize)]
pub struct ConversationSnapshot {
    pub id: String,
    pub state: ConversationState,
    pub turns: usize,
    pub messages: usize,
    pub last_sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failure_reason_from_error() {
        let r = FailureReason::from(&OrchestrationError::TimedOut(Duration::from_millis(1500)));
        assert_eq!(r, FailureReason::TimedOut { after_ms: 1500 });
        let r = FailureReason::from(&OrchestrationError::NoEligibleSpeaker { turn: 2 });
        assert_eq!(r, FailureReason::NoEligibleSpeaker { turn: 2 });
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let s = ConversationState::Terminated {
            reason: TerminationReason::MaxTurns { turns: 10 },
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["state"], "terminated");
        assert_eq!(json["reason"]["kind"], "max_turns");
        assert_eq!(s.label(), "TERMINATED");
    }
}
