//! 对话事件：编排器在关键节点同步通知观察者
//!
//! 观察者只读，不能否决或修改对话。ChannelObserver 把事件转发到 mpsc 通道（前端/测试订阅），
//! TracingObserver 把事件写入日志。

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::conversation::{Message, ToolStatus};
use crate::core::{FailureReason, TerminationReason};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// 新一轮开始（turn 从 1 计）
    TurnStarted {
        conversation_id: String,
        turn: usize,
        speaker: String,
    },
    /// Agent 请求调用工具（已通过授权检查）
    ToolSelected {
        conversation_id: String,
        speaker: String,
        tool: String,
        args: serde_json::Value,
        /// Agent 给出的调用理由
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
    },
    /// 工具调用结束（含重试）
    ToolCompleted {
        conversation_id: String,
        tool: String,
        status: ToolStatus,
        attempts: u32,
        preview: String,
    },
    /// 越权工具调用，本轮被替换
    ToolRejected {
        conversation_id: String,
        speaker: String,
        tool: String,
    },
    /// 记忆写入被拒绝（无写权限、超限等），旧内容保留
    MemoryWriteRejected {
        conversation_id: String,
        speaker: String,
        section: String,
        error: String,
    },
    MessageAppended {
        conversation_id: String,
        message: Message,
    },
    Terminated {
        conversation_id: String,
        reason: TerminationReason,
    },
    Failed {
        conversation_id: String,
        reason: FailureReason,
    },
}

impl ConversationEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            ConversationEvent::TurnStarted { conversation_id, .. }
            | ConversationEvent::ToolSelected { conversation_id, .. }
            | ConversationEvent::ToolCompleted { conversation_id, .. }
            | ConversationEvent::ToolRejected { conversation_id, .. }
            | ConversationEvent::MemoryWriteRejected { conversation_id, .. }
            | ConversationEvent::MessageAppended { conversation_id, .. }
            | ConversationEvent::Terminated { conversation_id, .. }
            | ConversationEvent::Failed { conversation_id, .. } => conversation_id,
        }
    }
}

pub trait ConversationObserver: Send + Sync {
    fn on_event(&self, event: &ConversationEvent);
}

/// 转发到无界通道；接收端关闭后静默丢弃
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ConversationEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<ConversationEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConversationObserver for ChannelObserver {
    fn on_event(&self, event: &ConversationEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[derive(Debug, Default)]
pub struct TracingObserver;

impl ConversationObserver for TracingObserver {
    fn on_event(&self, event: &ConversationEvent) {
        match event {
            ConversationEvent::TurnStarted {
                conversation_id,
                turn,
                speaker,
            } => tracing::debug!(conversation = %conversation_id, turn, speaker = %speaker, "Turn started"),
            ConversationEvent::ToolSelected {
                conversation_id,
                speaker,
                tool,
                thought,
                ..
            } => tracing::debug!(
                conversation = %conversation_id,
                speaker = %speaker,
                tool = %tool,
                thought = thought.as_deref().unwrap_or(""),
                "Tool selected"
            ),
            ConversationEvent::ToolCompleted {
                conversation_id,
                tool,
                status,
                attempts,
                ..
            } => tracing::info!(conversation = %conversation_id, tool = %tool, ?status, attempts, "Tool completed"),
            ConversationEvent::ToolRejected {
                conversation_id,
                speaker,
                tool,
            } => tracing::warn!(conversation = %conversation_id, speaker = %speaker, tool = %tool, "Unauthorized tool call"),
            ConversationEvent::MemoryWriteRejected {
                conversation_id,
                speaker,
                section,
                error,
            } => tracing::warn!(conversation = %conversation_id, speaker = %speaker, section = %section, error = %error, "Memory write rejected"),
            ConversationEvent::MessageAppended {
                conversation_id,
                message,
            } => tracing::debug!(
                conversation = %conversation_id,
                seq = message.sequence,
                sender = %message.sender,
                "Message appended"
            ),
            ConversationEvent::Terminated {
                conversation_id,
                reason,
            } => tracing::info!(conversation = %conversation_id, ?reason, "Conversation terminated"),
            ConversationEvent::Failed {
                conversation_id,
                reason,
            } => tracing::warn!(conversation = %conversation_id, ?reason, "Conversation failed"),
        }
    }
}

/// 收集全部事件（测试与演示用）
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ConversationEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConversationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ConversationObserver for RecordingObserver {
    fn on_event(&self, event: &ConversationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_observer_forwards() {
        let (observer, mut rx) = ChannelObserver::channel();
        observer.on_event(&ConversationEvent::TurnStarted {
            conversation_id: "c1".into(),
            turn: 1,
            speaker: "liaison".into(),
        });
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.conversation_id(), "c1");
        drop(rx);
        observer.on_event(&ConversationEvent::Failed {
            conversation_id: "c1".into(),
            reason: FailureReason::Cancelled,
        });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let ev = ConversationEvent::ToolRejected {
            conversation_id: "c1".into(),
            speaker: "liaison".into(),
            tool: "shell".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "tool_rejected");
        assert_eq!(json["tool"], "shell");
    }
}
