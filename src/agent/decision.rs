//! 决策函数：Agent 与外部语言模型之间的边界
//!
//! 核心不做任何自然语言推理，只约定：给定对话记录快照、已绑定记忆分区与可用工具集合，
//! 产出恰好一条回复（可附带一个 ToolCall 与若干记忆写入）。调用可能挂起，由编排器负责取消。

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::{MemoryWrite, Message, Recipient, ToolCall};
use crate::memory::SectionContent;

/// 外部决策调用失败（网络、模型报错等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Decision failed: {0}")]
pub struct DecisionFailed(pub String);

/// 一次决策的输入（只读快照）
#[derive(Debug)]
pub struct DecisionContext<'a> {
    pub agent_id: &'a str,
    pub role: &'a str,
    pub transcript: &'a [Message],
    /// 可读分区名 -> 调用时刻的内容
    pub memory: &'a BTreeMap<String, SectionContent>,
    pub tools: &'a BTreeSet<String>,
}

impl DecisionContext<'_> {
    pub fn last_message(&self) -> Option<&Message> {
        self.transcript.last()
    }

    /// 该 Agent 已在本次对话中发出的消息数
    pub fn own_turns(&self) -> usize {
        self.transcript
            .iter()
            .filter(|m| m.sender == self.agent_id)
            .count()
    }
}

/// 决策函数的输出；recipient 为 None 时由编排器回复给上一条消息的发送方
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentReply {
    pub content: String,
    pub recipient: Option<Recipient>,
    pub tool_call: Option<ToolCall>,
    pub memory_writes: Vec<MemoryWrite>,
}

impl AgentReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn to(mut self, recipient: Recipient) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_call = Some(call);
        self
    }

    pub fn with_memory_write(mut self, write: MemoryWrite) -> Self {
        self.memory_writes.push(write);
        self
    }
}

#[async_trait]
pub trait DecisionFunction: Send + Sync {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<AgentReply, DecisionFailed>;
}
