//! 消息模型：Message、ToolCall、ToolResult
//!
//! Message 追加到 Transcript 后不可变；sequence 由 Transcript::append 统一分配。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::SectionContent;

/// 编排器自身作为发送方时使用的 ID（如越权工具调用的错误消息）
pub const ORCHESTRATOR_ID: &str = "orchestrator";

/// 接收方：指定 Agent 或广播
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Agent(String),
    Broadcast,
}

impl Recipient {
    pub fn agent(id: impl Into<String>) -> Self {
        Self::Agent(id.into())
    }

    pub fn is_addressed_to(&self, id: &str) -> bool {
        matches!(self, Recipient::Agent(r) if r == id)
    }
}

/// 工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// 调用理由（可选，供观察者展示）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Map::new(),
            thought: None,
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Failure,
}

/// 工具调用结果；attempt_count 为真实尝试次数（含首次）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub attempt_count: u32,
}

impl ToolResult {
    pub fn success(output: impl Into<String>, attempt_count: u32) -> Self {
        Self {
            status: ToolStatus::Success,
            output: output.into(),
            error_detail: None,
            attempt_count,
        }
    }

    pub fn failure(error_detail: impl Into<String>, attempt_count: u32) -> Self {
        let detail = error_detail.into();
        Self {
            status: ToolStatus::Failure,
            output: format!("Error: {detail}"),
            error_detail: Some(detail),
            attempt_count,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Agent 在一轮中请求的记忆写入
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryWrite {
    pub section: String,
    pub content: SectionContent,
}

impl MemoryWrite {
    pub fn new(section: impl Into<String>, content: impl Into<SectionContent>) -> Self {
        Self {
            section: section.into(),
            content: content.into(),
        }
    }
}

/// 一次记忆写入的结果，随消息一起记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryWriteOutcome {
    pub section: String,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 对话中的一条消息（追加后不可变）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sequence: u64,
    pub sender: String,
    pub recipient: Recipient,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_writes: Vec<MemoryWriteOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// 内容是否以指定短语结尾（忽略大小写，先去掉尾部空白）
    pub fn ends_with_phrase(&self, phrase: &str) -> bool {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return false;
        }
        self.content
            .trim_end()
            .to_lowercase()
            .ends_with(&phrase.to_lowercase())
    }
}

/// 尚未编号的消息草稿；只有 Transcript::append 能把它变成 Message
#[derive(Clone, Debug)]
pub struct MessageDraft {
    pub sender: String,
    pub recipient: Recipient,
    pub content: String,
    pub tool_call: Option<ToolCall>,
    pub tool_result: Option<ToolResult>,
    pub memory_writes: Vec<MemoryWriteOutcome>,
}

impl MessageDraft {
    pub fn new(sender: impl Into<String>, recipient: Recipient, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient,
            content: content.into(),
            tool_call: None,
            tool_result: None,
            memory_writes: Vec::new(),
        }
    }

    pub fn with_tool(mut self, call: ToolCall, result: ToolResult) -> Self {
        self.tool_call = Some(call);
        self.tool_result = Some(result);
        self
    }

    pub fn with_memory_writes(mut self, outcomes: Vec<MemoryWriteOutcome>) -> Self {
        self.memory_writes = outcomes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> Message {
        Message {
            sequence: 1,
            sender: "a".to_string(),
            recipient: Recipient::Broadcast,
            content: content.to_string(),
            tool_call: None,
            tool_result: None,
            memory_writes: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_phrase_suffix_case_insensitive() {
        assert!(msg("Done. TERMINATE").ends_with_phrase("TERMINATE"));
        assert!(msg("done. terminate  \n").ends_with_phrase("TERMINATE"));
        assert!(!msg("TERMINATE now").ends_with_phrase("TERMINATE"));
        assert!(!msg("anything").ends_with_phrase("  "));
    }

    #[test]
    fn test_failure_result_carries_detail() {
        let r = ToolResult::failure("rate limited", 2);
        assert!(!r.is_success());
        assert_eq!(r.error_detail.as_deref(), Some("rate limited"));
        assert_eq!(r.attempt_count, 2);
    }

    #[test]
    fn test_tool_call_serializes_without_empty_thought() {
        let call = ToolCall::new("echo").arg("text", "hi");
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["tool_name"], "echo");
        assert_eq!(json["arguments"]["text"], "hi");
        assert!(json.get("thought").is_none());
    }
}
