//! 记忆分区：命名、限长的共享状态槽位

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个分区默认的最大尺寸（文本按 UTF-8 字节数，结构化内容按紧凑 JSON 长度）
pub const DEFAULT_MAX_SECTION_SIZE: usize = 10_000;

/// 分区内容：纯文本或结构化 JSON
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionContent {
    Text(String),
    Structured(Value),
}

impl SectionContent {
    /// 文本按 UTF-8 字节数计，结构化值按紧凑 JSON 序列化长度计
    pub fn size(&self) -> usize {
        match self {
            SectionContent::Text(s) => s.len(),
            SectionContent::Structured(v) => v.to_string().len(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SectionContent::Text(s) => Some(s),
            SectionContent::Structured(Value::String(s)) => Some(s),
            SectionContent::Structured(_) => None,
        }
    }
}

impl Default for SectionContent {
    fn default() -> Self {
        SectionContent::Text(String::new())
    }
}

impl From<&str> for SectionContent {
    fn from(s: &str) -> Self {
        SectionContent::Text(s.to_string())
    }
}

impl From<String> for SectionContent {
    fn from(s: String) -> Self {
        SectionContent::Text(s)
    }
}

impl From<Value> for SectionContent {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => SectionContent::Text(s),
            other => SectionContent::Structured(other),
        }
    }
}

/// 分区作用域：跨对话共享，或仅限单个对话
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionScope {
    #[default]
    Shared,
    Conversation,
}

/// 分区定义（配置或代码中声明，交给 MemoryStore::define）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    #[serde(default)]
    pub initial: SectionContent,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default)]
    pub scope: SectionScope,
}

fn default_max_size() -> usize {
    DEFAULT_MAX_SECTION_SIZE
}

impl SectionSpec {
    pub fn new(name: impl Into<String>, initial: impl Into<SectionContent>) -> Self {
        Self {
            name: name.into(),
            initial: initial.into(),
            max_size: DEFAULT_MAX_SECTION_SIZE,
            scope: SectionScope::Shared,
        }
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn conversation_scoped(mut self) -> Self {
        self.scope = SectionScope::Conversation;
        self
    }
}

/// 存储中的一个分区
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemorySection {
    pub name: String,
    pub content: SectionContent,
    pub max_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_counts_bytes_and_json() {
        assert_eq!(SectionContent::from("héllo").size(), 6);
        let v = SectionContent::from(serde_json::json!({"a": 1}));
        assert_eq!(v.size(), r#"{"a":1}"#.len());
    }

    #[test]
    fn test_json_string_becomes_text() {
        let c = SectionContent::from(serde_json::json!("plain"));
        assert_eq!(c, SectionContent::Text("plain".to_string()));
        assert_eq!(c.as_text(), Some("plain"));
    }
}
