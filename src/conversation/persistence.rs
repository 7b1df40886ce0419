//! 对话记录持久化
//!
//! 每个对话一个 JSON 文件：`<dir>/<conversation_id>.json`，包含状态与全部消息。
//! 编排器每轮追加后覆盖写入，进程崩溃时最多丢失未完成的一轮。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, Message};

#[derive(Debug, Clone)]
pub struct TranscriptPersistence {
    dir: PathBuf,
}

/// 落盘格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTranscript {
    pub conversation_id: String,
    /// ACTIVE / TERMINATED / FAILED
    pub state: String,
    #[serde(default)]
    pub outcome: Option<serde_json::Value>,
    pub messages: Vec<Message>,
}

impl TranscriptPersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{conversation_id}.json"))
    }

    /// 写入对话当前记录；目录不存在时自动创建
    pub fn save(&self, conversation: &Conversation) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let outcome = if conversation.is_active() {
            None
        } else {
            Some(serde_json::to_value(conversation.state())?)
        };
        let stored = StoredTranscript {
            conversation_id: conversation.id().to_string(),
            state: conversation.state().label().to_string(),
            outcome,
            messages: conversation.messages().to_vec(),
        };
        let path = self.path_for(conversation.id());
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&stored)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// 读取已保存的记录；文件不存在时返回 None
    pub fn load(&self, conversation_id: &str) -> anyhow::Result<Option<StoredTranscript>> {
        let path = self.path_for(conversation_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::agent::{Agent, AgentKind, ScriptedDecision};
    use crate::config::ConversationConfig;
    use crate::conversation::Recipient;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = TranscriptPersistence::new(dir.path().join("transcripts"));
        let agent = Arc::new(
            Agent::builder("liaison", AgentKind::Liaison)
                .decision(Arc::new(ScriptedDecision::new()))
                .build()
                .unwrap(),
        );
        let conv = Conversation::builder(ConversationConfig::default())
            .id("conv-1")
            .participant(agent)
            .initiate("user", Recipient::agent("liaison"), "hello")
            .build()
            .unwrap();

        persistence.save(&conv).unwrap();
        let stored = persistence.load("conv-1").unwrap().unwrap();
        assert_eq!(stored.state, "ACTIVE");
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].content, "hello");
        assert!(persistence.load("missing").unwrap().is_none());
    }
}
