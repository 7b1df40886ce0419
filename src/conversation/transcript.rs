//! 对话记录：只追加的消息序列
//!
//! 序号从 1 开始连续递增，由 append 唯一分配；close 之后拒绝任何追加。

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::conversation::{Message, MessageDraft};
use crate::core::OrchestrationError;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
    closed: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加草稿并分配下一个序号；已关闭时返回 ConversationClosed
    pub fn append(&mut self, draft: MessageDraft) -> Result<&Message, OrchestrationError> {
        if self.closed {
            return Err(OrchestrationError::ConversationClosed);
        }
        let sequence = self.messages.len() as u64 + 1;
        self.messages.push(Message {
            sequence,
            sender: draft.sender,
            recipient: draft.recipient,
            content: draft.content,
            tool_call: draft.tool_call,
            tool_result: draft.tool_result,
            memory_writes: draft.memory_writes,
            timestamp: Utc::now(),
        });
        Ok(&self.messages[self.messages.len() - 1])
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 序号是否为 1..=N 且无空洞
    pub fn is_contiguous(&self) -> bool {
        self.messages
            .iter()
            .enumerate()
            .all(|(i, m)| m.sequence == i as u64 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Recipient;

    #[test]
    fn test_sequence_numbers_start_at_one() {
        let mut t = Transcript::new();
        for i in 0..5 {
            let m = t
                .append(MessageDraft::new("a", Recipient::Broadcast, format!("m{i}")))
                .unwrap();
            assert_eq!(m.sequence, i + 1);
        }
        assert!(t.is_contiguous());
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn test_closed_transcript_rejects_append() {
        let mut t = Transcript::new();
        t.append(MessageDraft::new("a", Recipient::Broadcast, "hi")).unwrap();
        t.close();
        let err = t
            .append(MessageDraft::new("a", Recipient::Broadcast, "late"))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ConversationClosed));
        assert_eq!(t.len(), 1);
    }
}
