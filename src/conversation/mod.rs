//! 对话层：消息模型、对话记录、轮次调度、终止检测、事件与持久化

#[allow(clippy::module_inception)]
pub mod conversation;
pub mod events;
pub mod message;
pub mod persistence;
pub mod scheduler;
pub mod termination;
pub mod transcript;

pub use conversation::{Conversation, ConversationBuilder, ParticipantState};
pub use events::{ChannelObserver, ConversationEvent, ConversationObserver, RecordingObserver, TracingObserver};
pub use message::{
    MemoryWrite, MemoryWriteOutcome, Message, MessageDraft, Recipient, ToolCall, ToolResult, ToolStatus,
    ORCHESTRATOR_ID,
};
pub use persistence::{StoredTranscript, TranscriptPersistence};
pub use scheduler::{scheduler_for, OpenScheduler, RoundBasedScheduler, SchedulingContext, TurnScheduler};
pub use termination::TerminationPredicate;
pub use transcript::Transcript;
