//! Conversation：参与者、对话记录、状态与配置
//!
//! 对话独占自己的 Transcript；Agent 与记忆存储以 Arc 引用，可跨对话共享。
//! 对话作用域的记忆分区以 `<conversation_id>/<section>` 为实际键，开始时创建、结束时删除。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::ConversationConfig;
use crate::conversation::{Message, MessageDraft, Recipient, Transcript};
use crate::core::{ConversationSnapshot, ConversationState, FailureReason, OrchestrationError, TerminationReason};
use crate::memory::{SectionScope, SectionSpec};

/// 参与者在某个对话中的可变状态
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticipantState {
    pub turns_taken: usize,
    /// 仅对无人类输入源的 HumanProxy 计数
    pub remaining_auto_replies: Option<u32>,
}

pub struct Conversation {
    id: String,
    participants: Vec<Arc<Agent>>,
    states: HashMap<String, ParticipantState>,
    transcript: Transcript,
    state: ConversationState,
    config: ConversationConfig,
    speaking_order: Option<Vec<String>>,
    scoped_sections: Vec<SectionSpec>,
    cancel: CancellationToken,
    turns_taken: usize,
}

impl Conversation {
    pub fn builder(config: ConversationConfig) -> ConversationBuilder {
        ConversationBuilder::new(config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participants(&self) -> &[Arc<Agent>] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Arc<Agent>> {
        self.participants.iter().find(|a| a.id() == id)
    }

    pub fn participant_state(&self, id: &str) -> Option<&ParticipantState> {
        self.states.get(id)
    }

    pub fn participant_states(&self) -> &HashMap<String, ParticipantState> {
        &self.states
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn speaking_order(&self) -> Option<&[String]> {
        self.speaking_order.as_deref()
    }

    pub fn scoped_sections(&self) -> &[SectionSpec] {
        &self.scoped_sections
    }

    /// 已完成的轮数（不含发起消息）
    pub fn turns_taken(&self) -> usize {
        self.turns_taken
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 请求取消；正在进行的决策、工具尝试与退避等待会立即停止
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            id: self.id.clone(),
            state: self.state.clone(),
            turns: self.turns_taken,
            messages: self.transcript.len(),
            last_sequence: self.transcript.last().map(|m| m.sequence).unwrap_or(0),
        }
    }

    pub fn is_scoped(&self, section: &str) -> bool {
        self.scoped_sections.iter().any(|s| s.name == section)
    }

    /// 绑定中的分区名 -> 存储中的实际键
    pub fn resolve_section(&self, section: &str) -> String {
        if self.is_scoped(section) {
            format!("{}/{}", self.id, section)
        } else {
            section.to_string()
        }
    }

    pub(crate) fn append(&mut self, draft: MessageDraft) -> Result<&Message, OrchestrationError> {
        if !self.state.is_active() {
            return Err(OrchestrationError::ConversationClosed);
        }
        self.transcript.append(draft)
    }

    /// 记一轮：更新总轮数与发言者状态；auto_reply 为 true 时扣减自动回复次数
    pub(crate) fn record_turn(&mut self, speaker: &str, auto_reply: bool) {
        self.turns_taken += 1;
        if let Some(state) = self.states.get_mut(speaker) {
            state.turns_taken += 1;
            if auto_reply {
                if let Some(n) = state.remaining_auto_replies.as_mut() {
                    *n = n.saturating_sub(1);
                }
            }
        }
    }

    pub(crate) fn terminate(&mut self, reason: TerminationReason) {
        if self.state.is_active() {
            self.transcript.close();
            self.state = ConversationState::Terminated { reason };
        }
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) {
        if self.state.is_active() {
            self.transcript.close();
            self.state = ConversationState::Failed { reason };
        }
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field(
                "participants",
                &self.participants.iter().map(|a| a.id()).collect::<Vec<_>>(),
            )
            .field("state", &self.state)
            .field("turns_taken", &self.turns_taken)
            .field("messages", &self.transcript.len())
            .finish()
    }
}

pub struct ConversationBuilder {
    id: Option<String>,
    config: ConversationConfig,
    participants: Vec<Arc<Agent>>,
    speaking_order: Option<Vec<String>>,
    scoped_sections: Vec<SectionSpec>,
    cancel: Option<CancellationToken>,
    initial: Option<MessageDraft>,
}

impl ConversationBuilder {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            id: None,
            config,
            participants: Vec::new(),
            speaking_order: None,
            scoped_sections: Vec::new(),
            cancel: None,
            initial: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn participant(mut self, agent: Arc<Agent>) -> Self {
        self.participants.push(agent);
        self
    }

    pub fn participants(mut self, agents: impl IntoIterator<Item = Arc<Agent>>) -> Self {
        self.participants.extend(agents);
        self
    }

    /// 轮流发言顺序（可重复同一 Agent）；未设置时按参与者顺序
    pub fn speaking_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.speaking_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    /// 声明对话作用域的记忆分区
    pub fn scoped_section(mut self, spec: SectionSpec) -> Self {
        self.scoped_sections.push(SectionSpec {
            scope: SectionScope::Conversation,
            ..spec
        });
        self
    }

    pub fn scoped_sections(mut self, specs: impl IntoIterator<Item = SectionSpec>) -> Self {
        for spec in specs {
            self = self.scoped_section(spec);
        }
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 发起消息（序号 1）；发送方可以是外部参与方，如 "user"
    pub fn initiate(mut self, sender: impl Into<String>, recipient: Recipient, content: impl Into<String>) -> Self {
        self.initial = Some(MessageDraft::new(sender, recipient, content));
        self
    }

    pub fn build(self) -> Result<Conversation, OrchestrationError> {
        self.config.validate()?;
        if self.participants.is_empty() {
            return Err(OrchestrationError::InvalidConfig(
                "conversation needs at least one participant".into(),
            ));
        }
        let mut seen = HashSet::new();
        for agent in &self.participants {
            if !seen.insert(agent.id()) {
                return Err(OrchestrationError::InvalidConfig(format!(
                    "duplicate participant id: {}",
                    agent.id()
                )));
            }
        }
        if matches!(&self.speaking_order, Some(order) if order.is_empty()) {
            return Err(OrchestrationError::InvalidConfig("speaking_order must not be empty".into()));
        }
        let mut names = HashSet::new();
        for spec in &self.scoped_sections {
            if !names.insert(spec.name.as_str()) {
                return Err(OrchestrationError::InvalidConfig(format!(
                    "conversation section declared twice: {}",
                    spec.name
                )));
            }
        }
        let initial = self.initial.ok_or_else(|| {
            OrchestrationError::InvalidConfig("conversation needs an initiating message".into())
        })?;

        let states = self
            .participants
            .iter()
            .map(|a| {
                (
                    a.id().to_string(),
                    ParticipantState {
                        turns_taken: 0,
                        remaining_auto_replies: a.auto_reply_budget(),
                    },
                )
            })
            .collect();

        let mut transcript = Transcript::new();
        transcript.append(initial)?;

        Ok(Conversation {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            participants: self.participants,
            states,
            transcript,
            state: ConversationState::Active,
            config: self.config,
            speaking_order: self.speaking_order,
            scoped_sections: self.scoped_sections,
            cancel: self.cancel.unwrap_or_default(),
            turns_taken: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentKind, HumanProxyConfig, ScriptedDecision};

    fn agent(id: &str) -> Arc<Agent> {
        Arc::new(
            Agent::builder(id, AgentKind::Liaison)
                .decision(Arc::new(ScriptedDecision::new()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_initiating_message_is_sequence_one() {
        let conv = Conversation::builder(ConversationConfig::default())
            .participant(agent("liaison"))
            .initiate("user", Recipient::agent("liaison"), "Plot a chart")
            .build()
            .unwrap();
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].sequence, 1);
        assert_eq!(conv.messages()[0].sender, "user");
        assert!(conv.is_active());
        assert_eq!(conv.turns_taken(), 0);
        assert!(Uuid::parse_str(conv.id()).is_ok());
    }

    #[test]
    fn test_duplicate_participants_rejected() {
        let err = Conversation::builder(ConversationConfig::default())
            .participant(agent("a"))
            .participant(agent("a"))
            .initiate("user", Recipient::Broadcast, "hi")
            .build()
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_initiation_and_invalid_config() {
        assert!(Conversation::builder(ConversationConfig::default())
            .participant(agent("a"))
            .build()
            .is_err());
        assert!(Conversation::builder(ConversationConfig::default().max_turns(0))
            .participant(agent("a"))
            .initiate("user", Recipient::Broadcast, "hi")
            .build()
            .is_err());
    }

    #[test]
    fn test_closed_after_terminate() {
        let mut conv = Conversation::builder(ConversationConfig::default())
            .participant(agent("a"))
            .initiate("user", Recipient::agent("a"), "hi")
            .build()
            .unwrap();
        conv.terminate(TerminationReason::MaxTurns { turns: 1 });
        let err = conv
            .append(MessageDraft::new("a", Recipient::agent("user"), "late"))
            .unwrap_err();
        assert_eq!(err, OrchestrationError::ConversationClosed);
        conv.fail(FailureReason::Cancelled);
        assert!(conv.state().is_terminated());
    }

    #[test]
    fn test_scoped_sections_and_auto_reply_state() {
        let proxy = Arc::new(
            Agent::builder(
                "user",
                AgentKind::HumanProxy(HumanProxyConfig {
                    auto_reply: "go on".into(),
                    max_auto_replies: 2,
                }),
            )
            .build()
            .unwrap(),
        );
        let mut conv = Conversation::builder(ConversationConfig::default())
            .id("c1")
            .participant(proxy)
            .scoped_section(SectionSpec::new("scratch", ""))
            .initiate("user", Recipient::Broadcast, "hi")
            .build()
            .unwrap();
        assert_eq!(conv.resolve_section("scratch"), "c1/scratch");
        assert_eq!(conv.resolve_section("task"), "task");

        conv.record_turn("user", true);
        let state = conv.participant_state("user").unwrap();
        assert_eq!(state.turns_taken, 1);
        assert_eq!(state.remaining_auto_replies, Some(1));
    }
}
