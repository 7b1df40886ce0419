//! 对话编排器：主控循环
//!
//! 单个对话内严格串行，每轮：
//! 调度下一位发言者 → 调用其决策函数（受取消与超时约束）→ 工具授权检查与带重试的工具调用
//! → 应用记忆写入并追加消息（两者之间没有挂起点）→ 持久化 → 终止检测。
//!
//! 致命错误转为对话状态（Failed），run 本身不返回错误。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, AgentKind, AgentReply, DecisionContext};
use crate::config::AppConfig;
use crate::conversation::termination;
use crate::conversation::{
    scheduler_for, Conversation, ConversationEvent, ConversationObserver, MemoryWrite, MemoryWriteOutcome,
    Message, MessageDraft, Recipient, SchedulingContext, TracingObserver, TranscriptPersistence, TurnScheduler,
    ORCHESTRATOR_ID,
};
use crate::core::{
    FailureReason, OrchestrationError, RecoveryAction, RecoveryEngine, SessionSupervisor, TerminationReason,
};
use crate::memory::{FileMemoryStore, InMemoryStore, MemoryError, MemoryStore, SectionContent, SectionSpec};
use crate::tools::{RetryPolicy, ToolExecutor, ToolRegistry};

const PREVIEW_CHARS: usize = 120;

pub struct Orchestrator {
    executor: Arc<ToolExecutor>,
    memory: Arc<dyn MemoryStore>,
    observers: Vec<Arc<dyn ConversationObserver>>,
    persistence: Option<TranscriptPersistence>,
    recovery: RecoveryEngine,
}

impl Orchestrator {
    pub fn new(executor: Arc<ToolExecutor>, memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            executor,
            memory,
            observers: Vec::new(),
            persistence: None,
            recovery: RecoveryEngine::new(),
        }
    }

    /// 按配置组装：记忆存储（文件或内存）、共享分区、工具执行器与重试策略、对话记录目录
    pub fn from_config(cfg: &AppConfig, registry: ToolRegistry) -> anyhow::Result<Self> {
        cfg.validate()?;
        let memory: Arc<dyn MemoryStore> = match &cfg.memory.store_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Using file-backed memory store");
                Arc::new(FileMemoryStore::open(path, cfg.memory.default_max_section_size)?)
            }
            None => Arc::new(InMemoryStore::new(cfg.memory.default_max_section_size)),
        };
        for spec in cfg.memory.shared_sections() {
            memory.define(spec)?;
        }

        let policy = RetryPolicy::from_config(&cfg.tools, cfg.conversation.max_tool_retries);
        let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs).with_retry_policy(policy);

        let mut orchestrator =
            Self::new(Arc::new(executor), memory).with_observer(Arc::new(TracingObserver));
        if let Some(dir) = &cfg.runtime.transcript_dir {
            orchestrator = orchestrator.with_persistence(TranscriptPersistence::new(dir));
        }
        Ok(orchestrator)
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_persistence(mut self, persistence: TranscriptPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// 驱动对话直到终止或失败，返回最终的对话记录
    pub async fn run(&self, conversation: &mut Conversation) -> Vec<Message> {
        if !conversation.is_active() {
            return conversation.messages().to_vec();
        }
        tracing::info!(
            conversation = %conversation.id(),
            participants = conversation.participants().len(),
            policy = ?conversation.config().scheduling_policy,
            "Conversation started"
        );

        if let Err(e) = self.define_scoped_sections(conversation) {
            // 已创建的部分分区随失败一并清理
            self.remove_scoped_sections(conversation);
            self.fail(conversation, &OrchestrationError::from(e));
            return conversation.messages().to_vec();
        }

        let supervisor = SessionSupervisor::new(
            conversation.cancel_token(),
            conversation.config().timeout_secs.map(Duration::from_secs),
        );
        let scheduler = scheduler_for(
            conversation.config().scheduling_policy,
            conversation.speaking_order(),
        );

        loop {
            match self.step(conversation, scheduler.as_ref(), &supervisor).await {
                Ok(None) => continue,
                Ok(Some(reason)) => {
                    conversation.terminate(reason.clone());
                    tracing::info!(
                        conversation = %conversation.id(),
                        turns = conversation.turns_taken(),
                        "Conversation terminated"
                    );
                    self.emit(ConversationEvent::Terminated {
                        conversation_id: conversation.id().to_string(),
                        reason,
                    });
                    break;
                }
                Err(e) => {
                    self.fail(conversation, &e);
                    break;
                }
            }
        }

        self.persist(conversation);
        self.remove_scoped_sections(conversation);
        conversation.messages().to_vec()
    }

    async fn step(
        &self,
        conversation: &mut Conversation,
        scheduler: &dyn TurnScheduler,
        supervisor: &SessionSupervisor,
    ) -> Result<Option<TerminationReason>, OrchestrationError> {
        supervisor.check()?;
        let turn = conversation.turns_taken() + 1;

        let speaker = {
            let ctx = SchedulingContext {
                transcript: conversation.messages(),
                participants: conversation.participants(),
                turns_taken: conversation.turns_taken(),
            };
            scheduler.next_speaker(&ctx).cloned()
        }
        .ok_or(OrchestrationError::NoEligibleSpeaker { turn })?;

        tracing::debug!(conversation = %conversation.id(), turn, speaker = %speaker.id(), "Turn");
        self.emit(ConversationEvent::TurnStarted {
            conversation_id: conversation.id().to_string(),
            turn,
            speaker: speaker.id().to_string(),
        });

        let (reply, auto_reply) = self.decide(conversation, &speaker, supervisor).await?;
        let recipient = reply
            .recipient
            .clone()
            .unwrap_or_else(|| default_recipient(conversation, speaker.id()));
        let mut draft = MessageDraft::new(speaker.id(), recipient, reply.content.clone());

        if let Some(call) = reply.tool_call {
            if !speaker.can_use_tool(&call.tool_name) {
                let err = OrchestrationError::UnauthorizedTool {
                    agent: speaker.id().to_string(),
                    tool: call.tool_name.clone(),
                };
                tracing::warn!(conversation = %conversation.id(), error = %err, "Turn discarded");
                self.emit(ConversationEvent::ToolRejected {
                    conversation_id: conversation.id().to_string(),
                    speaker: speaker.id().to_string(),
                    tool: call.tool_name.clone(),
                });
                return match self.recovery.handle(&err) {
                    RecoveryAction::ReplaceTurn(text) => {
                        let replacement =
                            MessageDraft::new(ORCHESTRATOR_ID, Recipient::agent(speaker.id()), text);
                        self.commit(conversation, speaker.id(), replacement, false)
                    }
                    _ => Err(err),
                };
            }

            self.emit(ConversationEvent::ToolSelected {
                conversation_id: conversation.id().to_string(),
                speaker: speaker.id().to_string(),
                tool: call.tool_name.clone(),
                args: serde_json::Value::Object(call.arguments.clone()),
                thought: call.thought.clone(),
            });
            let result = supervisor
                .guard(self.executor.invoke(
                    &call.tool_name,
                    &call.arguments,
                    conversation.config().max_tool_retries,
                    &supervisor.child_token(),
                ))
                .await??;
            self.emit(ConversationEvent::ToolCompleted {
                conversation_id: conversation.id().to_string(),
                tool: call.tool_name.clone(),
                status: result.status,
                attempts: result.attempt_count,
                preview: preview(&result.output),
            });
            draft = draft.with_tool(call, result);
        }

        let outcomes = self.apply_memory_writes(conversation, &speaker, &reply.memory_writes);
        self.commit(conversation, speaker.id(), draft.with_memory_writes(outcomes), auto_reply)
    }

    /// 取得发言者的回复；第二个值表示是否为 HumanProxy 的自动回复
    async fn decide(
        &self,
        conversation: &Conversation,
        speaker: &Arc<Agent>,
        supervisor: &SessionSupervisor,
    ) -> Result<(AgentReply, bool), OrchestrationError> {
        let failed = |reason: String| OrchestrationError::DecisionFailed {
            agent: speaker.id().to_string(),
            reason,
        };

        match (speaker.kind(), speaker.decision()) {
            (_, Some(decision)) => {
                let memory = self.memory_snapshot(conversation, speaker);
                let ctx = DecisionContext {
                    agent_id: speaker.id(),
                    role: speaker.role(),
                    transcript: conversation.messages(),
                    memory: &memory,
                    tools: speaker.tools(),
                };
                let reply = supervisor
                    .guard(decision.decide(&ctx))
                    .await?
                    .map_err(|e| failed(e.0))?;
                Ok((reply, false))
            }
            (AgentKind::HumanProxy(cfg), None) => {
                let remaining = conversation
                    .participant_state(speaker.id())
                    .and_then(|s| s.remaining_auto_replies)
                    .unwrap_or(0);
                if remaining == 0 {
                    return Err(failed("no auto-replies left and no human input source".into()));
                }
                Ok((AgentReply::text(cfg.auto_reply.clone()), true))
            }
            (_, None) => Err(failed("no decision function".into())),
        }
    }

    /// 发言者可读的已绑定分区；不存在的分区不出现在快照中
    fn memory_snapshot(&self, conversation: &Conversation, speaker: &Agent) -> BTreeMap<String, SectionContent> {
        let mut snapshot = BTreeMap::new();
        for binding in speaker.bindings().iter().filter(|b| b.access.can_read()) {
            let key = conversation.resolve_section(&binding.section);
            match self.memory.read(&key) {
                Ok(content) => {
                    snapshot.insert(binding.section.clone(), content);
                }
                Err(MemoryError::SectionNotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(section = %key, error = %e, "Memory read failed, section omitted")
                }
            }
        }
        snapshot
    }

    /// 先查写权限再写（大小检查在存储内）；每个写入都产生一条结果记录在消息上
    fn apply_memory_writes(
        &self,
        conversation: &Conversation,
        speaker: &Agent,
        writes: &[MemoryWrite],
    ) -> Vec<MemoryWriteOutcome> {
        writes
            .iter()
            .map(|write| {
                let result = match speaker.binding(&write.section) {
                    Some(b) if b.access.can_write() => self
                        .memory
                        .write(&conversation.resolve_section(&write.section), write.content.clone()),
                    _ => Err(MemoryError::AccessDenied {
                        agent: speaker.id().to_string(),
                        section: write.section.clone(),
                        access: "write",
                    }),
                };
                match result {
                    Ok(()) => MemoryWriteOutcome {
                        section: write.section.clone(),
                        applied: true,
                        error: None,
                    },
                    Err(e) => {
                        let err = OrchestrationError::from(e);
                        let detail = match self.recovery.handle(&err) {
                            RecoveryAction::Report(detail) => detail,
                            _ => err.to_string(),
                        };
                        self.emit(ConversationEvent::MemoryWriteRejected {
                            conversation_id: conversation.id().to_string(),
                            speaker: speaker.id().to_string(),
                            section: write.section.clone(),
                            error: detail.clone(),
                        });
                        MemoryWriteOutcome {
                            section: write.section.clone(),
                            applied: false,
                            error: Some(detail),
                        }
                    }
                }
            })
            .collect()
    }

    fn commit(
        &self,
        conversation: &mut Conversation,
        speaker: &str,
        draft: MessageDraft,
        auto_reply: bool,
    ) -> Result<Option<TerminationReason>, OrchestrationError> {
        let message = conversation.append(draft)?.clone();
        conversation.record_turn(speaker, auto_reply);
        self.emit(ConversationEvent::MessageAppended {
            conversation_id: conversation.id().to_string(),
            message: message.clone(),
        });
        self.persist(conversation);
        Ok(termination::evaluate(
            &message,
            conversation.turns_taken(),
            conversation.config(),
            conversation.participants(),
            conversation.participant_states(),
        ))
    }

    fn fail(&self, conversation: &mut Conversation, err: &OrchestrationError) {
        let reason = FailureReason::from(err);
        conversation.fail(reason.clone());
        tracing::warn!(conversation = %conversation.id(), error = %err, "Conversation failed");
        self.emit(ConversationEvent::Failed {
            conversation_id: conversation.id().to_string(),
            reason,
        });
    }

    fn define_scoped_sections(&self, conversation: &Conversation) -> Result<(), MemoryError> {
        for spec in conversation.scoped_sections() {
            self.memory.define(&SectionSpec {
                name: conversation.resolve_section(&spec.name),
                ..spec.clone()
            })?;
        }
        Ok(())
    }

    fn remove_scoped_sections(&self, conversation: &Conversation) {
        for spec in conversation.scoped_sections() {
            let key = conversation.resolve_section(&spec.name);
            match self.memory.remove(&key) {
                Ok(()) | Err(MemoryError::SectionNotFound(_)) => {}
                Err(e) => tracing::warn!(section = %key, error = %e, "Failed to remove conversation section"),
            }
        }
    }

    fn persist(&self, conversation: &Conversation) {
        if let Some(p) = &self.persistence {
            if let Err(e) = p.save(conversation) {
                tracing::warn!(conversation = %conversation.id(), error = %e, "Transcript save failed");
            }
        }
    }

    fn emit(&self, event: ConversationEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

/// 未指定接收方时回复上一条消息的发送方；上一条是自己发的则广播
fn default_recipient(conversation: &Conversation, speaker: &str) -> Recipient {
    match conversation.transcript().last() {
        Some(last) if last.sender != speaker => Recipient::agent(last.sender.clone()),
        _ => Recipient::Broadcast,
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}
