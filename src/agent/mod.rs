//! Agent：角色、工具能力集合、记忆绑定、终止条件与决策函数
//!
//! 三种变体：
//! - **TaskExecutor**：执行任务，可调用工具
//! - **Liaison**：对话型，不持有工具，面向人类做总结
//! - **HumanProxy**：不调用模型；按配置自动回复，或转发给外部人类输入源
//!
//! Agent 在启动时创建，可被多个对话共享（Arc<Agent>）；对话内的可变状态放在 ParticipantState。

pub mod decision;
pub mod mock;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

pub use decision::{AgentReply, DecisionContext, DecisionFailed, DecisionFunction};
pub use mock::ScriptedDecision;

use crate::conversation::{Message, Recipient, TerminationPredicate, ORCHESTRATOR_ID};
use crate::core::OrchestrationError;

/// 记忆分区访问权限
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn can_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Agent 对某个记忆分区的授权（能力授予，不是所有权）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryBinding {
    pub section: String,
    pub access: Access,
}

/// HumanProxy 的自动回复设置（对应 max_consecutive_auto_reply）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HumanProxyConfig {
    pub auto_reply: String,
    pub max_auto_replies: u32,
}

impl Default for HumanProxyConfig {
    fn default() -> Self {
        Self {
            auto_reply: String::new(),
            max_auto_replies: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentKind {
    TaskExecutor,
    Liaison,
    HumanProxy(HumanProxyConfig),
}

/// 开放式调度下的发言资格：针对上一条消息判断本 Agent 能否接话
#[derive(Clone)]
pub enum Eligibility {
    /// 上一条消息明确发给自己
    Addressed,
    /// 发给自己，或广播且不是自己发的
    Broadcast,
    /// 内容中提到自己（@id 或独立单词，忽略大小写），且不是自己发的
    Mentioned(Regex),
    Custom(Arc<dyn Fn(&Message, &str) -> bool + Send + Sync>),
}

impl Eligibility {
    pub fn matches(&self, agent_id: &str, last: &Message) -> bool {
        match self {
            Eligibility::Addressed => last.recipient.is_addressed_to(agent_id),
            Eligibility::Broadcast => {
                last.recipient.is_addressed_to(agent_id)
                    || (last.recipient == Recipient::Broadcast && last.sender != agent_id)
            }
            Eligibility::Mentioned(re) => last.sender != agent_id && re.is_match(&last.content),
            Eligibility::Custom(f) => f(last, agent_id),
        }
    }
}

impl fmt::Debug for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::Addressed => write!(f, "Addressed"),
            Eligibility::Broadcast => write!(f, "Broadcast"),
            Eligibility::Mentioned(re) => write!(f, "Mentioned({})", re.as_str()),
            Eligibility::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

fn mention_pattern(id: &str) -> Result<Regex, OrchestrationError> {
    Regex::new(&format!(r"(?i)(?:^|[^\w])@?{}(?:$|[^\w])", regex::escape(id)))
        .map_err(|e| OrchestrationError::InvalidConfig(format!("mention pattern for {id}: {e}")))
}

pub struct Agent {
    id: String,
    role: String,
    kind: AgentKind,
    tools: BTreeSet<String>,
    bindings: Vec<MemoryBinding>,
    eligibility: Eligibility,
    termination: Option<TerminationPredicate>,
    decision: Option<Arc<dyn DecisionFunction>>,
}

impl Agent {
    pub fn builder(id: impl Into<String>, kind: AgentKind) -> AgentBuilder {
        AgentBuilder::new(id, kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn kind(&self) -> &AgentKind {
        &self.kind
    }

    pub fn tools(&self) -> &BTreeSet<String> {
        &self.tools
    }

    pub fn can_use_tool(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    pub fn bindings(&self) -> &[MemoryBinding] {
        &self.bindings
    }

    pub fn binding(&self, section: &str) -> Option<&MemoryBinding> {
        self.bindings.iter().find(|b| b.section == section)
    }

    pub fn eligibility(&self) -> &Eligibility {
        &self.eligibility
    }

    pub fn termination(&self) -> Option<&TerminationPredicate> {
        self.termination.as_ref()
    }

    pub fn decision(&self) -> Option<&Arc<dyn DecisionFunction>> {
        self.decision.as_ref()
    }

    pub fn is_eligible(&self, last: &Message) -> bool {
        self.eligibility.matches(&self.id, last)
    }

    /// HumanProxy 且没有人类输入源时才计数自动回复
    pub fn auto_reply_budget(&self) -> Option<u32> {
        match &self.kind {
            AgentKind::HumanProxy(cfg) if self.decision.is_none() => Some(cfg.max_auto_replies),
            _ => None,
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("kind", &self.kind)
            .field("tools", &self.tools)
            .field("bindings", &self.bindings)
            .field("eligibility", &self.eligibility)
            .finish_non_exhaustive()
    }
}

enum EligibilityChoice {
    Fixed(Eligibility),
    Mentioned,
}

pub struct AgentBuilder {
    id: String,
    role: String,
    kind: AgentKind,
    tools: BTreeSet<String>,
    bindings: Vec<MemoryBinding>,
    eligibility: EligibilityChoice,
    termination: Option<TerminationPredicate>,
    decision: Option<Arc<dyn DecisionFunction>>,
}

impl AgentBuilder {
    pub fn new(id: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            role: String::new(),
            kind,
            tools: BTreeSet::new(),
            bindings: Vec::new(),
            eligibility: EligibilityChoice::Fixed(Eligibility::Addressed),
            termination: None,
            decision: None,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tools.insert(name.into());
        self
    }

    pub fn tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn bind(mut self, section: impl Into<String>, access: Access) -> Self {
        self.bindings.push(MemoryBinding {
            section: section.into(),
            access,
        });
        self
    }

    pub fn eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = EligibilityChoice::Fixed(eligibility);
        self
    }

    pub fn eligible_when_mentioned(mut self) -> Self {
        self.eligibility = EligibilityChoice::Mentioned;
        self
    }

    pub fn terminate_when(mut self, predicate: TerminationPredicate) -> Self {
        self.termination = Some(predicate);
        self
    }

    pub fn decision(mut self, decision: Arc<dyn DecisionFunction>) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn build(self) -> Result<Agent, OrchestrationError> {
        if self.id.trim().is_empty() {
            return Err(OrchestrationError::InvalidConfig("agent id must not be empty".into()));
        }
        if self.id == ORCHESTRATOR_ID {
            return Err(OrchestrationError::InvalidConfig(format!(
                "agent id '{ORCHESTRATOR_ID}' is reserved"
            )));
        }
        match &self.kind {
            AgentKind::Liaison if !self.tools.is_empty() => {
                return Err(OrchestrationError::InvalidConfig(format!(
                    "liaison agent '{}' cannot hold tools",
                    self.id
                )));
            }
            AgentKind::HumanProxy(_) if !self.tools.is_empty() => {
                return Err(OrchestrationError::InvalidConfig(format!(
                    "human proxy '{}' cannot hold tools",
                    self.id
                )));
            }
            AgentKind::TaskExecutor | AgentKind::Liaison if self.decision.is_none() => {
                return Err(OrchestrationError::InvalidConfig(format!(
                    "agent '{}' needs a decision function",
                    self.id
                )));
            }
            _ => {}
        }
        let mut seen = BTreeSet::new();
        for b in &self.bindings {
            if !seen.insert(b.section.as_str()) {
                return Err(OrchestrationError::InvalidConfig(format!(
                    "agent '{}' binds section '{}' twice",
                    self.id, b.section
                )));
            }
        }
        let eligibility = match self.eligibility {
            EligibilityChoice::Fixed(e) => e,
            EligibilityChoice::Mentioned => Eligibility::Mentioned(mention_pattern(&self.id)?),
        };
        Ok(Agent {
            id: self.id,
            role: self.role,
            kind: self.kind,
            tools: self.tools,
            bindings: self.bindings,
            eligibility,
            termination: self.termination,
            decision: self.decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{MessageDraft, Transcript};

    fn scripted() -> Arc<dyn DecisionFunction> {
        Arc::new(ScriptedDecision::new())
    }

    fn last(sender: &str, recipient: Recipient, content: &str) -> Message {
        let mut t = Transcript::new();
        t.append(MessageDraft::new(sender, recipient, content)).unwrap().clone()
    }

    #[test]
    fn test_liaison_rejects_tools() {
        let err = Agent::builder("liaison", AgentKind::Liaison)
            .tool("echo")
            .decision(scripted())
            .build()
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidConfig(_)));
    }

    #[test]
    fn test_executor_requires_decision() {
        assert!(Agent::builder("exec", AgentKind::TaskExecutor).build().is_err());
        assert!(Agent::builder("user", AgentKind::HumanProxy(HumanProxyConfig::default()))
            .build()
            .is_ok());
    }

    #[test]
    fn test_reserved_id_and_duplicate_binding() {
        assert!(Agent::builder(ORCHESTRATOR_ID, AgentKind::TaskExecutor)
            .decision(scripted())
            .build()
            .is_err());
        assert!(Agent::builder("a", AgentKind::TaskExecutor)
            .decision(scripted())
            .bind("task", Access::Read)
            .bind("task", Access::Write)
            .build()
            .is_err());
    }

    #[test]
    fn test_eligibility_rules() {
        let to_b = last("a", Recipient::agent("b"), "hello");
        let broadcast = last("a", Recipient::Broadcast, "anyone? ask @Coder");

        assert!(Eligibility::Addressed.matches("b", &to_b));
        assert!(!Eligibility::Addressed.matches("c", &to_b));
        assert!(!Eligibility::Addressed.matches("b", &broadcast));

        assert!(Eligibility::Broadcast.matches("c", &broadcast));
        assert!(!Eligibility::Broadcast.matches("a", &broadcast));

        let coder = Agent::builder("coder", AgentKind::TaskExecutor)
            .decision(scripted())
            .eligible_when_mentioned()
            .build()
            .unwrap();
        assert!(coder.is_eligible(&broadcast));
        assert!(!coder.is_eligible(&last("a", Recipient::Broadcast, "the decoders are fine")));
    }

    #[test]
    fn test_auto_reply_budget_only_without_input() {
        let proxy = Agent::builder(
            "user",
            AgentKind::HumanProxy(HumanProxyConfig {
                auto_reply: "continue".into(),
                max_auto_replies: 3,
            }),
        )
        .build()
        .unwrap();
        assert_eq!(proxy.auto_reply_budget(), Some(3));

        let with_input = Agent::builder("user", AgentKind::HumanProxy(HumanProxyConfig::default()))
            .decision(scripted())
            .build()
            .unwrap();
        assert_eq!(with_input.auto_reply_budget(), None);
    }
}
