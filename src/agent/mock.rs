//! 脚本化决策函数（用于测试与演示，无需模型）
//!
//! 按顺序返回预置回复；脚本用尽后返回 DecisionFailed，或按 repeat_last 重复最后一条。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::{AgentReply, DecisionContext, DecisionFailed, DecisionFunction};

#[derive(Debug, Clone)]
enum Step {
    Reply(AgentReply),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct ScriptedDecision {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<AgentReply>>,
    repeat_last: bool,
    delay: Option<Duration>,
}

impl ScriptedDecision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_replies(replies: impl IntoIterator<Item = AgentReply>) -> Self {
        let script = Self::new();
        for r in replies {
            script.push(r);
        }
        script
    }

    pub fn push(&self, reply: AgentReply) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(Step::Reply(reply));
        }
    }

    /// 追加一次失败
    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(Step::Fail(reason.into()));
        }
    }

    /// 脚本用尽后重复最后一条回复
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// 每次决策前等待一段时间（模拟模型延迟）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DecisionFunction for ScriptedDecision {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<AgentReply, DecisionFailed> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let step = self
            .steps
            .lock()
            .map_err(|_| DecisionFailed("script lock poisoned".to_string()))?
            .pop_front();
        match step {
            Some(Step::Reply(reply)) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(reply.clone());
                }
                Ok(reply)
            }
            Some(Step::Fail(reason)) => Err(DecisionFailed(reason)),
            None if self.repeat_last => self
                .last
                .lock()
                .ok()
                .and_then(|l| l.clone())
                .ok_or_else(|| DecisionFailed(format!("script for {} is empty", ctx.agent_id))),
            None => Err(DecisionFailed(format!("script for {} exhausted", ctx.agent_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn ctx<'a>(
        memory: &'a BTreeMap<String, crate::memory::SectionContent>,
        tools: &'a BTreeSet<String>,
    ) -> DecisionContext<'a> {
        DecisionContext {
            agent_id: "bot",
            role: "tester",
            transcript: &[],
            memory,
            tools,
        }
    }

    #[tokio::test]
    async fn test_script_order_and_exhaustion() {
        let script = ScriptedDecision::from_replies([AgentReply::text("one"), AgentReply::text("two")]);
        script.push_failure("boom");
        let (m, t) = (BTreeMap::new(), BTreeSet::new());
        assert_eq!(script.decide(&ctx(&m, &t)).await.unwrap().content, "one");
        assert_eq!(script.decide(&ctx(&m, &t)).await.unwrap().content, "two");
        assert_eq!(script.decide(&ctx(&m, &t)).await.unwrap_err().0, "boom");
        assert!(script.decide(&ctx(&m, &t)).await.is_err());
    }

    #[tokio::test]
    async fn test_repeat_last() {
        let script = ScriptedDecision::from_replies([AgentReply::text("again")]).repeat_last();
        let (m, t) = (BTreeMap::new(), BTreeSet::new());
        for _ in 0..3 {
            assert_eq!(script.decide(&ctx(&m, &t)).await.unwrap().content, "again");
        }
    }
}
