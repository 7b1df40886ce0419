//! 轮次调度：决定下一位发言者
//!
//! - RoundBasedScheduler：固定顺序轮流（可重复 Agent，如 liaison → executor → liaison）
//! - OpenScheduler：按注册顺序取第一个发言资格匹配上一条消息的参与者
//!
//! 没有可发言者是一等结果（None），由编排器转为 NoEligibleSpeaker。

use std::sync::Arc;

use crate::agent::Agent;
use crate::config::SchedulingPolicy;
use crate::conversation::Message;

pub struct SchedulingContext<'a> {
    pub transcript: &'a [Message],
    pub participants: &'a [Arc<Agent>],
    pub turns_taken: usize,
}

pub trait TurnScheduler: Send + Sync {
    fn next_speaker<'a>(&self, ctx: &SchedulingContext<'a>) -> Option<&'a Arc<Agent>>;
}

#[derive(Debug, Clone, Default)]
pub struct RoundBasedScheduler {
    order: Option<Vec<String>>,
}

impl RoundBasedScheduler {
    pub fn new(order: Option<Vec<String>>) -> Self {
        Self { order }
    }
}

impl TurnScheduler for RoundBasedScheduler {
    fn next_speaker<'a>(&self, ctx: &SchedulingContext<'a>) -> Option<&'a Arc<Agent>> {
        match &self.order {
            Some(order) => {
                if order.is_empty() {
                    return None;
                }
                let id = &order[ctx.turns_taken % order.len()];
                ctx.participants.iter().find(|a| a.id() == id)
            }
            None => {
                if ctx.participants.is_empty() {
                    return None;
                }
                ctx.participants.get(ctx.turns_taken % ctx.participants.len())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenScheduler;

impl TurnScheduler for OpenScheduler {
    fn next_speaker<'a>(&self, ctx: &SchedulingContext<'a>) -> Option<&'a Arc<Agent>> {
        let last = ctx.transcript.last()?;
        ctx.participants.iter().find(|a| a.is_eligible(last))
    }
}

pub fn scheduler_for(policy: SchedulingPolicy, order: Option<&[String]>) -> Box<dyn TurnScheduler> {
    match policy {
        SchedulingPolicy::RoundBased => Box::new(RoundBasedScheduler::new(order.map(|o| o.to_vec()))),
        SchedulingPolicy::Open => Box::new(OpenScheduler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentKind, Eligibility, ScriptedDecision};
    use crate::conversation::{MessageDraft, Recipient, Transcript};

    fn agent(id: &str, eligibility: Eligibility) -> Arc<Agent> {
        Arc::new(
            Agent::builder(id, AgentKind::Liaison)
                .decision(Arc::new(ScriptedDecision::new()))
                .eligibility(eligibility)
                .build()
                .unwrap(),
        )
    }

    fn transcript(sender: &str, recipient: Recipient, content: &str) -> Transcript {
        let mut t = Transcript::new();
        t.append(MessageDraft::new(sender, recipient, content)).unwrap();
        t
    }

    #[test]
    fn test_round_based_default_order() {
        let participants = vec![agent("liaison", Eligibility::Addressed), agent("executor", Eligibility::Addressed)];
        let t = transcript("user", Recipient::agent("liaison"), "go");
        let sched = RoundBasedScheduler::default();
        let ids: Vec<&str> = (0..4)
            .map(|turns_taken| {
                let ctx = SchedulingContext {
                    transcript: t.messages(),
                    participants: &participants,
                    turns_taken,
                };
                sched.next_speaker(&ctx).unwrap().id()
            })
            .collect();
        assert_eq!(ids, vec!["liaison", "executor", "liaison", "executor"]);
    }

    #[test]
    fn test_round_based_repeating_order_and_unknown_entry() {
        let participants = vec![agent("liaison", Eligibility::Addressed), agent("executor", Eligibility::Addressed)];
        let t = transcript("user", Recipient::agent("liaison"), "go");
        let sched = RoundBasedScheduler::new(Some(vec![
            "liaison".into(),
            "executor".into(),
            "liaison".into(),
            "ghost".into(),
        ]));
        let pick = |turns_taken| {
            let ctx = SchedulingContext {
                transcript: t.messages(),
                participants: &participants,
                turns_taken,
            };
            sched.next_speaker(&ctx).map(|a| a.id().to_string())
        };
        assert_eq!(pick(2).as_deref(), Some("liaison"));
        assert_eq!(pick(3), None);
        assert_eq!(pick(5).as_deref(), Some("executor"));
    }

    #[test]
    fn test_open_first_eligible_in_registration_order() {
        let participants = vec![
            agent("a", Eligibility::Addressed),
            agent("b", Eligibility::Broadcast),
            agent("c", Eligibility::Broadcast),
        ];
        let t = transcript("user", Recipient::Broadcast, "anyone?");
        let ctx = SchedulingContext {
            transcript: t.messages(),
            participants: &participants,
            turns_taken: 0,
        };
        assert_eq!(OpenScheduler.next_speaker(&ctx).unwrap().id(), "b");
    }

    #[test]
    fn test_open_no_match() {
        let participants = vec![
            agent("a", Eligibility::Addressed),
            agent("b", Eligibility::Addressed),
            agent("c", Eligibility::Addressed),
        ];
        let t = transcript("user", Recipient::agent("d"), "hello d");
        let ctx = SchedulingContext {
            transcript: t.messages(),
            participants: &participants,
            turns_taken: 0,
        };
        assert!(OpenScheduler.next_speaker(&ctx).is_none());
    }
}
