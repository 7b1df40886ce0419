//! 终止检测
//!
//! 每轮追加消息后按固定顺序判断，先匹配者生效：
//! 1. 对话终止短语（去掉尾部空白后忽略大小写的后缀匹配）
//! 2. 已完成轮数 >= max_turns
//! 3. 按注册顺序检查参与者：自定义终止条件；HumanProxy 自动回复次数用尽

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::config::ConversationConfig;
use crate::conversation::{Message, ParticipantState};
use crate::core::TerminationReason;

/// 参与者自定义终止条件：(刚追加的消息, 已完成轮数, 该参与者状态)
pub type TerminationPredicate = Arc<dyn Fn(&Message, usize, &ParticipantState) -> bool + Send + Sync>;

pub fn predicate<F>(f: F) -> TerminationPredicate
where
    F: Fn(&Message, usize, &ParticipantState) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 消息以指定短语结尾即终止
pub fn ends_with(phrase: impl Into<String>) -> TerminationPredicate {
    let phrase = phrase.into();
    Arc::new(move |msg: &Message, _, _: &ParticipantState| msg.ends_with_phrase(&phrase))
}

/// 该参与者自己发出的消息达到 n 条即终止
pub fn after_own_turns(n: usize) -> TerminationPredicate {
    Arc::new(move |_: &Message, _, state: &ParticipantState| state.turns_taken >= n)
}

pub fn evaluate(
    last: &Message,
    turns_taken: usize,
    config: &ConversationConfig,
    participants: &[Arc<Agent>],
    states: &HashMap<String, ParticipantState>,
) -> Option<TerminationReason> {
    if let Some(phrase) = config.termination_phrase.as_deref() {
        if last.ends_with_phrase(phrase) {
            return Some(TerminationReason::PhraseMatched {
                phrase: phrase.to_string(),
                sequence: last.sequence,
            });
        }
    }

    if turns_taken >= config.max_turns {
        return Some(TerminationReason::MaxTurns { turns: turns_taken });
    }

    let idle = ParticipantState::default();
    for agent in participants {
        let state = states.get(agent.id()).unwrap_or(&idle);
        if let Some(pred) = agent.termination() {
            if pred(last, turns_taken, state) {
                return Some(TerminationReason::Participant {
                    agent: agent.id().to_string(),
                });
            }
        }
        if state.remaining_auto_replies == Some(0) {
            return Some(TerminationReason::AutoRepliesExhausted {
                agent: agent.id().to_string(),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentKind, HumanProxyConfig, ScriptedDecision};
    use crate::conversation::{MessageDraft, Recipient, Transcript};

    fn message(content: &str) -> Message {
        let mut t = Transcript::new();
        t.append(MessageDraft::new("executor", Recipient::agent("liaison"), content))
            .unwrap()
            .clone()
    }

    fn executor(termination: Option<TerminationPredicate>) -> Arc<Agent> {
        let mut b = Agent::builder("executor", AgentKind::TaskExecutor)
            .decision(Arc::new(ScriptedDecision::new()));
        if let Some(p) = termination {
            b = b.terminate_when(p);
        }
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn test_phrase_wins_over_max_turns() {
        let cfg = ConversationConfig::default().max_turns(3);
        let reason = evaluate(&message("Done. terminate  \n"), 3, &cfg, &[], &HashMap::new());
        assert!(matches!(reason, Some(TerminationReason::PhraseMatched { .. })));
    }

    #[test]
    fn test_max_turns() {
        let cfg = ConversationConfig::default().max_turns(3);
        assert_eq!(evaluate(&message("working"), 2, &cfg, &[], &HashMap::new()), None);
        assert_eq!(
            evaluate(&message("working"), 3, &cfg, &[], &HashMap::new()),
            Some(TerminationReason::MaxTurns { turns: 3 })
        );
    }

    #[test]
    fn test_phrase_disabled() {
        let cfg = ConversationConfig::default().termination_phrase(None);
        assert_eq!(evaluate(&message("TERMINATE"), 1, &cfg, &[], &HashMap::new()), None);
    }

    #[test]
    fn test_participant_predicate() {
        let cfg = ConversationConfig::default();
        let agents = vec![executor(Some(after_own_turns(2)))];
        let mut states = HashMap::new();
        states.insert(
            "executor".to_string(),
            ParticipantState {
                turns_taken: 1,
                remaining_auto_replies: None,
            },
        );
        assert_eq!(evaluate(&message("step"), 1, &cfg, &agents, &states), None);
        states.get_mut("executor").unwrap().turns_taken = 2;
        assert_eq!(
            evaluate(&message("step"), 2, &cfg, &agents, &states),
            Some(TerminationReason::Participant {
                agent: "executor".into()
            })
        );
    }

    #[test]
    fn test_human_proxy_exhausted() {
        let cfg = ConversationConfig::default();
        let proxy = Arc::new(
            Agent::builder("user", AgentKind::HumanProxy(HumanProxyConfig::default()))
                .build()
                .unwrap(),
        );
        let mut states = HashMap::new();
        states.insert(
            "user".to_string(),
            ParticipantState {
                turns_taken: 2,
                remaining_auto_replies: Some(0),
            },
        );
        assert_eq!(
            evaluate(&message("ok"), 2, &cfg, &[proxy], &states),
            Some(TerminationReason::AutoRepliesExhausted { agent: "user".into() })
        );
    }
}
