//! 多对话并发运行
//!
//! 每个对话一个 tokio 任务，共享同一个 Orchestrator（记忆存储与工具执行器经 Arc 共享）；
//! Semaphore 限制同时运行的对话数。对话之间互不影响：各自的记录、序号与取消令牌。

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::conversation::Conversation;
use crate::core::Orchestrator;

pub struct ConversationRunner {
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
}

impl ConversationRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// 当前可用的并发名额
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// 在后台运行一个对话，完成后返回处于终态的对话
    pub fn spawn(&self, mut conversation: Conversation) -> JoinHandle<Conversation> {
        let orchestrator = self.orchestrator.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            orchestrator.run(&mut conversation).await;
            conversation
        })
    }

    /// 并发运行全部对话，按输入顺序返回；任务 panic 的对话被丢弃并记录错误
    pub async fn run_all(&self, conversations: Vec<Conversation>) -> Vec<Conversation> {
        let handles: Vec<_> = conversations.into_iter().map(|c| self.spawn(c)).collect();
        join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(conversation) => Some(conversation),
                Err(e) => {
                    tracing::error!(error = %e, "Conversation task panicked");
                    None
                }
            })
            .collect()
    }
}
