//! 会话监管：取消与超时
//!
//! 每个对话一个 SessionSupervisor：持有 CancellationToken（外部取消）与可选截止时间（timeout_secs）。
//! 决策调用与工具调用都通过 guard 执行，取消或超时立即返回，未完成的本轮草稿随之丢弃。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::OrchestrationError;

#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl SessionSupervisor {
    /// 超时大到无法表示为时间点时视为不设截止时间
    pub fn new(cancel_token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel_token,
            deadline: timeout.and_then(|t| Instant::now().checked_add(t).map(|at| (at, t))),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// 子 token：取消会话时一并取消（如单次工具调用）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// 在进入下一轮前检查：已取消或已过截止时间
    pub fn check(&self) -> Result<(), OrchestrationError> {
        if self.cancel_token.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }
        if let Some((deadline, limit)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(OrchestrationError::TimedOut(limit));
            }
        }
        Ok(())
    }

    /// 以取消与截止时间约束一个 future
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, OrchestrationError>
    where
        F: Future<Output = T>,
    {
        match self.deadline {
            Some((deadline, limit)) => tokio::select! {
                _ = self.cancel_token.cancelled() => Err(OrchestrationError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(OrchestrationError::TimedOut(limit)),
                out = fut => Ok(out),
            },
            None => tokio::select! {
                _ = self.cancel_token.cancelled() => Err(OrchestrationError::Cancelled),
                out = fut => Ok(out),
            },
        }
    }
}
