//! 工具执行器
//!
//! 持有 ToolRegistry、单次尝试超时与退避策略。invoke(tool_name, args, max_retries) 最多尝试 max_retries + 1 次：
//! 仅瞬时错误（超时 / 限流 / 瞬时 I/O）重试，结构性错误（未知工具、参数错误）立即失败；
//! 最终总是返回 ToolResult（失败也作为工具结果交回 Agent），只有取消信号会让调用返回 Err。
//! 每次调用输出一条结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::conversation::ToolResult;
use crate::core::OrchestrationError;
use crate::tools::{validate_arguments, RetryPolicy, ToolError, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    policy: RetryPolicy,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            policy: RetryPolicy::default(),
        }
    }

    /// 设置退避参数（max_retries 以 invoke 的参数为准）
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 调用工具并按策略重试；cancel 触发时立即放弃（包括退避等待）并返回 Cancelled
    pub async fn invoke(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, OrchestrationError> {
        let start = Instant::now();
        let policy = self.policy.clone().with_max_retries(max_retries);

        let (result, attempts) = match self.registry.get(tool_name) {
            None => (Err(ToolError::UnknownTool(tool_name.to_string())), 1),
            Some(tool) => match validate_arguments(tool.as_ref(), args) {
                Err(e) => (Err(e), 1),
                Ok(()) => {
                    let mut attempt = 0u32;
                    loop {
                        attempt += 1;
                        let outcome = tokio::select! {
                            _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
                            r = timeout(self.timeout, tool.execute(args)) => match r {
                                Ok(inner) => inner,
                                Err(_) => Err(ToolError::Timeout(format!(
                                    "{tool_name} exceeded {}ms",
                                    self.timeout.as_millis()
                                ))),
                            },
                        };
                        match outcome {
                            Err(e) if e.is_transient() && attempt < policy.max_attempts() => {
                                let delay = policy.delay_after(attempt, e.retry_after_ms());
                                tracing::warn!(
                                    tool = tool_name,
                                    attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %e,
                                    "Transient tool error, retrying"
                                );
                                tokio::select! {
                                    _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                            other => break (other, attempt),
                        }
                    }
                }
            },
        };

        let (ok, outcome): (bool, &str) = match &result {
            Ok(_) => (true, "ok"),
            Err(e) if e.is_transient() => (false, "exhausted"),
            Err(_) => (false, "error"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "attempts": attempts,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        Ok(match result {
            Ok(output) => ToolResult::success(output, attempts),
            Err(e) => ToolResult::failure(e.to_string(), attempts),
        })
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
