//! 工具错误分类：可重试（瞬时）与结构性错误

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool timed out: {0}")]
    Timeout(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    Failed(String),
}

impl ToolError {
    /// 是否为瞬时错误（超时、限流、瞬时 I/O），只有这类错误会触发重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ToolError::Timeout(_) | ToolError::RateLimited { .. } | ToolError::TransientIo(_)
        )
    }

    /// 服务端建议的重试等待（毫秒）
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ToolError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}
