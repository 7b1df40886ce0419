//! Echo 工具（演示与测试用）

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

use crate::tools::{Tool, ToolError};

/// echo 的参数（仅用于生成 schema）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct EchoArgs {
    /// 需要回显的文本
    text: String,
}

/// Echo 工具：回显 text 参数
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back. Args: {\"text\": \"message\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(EchoArgs)).unwrap_or_else(|_| serde_json::json!({}))
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        args.get("text")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ToolError::InvalidArguments("text must be a string".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_requires_text() {
        let schema = EchoTool.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "text"));
    }

    #[tokio::test]
    async fn test_echo_returns_text() {
        let mut args = Map::new();
        args.insert("text".to_string(), Value::from("hello"));
        assert_eq!(EchoTool.execute(&args).await.unwrap(), "hello");

        args.insert("text".to_string(), Value::from(3));
        assert!(EchoTool.execute(&args).await.is_err());
    }
}
