//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! ToolExecutor 在调用前按 schema 校验参数，并负责超时与重试。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::ToolError;

/// 工具 trait：名称、描述、参数 schema、异步执行（参数为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// 工具描述（供决策函数理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；执行器只检查其中的 "required" 字段
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ToolError>;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的工具 schema 列表（name / description / parameters），供决策函数拼提示词
    pub fn to_schema_json(&self) -> Value {
        let mut tools: Vec<(&String, &Arc<dyn Tool>)> = self.tools.iter().collect();
        tools.sort_by(|a, b| a.0.cmp(b.0));
        Value::Array(
            tools
                .into_iter()
                .map(|(name, tool)| {
                    serde_json::json!({
                        "name": name,
                        "description": tool.description(),
                        "parameters": tool.parameters_schema()
                    })
                })
                .collect(),
        )
    }
}

/// 按 schema 的 "required" 列表检查必填参数
pub fn validate_arguments(tool: &dyn Tool, args: &Map<String, Value>) -> Result<(), ToolError> {
    let schema = tool.parameters_schema();
    let missing: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|required| {
            required
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|key| !args.contains_key(*key))
                .collect()
        })
        .unwrap_or_default();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(format!(
            "{} missing required argument(s): {}",
            tool.name(),
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.tool_names(), vec!["echo".to_string()]);

        let schema = registry.to_schema_json();
        assert_eq!(schema[0]["name"], "echo");
    }

    #[test]
    fn test_validate_required_arguments() {
        let mut args = Map::new();
        let err = validate_arguments(&EchoTool, &args).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("text")));

        args.insert("text".to_string(), Value::from("hi"));
        assert!(validate_arguments(&EchoTool, &args).is_ok());
    }
}
