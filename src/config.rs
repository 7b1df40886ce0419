//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__CONVERSATION__MAX_TURNS=20`）。
//! ConversationConfig 是单个对话可识别的选项集合；从键值表构造时拒绝未知选项。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::OrchestrationError;
use crate::memory::{SectionScope, SectionSpec, DEFAULT_MAX_SECTION_SIZE};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub conversation: ConversationConfig,
    pub tools: ToolsSection,
    pub memory: MemorySection,
    pub runtime: RuntimeSection,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        self.conversation.validate()?;
        self.tools.validate()
    }
}

/// 调度策略：固定发言顺序，或按发言资格开放抢答
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    #[default]
    RoundBased,
    Open,
}

impl std::str::FromStr for SchedulingPolicy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "round_based" | "round-based" => Ok(SchedulingPolicy::RoundBased),
            "open" | "broadcast" => Ok(SchedulingPolicy::Open),
            other => Err(OrchestrationError::InvalidConfig(format!(
                "unknown scheduling_policy: {other}"
            ))),
        }
    }
}

/// [conversation] 段：单个对话的可识别选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversationConfig {
    /// 轮数上限（不含发起消息），必须 >= 1
    pub max_turns: usize,
    /// 终止短语：消息去掉尾部空白后以此结尾（忽略大小写）即终止
    pub termination_phrase: Option<String>,
    pub max_tool_retries: u32,
    pub scheduling_policy: SchedulingPolicy,
    /// 整个对话的超时（秒）；None 表示不限
    pub timeout_secs: Option<u64>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            termination_phrase: Some("TERMINATE".to_string()),
            max_tool_retries: 3,
            scheduling_policy: SchedulingPolicy::RoundBased,
            timeout_secs: Some(120),
        }
    }
}

const RECOGNIZED_OPTIONS: [&str; 5] = [
    "max_turns",
    "termination_phrase",
    "max_tool_retries",
    "scheduling_policy",
    "timeout_secs",
];

impl ConversationConfig {
    /// 从键值表构造（未出现的选项取默认值）；未知选项返回 UnknownOption，非法值返回 InvalidConfig
    pub fn from_options(options: &HashMap<String, Value>) -> Result<Self, OrchestrationError> {
        let mut unknown: Vec<&String> = options
            .keys()
            .filter(|k| !RECOGNIZED_OPTIONS.contains(&k.as_str()))
            .collect();
        unknown.sort();
        if let Some(first) = unknown.first() {
            return Err(OrchestrationError::UnknownOption((*first).clone()));
        }

        let mut cfg = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "max_turns" => cfg.max_turns = as_u64(key, value)? as usize,
                "termination_phrase" => {
                    cfg.termination_phrase = match value {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        _ => return Err(invalid(key, value)),
                    }
                }
                "max_tool_retries" => {
                    cfg.max_tool_retries =
                        u32::try_from(as_u64(key, value)?).map_err(|_| invalid(key, value))?
                }
                "scheduling_policy" => {
                    cfg.scheduling_policy = value
                        .as_str()
                        .ok_or_else(|| invalid(key, value))?
                        .parse()?
                }
                "timeout_secs" => {
                    cfg.timeout_secs = match value {
                        Value::Null => None,
                        v => Some(as_u64(key, v)?),
                    }
                }
                _ => {}
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.max_turns == 0 {
            return Err(OrchestrationError::InvalidConfig("max_turns must be at least 1".into()));
        }
        if matches!(&self.termination_phrase, Some(p) if p.trim().is_empty()) {
            return Err(OrchestrationError::InvalidConfig(
                "termination_phrase must not be blank".into(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(OrchestrationError::InvalidConfig("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn termination_phrase(mut self, phrase: Option<&str>) -> Self {
        self.termination_phrase = phrase.map(|p| p.to_string());
        self
    }

    pub fn max_tool_retries(mut self, retries: u32) -> Self {
        self.max_tool_retries = retries;
        self
    }

    pub fn scheduling_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.scheduling_policy = policy;
        self
    }

    pub fn timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn invalid(key: &str, value: &Value) -> OrchestrationError {
    OrchestrationError::InvalidConfig(format!("invalid value for {key}: {value}"))
}

fn as_u64(key: &str, value: &Value) -> Result<u64, OrchestrationError> {
    value.as_u64().ok_or_else(|| invalid(key, value))
}

/// [tools] 段：单次尝试超时与退避参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_multiplier: f64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            retry_initial_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            retry_multiplier: 2.0,
        }
    }
}

impl ToolsSection {
    /// 单次尝试超时为 0 时任何工具调用都会立即超时
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.tool_timeout_secs == 0 {
            return Err(OrchestrationError::InvalidConfig(
                "tool_timeout_secs must be positive".into(),
            ));
        }
        if !self.retry_multiplier.is_finite() {
            return Err(OrchestrationError::InvalidConfig(
                "retry_multiplier must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// [memory] 段：默认分区上限、可选的持久化文件、启动时定义的分区
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub default_max_section_size: usize,
    /// 设置后使用 FileMemoryStore，否则使用内存存储
    pub store_path: Option<PathBuf>,
    pub sections: Vec<SectionSpec>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            default_max_section_size: DEFAULT_MAX_SECTION_SIZE,
            store_path: None,
            sections: Vec::new(),
        }
    }
}

impl MemorySection {
    /// 声明为对话作用域的分区（每个对话开始时创建）
    pub fn conversation_sections(&self) -> Vec<SectionSpec> {
        self.sections
            .iter()
            .filter(|s| s.scope == SectionScope::Conversation)
            .cloned()
            .collect()
    }

    pub fn shared_sections(&self) -> impl Iterator<Item = &SectionSpec> {
        self.sections.iter().filter(|s| s.scope == SectionScope::Shared)
    }
}

/// [runtime] 段：并发对话数与对话记录目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub max_concurrent_conversations: usize,
    /// 设置后每轮结束把对话记录写入 <dir>/<conversation_id>.json
    pub transcript_dir: Option<PathBuf>,
    /// 日志级别（RUST_LOG 未设置时使用）
    pub log_level: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            max_concurrent_conversations: 4,
            transcript_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
