//! Hive - 多 Agent 对话编排核心
//!
//! 模块划分：
//! - **agent**: Agent 定义（TaskExecutor / Liaison / HumanProxy）、决策函数边界、脚本化决策
//! - **config**: 应用配置加载（TOML + 环境变量）与对话选项
//! - **conversation**: 消息模型、对话记录、轮次调度、终止检测、事件与持久化
//! - **core**: 编排器主循环、错误与恢复、会话监管、多对话运行
//! - **memory**: 记忆分区与存储（内存 / 文件）
//! - **observability**: 日志初始化
//! - **tools**: Tool trait、注册表、重试策略与执行器

pub mod agent;
pub mod config;
pub mod conversation;
pub mod core;
pub mod memory;
pub mod observability;
pub mod tools;
