//! Hive 演示入口
//!
//! 加载配置、初始化日志，运行一段 liaison ↔ executor 的脚本化对话并打印对话记录。
//! 用法：`hive [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hive::agent::{Access, Agent, AgentKind, AgentReply, ScriptedDecision};
use hive::config::load_config;
use hive::conversation::{Conversation, MemoryWrite, Message, Recipient, ToolCall};
use hive::core::{ConversationRunner, Orchestrator};
use hive::observability;
use hive::tools::{EchoTool, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    observability::init(&cfg.runtime.log_level);

    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let orchestrator = Arc::new(Orchestrator::from_config(&cfg, registry).context("Failed to build orchestrator")?);

    let liaison = Agent::builder("liaison", AgentKind::Liaison)
        .role("Talks to the user and delegates work")
        .bind("task", Access::Read)
        .decision(Arc::new(ScriptedDecision::from_replies([
            AgentReply::text("Please greet the user through the echo tool.").to(Recipient::agent("executor")),
            AgentReply::text("Thanks. Anything left?").to(Recipient::agent("executor")),
            AgentReply::text("Summarizing for the user.").to(Recipient::agent("executor")),
        ])))
        .build()?;

    let executor = Agent::builder("executor", AgentKind::TaskExecutor)
        .role("Executes tasks with tools")
        .tool("echo")
        .bind("task", Access::ReadWrite)
        .bind("scratch", Access::ReadWrite)
        .decision(Arc::new(ScriptedDecision::from_replies([
            AgentReply::text("Calling echo.")
                .with_tool_call(ToolCall::new("echo").arg("text", "Hello from hive").with_thought("greet"))
                .with_memory_write(MemoryWrite::new("scratch", "greeting sent")),
            AgentReply::text("Recording progress.").with_memory_write(MemoryWrite::new("task", "greet user: done")),
            AgentReply::text("Done. TERMINATE"),
        ])))
        .build()?;

    let conversation = Conversation::builder(cfg.conversation.clone())
        .participants([Arc::new(liaison), Arc::new(executor)])
        .scoped_sections(cfg.memory.conversation_sections())
        .initiate("user", Recipient::agent("liaison"), "Say hello to me, please.")
        .build()?;

    let runner = ConversationRunner::new(orchestrator.clone(), cfg.runtime.max_concurrent_conversations);
    for conversation in runner.run_all(vec![conversation]).await {
        println!("conversation {} -> {}", conversation.id(), conversation.state().label());
        for message in conversation.messages() {
            print_message(message);
        }
        println!("{}", serde_json::to_string_pretty(&conversation.snapshot())?);
    }

    Ok(())
}

fn print_message(message: &Message) {
    let to = match &message.recipient {
        Recipient::Agent(id) => id.as_str(),
        Recipient::Broadcast => "*",
    };
    println!("[{}] {} -> {}: {}", message.sequence, message.sender, to, message.content);
    if let (Some(call), Some(result)) = (&message.tool_call, &message.tool_result) {
        println!(
            "    tool {} ({:?}, {} attempt(s)): {}",
            call.tool_name, result.status, result.attempt_count, result.output
        );
    }
    for write in &message.memory_writes {
        match &write.error {
            None => println!("    memory {} updated", write.section),
            Some(e) => println!("    memory {} rejected: {}", write.section, e),
        }
    }
}
