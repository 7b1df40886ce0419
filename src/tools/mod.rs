//! 工具层：Tool trait、注册表、错误分类、重试策略与执行器

pub mod echo;
pub mod error;
pub mod executor;
pub mod registry;
pub mod retry;

pub use echo::EchoTool;
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use registry::{validate_arguments, Tool, ToolRegistry};
pub use retry::RetryPolicy;
