//! 记忆层：分区定义、存储接口（内存 / 文件持久化）

pub mod file_store;
pub mod section;
pub mod store;

pub use file_store::FileMemoryStore;
pub use section::{MemorySection, SectionContent, SectionScope, SectionSpec, DEFAULT_MAX_SECTION_SIZE};
pub use store::{InMemoryStore, MemoryError, MemoryStore};
