//! 记忆存储：按分区读写的键值抽象
//!
//! 存储本身不做权限检查（由编排器按 Agent 绑定检查），只保证分区大小不变式：
//! 超限写入被拒绝，旧内容保留。InMemoryStore 每个分区一把锁，不同分区可并行访问。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use crate::memory::{MemorySection, SectionContent, SectionSpec, DEFAULT_MAX_SECTION_SIZE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Section '{section}' too large: {size} bytes exceeds limit {max_size}")]
    SectionTooLarge {
        section: String,
        size: usize,
        max_size: usize,
    },

    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("Agent '{agent}' has no {access} access to section '{section}'")]
    AccessDenied {
        agent: String,
        section: String,
        access: &'static str,
    },

    #[error("Memory backend error: {0}")]
    Backend(String),
}

/// 记忆后端接口
pub trait MemoryStore: Send + Sync {
    fn read(&self, section: &str) -> Result<SectionContent, MemoryError>;

    /// 写入分区；超过 max_size 时返回 SectionTooLarge 且不修改旧内容
    fn write(&self, section: &str, content: SectionContent) -> Result<(), MemoryError>;

    /// 分区不存在时按 SectionSpec 创建；已存在则保持原样
    fn define(&self, spec: &SectionSpec) -> Result<(), MemoryError>;

    fn remove(&self, section: &str) -> Result<(), MemoryError>;

    fn sections(&self) -> Vec<String>;
}

/// 内存实现
pub struct InMemoryStore {
    sections: RwLock<HashMap<String, Arc<Mutex<MemorySection>>>>,
    default_max_size: usize,
}

impl InMemoryStore {
    pub fn new(default_max_size: usize) -> Self {
        Self {
            sections: RwLock::new(HashMap::new()),
            default_max_size,
        }
    }

    pub fn with_sections(specs: &[SectionSpec]) -> Result<Self, MemoryError> {
        let store = Self::default();
        for spec in specs {
            store.define(spec)?;
        }
        Ok(store)
    }

    fn section(&self, name: &str) -> Result<Option<Arc<Mutex<MemorySection>>>, MemoryError> {
        let map = self.sections.read().map_err(poisoned)?;
        Ok(map.get(name).cloned())
    }

    /// 单个分区的拷贝；不存在时返回 None
    pub(crate) fn section_copy(&self, name: &str) -> Result<Option<MemorySection>, MemoryError> {
        match self.section(name)? {
            Some(slot) => Ok(Some(slot.lock().map_err(poisoned)?.clone())),
            None => Ok(None),
        }
    }

    /// 当前所有分区的拷贝（供 FileMemoryStore 落盘）
    pub fn snapshot(&self) -> Result<Vec<MemorySection>, MemoryError> {
        let map = self.sections.read().map_err(poisoned)?;
        let mut out = Vec::with_capacity(map.len());
        for slot in map.values() {
            out.push(slot.lock().map_err(poisoned)?.clone());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub(crate) fn insert_section(&self, section: MemorySection) -> Result<(), MemoryError> {
        check_size(&section.name, &section.content, section.max_size)?;
        let mut map = self.sections.write().map_err(poisoned)?;
        map.insert(section.name.clone(), Arc::new(Mutex::new(section)));
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SECTION_SIZE)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> MemoryError {
    MemoryError::Backend("memory lock poisoned".to_string())
}

fn check_size(section: &str, content: &SectionContent, max_size: usize) -> Result<(), MemoryError> {
    let size = content.size();
    if size > max_size {
        return Err(MemoryError::SectionTooLarge {
            section: section.to_string(),
            size,
            max_size,
        });
    }
    Ok(())
}

impl MemoryStore for InMemoryStore {
    fn read(&self, section: &str) -> Result<SectionContent, MemoryError> {
        let slot = self
            .section(section)?
            .ok_or_else(|| MemoryError::SectionNotFound(section.to_string()))?;
        let guard = slot.lock().map_err(poisoned)?;
        Ok(guard.content.clone())
    }

    fn write(&self, section: &str, content: SectionContent) -> Result<(), MemoryError> {
        if let Some(slot) = self.section(section)? {
            let mut guard = slot.lock().map_err(poisoned)?;
            check_size(section, &content, guard.max_size)?;
            guard.content = content;
            return Ok(());
        }
        // 未定义的分区：按默认上限创建
        check_size(section, &content, self.default_max_size)?;
        let mut map = self.sections.write().map_err(poisoned)?;
        // 并发下可能已被其他写者创建
        if let Some(slot) = map.get(section).cloned() {
            let mut guard = slot.lock().map_err(poisoned)?;
            check_size(section, &content, guard.max_size)?;
            guard.content = content;
            return Ok(());
        }
        map.insert(
            section.to_string(),
            Arc::new(Mutex::new(MemorySection {
                name: section.to_string(),
                content,
                max_size: self.default_max_size,
            })),
        );
        Ok(())
    }

    fn define(&self, spec: &SectionSpec) -> Result<(), MemoryError> {
        check_size(&spec.name, &spec.initial, spec.max_size)?;
        let mut map = self.sections.write().map_err(poisoned)?;
        map.entry(spec.name.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(MemorySection {
                name: spec.name.clone(),
                content: spec.initial.clone(),
                max_size: spec.max_size,
            }))
        });
        Ok(())
    }

    fn remove(&self, section: &str) -> Result<(), MemoryError> {
        let mut map = self.sections.write().map_err(poisoned)?;
        map.remove(section)
            .map(|_| ())
            .ok_or_else(|| MemoryError::SectionNotFound(section.to_string()))
    }

    fn sections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sections
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_write_keeps_old_content() {
        let store = InMemoryStore::default();
        store
            .define(&SectionSpec::new("task", "initial").max_size(10))
            .unwrap();

        let err = store
            .write("task", SectionContent::from("this is far too long"))
            .unwrap_err();
        assert!(matches!(err, MemoryError::SectionTooLarge { max_size: 10, .. }));
        assert_eq!(store.read("task").unwrap(), SectionContent::from("initial"));

        store.write("task", SectionContent::from("short")).unwrap();
        assert_eq!(store.read("task").unwrap(), SectionContent::from("short"));
    }

    #[test]
    fn test_define_does_not_overwrite() {
        let store = InMemoryStore::default();
        store.define(&SectionSpec::new("user", "a")).unwrap();
        store.write("user", SectionContent::from("b")).unwrap();
        store.define(&SectionSpec::new("user", "a")).unwrap();
        assert_eq!(store.read("user").unwrap(), SectionContent::from("b"));
    }

    #[test]
    fn test_write_creates_with_default_limit() {
        let store = InMemoryStore::new(4);
        assert!(store.write("notes", SectionContent::from("12345")).is_err());
        assert!(matches!(
            store.read("notes"),
            Err(MemoryError::SectionNotFound(_))
        ));
        store.write("notes", SectionContent::from("1234")).unwrap();
        assert_eq!(store.sections(), vec!["notes".to_string()]);
    }

    #[test]
    fn test_remove_missing_section() {
        let store = InMemoryStore::default();
        assert!(matches!(
            store.remove("nope"),
            Err(MemoryError::SectionNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_writes_to_independent_sections() {
        let store = Arc::new(InMemoryStore::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..100 {
                        store
                            .write(&format!("s{i}"), SectionContent::from(format!("{j}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.sections().len(), 8);
        assert_eq!(store.read("s3").unwrap(), SectionContent::from("99"));
    }
}
