//! 文件持久化的记忆存储
//!
//! 以 InMemoryStore 为缓存，启动时从 JSON 文件加载全部分区；每次成功的 write / define / remove
//! 之后整体写回文件（写穿，临时文件 + rename）。写回失败时撤销内存中的修改并返回 Backend 错误，
//! 内存与文件始终一致。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::memory::{InMemoryStore, MemoryError, MemorySection, MemoryStore, SectionContent, SectionSpec};

pub struct FileMemoryStore {
    path: PathBuf,
    inner: InMemoryStore,
    /// 串行化落盘，避免并发写回互相覆盖
    flush_lock: Mutex<()>,
}

impl FileMemoryStore {
    /// 打开（或新建）存储文件；文件不存在时从空存储开始
    pub fn open(path: impl AsRef<Path>, default_max_size: usize) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        let inner = InMemoryStore::new(default_max_size);
        if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(backend)?;
            let sections: Vec<MemorySection> = serde_json::from_str(&data).map_err(backend)?;
            for section in sections {
                inner.insert_section(section)?;
            }
            tracing::debug!(path = %path.display(), "Loaded memory sections");
        }
        Ok(Self {
            path,
            inner,
            flush_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, MemoryError> {
        self.flush_lock
            .lock()
            .map_err(|_| MemoryError::Backend("flush lock poisoned".to_string()))
    }

    /// 调用方须持有 flush_lock
    fn flush(&self) -> Result<(), MemoryError> {
        let sections = self.inner.snapshot()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(backend)?;
        }
        let json = serde_json::to_string_pretty(&sections).map_err(backend)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(backend)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(backend(e));
        }
        Ok(())
    }

    /// 写回失败时把分区恢复成修改前的样子
    fn flush_or_restore(&self, section: &str, previous: Option<MemorySection>) -> Result<(), MemoryError> {
        let Err(e) = self.flush() else {
            return Ok(());
        };
        tracing::warn!(section, error = %e, "Memory flush failed, change rolled back");
        match previous {
            Some(old) => self.inner.insert_section(old)?,
            None => match self.inner.remove(section) {
                Ok(()) | Err(MemoryError::SectionNotFound(_)) => {}
                Err(other) => return Err(other),
            },
        }
        Err(e)
    }
}

fn backend(e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Backend(e.to_string())
}

impl MemoryStore for FileMemoryStore {
    fn read(&self, section: &str) -> Result<SectionContent, MemoryError> {
        self.inner.read(section)
    }

    fn write(&self, section: &str, content: SectionContent) -> Result<(), MemoryError> {
        let _guard = self.lock()?;
        let previous = self.inner.section_copy(section)?;
        self.inner.write(section, content)?;
        self.flush_or_restore(section, previous)
    }

    fn define(&self, spec: &SectionSpec) -> Result<(), MemoryError> {
        let _guard = self.lock()?;
        let previous = self.inner.section_copy(&spec.name)?;
        if previous.is_some() {
            return Ok(());
        }
        self.inner.define(spec)?;
        self.flush_or_restore(&spec.name, None)
    }

    fn remove(&self, section: &str) -> Result<(), MemoryError> {
        let _guard = self.lock()?;
        let previous = self.inner.section_copy(section)?;
        self.inner.remove(section)?;
        self.flush_or_restore(section, previous)
    }

    fn sections(&self) -> Vec<String> {
        self.inner.sections()
    }
}
