//! 内存表存储会话

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use keel_errors::AppResult;
use keel_ports::Session;
use serde_json::Value;
use uuid::Uuid;

enum StagedOp {
    Upsert { table: String, id: Uuid, row: Value },
    Delete { table: String, id: Uuid },
}

type Tables = HashMap<String, BTreeMap<Uuid, Value>>;

/// 共享的内存后端
///
/// 扮演"数据库"的角色：在会话之间共享，存放已提交的行。
/// 克隆是浅拷贝，指向同一份数据。
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        f(&tables)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        f(&mut tables)
    }
}

/// 内存表存储会话
///
/// 写操作进入本会话的暂存队列，[`Session::flush`] 将队列排空并入
/// 共享后端，因此重复 flush 天然幂等；读操作只看到已提交状态。
#[derive(Default)]
pub struct MemoryStore {
    backend: MemoryBackend,
    staged: Vec<StagedOp>,
}

impl MemoryStore {
    pub fn new(backend: MemoryBackend) -> Self {
        Self {
            backend,
            staged: Vec::new(),
        }
    }

    /// 暂存一次插入或更新
    pub fn stage_upsert(&mut self, table: impl Into<String>, id: Uuid, row: Value) {
        self.staged.push(StagedOp::Upsert {
            table: table.into(),
            id,
            row,
        });
    }

    /// 暂存一次删除
    pub fn stage_delete(&mut self, table: impl Into<String>, id: Uuid) {
        self.staged.push(StagedOp::Delete {
            table: table.into(),
            id,
        });
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// 已提交的行
    pub fn get(&self, table: &str, id: &Uuid) -> Option<Value> {
        self.backend
            .read(|tables| tables.get(table).and_then(|rows| rows.get(id)).cloned())
    }

    pub fn contains(&self, table: &str, id: &Uuid) -> bool {
        self.get(table, id).is_some()
    }

    /// 已提交的行，按 ID 顺序
    pub fn scan(&self, table: &str) -> Vec<Value> {
        self.backend.read(|tables| {
            tables
                .get(table)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.backend
            .read(|tables| tables.get(table).map_or(0, |rows| rows.len()))
    }
}

impl Session for MemoryStore {
    fn flush(&mut self) -> AppResult<()> {
        let staged: Vec<StagedOp> = self.staged.drain(..).collect();
        self.backend.write(|tables| {
            for op in staged {
                match op {
                    StagedOp::Upsert { table, id, row } => {
                        tables.entry(table).or_default().insert(id, row);
                    }
                    StagedOp::Delete { table, id } => {
                        if let Some(rows) = tables.get_mut(&table) {
                            rows.remove(&id);
                        }
                    }
                }
            }
        });
        Ok(())
    }

    fn release(&mut self) {
        if !self.staged.is_empty() {
            tracing::debug!(
                dropped = self.staged.len(),
                "releasing memory store with unflushed operations"
            );
        }
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_staged_ops_invisible_until_flush() {
        let mut store = MemoryStore::default();
        let id = Uuid::now_v7();

        store.stage_upsert("todos", id, json!({"title": "write tests"}));
        assert!(!store.contains("todos", &id));

        store.flush().unwrap();
        assert!(store.contains("todos", &id));
        assert_eq!(store.staged_len(), 0);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut store = MemoryStore::default();
        let id = Uuid::now_v7();

        store.stage_upsert("todos", id, json!({"n": 1}));
        store.flush().unwrap();
        store.flush().unwrap();
        assert_eq!(store.row_count("todos"), 1);
    }

    #[test]
    fn test_delete_after_upsert() {
        let mut store = MemoryStore::default();
        let id = Uuid::now_v7();

        store.stage_upsert("todos", id, json!({"n": 1}));
        store.stage_delete("todos", id);
        store.flush().unwrap();
        assert!(!store.contains("todos", &id));
    }

    #[test]
    fn test_release_discards_staged_work() {
        let mut store = MemoryStore::default();
        let id = Uuid::now_v7();

        store.stage_upsert("todos", id, json!({"n": 1}));
        store.release();
        store.flush().unwrap();
        assert_eq!(store.row_count("todos"), 0);
    }

    #[test]
    fn test_backend_shared_between_sessions() {
        let backend = MemoryBackend::new();
        let id = Uuid::now_v7();

        let mut first = MemoryStore::new(backend.clone());
        first.stage_upsert("todos", id, json!({"n": 1}));
        first.flush().unwrap();
        drop(first);

        let second = MemoryStore::new(backend);
        assert!(second.contains("todos", &id));
    }
}
