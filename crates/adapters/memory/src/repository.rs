//! 内存仓储实现

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use keel_common::Pagination;
use keel_errors::{AppError, AppResult};
use keel_ports::{Entity, PageableRepository, Repository};
use keel_uow::SharedSession;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::store::MemoryStore;

/// 基于内存表存储的仓储
///
/// 写操作暂存进共享会话，由拥有会话的工作单元在提交时落盘；
/// 读操作只看到已提交状态。
pub struct MemoryRepository<E> {
    table: String,
    session: Arc<SharedSession<MemoryStore>>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> MemoryRepository<E> {
    pub fn new(table: impl Into<String>, session: Arc<SharedSession<MemoryStore>>) -> Self {
        Self {
            table: table.into(),
            session,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<E> Repository<E, Uuid> for MemoryRepository<E>
where
    E: Entity<Id = Uuid> + Serialize + DeserializeOwned + Send + Sync,
{
    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<E>> {
        let store = self.session.lock().await.map_err(AppError::from)?;
        match store.get(&self.table, id) {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, entity: &E) -> AppResult<()> {
        debug!(table = %self.table, id = %entity.id(), "staging upsert");
        let row = serde_json::to_value(entity)?;
        let mut store = self.session.lock().await.map_err(AppError::from)?;
        store.stage_upsert(&self.table, *entity.id(), row);
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> AppResult<()> {
        debug!(table = %self.table, id = %id, "staging delete");
        let mut store = self.session.lock().await.map_err(AppError::from)?;
        store.stage_delete(&self.table, *id);
        Ok(())
    }

    async fn exists(&self, id: &Uuid) -> AppResult<bool> {
        let store = self.session.lock().await.map_err(AppError::from)?;
        Ok(store.contains(&self.table, id))
    }
}

#[async_trait]
impl<E> PageableRepository<E, Uuid> for MemoryRepository<E>
where
    E: Entity<Id = Uuid> + Serialize + DeserializeOwned + Send + Sync,
{
    async fn find_all(&self, pagination: &Pagination) -> AppResult<Vec<E>> {
        let store = self.session.lock().await.map_err(AppError::from)?;
        store
            .scan(&self.table)
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .map(|row| serde_json::from_value(row).map_err(AppError::from))
            .collect()
    }

    async fn count(&self) -> AppResult<u64> {
        let store = self.session.lock().await.map_err(AppError::from)?;
        Ok(store.row_count(&self.table) as u64)
    }
}
