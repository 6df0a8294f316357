//! CRUD 门面测试

use std::sync::Arc;

use async_trait::async_trait;
use keel_adapter_memory::{MemoryBackend, MemoryRepository, MemoryStore};
use keel_common::{AuditInfo, Pagination};
use keel_errors::{AppError, AppResult};
use keel_facade::{CrudFacade, QueryHandler, QueryObject};
use keel_ports::{AggregateRoot, Entity, Repository};
use keel_uow::{AmbientRegistry, LocalRegistry, UnitOfWorkProvider};
use mockall::mock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Todo {
    id: Uuid,
    title: String,
    done: bool,
    audit: AuditInfo,
}

impl Todo {
    fn new(title: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: title.to_string(),
            done: false,
            audit: AuditInfo::default(),
        }
    }
}

impl Entity for Todo {
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.id
    }
}

impl AggregateRoot for Todo {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

type TodoFacade = CrudFacade<MemoryStore, Todo, MemoryRepository<Todo>>;

fn memory_facade() -> (TodoFacade, UnitOfWorkProvider<MemoryStore>) {
    let backend = MemoryBackend::new();
    let provider = UnitOfWorkProvider::new(Arc::new(LocalRegistry::new()), move || {
        Ok(MemoryStore::new(backend.clone()))
    });
    let facade = CrudFacade::new(provider.clone(), |session| {
        MemoryRepository::new("todos", session)
    });
    (facade, provider)
}

#[tokio::test]
async fn test_create_then_get() {
    let (facade, _) = memory_facade();
    let todo = Todo::new("ship the data layer");

    facade.create(&todo, &CancellationToken::new()).await.unwrap();

    let found = facade.get(&todo.id).await.unwrap().unwrap();
    assert_eq!(found.title, "ship the data layer");
    assert!(!found.done);
}

#[tokio::test]
async fn test_update_existing_entity() {
    let (facade, _) = memory_facade();
    let cancel = CancellationToken::new();
    let mut todo = Todo::new("draft");
    facade.create(&todo, &cancel).await.unwrap();

    todo.done = true;
    todo.audit_info_mut().update(None);
    facade.update(&todo, &cancel).await.unwrap();

    let found = facade.get(&todo.id).await.unwrap().unwrap();
    assert!(found.done);
    assert!(found.audit.updated_at >= found.audit.created_at);
}

#[tokio::test]
async fn test_update_missing_entity_is_not_found() {
    let (facade, _) = memory_facade();
    let todo = Todo::new("ghost");

    let err = facade
        .update(&todo, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_roundtrip() {
    let (facade, _) = memory_facade();
    let cancel = CancellationToken::new();
    let todo = Todo::new("temporary");
    facade.create(&todo, &cancel).await.unwrap();

    facade.delete(&todo.id, &cancel).await.unwrap();
    assert!(facade.get(&todo.id).await.unwrap().is_none());

    let err = facade.delete(&todo.id, &cancel).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_list_pages_committed_rows() {
    let (facade, _) = memory_facade();
    let cancel = CancellationToken::new();
    for i in 0..5 {
        facade
            .create(&Todo::new(&format!("item {}", i)), &cancel)
            .await
            .unwrap();
    }

    let page = facade.list(&Pagination::new(1, 2)).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages(), 3);
}

#[tokio::test]
async fn test_pre_cancelled_create_saves_nothing() {
    let (facade, _) = memory_facade();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let todo = Todo::new("never saved");

    let err = facade.create(&todo, &cancel).await.unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)));
    assert!(facade.get(&todo.id).await.unwrap().is_none());
}

struct DoneCountQuery;

impl QueryObject for DoneCountQuery {
    type Output = u64;
}

/// 通过环境作用域取会话的查询处理器
struct DoneCountHandler {
    provider: UnitOfWorkProvider<MemoryStore>,
}

#[async_trait]
impl QueryHandler<DoneCountQuery> for DoneCountHandler {
    async fn handle(&self, _query: DoneCountQuery) -> AppResult<u64> {
        let session = self
            .provider
            .current_session()
            .ok_or_else(|| AppError::internal("no ambient session"))?;
        let store = session.lock().await.map_err(AppError::from)?;
        Ok(store.row_count("todos") as u64)
    }
}

#[tokio::test]
async fn test_fetch_runs_inside_ambient_scope() {
    let (facade, provider) = memory_facade();
    let cancel = CancellationToken::new();
    facade.create(&Todo::new("one"), &cancel).await.unwrap();
    facade.create(&Todo::new("two"), &cancel).await.unwrap();

    let handler = DoneCountHandler { provider };
    let count = facade.fetch(DoneCountQuery, &handler).await.unwrap();
    assert_eq!(count, 2);
}

mock! {
    TodoRepo {}

    #[async_trait]
    impl Repository<Todo, Uuid> for TodoRepo {
        async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<Todo>>;
        async fn save(&self, entity: &Todo) -> AppResult<()>;
        async fn delete(&self, id: &Uuid) -> AppResult<()>;
        async fn exists(&self, id: &Uuid) -> AppResult<bool>;
    }
}

#[tokio::test]
async fn test_repository_error_propagates_and_scope_unwinds() {
    let registry = Arc::new(LocalRegistry::new());
    let backend = MemoryBackend::new();
    let provider: UnitOfWorkProvider<MemoryStore> =
        UnitOfWorkProvider::new(registry.clone(), move || Ok(MemoryStore::new(backend.clone())));

    let facade: CrudFacade<MemoryStore, Todo, MockTodoRepo> =
        CrudFacade::new(provider, |_session| {
            let mut repo = MockTodoRepo::new();
            repo.expect_save()
                .returning(|_| Err(AppError::database("insert failed")));
            repo
        });

    let err = facade
        .create(&Todo::new("doomed"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    // 失败路径上作用域照常释放
    assert_eq!(registry.depth(), 0);
}

#[tokio::test]
async fn test_get_uses_repository_lookup() {
    let registry = Arc::new(LocalRegistry::new());
    let backend = MemoryBackend::new();
    let provider: UnitOfWorkProvider<MemoryStore> =
        UnitOfWorkProvider::new(registry, move || Ok(MemoryStore::new(backend.clone())));

    let todo = Todo::new("mocked");
    let id = todo.id;
    let facade: CrudFacade<MemoryStore, Todo, MockTodoRepo> =
        CrudFacade::new(provider, move |_session| {
            let todo = todo.clone();
            let mut repo = MockTodoRepo::new();
            repo.expect_find_by_id()
                .returning(move |_| Ok(Some(todo.clone())));
            repo
        });

    let found = facade.get(&id).await.unwrap().unwrap();
    assert_eq!(found.id, id);
}
