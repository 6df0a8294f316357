//! CRUD 门面

use std::marker::PhantomData;
use std::sync::Arc;

use keel_common::{PagedResult, Pagination};
use keel_errors::{AppError, AppResult};
use keel_ports::{Entity, PageableRepository, Repository, Session};
use keel_uow::{SharedSession, UnitOfWork, UnitOfWorkProvider};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::query::{QueryHandler, QueryObject};

/// 仓储工厂：在每个作用域的共享会话上构造仓储
pub type RepositoryFactory<S, Repo> = Arc<dyn Fn(Arc<SharedSession<S>>) -> Repo + Send + Sync>;

/// 通用 CRUD 门面
///
/// 每个写操作包裹一个工作单元作用域：创建作用域、执行仓储操作、
/// 异步提交、释放。读操作同样开作用域（以便嵌套调用复用会话），
/// 但从不提交。
pub struct CrudFacade<S, E, Repo>
where
    S: Session,
    E: Entity<Id = Uuid> + Send + Sync,
    Repo: Repository<E, Uuid>,
{
    provider: UnitOfWorkProvider<S>,
    repos: RepositoryFactory<S, Repo>,
    _marker: PhantomData<fn() -> E>,
}

impl<S, E, Repo> CrudFacade<S, E, Repo>
where
    S: Session,
    E: Entity<Id = Uuid> + Send + Sync,
    Repo: Repository<E, Uuid>,
{
    pub fn new(
        provider: UnitOfWorkProvider<S>,
        repos: impl Fn(Arc<SharedSession<S>>) -> Repo + Send + Sync + 'static,
    ) -> Self {
        Self {
            provider,
            repos: Arc::new(repos),
            _marker: PhantomData,
        }
    }

    /// 新建实体
    pub async fn create(&self, entity: &E, cancel: &CancellationToken) -> AppResult<()> {
        let mut uow = self.provider.create()?;
        let repo = (self.repos)(uow.session());

        let outcome = match repo.save(entity).await {
            Ok(()) => uow.commit_async(cancel).await.map_err(AppError::from),
            Err(err) => Err(err),
        };
        Self::finish(uow, outcome)
    }

    /// 按 ID 查找
    pub async fn get(&self, id: &Uuid) -> AppResult<Option<E>> {
        let uow = self.provider.create()?;
        let repo = (self.repos)(uow.session());

        let outcome = repo.find_by_id(id).await;
        Self::finish(uow, outcome)
    }

    /// 更新已存在的实体
    pub async fn update(&self, entity: &E, cancel: &CancellationToken) -> AppResult<()> {
        let mut uow = self.provider.create()?;
        let repo = (self.repos)(uow.session());

        let outcome = match repo.exists(entity.id()).await {
            Ok(false) => Err(AppError::not_found(format!(
                "entity {} not found",
                entity.id()
            ))),
            Ok(true) => match repo.save(entity).await {
                Ok(()) => uow.commit_async(cancel).await.map_err(AppError::from),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        Self::finish(uow, outcome)
    }

    /// 按 ID 删除
    pub async fn delete(&self, id: &Uuid, cancel: &CancellationToken) -> AppResult<()> {
        let mut uow = self.provider.create()?;
        let repo = (self.repos)(uow.session());

        let outcome = match repo.exists(id).await {
            Ok(false) => Err(AppError::not_found(format!("entity {} not found", id))),
            Ok(true) => match repo.delete(id).await {
                Ok(()) => uow.commit_async(cancel).await.map_err(AppError::from),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        Self::finish(uow, outcome)
    }

    /// 在只读作用域内执行查询对象
    pub async fn fetch<Q, H>(&self, query: Q, handler: &H) -> AppResult<Q::Output>
    where
        Q: QueryObject,
        H: QueryHandler<Q>,
    {
        let uow = self.provider.create()?;
        let outcome = handler.handle(query).await;
        Self::finish(uow, outcome)
    }

    fn finish<T>(uow: UnitOfWork<S>, outcome: AppResult<T>) -> AppResult<T> {
        match outcome {
            Ok(value) => {
                uow.dispose()?;
                Ok(value)
            }
            Err(err) => {
                // 工作路径已失败：作用域照常释放，原始错误优先返回
                if let Err(dispose_err) = uow.dispose() {
                    warn!(error = %dispose_err, "scope disposal failed after operation error");
                }
                Err(err)
            }
        }
    }
}

impl<S, E, Repo> CrudFacade<S, E, Repo>
where
    S: Session,
    E: Entity<Id = Uuid> + Send + Sync,
    Repo: PageableRepository<E, Uuid>,
{
    /// 分页列表
    pub async fn list(&self, pagination: &Pagination) -> AppResult<PagedResult<E>> {
        let uow = self.provider.create()?;
        let repo = (self.repos)(uow.session());

        let outcome = async {
            let items = repo.find_all(pagination).await?;
            let total = repo.count().await?;
            Ok(PagedResult::new(items, total, pagination))
        }
        .await;
        Self::finish(uow, outcome)
    }
}
