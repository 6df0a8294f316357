//! PostgreSQL 会话

use async_trait::async_trait;
use futures::future::BoxFuture;
use keel_errors::{AppError, AppResult};
use keel_ports::Session;
use sqlx::postgres::{PgConnection, PgPool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 排队等待 flush 的语句
pub type QueuedStatement =
    Box<dyn for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, AppResult<()>> + Send>;

/// PostgreSQL 会话
///
/// 写语句进入队列，flush 时在同一个数据库事务里按序执行并提交。
/// 事务的原子性由 PostgreSQL 保证，本层不做额外承诺。
pub struct PgSession {
    pool: PgPool,
    queued: Vec<QueuedStatement>,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            queued: Vec::new(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 排队一条写语句
    pub fn enqueue(&mut self, statement: QueuedStatement) {
        self.queued.push(statement);
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }
}

#[async_trait]
impl Session for PgSession {
    /// 同步 flush 不受支持：sqlx 没有阻塞接口，同步部署请使用内存适配器
    fn flush(&mut self) -> AppResult<()> {
        Err(AppError::failed_precondition(
            "postgres session only supports asynchronous flush",
        ))
    }

    async fn flush_async(&mut self, cancel: &CancellationToken) -> AppResult<()> {
        if cancel.is_cancelled() {
            return Err(AppError::cancelled("flush cancelled before it began"));
        }
        if self.queued.is_empty() {
            return Ok(());
        }

        let queued = std::mem::take(&mut self.queued);
        let count = queued.len();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

        for statement in queued {
            if cancel.is_cancelled() {
                tx.rollback().await.map_err(|e| {
                    AppError::database(format!("Failed to rollback transaction: {}", e))
                })?;
                return Err(AppError::cancelled("flush cancelled mid-transaction"));
            }
            statement(&mut *tx).await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit transaction: {}", e)))?;
        debug!(statements = count, "postgres session flushed");
        Ok(())
    }

    fn release(&mut self) {
        if !self.queued.is_empty() {
            warn!(
                dropped = self.queued.len(),
                "releasing postgres session with unflushed statements"
            );
        }
        self.queued.clear();
    }
}
