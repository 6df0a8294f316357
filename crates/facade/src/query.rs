//! Query Object trait 定义

use async_trait::async_trait;
use keel_errors::AppResult;

/// Query Object trait
pub trait QueryObject: Send + Sync {
    type Output: Send;
}

/// Query Handler trait
#[async_trait]
pub trait QueryHandler<Q: QueryObject>: Send + Sync {
    async fn handle(&self, query: Q) -> AppResult<Q::Output>;
}
