//! 持久化会话 trait 定义

use async_trait::async_trait;
use keel_errors::{AppError, AppResult};
use tokio_util::sync::CancellationToken;

/// 持久化会话 trait
///
/// 会话累积写操作，`flush` 将其原子地持久化到底层存储。
/// 重复 flush 必须是幂等的：已持久化的变更不会被再次应用。
#[async_trait]
pub trait Session: Send + 'static {
    /// 同步持久化累积的变更
    fn flush(&mut self) -> AppResult<()>;

    /// 异步持久化累积的变更
    ///
    /// 若调用时取消信号已触发，立即失败且不开始持久化。
    async fn flush_async(&mut self, cancel: &CancellationToken) -> AppResult<()> {
        if cancel.is_cancelled() {
            return Err(AppError::cancelled("flush cancelled before it began"));
        }
        self.flush()
    }

    /// 释放会话占用的底层资源，丢弃未持久化的变更
    fn release(&mut self);
}
