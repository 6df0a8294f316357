//! 共享会话单元格
//!
//! 复用祖先会话的作用域持有同一个 `Arc<SharedSession>`，
//! 身份同一性即 `Arc::ptr_eq`。

use keel_ports::Session;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::{UowError, UowResult};

/// 作用域之间共享的会话单元格
///
/// 单元格内部是 `Option`：拥有会话的作用域释放时取走内部值，
/// 之后的访问以误用错误失败。会话约定上只属于单条逻辑调用链，
/// 锁竞争意味着调用方打破了约定，不值得等待。
pub struct SharedSession<S> {
    cell: Mutex<Option<S>>,
}

impl<S: Session> SharedSession<S> {
    pub(crate) fn new(session: S) -> Self {
        Self {
            cell: Mutex::new(Some(session)),
        }
    }

    /// 异步获取会话
    pub async fn lock(&self) -> UowResult<MappedMutexGuard<'_, S>> {
        let guard = self.cell.lock().await;
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| UowError::Misuse("session has already been released".into()))
    }

    /// 同步获取会话
    pub fn try_lock(&self) -> UowResult<MappedMutexGuard<'_, S>> {
        let guard = self.cell.try_lock().map_err(|_| {
            UowError::Misuse("session is locked elsewhere in the same logical chain".into())
        })?;
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| UowError::Misuse("session has already been released".into()))
    }

    /// 会话是否已被释放
    pub fn is_released(&self) -> bool {
        match self.cell.try_lock() {
            Ok(guard) => guard.is_none(),
            Err(_) => false,
        }
    }

    /// 取走会话内部值，供拥有者释放
    pub(crate) fn take(&self) -> Option<S> {
        match self.cell.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                tracing::warn!("session still locked while its owning scope is being disposed");
                None
            }
        }
    }
}
