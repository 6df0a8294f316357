//! 工作单元作用域
//!
//! 协调逻辑（所有权、待定提交、注册表入栈出栈）集中在这里的具体
//! 类型中，不可覆写；后端差异只存在于 [`Session`] trait 之后。

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keel_errors::AppError;
use keel_ports::Session;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{UowError, UowResult};
use crate::registry::AmbientRegistry;
use crate::session::SharedSession;

/// 作用域的共享状态
///
/// 注册表和子作用域通过 `Arc<ScopeState>` 引用它；子作用域用
/// [`ScopeState::request_commit`] 向上登记提交意图。
pub struct ScopeState {
    id: Uuid,
    session_type: TypeId,
    owns_session: bool,
    child_commit_aware: bool,
    commit_pending: AtomicBool,
}

impl ScopeState {
    pub(crate) fn new(session_type: TypeId, owns_session: bool, child_commit_aware: bool) -> Self {
        Self {
            id: keel_common::new_id(),
            session_type,
            owns_session,
            child_commit_aware,
            commit_pending: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owns_session(&self) -> bool {
        self.owns_session
    }

    pub fn is_child_commit_aware(&self) -> bool {
        self.child_commit_aware
    }

    pub fn is_commit_pending(&self) -> bool {
        self.commit_pending.load(Ordering::SeqCst)
    }

    pub(crate) fn session_type(&self) -> TypeId {
        self.session_type
    }

    /// 登记一次提交请求
    ///
    /// 仅记录意图，不发生任何持久化。不跟踪子提交的作用域静默丢弃
    /// 请求并返回 `false`——传播是可选参与的。
    pub fn request_commit(&self) -> bool {
        if !self.child_commit_aware {
            return false;
        }
        self.commit_pending.store(true, Ordering::SeqCst);
        true
    }

    fn clear_commit_pending(&self) {
        self.commit_pending.store(false, Ordering::SeqCst);
    }
}

/// 工作单元作用域
///
/// 由 [`UnitOfWorkProvider`](crate::UnitOfWorkProvider) 创建。拥有会话的
/// 作用域在提交时落盘、释放时归还会话；复用祖先会话的作用域提交时只向
/// 父作用域转发意图。释放走显式的 [`UnitOfWork::dispose`]，`Drop` 只是
/// 异常路径上的兜底：同样出栈并归还会话，但类型化的待定提交错误只有
/// `dispose` 能返回。
pub struct UnitOfWork<S: Session> {
    state: Arc<ScopeState>,
    session: Arc<SharedSession<S>>,
    parent: Option<Arc<ScopeState>>,
    registry: Arc<dyn AmbientRegistry>,
    disposed: bool,
}

impl<S: Session> std::fmt::Debug for UnitOfWork<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.state.id())
            .field("owns_session", &self.state.owns_session())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl<S: Session> UnitOfWork<S> {
    pub(crate) fn new(
        state: Arc<ScopeState>,
        session: Arc<SharedSession<S>>,
        parent: Option<Arc<ScopeState>>,
        registry: Arc<dyn AmbientRegistry>,
    ) -> Self {
        Self {
            state,
            session,
            parent,
            registry,
            disposed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.id()
    }

    pub fn owns_session(&self) -> bool {
        self.state.owns_session()
    }

    pub fn is_commit_pending(&self) -> bool {
        self.state.is_commit_pending()
    }

    /// 本作用域的共享会话句柄
    pub fn session(&self) -> Arc<SharedSession<S>> {
        self.session.clone()
    }

    /// 向本作用域登记子提交请求
    pub fn request_commit(&self) -> bool {
        self.state.request_commit()
    }

    /// 同步提交
    ///
    /// 拥有会话时清除待定标记并落盘；否则仅向父作用域转发意图。
    /// 会话级 flush 是幂等的，重复提交不会重复落盘。
    pub fn commit(&mut self) -> UowResult<()> {
        if self.state.owns_session() {
            self.state.clear_commit_pending();
            let mut session = self.session.try_lock()?;
            session.flush().map_err(UowError::Persistence)?;
            debug!(scope_id = %self.state.id(), "unit of work committed");
        } else {
            self.forward_commit_intent();
        }
        Ok(())
    }

    /// 异步提交
    ///
    /// 取消信号已触发时立即失败，不开始持久化；进行中的取消由底层
    /// 会话尽力而为，本层只负责透传信号。
    pub async fn commit_async(&mut self, cancel: &CancellationToken) -> UowResult<()> {
        if cancel.is_cancelled() {
            return Err(UowError::Cancelled);
        }
        if self.state.owns_session() {
            self.state.clear_commit_pending();
            let mut session = self.session.lock().await?;
            session.flush_async(cancel).await.map_err(|err| match err {
                AppError::Cancelled(_) => UowError::Cancelled,
                other => UowError::Persistence(other),
            })?;
            debug!(scope_id = %self.state.id(), "unit of work committed");
        } else {
            self.forward_commit_intent();
        }
        Ok(())
    }

    fn forward_commit_intent(&self) {
        match &self.parent {
            Some(parent) if parent.request_commit() => {
                debug!(
                    scope_id = %self.state.id(),
                    parent_id = %parent.id(),
                    "commit deferred to the session-owning chain"
                );
            }
            Some(parent) => {
                debug!(
                    scope_id = %self.state.id(),
                    parent_id = %parent.id(),
                    "parent does not track child commits, request dropped"
                );
            }
            None => {
                debug!(scope_id = %self.state.id(), "no parent scope, commit request dropped");
            }
        }
    }

    /// 释放作用域
    ///
    /// 总是先出栈。拥有会话时归还底层会话；此刻仍有未兑现的子提交
    /// 请求即返回 [`UowError::CommitPendingAtDisposal`]——这是整个机制
    /// 的核心守卫，把"嵌套作用域的变更被静默丢弃"变成释放瞬间的
    /// 同步失败。不拥有会话时不归还任何东西，仅把待定标记沿父链
    /// 继续传播。
    pub fn dispose(mut self) -> UowResult<()> {
        self.disposed = true;
        self.registry.pop(&self.state);

        if self.state.owns_session() {
            if let Some(mut session) = self.session.take() {
                session.release();
            }
            if self.state.is_commit_pending() {
                error!(
                    scope_id = %self.state.id(),
                    "child commit still pending at disposal"
                );
                return Err(UowError::CommitPendingAtDisposal);
            }
            debug!(scope_id = %self.state.id(), "unit of work disposed, session released");
        } else if self.state.is_commit_pending() {
            // 传播沿父链继续，即使本作用域自己从未提交
            if let Some(parent) = &self.parent {
                parent.request_commit();
            }
        }
        Ok(())
    }
}

impl<S: Session> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        self.registry.pop(&self.state);

        if self.state.owns_session() {
            if let Some(mut session) = self.session.take() {
                session.release();
            }
            if self.state.is_commit_pending() {
                error!(
                    scope_id = %self.state.id(),
                    "unit of work dropped while a child commit was still pending"
                );
            }
        } else if self.state.is_commit_pending() {
            if let Some(parent) = &self.parent {
                parent.request_commit();
            }
        }
    }
}
