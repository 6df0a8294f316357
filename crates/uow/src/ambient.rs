//! 环境注册表实现
//!
//! 两种键控方式：物理线程键控（同步部署），以及异步调用链键控
//! （跨挂起点传播，但不进入独立调度的任务）。

use std::cell::RefCell;
use std::sync::Arc;

use crate::error::{UowError, UowResult};
use crate::registry::{AmbientRegistry, ScopeEntry, ScopeStack};
use crate::scope::ScopeState;

thread_local! {
    static THREAD_SCOPES: RefCell<ScopeStack> = RefCell::new(ScopeStack::new());
}

/// 线程键控注册表
///
/// 每个物理线程一个独立的作用域栈，适合专用线程上的纯同步调用栈。
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLocalRegistry;

impl ThreadLocalRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl AmbientRegistry for ThreadLocalRegistry {
    fn current(&self, depth: usize) -> Option<ScopeEntry> {
        THREAD_SCOPES.with(|stack| stack.borrow().get_current(depth))
    }

    fn push(&self, entry: ScopeEntry) -> UowResult<()> {
        THREAD_SCOPES.with(|stack| stack.borrow_mut().push(entry));
        Ok(())
    }

    fn pop(&self, state: &Arc<ScopeState>) {
        THREAD_SCOPES.with(|stack| stack.borrow_mut().pop(state));
    }

    fn depth(&self) -> usize {
        THREAD_SCOPES.with(|stack| stack.borrow().depth())
    }
}

tokio::task_local! {
    static TASK_SCOPES: RefCell<ScopeStack>;
}

/// 异步调用链键控注册表
///
/// 栈挂在 tokio 的 task-local 存储上：在 [`TaskLocalRegistry::scope`]
/// 包裹的调用链内，挂起点之后（哪怕恢复在别的工作线程上）仍然可见；
/// `tokio::spawn` 出去的任务则各自为政，看不到这里的栈。
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalRegistry;

impl TaskLocalRegistry {
    pub fn new() -> Self {
        Self
    }

    /// 为一条异步调用链安装独立的作用域栈
    pub async fn scope<F>(fut: F) -> F::Output
    where
        F: Future,
    {
        TASK_SCOPES.scope(RefCell::new(ScopeStack::new()), fut).await
    }
}

impl AmbientRegistry for TaskLocalRegistry {
    fn current(&self, depth: usize) -> Option<ScopeEntry> {
        TASK_SCOPES
            .try_with(|stack| stack.borrow().get_current(depth))
            .ok()
            .flatten()
    }

    fn push(&self, entry: ScopeEntry) -> UowResult<()> {
        TASK_SCOPES
            .try_with(|stack| stack.borrow_mut().push(entry))
            .map_err(|_| {
                UowError::Misuse(
                    "no task-local scope stack installed; wrap the call chain in \
                     TaskLocalRegistry::scope"
                        .into(),
                )
            })
    }

    fn pop(&self, state: &Arc<ScopeState>) {
        let _ = TASK_SCOPES.try_with(|stack| stack.borrow_mut().pop(state));
    }

    fn depth(&self) -> usize {
        TASK_SCOPES
            .try_with(|stack| stack.borrow().depth())
            .unwrap_or(0)
    }
}
