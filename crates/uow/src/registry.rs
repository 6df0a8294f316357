//! 作用域注册表
//!
//! 每条逻辑执行上下文（线程或异步调用链）维护一个独立的作用域栈，
//! 最近创建的作用域在栈顶。栈反映严格嵌套：作用域总是在父作用域
//! 仍在栈中时创建，并在任何祖先出栈之前出栈。

use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::error::UowResult;
use crate::scope::ScopeState;

/// 注册表中的作用域条目
///
/// 会话以类型擦除的形式存放，按 `TypeId` 精确匹配后再向下转型，
/// 不依赖任何运行时反射。
#[derive(Clone)]
pub struct ScopeEntry {
    state: Arc<ScopeState>,
    session: Arc<dyn Any + Send + Sync>,
}

impl ScopeEntry {
    pub(crate) fn new(state: Arc<ScopeState>, session: Arc<dyn Any + Send + Sync>) -> Self {
        Self { state, session }
    }

    pub fn state(&self) -> &Arc<ScopeState> {
        &self.state
    }

    pub(crate) fn session_any(&self) -> Arc<dyn Any + Send + Sync> {
        self.session.clone()
    }
}

/// 有序的作用域栈
#[derive(Default)]
pub struct ScopeStack {
    entries: Vec<ScopeEntry>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回距栈顶 `depth` 个位置的条目，0 为最近创建
    pub fn get_current(&self, depth: usize) -> Option<ScopeEntry> {
        let len = self.entries.len();
        if depth >= len {
            None
        } else {
            Some(self.entries[len - 1 - depth].clone())
        }
    }

    pub fn push(&mut self, entry: ScopeEntry) {
        self.entries.push(entry);
    }

    /// 弹出指定作用域，校验最内层优先的释放顺序
    ///
    /// 乱序释放是调用方的编程错误：大声报告并按身份移除对应条目，
    /// 绝不当作正确顺序静默接受。
    pub fn pop(&mut self, state: &Arc<ScopeState>) {
        match self.entries.last() {
            Some(top) if Arc::ptr_eq(top.state(), state) => {
                self.entries.pop();
            }
            _ => {
                tracing::error!(
                    scope_id = %state.id(),
                    "scope disposed out of nesting order"
                );
                self.entries.retain(|entry| !Arc::ptr_eq(entry.state(), state));
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 环境注册表抽象
///
/// 每条逻辑执行上下文只能看到自己的栈，互不可见。
pub trait AmbientRegistry: Send + Sync {
    /// 当前上下文中距栈顶 `depth` 个位置的条目
    fn current(&self, depth: usize) -> Option<ScopeEntry>;

    /// 作用域构造时入栈
    fn push(&self, entry: ScopeEntry) -> UowResult<()>;

    /// 作用域释放时出栈
    fn pop(&self, state: &Arc<ScopeState>);

    /// 当前上下文的栈深度
    fn depth(&self) -> usize;
}

/// 显式注册表实例
///
/// 不依赖任何环境存储，适合测试注入和显式装配。调用方自己保证
/// 同一个实例只服务于一条逻辑调用链。
#[derive(Default)]
pub struct LocalRegistry {
    stack: Mutex<ScopeStack>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_stack<R>(&self, f: impl FnOnce(&mut ScopeStack) -> R) -> R {
        let mut stack = self.stack.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stack)
    }
}

impl AmbientRegistry for LocalRegistry {
    fn current(&self, depth: usize) -> Option<ScopeEntry> {
        self.with_stack(|stack| stack.get_current(depth))
    }

    fn push(&self, entry: ScopeEntry) -> UowResult<()> {
        self.with_stack(|stack| stack.push(entry));
        Ok(())
    }

    fn pop(&self, state: &Arc<ScopeState>) {
        self.with_stack(|stack| stack.pop(state));
    }

    fn depth(&self) -> usize {
        self.with_stack(|stack| stack.depth())
    }
}
