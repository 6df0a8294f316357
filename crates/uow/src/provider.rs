//! 工作单元工厂

use std::any::TypeId;
use std::sync::Arc;

use keel_errors::AppResult;
use keel_ports::Session;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{UowError, UowResult};
use crate::registry::{AmbientRegistry, ScopeEntry};
use crate::scope::{ScopeState, UnitOfWork};
use crate::session::SharedSession;

/// 会话复用策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReusePolicy {
    /// 总是创建新会话
    AlwaysCreateNew,
    /// 祖先链上存在同类型会话时复用
    #[default]
    ReuseIfAvailable,
}

/// 工作单元选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOfWorkOptions {
    /// 会话复用策略
    #[serde(default)]
    pub reuse: ReusePolicy,
    /// 创建的作用域是否跟踪子提交请求
    #[serde(default = "default_child_commit_aware")]
    pub child_commit_aware: bool,
}

fn default_child_commit_aware() -> bool {
    true
}

impl Default for UnitOfWorkOptions {
    fn default() -> Self {
        Self {
            reuse: ReusePolicy::default(),
            child_commit_aware: true,
        }
    }
}

/// 会话工厂：每个拥有会话的作用域最多调用一次
pub type SessionFactory<S> = Arc<dyn Fn() -> AppResult<S> + Send + Sync>;

/// 工作单元工厂
///
/// 创建作用域时查询环境注册表：按策略决定复用祖先会话还是通过
/// 工厂新建。工厂失败原样传播给调用方。
pub struct UnitOfWorkProvider<S: Session> {
    registry: Arc<dyn AmbientRegistry>,
    factory: SessionFactory<S>,
    options: UnitOfWorkOptions,
}

impl<S: Session> Clone for UnitOfWorkProvider<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            factory: self.factory.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S: Session> UnitOfWorkProvider<S> {
    pub fn new(
        registry: Arc<dyn AmbientRegistry>,
        factory: impl Fn() -> AppResult<S> + Send + Sync + 'static,
    ) -> Self {
        Self {
            registry,
            factory: Arc::new(factory),
            options: UnitOfWorkOptions::default(),
        }
    }

    /// 设置选项
    pub fn with_options(mut self, options: UnitOfWorkOptions) -> Self {
        self.options = options;
        self
    }

    /// 设置复用策略
    pub fn with_reuse_policy(mut self, reuse: ReusePolicy) -> Self {
        self.options.reuse = reuse;
        self
    }

    /// 设置是否跟踪子提交请求
    pub fn with_child_commit_aware(mut self, aware: bool) -> Self {
        self.options.child_commit_aware = aware;
        self
    }

    /// 创建一个新的工作单元作用域
    pub fn create(&self) -> UowResult<UnitOfWork<S>> {
        let parent = self.registry.current(0).map(|entry| entry.state().clone());

        let reusable = match self.options.reuse {
            ReusePolicy::ReuseIfAvailable => self.ambient_session(),
            ReusePolicy::AlwaysCreateNew => None,
        };

        let (session, owns_session) = match reusable {
            Some(shared) => (shared, false),
            None => {
                let session = (self.factory)().map_err(UowError::Persistence)?;
                (Arc::new(SharedSession::new(session)), true)
            }
        };

        let state = Arc::new(ScopeState::new(
            TypeId::of::<S>(),
            owns_session,
            self.options.child_commit_aware,
        ));
        let erased: Arc<dyn std::any::Any + Send + Sync> = session.clone();
        self.registry.push(ScopeEntry::new(state.clone(), erased))?;

        debug!(
            scope_id = %state.id(),
            owns_session,
            depth = self.registry.depth(),
            "unit of work created"
        );

        Ok(UnitOfWork::new(state, session, parent, self.registry.clone()))
    }

    /// 当前环境中本会话类型的共享会话
    ///
    /// 供仓储、门面等协作方获取环境会话：沿祖先链从栈顶向上找第一个
    /// 类型匹配的作用域。
    pub fn current_session(&self) -> Option<Arc<SharedSession<S>>> {
        self.ambient_session()
    }

    fn ambient_session(&self) -> Option<Arc<SharedSession<S>>> {
        let mut depth = 0;
        while let Some(entry) = self.registry.current(depth) {
            if entry.state().session_type() == TypeId::of::<S>() {
                return entry.session_any().downcast::<SharedSession<S>>().ok();
            }
            depth += 1;
        }
        None
    }
}
