//! keel-uow - 嵌套工作单元协调
//!
//! 让逻辑上嵌套的事务作用域共享同一个底层会话和同一次提交，
//! 同时每个作用域对调用方仍表现为独立的事务单元：
//!
//! - 作用域由 [`UnitOfWorkProvider`] 创建，按环境注册表判断复用或新建会话；
//! - 非拥有者的提交只向父作用域登记意图（commit-pending），从不落盘；
//! - 拥有者在释放时若仍有未兑现的子提交请求，以
//!   [`UowError::CommitPendingAtDisposal`] 大声失败，而不是静默丢失数据。

mod ambient;
mod error;
mod provider;
mod registry;
mod scope;
mod session;

pub use ambient::*;
pub use error::*;
pub use provider::*;
pub use registry::*;
pub use scope::*;
pub use session::*;
