//! keel-facade - 应用服务门面
//!
//! 在工作单元之上的 CRUD 门面与查询对象：每个写操作包裹一个作用域，
//! 读操作开作用域但不提交。

mod crud;
mod query;

pub use crud::*;
pub use query::*;
