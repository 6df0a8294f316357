//! keel-adapter-memory - 内存表存储适配器
//!
//! 测试与同步部署模式的参考后端：行存在内存表中，写操作先进入
//! 暂存队列，flush 时一次性并入已提交状态。

mod repository;
mod store;

pub use repository::*;
pub use store::*;
