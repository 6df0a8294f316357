//! keel-adapter-postgres - PostgreSQL 适配器

mod config;
mod connection;
mod repository;
mod session;

pub use config::*;
pub use connection::*;
pub use repository::*;
pub use session::*;
