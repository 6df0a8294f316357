//! PostgreSQL 连接管理

use std::time::Duration;

use keel_errors::{AppError, AppResult};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::PostgresConfig;

/// 创建 PostgreSQL 连接池
pub async fn create_pool(config: &PostgresConfig) -> AppResult<PgPool> {
    pool_options(config)
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| AppError::database(format!("Failed to create pool: {}", e)))
}

/// 延迟连接的连接池，首次使用时才真正建连
pub fn create_lazy_pool(config: &PostgresConfig) -> AppResult<PgPool> {
    pool_options(config)
        .connect_lazy(config.url.expose_secret())
        .map_err(|e| AppError::database(format!("Failed to create pool: {}", e)))
}

fn pool_options(config: &PostgresConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
}

/// 检查数据库连接
pub async fn check_connection(pool: &PgPool) -> AppResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| AppError::database(format!("Database health check failed: {}", e)))?;
    Ok(())
}
