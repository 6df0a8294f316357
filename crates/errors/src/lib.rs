//! keel-errors - 统一错误处理
//!
//! 基于 RFC 7807 Problem Details 规范

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::FailedPrecondition(_) => 412,
            Self::Internal(_) => 500,
            Self::Database(_) => 500,
            Self::Serialization(_) => 500,
            Self::Cancelled(_) => 499,
        }
    }

    /// 转换为 Problem Details
    pub fn to_problem_details(&self) -> ProblemDetails {
        ProblemDetails {
            r#type: self.problem_type(),
            title: self.problem_title(),
            status: self.status_code(),
            detail: self.to_string(),
            instance: None,
        }
    }

    fn problem_type(&self) -> String {
        match self {
            Self::NotFound(_) => "https://keel-rs.dev/problems/not-found".to_string(),
            Self::Validation(_) => "https://keel-rs.dev/problems/validation".to_string(),
            Self::Conflict(_) => "https://keel-rs.dev/problems/conflict".to_string(),
            Self::FailedPrecondition(_) => {
                "https://keel-rs.dev/problems/failed-precondition".to_string()
            }
            Self::Internal(_) => "https://keel-rs.dev/problems/internal".to_string(),
            Self::Database(_) => "https://keel-rs.dev/problems/database".to_string(),
            Self::Serialization(_) => "https://keel-rs.dev/problems/serialization".to_string(),
            Self::Cancelled(_) => "https://keel-rs.dev/problems/cancelled".to_string(),
        }
    }

    fn problem_title(&self) -> String {
        match self {
            Self::NotFound(_) => "Resource Not Found".to_string(),
            Self::Validation(_) => "Validation Error".to_string(),
            Self::Conflict(_) => "Conflict".to_string(),
            Self::FailedPrecondition(_) => "Failed Precondition".to_string(),
            Self::Internal(_) => "Internal Error".to_string(),
            Self::Database(_) => "Database Error".to_string(),
            Self::Serialization(_) => "Serialization Error".to_string(),
            Self::Cancelled(_) => "Cancelled".to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// RFC 7807 Problem Details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found("x").status_code(), 404);
        assert_eq!(AppError::validation("x").status_code(), 400);
        assert_eq!(AppError::conflict("x").status_code(), 409);
        assert_eq!(AppError::failed_precondition("x").status_code(), 412);
        assert_eq!(AppError::database("x").status_code(), 500);
        assert_eq!(AppError::cancelled("x").status_code(), 499);
    }

    #[test]
    fn test_problem_details() {
        let problem = AppError::not_found("entity 42").to_problem_details();
        assert_eq!(problem.status, 404);
        assert_eq!(problem.title, "Resource Not Found");
        assert!(problem.detail.contains("entity 42"));
        assert!(problem.r#type.ends_with("/not-found"));
    }

    #[test]
    fn test_serde_json_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let app: AppError = err.into();
        assert!(matches!(app, AppError::Serialization(_)));
    }
}
