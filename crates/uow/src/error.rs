//! 工作单元错误类型

use keel_errors::AppError;
use thiserror::Error;

/// 工作单元协调层的错误
///
/// 待定提交与取消是独立的变体，调用方和测试可以断言到底是哪条
/// 不变量被打破，而不是混在一般的持久化失败里。
#[derive(Debug, Error)]
pub enum UowError {
    /// 子作用域请求的提交在所有者释放前始终未被兑现
    #[error("a nested scope requested a commit that was never honored before disposal")]
    CommitPendingAtDisposal,

    /// 取消信号在持久化开始前已触发
    #[error("commit cancelled before persistence began")]
    Cancelled,

    /// 底层持久化失败，原样向上传播，不做重试
    #[error("persistence failed: {0}")]
    Persistence(#[source] AppError),

    /// 调用序列违反约定
    #[error("unit of work misuse: {0}")]
    Misuse(String),
}

impl From<UowError> for AppError {
    fn from(err: UowError) -> Self {
        match err {
            UowError::CommitPendingAtDisposal => AppError::failed_precondition(
                "a nested scope requested a commit that was never honored before disposal",
            ),
            UowError::Cancelled => {
                AppError::cancelled("commit cancelled before persistence began")
            }
            UowError::Persistence(inner) => inner,
            UowError::Misuse(msg) => AppError::internal(msg),
        }
    }
}

/// Result 类型别名
pub type UowResult<T> = Result<T, UowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_mapping() {
        let err: AppError = UowError::CommitPendingAtDisposal.into();
        assert!(matches!(err, AppError::FailedPrecondition(_)));

        let err: AppError = UowError::Cancelled.into();
        assert!(matches!(err, AppError::Cancelled(_)));

        let err: AppError = UowError::Persistence(AppError::database("boom")).into();
        assert!(matches!(err, AppError::Database(_)));
    }
}
