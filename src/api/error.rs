// ==========================================
// 上门安装预约路由系统 - API层错误类型
// ==========================================
// 职责: 汇总各层错误，转换为可展示的错误消息
// ==========================================

use crate::config::error::ConfigError;
use crate::engine::booking_signature::SignatureError;
use crate::importer::error::DistanceError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("配置错误: {0}")]
    ConfigurationError(String),

    #[error("预约链接校验失败: {0}")]
    Signature(#[from] SignatureError),

    #[error("车程表错误: {0}")]
    DistanceTable(#[from] DistanceError),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                key,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "{}已被其他请求修改（期望revision={}，实际revision={}）",
                key, expected, actual
            )),
            RepositoryError::RetryExhausted { key, attempts } => ApiError::OptimisticLockFailure(
                format!("{}并发冲突，重试{}次后放弃", key, attempts),
            ),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Database(e) => ApiError::DatabaseError(e.to_string()),
            ConfigError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            ConfigError::InvalidValue { .. } => ApiError::ConfigurationError(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::from(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let err: ApiError = RepositoryError::OptimisticLockFailure {
            key: "basel_fricktal/montage".to_string(),
            expected: 3,
            actual: 4,
        }
        .into();
        assert!(matches!(err, ApiError::OptimisticLockFailure(_)));
        assert!(err.to_string().contains("revision=4"));

        let err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(err, ApiError::DatabaseConnectionError(_)));
    }

    #[test]
    fn test_signature_error_is_wrapped() {
        let err: ApiError = SignatureError::Invalid.into();
        assert!(matches!(err, ApiError::Signature(SignatureError::Invalid)));
    }
}
