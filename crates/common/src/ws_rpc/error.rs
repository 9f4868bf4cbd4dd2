/// WebSocket RPC 错误定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// RPC 错误码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RpcErrorCode {
    // 通用错误
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Timeout,
    ConnectionClosed,
    SerializationError,

    // 业务错误
    OperationNotFound,
    OperationNotAbortable,
    OperationNotRetryable,
    CommandRejected,
    ExecutorUnavailable,
}

impl RpcErrorCode {
    /// 转换为字符串码
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::SerializationError => "SERIALIZATION_ERROR",

            Self::OperationNotFound => "OPERATION_NOT_FOUND",
            Self::OperationNotAbortable => "OPERATION_NOT_ABORTABLE",
            Self::OperationNotRetryable => "OPERATION_NOT_RETRYABLE",
            Self::CommandRejected => "COMMAND_REJECTED",
            Self::ExecutorUnavailable => "EXECUTOR_UNAVAILABLE",
        }
    }

    /// 从字符串码还原，未知码归为内部错误
    pub fn from_code(code: &str) -> Self {
        match code {
            "INVALID_REQUEST" => Self::InvalidRequest,
            "METHOD_NOT_FOUND" => Self::MethodNotFound,
            "INVALID_PARAMS" => Self::InvalidParams,
            "TIMEOUT" => Self::Timeout,
            "CONNECTION_CLOSED" => Self::ConnectionClosed,
            "SERIALIZATION_ERROR" => Self::SerializationError,
            "OPERATION_NOT_FOUND" => Self::OperationNotFound,
            "OPERATION_NOT_ABORTABLE" => Self::OperationNotAbortable,
            "OPERATION_NOT_RETRYABLE" => Self::OperationNotRetryable,
            "COMMAND_REJECTED" => Self::CommandRejected,
            "EXECUTOR_UNAVAILABLE" => Self::ExecutorUnavailable,
            _ => Self::InternalError,
        }
    }

    /// 是否为链路层错误（连接、超时），而非执行器拒绝
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionClosed | Self::ExecutorUnavailable
        )
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC 错误
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: RpcErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            RpcErrorCode::MethodNotFound,
            format!("方法不存在: {}", method.into()),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Timeout, message)
    }

    pub fn connection_closed() -> Self {
        Self::new(RpcErrorCode::ConnectionClosed, "连接已关闭")
    }

    pub fn executor_unavailable() -> Self {
        Self::new(RpcErrorCode::ExecutorUnavailable, "执行器未连接")
    }

    pub fn serialization_error(err: impl fmt::Display) -> Self {
        Self::new(
            RpcErrorCode::SerializationError,
            format!("序列化错误: {}", err),
        )
    }

    /// 操作不存在
    pub fn operation_not_found(operation_id: i64) -> Self {
        Self::new(
            RpcErrorCode::OperationNotFound,
            format!("操作不存在: {}", operation_id),
        )
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(err)
    }
}

impl From<RpcError> for crate::Error {
    fn from(err: RpcError) -> Self {
        match err.code {
            RpcErrorCode::OperationNotFound => crate::Error::NotFound(err.message),
            RpcErrorCode::InvalidParams | RpcErrorCode::InvalidRequest => {
                crate::Error::InvalidArgument(err.message)
            }
            RpcErrorCode::OperationNotAbortable
            | RpcErrorCode::OperationNotRetryable
            | RpcErrorCode::CommandRejected => crate::Error::Command(err.to_string()),
            _ => crate::Error::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in [
            RpcErrorCode::Timeout,
            RpcErrorCode::OperationNotAbortable,
            RpcErrorCode::ExecutorUnavailable,
        ] {
            assert_eq!(RpcErrorCode::from_code(code.as_str()), code);
        }
        assert_eq!(RpcErrorCode::from_code("VM_NOT_FOUND"), RpcErrorCode::InternalError);
    }

    #[test]
    fn test_into_common_error() {
        let err: crate::Error = RpcError::operation_not_found(7).into();
        assert!(matches!(err, crate::Error::NotFound(_)));

        let err: crate::Error = RpcError::new(RpcErrorCode::CommandRejected, "busy").into();
        assert!(matches!(err, crate::Error::Command(_)));
    }
}
