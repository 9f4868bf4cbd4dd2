/// WebSocket RPC 消息定义

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RpcError, RpcErrorCode};

/// 执行器 RPC 方法名
pub mod methods {
    /// 拉取最近的操作快照
    pub const LIST_OPERATIONS: &str = "list_operations";
    /// 中止操作
    pub const ABORT_OPERATION: &str = "abort_operation";
    /// 重试操作
    pub const RETRY_OPERATION: &str = "retry_operation";
    /// 执行器推送：操作有变化，建议立即轮询
    pub const OPERATIONS_CHANGED: &str = "operations_changed";
    /// 心跳
    pub const HEARTBEAT: &str = "heartbeat";
}

/// RPC 消息类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// 请求消息（期望响应）
    Request,
    /// 响应消息
    Response,
    /// 通知消息（不需要响应）
    Notification,
}

/// RPC 消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    /// 消息唯一ID
    pub id: String,

    /// 消息类型
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// RPC 方法名（request/notification 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// 消息负载
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// 错误信息（仅 response 时可能有值）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorInfo>,
}

/// RPC 错误信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RpcMessage {
    /// 创建请求消息
    pub fn request(method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: format!("req-{}", Uuid::new_v4()),
            message_type: MessageType::Request,
            method: Some(method.into()),
            payload: Some(payload),
            error: None,
        }
    }

    /// 创建响应消息
    pub fn response(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            message_type: MessageType::Response,
            method: None,
            payload: Some(payload),
            error: None,
        }
    }

    /// 由 RpcError 创建错误响应
    pub fn error_response(id: impl Into<String>, err: &RpcError) -> Self {
        Self {
            id: id.into(),
            message_type: MessageType::Response,
            method: None,
            payload: None,
            error: Some(RpcErrorInfo {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
            }),
        }
    }

    /// 创建通知消息
    pub fn notification(method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: format!("notif-{}", Uuid::new_v4()),
            message_type: MessageType::Notification,
            method: Some(method.into()),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 判断是否是成功响应
    pub fn is_success(&self) -> bool {
        self.message_type == MessageType::Response && self.error.is_none()
    }

    /// 判断是否是错误响应
    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Response && self.error.is_some()
    }

    /// 将响应转换为 Result，错误码还原为 RpcErrorCode
    pub fn into_result(self) -> Result<serde_json::Value, RpcError> {
        match self.error {
            Some(info) => {
                let code = RpcErrorCode::from_code(&info.code);
                Err(match info.details {
                    Some(details) => RpcError::with_details(code, info.message, details),
                    None => RpcError::new(code, info.message),
                })
            }
            None => Ok(self.payload.unwrap_or(serde_json::Value::Null)),
        }
    }

    /// 将响应负载解码为指定类型
    pub fn decode_payload<T: DeserializeOwned>(self) -> Result<T, RpcError> {
        let payload = self.into_result()?;
        serde_json::from_value(payload).map_err(RpcError::serialization_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_rpc::OperationCommandResponse;
    use serde_json::json;

    #[test]
    fn test_list_operations_request() {
        let msg = RpcMessage::request(methods::LIST_OPERATIONS, json!({"limit": 10}));
        assert_eq!(msg.message_type, MessageType::Request);
        assert_eq!(msg.method.as_deref(), Some("list_operations"));
        assert!(msg.id.starts_with("req-"));
    }

    #[test]
    fn test_decode_command_response() {
        let msg = RpcMessage::response("req-1", json!({"accepted": true, "message": null}));
        assert!(msg.is_success());
        let resp: OperationCommandResponse = msg.decode_payload().unwrap();
        assert!(resp.accepted);
    }

    #[test]
    fn test_error_response_round_trip_code() {
        let err = RpcError::operation_not_found(42);
        let msg = RpcMessage::error_response("req-2", &err);
        assert!(msg.is_error());

        let json = msg.to_json().unwrap();
        let parsed = RpcMessage::from_json(&json).unwrap();
        let err = parsed.into_result().unwrap_err();
        assert_eq!(err.code, RpcErrorCode::OperationNotFound);
    }

    #[test]
    fn test_notification_has_no_error() {
        let msg = RpcMessage::notification(methods::OPERATIONS_CHANGED, json!({}));
        assert_eq!(msg.message_type, MessageType::Notification);
        assert!(!msg.is_success());
        assert!(!msg.is_error());
    }
}
