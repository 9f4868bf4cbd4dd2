/// WebSocket RPC 客户端辅助工具

use super::{MessageType, RpcMessage, RpcError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

/// RPC 响应等待器
type ResponseWaiter = oneshot::Sender<Result<RpcMessage, RpcError>>;

/// WebSocket RPC 连接
///
/// 只负责请求/响应配对，收发由外部的 WebSocket 任务完成
pub struct WsRpcConnection {
    /// 待响应的请求映射（request_id -> response_sender）
    pending_requests: Arc<RwLock<HashMap<String, ResponseWaiter>>>,

    /// 发送消息的通道
    sender: mpsc::UnboundedSender<RpcMessage>,
}

impl WsRpcConnection {
    /// 创建新的 RPC 连接，返回待发送消息的接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RpcMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let connection = Self {
            pending_requests: Arc::new(RwLock::new(HashMap::new())),
            sender: tx,
        };

        (connection, rx)
    }

    /// 发送请求并等待响应
    pub async fn call(
        &self,
        method: impl Into<String>,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<RpcMessage, RpcError> {
        let msg = RpcMessage::request(method, payload);
        let request_id = msg.id.clone();

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_requests.write().await;
            pending.insert(request_id.clone(), tx);
        }

        if self.sender.send(msg).is_err() {
            let mut pending = self.pending_requests.write().await;
            pending.remove(&request_id);
            return Err(RpcError::connection_closed());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::internal_error("响应通道被关闭")),
            Err(_) => {
                // 超时，清理等待器
                let mut pending = self.pending_requests.write().await;
                pending.remove(&request_id);
                Err(RpcError::timeout(format!("请求超时: {}", request_id)))
            }
        }
    }

    /// 发送请求并把响应负载解码为指定类型
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: impl Into<String>,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, RpcError> {
        self.call(method, payload, timeout).await?.decode_payload()
    }

    /// 发送通知（不等待响应）
    pub fn notify(
        &self,
        method: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), RpcError> {
        let msg = RpcMessage::notification(method, payload);
        self.send(msg)
    }

    /// 发送任意消息（例如对执行器请求的响应）
    pub fn send(&self, msg: RpcMessage) -> Result<(), RpcError> {
        self.sender.send(msg).map_err(|_| RpcError::connection_closed())
    }

    /// 处理收到的响应消息
    ///
    /// 返回 false 表示消息不是响应，需要由调用方继续分发
    pub async fn handle_response(&self, msg: RpcMessage) -> bool {
        if msg.message_type != MessageType::Response {
            return false;
        }

        let waiter = {
            let mut pending = self.pending_requests.write().await;
            pending.remove(&msg.id)
        };

        match waiter {
            Some(waiter) => {
                let result = if msg.is_error() {
                    let id = msg.id.clone();
                    match msg.into_result() {
                        Err(err) => Err(err),
                        Ok(_) => Err(RpcError::internal_error(format!("错误响应缺少错误信息: {}", id))),
                    }
                } else {
                    Ok(msg)
                };
                if waiter.send(result).is_err() {
                    debug!("等待者已放弃响应");
                }
            }
            None => warn!("收到未预期的响应消息: {}", msg.id),
        }
        true
    }

    /// 获取待处理请求数量
    pub async fn pending_count(&self) -> usize {
        let pending = self.pending_requests.read().await;
        pending.len()
    }

    /// 清理所有待处理的请求（连接断开时调用）
    pub async fn clear_pending(&self) {
        let mut pending = self.pending_requests.write().await;
        for (id, waiter) in pending.drain() {
            debug!("清理待处理请求: {}", id);
            let _ = waiter.send(Err(RpcError::connection_closed()));
        }
    }
}

impl Clone for WsRpcConnection {
    fn clone(&self) -> Self {
        Self {
            pending_requests: self.pending_requests.clone(),
            sender: self.sender.clone(),
        }
    }
}

/// 消息编解码辅助函数
pub mod codec {
    use super::*;

    /// 编码 RPC 消息为 WebSocket 消息
    pub fn encode(msg: &RpcMessage) -> Result<WsMessage, RpcError> {
        let json = msg.to_json()?;
        Ok(WsMessage::Text(json))
    }

    /// 解码 WebSocket 消息为 RPC 消息
    ///
    /// Ping/Pong 等控制帧返回 Ok(None)
    pub fn decode(ws_msg: WsMessage) -> Result<Option<RpcMessage>, RpcError> {
        match ws_msg {
            WsMessage::Text(text) => Ok(Some(RpcMessage::from_json(&text)?)),
            WsMessage::Binary(data) => {
                let text = String::from_utf8(data).map_err(RpcError::serialization_error)?;
                Ok(Some(RpcMessage::from_json(&text)?))
            }
            WsMessage::Close(_) => Err(RpcError::connection_closed()),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_rpc::{methods, RpcErrorCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_call_resolves_with_response() {
        let (conn, mut rx) = WsRpcConnection::new();
        let responder = conn.clone();

        tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            assert_eq!(request.method.as_deref(), Some(methods::LIST_OPERATIONS));
            let response = RpcMessage::response(request.id, json!({"operations": []}));
            assert!(responder.handle_response(response).await);
        });

        let resp = conn
            .call(methods::LIST_OPERATIONS, json!({"limit": 10}), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(conn.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_call_maps_error_code() {
        let (conn, mut rx) = WsRpcConnection::new();
        let responder = conn.clone();

        tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            let err = RpcError::new(RpcErrorCode::OperationNotAbortable, "already finished");
            responder.handle_response(RpcMessage::error_response(request.id, &err)).await;
        });

        let err = conn
            .call(methods::ABORT_OPERATION, json!({"operation_id": 1}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::OperationNotAbortable);
    }

    #[tokio::test]
    async fn test_call_times_out_and_cleans_up() {
        let (conn, _rx) = WsRpcConnection::new();
        let err = conn
            .call(methods::LIST_OPERATIONS, json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::Timeout);
        assert_eq!(conn.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear_pending_fails_waiters() {
        let (conn, _rx) = WsRpcConnection::new();
        let caller = conn.clone();
        let handle = tokio::spawn(async move {
            caller
                .call(methods::LIST_OPERATIONS, json!({}), Duration::from_secs(5))
                .await
        });

        while conn.pending_count().await == 0 {
            tokio::task::yield_now().await;
        }
        conn.clear_pending().await;

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, RpcErrorCode::ConnectionClosed);
    }

    #[test]
    fn test_non_response_is_not_consumed() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (conn, _rx) = WsRpcConnection::new();
        let notification = RpcMessage::notification(methods::OPERATIONS_CHANGED, json!({}));
        assert!(!rt.block_on(conn.handle_response(notification)));
    }
}
