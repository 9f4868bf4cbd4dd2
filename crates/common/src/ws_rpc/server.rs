/// WebSocket RPC 方法分发
///
/// 处理对端主动发来的请求与通知（例如执行器推送的 operations_changed）

use super::{MessageType, RpcError, RpcMessage};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, RpcError>> + Send>>;

/// RPC 方法处理器类型
pub type RpcHandler = Arc<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

/// RPC 方法路由器
#[derive(Clone, Default)]
pub struct RpcRouter {
    handlers: Arc<RwLock<HashMap<String, RpcHandler>>>,
}

impl RpcRouter {
    /// 创建新的路由器
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册同步方法处理器
    pub async fn register<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, RpcError> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register_async(method, move |payload| {
            let handler = handler.clone();
            async move { handler(payload) }
        })
        .await;
    }

    /// 注册异步方法处理器
    pub async fn register_async<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, RpcError>> + Send + 'static,
    {
        let handler: RpcHandler = Arc::new(move |payload| Box::pin(handler(payload)) as HandlerFuture);
        let mut handlers = self.handlers.write().await;
        handlers.insert(method.into(), handler);
    }

    /// 分发一条消息
    ///
    /// 请求返回对应的响应；通知处理完后返回 None
    pub async fn dispatch(&self, msg: RpcMessage) -> Option<RpcMessage> {
        let method = match &msg.method {
            Some(m) => m.clone(),
            None => {
                warn!("消息缺少方法名: id={}", msg.id);
                return match msg.message_type {
                    MessageType::Request => Some(RpcMessage::error_response(
                        msg.id,
                        &RpcError::invalid_request("缺少方法名"),
                    )),
                    _ => None,
                };
            }
        };

        let payload = msg.payload.clone().unwrap_or(serde_json::Value::Null);
        info!("📨 [收到RPC消息] type={:?}, method={}, id={}", msg.message_type, method, msg.id);

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&method).cloned()
        };

        let result = match handler {
            Some(handler) => handler(payload).await,
            None => Err(RpcError::method_not_found(&method)),
        };

        match msg.message_type {
            MessageType::Request => Some(match result {
                Ok(value) => {
                    debug!("✅ [RPC处理成功] method={}, id={}", method, msg.id);
                    RpcMessage::response(msg.id, value)
                }
                Err(err) => {
                    warn!("❌ [RPC处理失败] method={}, id={}, error={}", method, msg.id, err);
                    RpcMessage::error_response(msg.id, &err)
                }
            }),
            _ => {
                if let Err(err) = result {
                    warn!("处理通知失败: method={}, error={}", method, err);
                }
                None
            }
        }
    }

    /// 获取已注册的方法列表
    pub async fn list_methods(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut methods: Vec<String> = handlers.keys().cloned().collect();
        methods.sort();
        methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_rpc::{methods, RpcErrorCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_request_gets_response() {
        let router = RpcRouter::new();
        router
            .register(methods::HEARTBEAT, |payload| Ok(json!({"echo": payload})))
            .await;

        let req = RpcMessage::request(methods::HEARTBEAT, json!({"timestamp": 1}));
        let resp = router.dispatch(req).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.payload.unwrap()["echo"]["timestamp"], 1);
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let router = RpcRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        router
            .register_async(methods::OPERATIONS_CHANGED, move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::Value::Null)
                }
            })
            .await;

        let notif = RpcMessage::notification(methods::OPERATIONS_CHANGED, json!({}));
        assert!(router.dispatch(notif).await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let router = RpcRouter::new();
        let req = RpcMessage::request("unknown", json!({}));
        let resp = router.dispatch(req).await.unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.error.unwrap().code, RpcErrorCode::MethodNotFound.as_str());
    }

    #[tokio::test]
    async fn test_list_methods_sorted() {
        let router = RpcRouter::new();
        router.register("b", |_| Ok(json!(null))).await;
        router.register("a", |_| Ok(json!(null))).await;
        assert_eq!(router.list_methods().await, vec!["a", "b"]);
    }
}
