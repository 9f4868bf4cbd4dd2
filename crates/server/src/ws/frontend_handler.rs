/// 前端 WebSocket 连接处理器
///
/// 向控制台页面推送操作树变化与失败通知

use axum::extract::ws::{Message as AxumWsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use engine::operations::CategoryCounts;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app_state::AppState;

/// 前端连接信息
#[derive(Debug, Clone)]
pub struct FrontendConnection {
    pub connection_id: String,

    /// 发送消息的通道
    pub sender: mpsc::UnboundedSender<FrontendMessage>,

    pub connected_at: chrono::DateTime<chrono::Utc>,
}

/// 前端消息类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FrontendMessage {
    /// 保留树已合并新快照
    OperationsUpdated {
        sequence: u64,
        counts: CategoryCounts,
        show_more_available: bool,
    },
    /// 轮询失败，保留树未变
    PollFailed {
        sequence: u64,
        message: String,
    },
    /// 中止命令失败，可中止标记已回滚
    AbortFailed {
        operation_id: i64,
        message: String,
    },
    /// 心跳响应
    Pong {
        timestamp: i64,
    },
}

/// 前端连接管理器
#[derive(Clone)]
pub struct FrontendConnectionManager {
    /// connection_id -> FrontendConnection
    connections: Arc<RwLock<HashMap<String, Arc<FrontendConnection>>>>,
}

impl FrontendConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册新的前端连接
    pub async fn register(
        &self,
        connection_id: String,
        sender: mpsc::UnboundedSender<FrontendMessage>,
    ) -> Arc<FrontendConnection> {
        let connection = Arc::new(FrontendConnection {
            connection_id: connection_id.clone(),
            sender,
            connected_at: chrono::Utc::now(),
        });

        let mut connections = self.connections.write().await;
        connections.insert(connection_id.clone(), connection.clone());

        info!("前端连接已注册: {}", connection_id);
        connection
    }

    /// 注销前端连接
    pub async fn unregister(&self, connection_id: &str) {
        let mut connections = self.connections.write().await;
        if connections.remove(connection_id).is_some() {
            info!("前端连接已注销: {}", connection_id);
        }
    }

    pub async fn count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// 向所有连接广播消息
    pub async fn broadcast(&self, message: FrontendMessage) -> usize {
        let connections = self.connections.read().await;
        let mut count = 0;

        for (connection_id, conn) in connections.iter() {
            if let Err(e) = conn.sender.send(message.clone()) {
                warn!("向前端连接 {} 发送消息失败: {}", connection_id, e);
            } else {
                count += 1;
            }
        }

        debug!("广播消息已发送到 {} 个前端连接", count);
        count
    }
}

impl Default for FrontendConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket 升级处理器
pub async fn handle_frontend_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_frontend_connection(socket, state))
}

async fn handle_frontend_connection(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!("新的前端 WebSocket 连接: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<FrontendMessage>();

    let connection = state
        .frontend_manager()
        .register(connection_id.clone(), tx)
        .await;

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send_frontend_message(&mut ws_sender, msg).await {
                error!("发送前端消息失败: {}", e);
                break;
            }
        }
        debug!("前端消息发送任务结束");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => handle_frontend_incoming_message(msg, &connection),
                Err(e) => {
                    error!("接收前端消息错误: {}", e);
                    break;
                }
            }
        }
        debug!("前端消息接收任务结束");
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.frontend_manager().unregister(&connection_id).await;
    info!("前端连接已关闭: {}", connection_id);
}

/// 处理收到的前端消息，目前只有 ping
fn handle_frontend_incoming_message(ws_msg: AxumWsMessage, connection: &FrontendConnection) {
    match ws_msg {
        AxumWsMessage::Text(text) => {
            let msg_type = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string));

            match msg_type.as_deref() {
                Some("ping") => {
                    let pong = FrontendMessage::Pong {
                        timestamp: chrono::Utc::now().timestamp(),
                    };
                    if let Err(e) = connection.sender.send(pong) {
                        warn!("发送心跳响应失败: {}", e);
                    }
                }
                Some(other) => debug!("收到未知的前端消息类型: {}", other),
                None => debug!("收到无法解析的前端消息: {}", text),
            }
        }
        AxumWsMessage::Close(_) => debug!("前端连接关闭"),
        _ => {}
    }
}

async fn send_frontend_message(
    sender: &mut futures_util::stream::SplitSink<WebSocket, AxumWsMessage>,
    msg: FrontendMessage,
) -> Result<(), String> {
    let json = serde_json::to_string(&msg).map_err(|e| format!("序列化前端消息失败: {}", e))?;

    sender
        .send(AxumWsMessage::Text(json))
        .await
        .map_err(|e| format!("发送前端 WebSocket 消息失败: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_live_connections() {
        let manager = FrontendConnectionManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        manager.register("a".to_string(), tx1).await;
        manager.register("b".to_string(), tx2).await;
        drop(rx2);

        let msg = FrontendMessage::PollFailed {
            sequence: 3,
            message: "timeout".to_string(),
        };
        assert_eq!(manager.broadcast(msg.clone()).await, 1);
        assert_eq!(rx1.recv().await, Some(msg));

        manager.unregister("b").await;
        assert_eq!(manager.count().await, 1);
    }

    #[test]
    fn test_message_is_tagged() {
        let json = serde_json::to_value(FrontendMessage::Pong { timestamp: 1 }).unwrap();
        assert_eq!(json["type"], "Pong");
    }
}
