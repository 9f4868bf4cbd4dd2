/// 执行器 WebSocket 客户端
///
/// 控制台主动连接执行器，断线后按固定间隔重连

use common::ws_rpc::client::codec;
use common::ws_rpc::{
    methods, HeartbeatRequest, MessageType, RpcError, RpcErrorCode, RpcRouter, WsRpcConnection,
};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 执行器链路状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone)]
pub struct ExecutorClient {
    /// 执行器地址
    url: String,

    /// 本控制台实例 ID，随心跳上报
    console_id: String,

    state: Arc<RwLock<LinkState>>,

    /// 当前连接，断开时为 None
    connection: Arc<RwLock<Option<WsRpcConnection>>>,

    /// 执行器主动发来的请求/通知
    router: RpcRouter,

    reconnect_interval: Duration,
    heartbeat_interval: Duration,
    rpc_timeout: Duration,
}

impl ExecutorClient {
    pub fn new(url: impl Into<String>, rpc_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            console_id: common::utils::generate_id(),
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            connection: Arc::new(RwLock::new(None)),
            router: RpcRouter::new(),
            reconnect_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            rpc_timeout,
        }
    }

    pub fn router(&self) -> &RpcRouter {
        &self.router
    }

    pub fn console_id(&self) -> &str {
        &self.console_id
    }

    pub async fn state(&self) -> LinkState {
        *self.state.read().await
    }

    async fn set_state(&self, next: LinkState) {
        let mut state = self.state.write().await;
        *state = next;
    }

    /// 调用执行器方法并解码响应
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T, RpcError> {
        let connection = self
            .connection
            .read()
            .await
            .clone()
            .ok_or_else(RpcError::executor_unavailable)?;
        connection.call_as(method, payload, self.rpc_timeout).await
    }

    /// 保持连接，直到取消
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            info!("尝试连接执行器: {}", self.url);

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connect_and_run() => match result {
                    Ok(()) => info!("执行器连接正常关闭"),
                    Err(e) => error!("执行器连接错误: {}", e),
                },
            }

            self.set_state(LinkState::Disconnected).await;

            warn!("{:?} 后重新连接执行器...", self.reconnect_interval);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }

        self.teardown().await;
        info!("执行器客户端已停止");
    }

    async fn connect_and_run(&self) -> anyhow::Result<()> {
        self.set_state(LinkState::Connecting).await;

        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        info!("✅ 执行器连接成功");
        self.set_state(LinkState::Connected).await;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (connection, mut rx) = WsRpcConnection::new();
        {
            let mut current = self.connection.write().await;
            *current = Some(connection.clone());
        }

        // 心跳
        let heartbeat_conn = connection.clone();
        let heartbeat_interval = self.heartbeat_interval;
        let console_id = self.console_id.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            loop {
                interval.tick().await;
                let heartbeat = HeartbeatRequest {
                    console_id: console_id.clone(),
                    timestamp: chrono::Utc::now().timestamp(),
                };
                let payload = match serde_json::to_value(&heartbeat) {
                    Ok(p) => p,
                    Err(e) => {
                        error!("序列化心跳失败: {}", e);
                        continue;
                    }
                };
                if heartbeat_conn.notify(methods::HEARTBEAT, payload).is_err() {
                    break;
                }
                debug!("发送心跳");
            }
        });

        // 发送
        let mut send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let frame = match codec::encode(&msg) {
                    Ok(f) => f,
                    Err(e) => {
                        error!("编码消息失败: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(frame).await {
                    error!("发送消息失败: {}", e);
                    break;
                }
            }
            debug!("发送任务结束");
        });

        // 接收
        let recv_conn = connection.clone();
        let router = self.router.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(result) = ws_receiver.next().await {
                let frame = match result {
                    Ok(f) => f,
                    Err(e) => {
                        error!("接收消息错误: {}", e);
                        break;
                    }
                };
                let msg = match codec::decode(frame) {
                    Ok(Some(msg)) => msg,
                    Ok(None) => continue,
                    Err(e) if e.code == RpcErrorCode::ConnectionClosed => {
                        info!("执行器关闭了连接");
                        break;
                    }
                    Err(e) => {
                        warn!("解析执行器消息失败: {}", e);
                        continue;
                    }
                };

                if msg.message_type == MessageType::Response {
                    recv_conn.handle_response(msg).await;
                    continue;
                }

                let router = router.clone();
                let reply_conn = recv_conn.clone();
                tokio::spawn(async move {
                    if let Some(reply) = router.dispatch(msg).await {
                        if let Err(e) = reply_conn.send(reply) {
                            warn!("回复执行器请求失败: {}", e);
                        }
                    }
                });
            }
            debug!("接收任务结束");
        });

        tokio::select! {
            _ = &mut send_task => {
                debug!("发送任务已结束");
                recv_task.abort();
            }
            _ = &mut recv_task => {
                debug!("接收任务已结束");
                send_task.abort();
            }
        }

        heartbeat_task.abort();
        self.teardown().await;
        Ok(())
    }

    /// 清理当前连接，在途请求以 connection_closed 失败
    async fn teardown(&self) {
        let connection = self.connection.write().await.take();
        if let Some(connection) = connection {
            connection.clear_pending().await;
        }
    }
}
