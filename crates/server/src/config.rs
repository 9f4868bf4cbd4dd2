/// 配置管理

use common::models::constants::{
    DEFAULT_OPERATIONS_LIMIT, DEFAULT_POLL_INTERVAL, DEFAULT_RPC_TIMEOUT, DEFAULT_SERVER_PORT,
};
use engine::RecomputePolicy;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server_port: u16,
    /// 执行器 WebSocket 地址
    pub executor_ws_url: String,
    pub poll_interval_secs: u64,
    pub rpc_timeout_secs: u64,
    pub operations_limit: usize,
    pub recompute_policy: RecomputePolicy,
    /// 设置后向导状态存入 Redis（需要 redis feature）
    pub redis_url: Option<String>,
    pub wizard_namespace: String,
    pub log_level: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = std::env::var("SERVER_PORT")
            .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
            .parse()?;

        let executor_ws_url = std::env::var("EXECUTOR_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:8080/ws/console".to_string());

        let poll_interval_secs = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL.to_string())
            .parse()?;

        let rpc_timeout_secs = std::env::var("RPC_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_RPC_TIMEOUT.to_string())
            .parse()?;

        let operations_limit = std::env::var("OPERATIONS_LIMIT")
            .unwrap_or_else(|_| DEFAULT_OPERATIONS_LIMIT.to_string())
            .parse()?;

        let recompute_policy = std::env::var("RECOMPUTE_POLICY")
            .unwrap_or_else(|_| "modified_or_focused".to_string())
            .parse()?;

        let redis_url = std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        let wizard_namespace = std::env::var("WIZARD_NAMESPACE")
            .unwrap_or_else(|_| "installer".to_string());

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "debug".to_string());

        if poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS 必须大于 0");
        }

        Ok(Self {
            server_port,
            executor_ws_url,
            poll_interval_secs,
            rpc_timeout_secs,
            operations_limit,
            recompute_policy,
            redis_url,
            wizard_namespace,
            log_level,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}
