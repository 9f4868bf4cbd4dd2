/// 基于执行器 RPC 的轮询源与命令下发方

use async_trait::async_trait;
use common::ws_rpc::{
    methods, OperationCommandRequest, OperationCommandResponse, RpcError,
};
use common::{Error, Result};
use engine::{CommandIssuer, OperationSnapshot, PollRequest, PollSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ExecutorClient;

/// list_operations 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOperationsResponse {
    #[serde(default)]
    pub operations: Vec<OperationSnapshot>,
}

pub struct RpcPollSource {
    client: ExecutorClient,
}

impl RpcPollSource {
    pub fn new(client: ExecutorClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PollSource for RpcPollSource {
    async fn fetch(&self, request: &PollRequest) -> Result<Vec<OperationSnapshot>> {
        let payload = serde_json::to_value(request)?;
        let response: ListOperationsResponse = self
            .client
            .call_as(methods::LIST_OPERATIONS, payload)
            .await
            .map_err(|e| Error::Poll(e.to_string()))?;
        debug!("执行器返回 {} 个操作", response.operations.len());
        Ok(response.operations)
    }
}

pub struct RpcCommandIssuer {
    client: ExecutorClient,
}

impl RpcCommandIssuer {
    pub fn new(client: ExecutorClient) -> Self {
        Self { client }
    }

    async fn send_command(&self, method: &str, operation_id: i64) -> Result<()> {
        let payload = serde_json::to_value(OperationCommandRequest { operation_id })?;
        let response: OperationCommandResponse = self
            .client
            .call_as(method, payload)
            .await
            .map_err(command_error)?;

        if response.accepted {
            Ok(())
        } else {
            Err(Error::Command(
                response
                    .message
                    .unwrap_or_else(|| format!("执行器拒绝了 {}: operation_id={}", method, operation_id)),
            ))
        }
    }
}

/// 传输层错误统一视为命令失败，业务错误按错误码映射
fn command_error(err: RpcError) -> Error {
    if err.code.is_transport() {
        Error::Command(err.to_string())
    } else {
        err.into()
    }
}

#[async_trait]
impl CommandIssuer for RpcCommandIssuer {
    async fn abort(&self, operation_id: i64) -> Result<()> {
        self.send_command(methods::ABORT_OPERATION, operation_id).await
    }

    async fn retry(&self, operation_id: i64) -> Result<()> {
        self.send_command(methods::RETRY_OPERATION, operation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ws_rpc::RpcErrorCode;
    use std::time::Duration;

    fn offline_client() -> ExecutorClient {
        ExecutorClient::new("ws://127.0.0.1:1/ws", Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_fetch_while_offline_is_poll_error() {
        let source = RpcPollSource::new(offline_client());
        let request = PollRequest {
            limit: 10,
            level: Default::default(),
            operation_id: None,
            host_name: None,
            task_id: None,
        };
        assert!(matches!(source.fetch(&request).await, Err(Error::Poll(_))));
    }

    #[tokio::test]
    async fn test_abort_while_offline_is_command_error() {
        let issuer = RpcCommandIssuer::new(offline_client());
        assert!(matches!(issuer.abort(3).await, Err(Error::Command(_))));
    }

    #[test]
    fn test_business_errors_keep_their_kind() {
        let err = command_error(RpcError::operation_not_found(9));
        assert!(matches!(err, Error::NotFound(_)));

        let err = command_error(RpcError::new(RpcErrorCode::Timeout, "slow"));
        assert!(matches!(err, Error::Command(_)));
    }

    #[test]
    fn test_list_response_decodes_snapshots() {
        let response: ListOperationsResponse = serde_json::from_value(serde_json::json!({
            "operations": [
                {"id": 1, "name": "Install Services", "status": "IN_PROGRESS", "progress": 35},
                {"id": 2, "name": "Start Services", "status": "weird-status"}
            ]
        }))
        .unwrap();
        assert_eq!(response.operations.len(), 2);
        assert_eq!(response.operations[1].status, common::OperationStatus::Pending);
    }
}
