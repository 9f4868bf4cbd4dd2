/// WebSocket RPC 数据类型定义
///
/// 控制台与执行器之间交换的请求/响应负载

use serde::{Deserialize, Serialize};

// ============================================================================
// 心跳
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub console_id: String,
    pub timestamp: i64,
}

// ============================================================================
// 操作轮询
// ============================================================================

/// 视图层级，决定轮询需要带回的明细程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewLevel {
    /// 仅操作列表
    #[default]
    RequestsList,
    /// 某个操作的主机列表
    HostsList,
    /// 某台主机的任务列表
    TasksList,
    /// 单个任务的日志详情
    TaskDetails,
}

/// list_operations 请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListOperationsRequest {
    /// 最多返回的最近操作数量
    pub limit: usize,
    pub level: ViewLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
}

// ============================================================================
// 操作命令
// ============================================================================

/// abort_operation / retry_operation 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationCommandRequest {
    pub operation_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationCommandResponse {
    pub accepted: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// operations_changed 通知
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperationsChangedNotification {
    #[serde(default)]
    pub operation_ids: Vec<i64>,
}
