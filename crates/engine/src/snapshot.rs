/// 轮询快照
///
/// 轮询源每次返回的操作 → 主机 → 任务记录。任务的日志类字段为 Option，
/// None 表示本次未带回，合并时保留已有值。

use chrono::{DateTime, Utc};
use common::{OperationStatus, TaskStatus};
use serde::{Deserialize, Serialize};

/// 一次轮询的完整结果，带单调递增的序号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence: u64,
    pub operations: Vec<OperationSnapshot>,
}

impl Snapshot {
    pub fn new(sequence: u64, operations: Vec<OperationSnapshot>) -> Self {
        Self { sequence, operations }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub id: i64,
    pub name: String,
    /// 服务端给出的汇总状态，只在没有主机明细时使用
    pub status: OperationStatus,
    /// 服务端给出的进度，只在没有主机明细时使用
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// None 表示列表级轮询，没有带回主机明细
    #[serde(default)]
    pub hosts: Option<Vec<HostSnapshot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub name: String,
    /// 服务端标记该主机自上次轮询以来有变化
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: i64,
    pub host_name: String,
    pub command: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub output_log: Option<String>,
    #[serde(default)]
    pub error_log: Option<String>,
    /// 结构化输出，例如数据均衡任务的搬迁计数
    #[serde(default)]
    pub structured_out: Option<serde_json::Value>,
}

impl TaskSnapshot {
    /// 只带必需字段的任务记录
    pub fn new(id: i64, host_name: impl Into<String>, command: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id,
            host_name: host_name.into(),
            command: command.into(),
            status,
            start_time: None,
            end_time: None,
            stdout: None,
            stderr: None,
            output_log: None,
            error_log: None,
            structured_out: None,
        }
    }
}
