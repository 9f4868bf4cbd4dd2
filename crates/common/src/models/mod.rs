/// 共享数据模型
///
/// 定义引擎和 Server 共享的状态枚举与过滤分类

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 操作（请求）状态
///
/// 主机级状态由其任务汇总得出，使用同一枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Aborted,
    Timedout,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::InProgress => "IN_PROGRESS",
            OperationStatus::Success => "SUCCESS",
            OperationStatus::Failed => "FAILED",
            OperationStatus::Aborted => "ABORTED",
            OperationStatus::Timedout => "TIMEDOUT",
        }
    }

    /// 是否允许发起中止
    pub fn is_abortable(&self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }

    /// 是否允许重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperationStatus::Failed | OperationStatus::Aborted | OperationStatus::Timedout
        )
    }

    /// 是否已结束
    pub fn is_finished(&self) -> bool {
        !matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }
}

impl From<String> for OperationStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" => OperationStatus::Pending,
            "IN_PROGRESS" | "UPGRADING" => OperationStatus::InProgress,
            "SUCCESS" | "COMPLETED" => OperationStatus::Success,
            "FAILED" => OperationStatus::Failed,
            "ABORTED" => OperationStatus::Aborted,
            "TIMEDOUT" => OperationStatus::Timedout,
            _ => OperationStatus::Pending,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum TaskStatus {
    Pending,
    Queued,
    InProgress,
    Completed,
    Failed,
    Aborted,
    Timedout,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Queued => "QUEUED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Aborted => "ABORTED",
            TaskStatus::Timedout => "TIMEDOUT",
        }
    }

    /// 已结束（无论成功与否）
    pub fn is_completed_class(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Aborted | TaskStatus::Timedout
        )
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => TaskStatus::Pending,
            "QUEUED" => TaskStatus::Queued,
            "IN_PROGRESS" | "UPGRADING" => TaskStatus::InProgress,
            "COMPLETED" | "SUCCESS" => TaskStatus::Completed,
            "FAILED" => TaskStatus::Failed,
            "ABORTED" => TaskStatus::Aborted,
            "TIMEDOUT" => TaskStatus::Timedout,
            _ => TaskStatus::Pending,
        }
    }
}

impl From<TaskStatus> for OperationStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending | TaskStatus::Queued => OperationStatus::Pending,
            TaskStatus::InProgress => OperationStatus::InProgress,
            TaskStatus::Completed => OperationStatus::Success,
            TaskStatus::Failed => OperationStatus::Failed,
            TaskStatus::Aborted => OperationStatus::Aborted,
            TaskStatus::Timedout => OperationStatus::Timedout,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态过滤分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    #[default]
    All,
    Pending,
    InProgress,
    Failed,
    Completed,
    Aborted,
    Timedout,
}

impl StatusCategory {
    /// 全部分类（下拉框顺序）
    pub const ALL: [StatusCategory; 7] = [
        StatusCategory::All,
        StatusCategory::Pending,
        StatusCategory::InProgress,
        StatusCategory::Failed,
        StatusCategory::Completed,
        StatusCategory::Aborted,
        StatusCategory::Timedout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::All => "all",
            StatusCategory::Pending => "pending",
            StatusCategory::InProgress => "in_progress",
            StatusCategory::Failed => "failed",
            StatusCategory::Completed => "completed",
            StatusCategory::Aborted => "aborted",
            StatusCategory::Timedout => "timedout",
        }
    }

    /// 操作/主机状态所属分类
    pub fn of_operation(status: OperationStatus) -> Self {
        match status {
            OperationStatus::Pending => StatusCategory::Pending,
            OperationStatus::InProgress => StatusCategory::InProgress,
            OperationStatus::Success => StatusCategory::Completed,
            OperationStatus::Failed => StatusCategory::Failed,
            OperationStatus::Aborted => StatusCategory::Aborted,
            OperationStatus::Timedout => StatusCategory::Timedout,
        }
    }

    /// 任务状态所属分类（pending 同时包含 PENDING 与 QUEUED）
    pub fn of_task(status: TaskStatus) -> Self {
        Self::of_operation(status.into())
    }

    pub fn matches_operation(&self, status: OperationStatus) -> bool {
        *self == StatusCategory::All || *self == Self::of_operation(status)
    }

    pub fn matches_task(&self, status: TaskStatus) -> bool {
        *self == StatusCategory::All || *self == Self::of_task(status)
    }
}

impl FromStr for StatusCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StatusCategory::All),
            "pending" => Ok(StatusCategory::Pending),
            "in_progress" => Ok(StatusCategory::InProgress),
            "failed" => Ok(StatusCategory::Failed),
            "completed" => Ok(StatusCategory::Completed),
            "aborted" => Ok(StatusCategory::Aborted),
            "timedout" => Ok(StatusCategory::Timedout),
            other => Err(crate::Error::InvalidArgument(format!("未知的状态分类: {}", other))),
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 常量定义
pub mod constants {
    /// 默认 Server 端口
    pub const DEFAULT_SERVER_PORT: u16 = 3000;

    /// 默认轮询间隔（秒）
    pub const DEFAULT_POLL_INTERVAL: u64 = 6;

    /// 默认拉取的最近操作数量
    pub const DEFAULT_OPERATIONS_LIMIT: usize = 10;

    /// "显示更多" 每次增加的操作数量
    pub const SHOW_MORE_INCREMENT: usize = 10;

    /// 默认 RPC 超时（秒）
    pub const DEFAULT_RPC_TIMEOUT: u64 = 30;

    /// 排队任务的进度权重
    pub const QUEUED_WEIGHT: f64 = 0.09;

    /// 执行中任务的进度权重
    pub const IN_PROGRESS_WEIGHT: f64 = 0.35;

    /// 已结束任务的进度权重
    pub const COMPLETED_WEIGHT: f64 = 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_aliases() {
        let status: TaskStatus = serde_json::from_str("\"UPGRADING\"").unwrap();
        assert_eq!(status, TaskStatus::InProgress);

        let status: TaskStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(status, TaskStatus::Completed);

        let status: OperationStatus = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(status, OperationStatus::Pending);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"IN_PROGRESS\"");
        assert_eq!(serde_json::to_string(&OperationStatus::Timedout).unwrap(), "\"TIMEDOUT\"");
        assert_eq!(serde_json::to_string(&StatusCategory::InProgress).unwrap(), "\"in_progress\"");
    }

    #[test]
    fn test_category_mapping() {
        assert!(StatusCategory::Pending.matches_task(TaskStatus::Pending));
        assert!(StatusCategory::Pending.matches_task(TaskStatus::Queued));
        assert!(StatusCategory::Completed.matches_task(TaskStatus::Completed));
        assert!(StatusCategory::Completed.matches_operation(OperationStatus::Success));
        assert!(!StatusCategory::Failed.matches_task(TaskStatus::Aborted));
        assert!(StatusCategory::All.matches_task(TaskStatus::Timedout));
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("in_progress".parse::<StatusCategory>().unwrap(), StatusCategory::InProgress);
        assert!("bogus".parse::<StatusCategory>().is_err());
    }

    #[test]
    fn test_abortable_and_retryable() {
        assert!(OperationStatus::InProgress.is_abortable());
        assert!(OperationStatus::Pending.is_abortable());
        assert!(!OperationStatus::Success.is_abortable());
        assert!(OperationStatus::Failed.is_retryable());
        assert!(!OperationStatus::InProgress.is_retryable());
    }
}
