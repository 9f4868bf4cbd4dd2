/// 后台操作
///
/// 保留的 操作 → 主机 → 任务 树，以及对外暴露的只读视图

mod aggregator;
mod filter;
mod merge;
mod poller;
mod service;

pub use aggregator::{AggregatorEvent, ApplyOutcome, Focus, OperationAggregator};
pub use filter::LevelFilters;
pub use merge::RecomputePolicy;
pub use poller::Poller;
pub use service::OperationService;

use chrono::{DateTime, Utc};
use common::utils::duration_ms;
use common::{OperationStatus, StatusCategory, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// 保留树
// ============================================================================

/// 任务
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub host_name: String,
    pub command: String,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub output_log: Option<String>,
    pub error_log: Option<String>,
    pub structured_out: Option<serde_json::Value>,
    pub is_visible: bool,
    /// 客户端附加的标注，轮询源不会下发，合并时保留
    pub annotations: HashMap<String, serde_json::Value>,
}

/// 操作下的主机
#[derive(Debug, Clone)]
pub struct OperationHost {
    pub name: String,
    pub status: OperationStatus,
    pub progress: u8,
    pub tasks: Vec<Task>,
    pub is_visible: bool,
    /// 上次合并时未重算，派生字段可能滞后
    pub is_stale: bool,
}

/// 操作（请求）
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: i64,
    pub name: String,
    pub status: OperationStatus,
    pub progress: u8,
    pub is_abortable: bool,
    /// 中止命令在途，或已被接受但快照尚未确认
    pub abort_requested: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub hosts: Vec<OperationHost>,
    pub is_visible: bool,
}

impl Operation {
    pub fn host(&self, name: &str) -> Option<&OperationHost> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.hosts.iter().flat_map(|h| h.tasks.iter())
    }
}

// ============================================================================
// 视图
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationView {
    pub id: i64,
    pub name: String,
    pub status: OperationStatus,
    pub progress: u8,
    pub is_abortable: bool,
    pub abort_requested: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub host_count: usize,
    pub is_visible: bool,
}

impl OperationView {
    pub(crate) fn build(op: &Operation, now: DateTime<Utc>) -> Self {
        Self {
            id: op.id,
            name: op.name.clone(),
            status: op.status,
            progress: op.progress,
            is_abortable: op.is_abortable,
            abort_requested: op.abort_requested,
            start_time: op.start_time,
            end_time: op.end_time,
            duration_ms: duration_ms(op.start_time, op.end_time, now),
            host_count: op.hosts.len(),
            is_visible: op.is_visible,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostView {
    pub name: String,
    pub status: OperationStatus,
    pub progress: u8,
    pub task_count: usize,
    pub is_stale: bool,
    pub is_visible: bool,
}

impl From<&OperationHost> for HostView {
    fn from(host: &OperationHost) -> Self {
        Self {
            name: host.name.clone(),
            status: host.status,
            progress: host.progress,
            task_count: host.tasks.len(),
            is_stale: host.is_stale,
            is_visible: host.is_visible,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    pub id: i64,
    pub host_name: String,
    pub command: String,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub is_visible: bool,
}

impl TaskView {
    pub(crate) fn build(task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            id: task.id,
            host_name: task.host_name.clone(),
            command: task.command.clone(),
            status: task.status,
            start_time: task.start_time,
            end_time: task.end_time,
            duration_ms: duration_ms(task.start_time, task.end_time, now),
            is_visible: task.is_visible,
        }
    }
}

/// 单个任务的完整详情，包括日志与标注
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDetailView {
    pub operation_id: i64,
    #[serde(flatten)]
    pub task: TaskView,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub output_log: Option<String>,
    pub error_log: Option<String>,
    pub structured_out: Option<serde_json::Value>,
    pub annotations: HashMap<String, serde_json::Value>,
}

/// 各状态分类的计数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCounts {
    pub all: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub completed: usize,
    pub aborted: usize,
    pub timedout: usize,
}

impl CategoryCounts {
    /// 单次遍历统计
    pub fn tally<I: IntoIterator<Item = StatusCategory>>(categories: I) -> Self {
        let mut counts = Self::default();
        for category in categories {
            counts.all += 1;
            match category {
                StatusCategory::All => {}
                StatusCategory::Pending => counts.pending += 1,
                StatusCategory::InProgress => counts.in_progress += 1,
                StatusCategory::Failed => counts.failed += 1,
                StatusCategory::Completed => counts.completed += 1,
                StatusCategory::Aborted => counts.aborted += 1,
                StatusCategory::Timedout => counts.timedout += 1,
            }
        }
        counts
    }

    pub fn get(&self, category: StatusCategory) -> usize {
        match category {
            StatusCategory::All => self.all,
            StatusCategory::Pending => self.pending,
            StatusCategory::InProgress => self.in_progress,
            StatusCategory::Failed => self.failed,
            StatusCategory::Completed => self.completed,
            StatusCategory::Aborted => self.aborted,
            StatusCategory::Timedout => self.timedout,
        }
    }
}

/// 分页参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> PageView<T> {
        let total = items.len();
        let items = items.into_iter().skip(self.offset).take(self.limit).collect();
        PageView {
            items,
            total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageView<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> PageView<T> {
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_every_child_once() {
        let counts = CategoryCounts::tally(vec![
            StatusCategory::Pending,
            StatusCategory::Pending,
            StatusCategory::Failed,
            StatusCategory::Completed,
        ]);
        assert_eq!(counts.all, 4);
        assert_eq!(counts.get(StatusCategory::Pending), 2);
        assert_eq!(counts.get(StatusCategory::Timedout), 0);
    }

    #[test]
    fn test_page_window() {
        let page = Page::new(10, 10).apply((0..25).collect::<Vec<_>>());
        assert_eq!(page.items, (10..20).collect::<Vec<_>>());
        assert_eq!(page.total, 25);
        assert!(page.has_more());

        let last = Page::new(20, 10).apply((0..25).collect::<Vec<_>>());
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_more());
    }
}
