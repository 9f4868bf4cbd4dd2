/// 操作聚合器
///
/// 持有保留树，按序号合并快照，维护过滤、聚焦、分页与中止状态。
/// 每次成功合并后依次执行：重算 → 重新过滤 → 重建任务索引 → 通知订阅者。

use chrono::Utc;
use common::models::constants::{DEFAULT_OPERATIONS_LIMIT, SHOW_MORE_INCREMENT};
use common::ws_rpc::ViewLevel;
use common::{Error, Result, StatusCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::filter::{apply_filters, LevelFilters};
use super::merge::{merge_operation, FocusLookup, RecomputePolicy};
use super::{
    CategoryCounts, Operation, OperationHost, OperationView, Page, PageView, HostView,
    TaskDetailView, TaskView,
};
use crate::snapshot::Snapshot;
use crate::source::PollRequest;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 快照合并结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { sequence: u64, operations: usize },
    /// 序号不大于已应用的序号，整个快照被丢弃
    Stale { sequence: u64, last_applied: u64 },
}

/// 聚合器事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AggregatorEvent {
    SnapshotApplied { sequence: u64, operations: usize },
    SnapshotDiscarded { sequence: u64, last_applied: u64 },
    PollFailed { sequence: u64, message: String },
    AbortRequested { operation_id: i64 },
    AbortFailed { operation_id: i64, message: String },
    FocusChanged { level: ViewLevel },
    FiltersChanged { filters: LevelFilters },
}

/// 当前展开的操作/主机/任务
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Focus {
    pub operation_id: Option<i64>,
    pub host_name: Option<String>,
    pub task_id: Option<i64>,
}

impl Focus {
    pub fn level(&self) -> ViewLevel {
        match (self.operation_id, &self.host_name, self.task_id) {
            (Some(_), Some(_), Some(_)) => ViewLevel::TaskDetails,
            (Some(_), Some(_), None) => ViewLevel::TasksList,
            (Some(_), None, _) => ViewLevel::HostsList,
            _ => ViewLevel::RequestsList,
        }
    }
}

impl FocusLookup for Focus {
    /// 聚焦操作而未选主机时，该操作下的主机都可见，视为聚焦
    fn is_host_focused(&self, operation_id: i64, host_name: &str) -> bool {
        if self.operation_id != Some(operation_id) {
            return false;
        }
        match &self.host_name {
            Some(name) => name == host_name,
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
struct TaskLocation {
    operation_id: i64,
    host_name: String,
}

pub struct OperationAggregator {
    operations: Vec<Operation>,
    policy: RecomputePolicy,
    last_sequence: Option<u64>,
    filters: LevelFilters,
    focus: Focus,
    limit: usize,
    last_snapshot_len: usize,
    task_index: HashMap<i64, TaskLocation>,
    events: broadcast::Sender<AggregatorEvent>,
}

impl Default for OperationAggregator {
    fn default() -> Self {
        Self::new(RecomputePolicy::default())
    }
}

impl OperationAggregator {
    pub fn new(policy: RecomputePolicy) -> Self {
        Self::with_limit(policy, DEFAULT_OPERATIONS_LIMIT)
    }

    pub fn with_limit(policy: RecomputePolicy, limit: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            operations: Vec::new(),
            policy,
            last_sequence: None,
            filters: LevelFilters::default(),
            focus: Focus::default(),
            limit,
            last_snapshot_len: 0,
            task_index: HashMap::new(),
            events,
        }
    }

    /// 订阅聚合器事件
    pub fn subscribe(&self) -> broadcast::Receiver<AggregatorEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AggregatorEvent) {
        // 没有订阅者时发送失败，忽略
        let _ = self.events.send(event);
    }

    pub fn policy(&self) -> RecomputePolicy {
        self.policy
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    // ========================================================================
    // 合并
    // ========================================================================

    /// 合并一次轮询快照
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> ApplyOutcome {
        if let Some(last) = self.last_sequence {
            if snapshot.sequence <= last {
                debug!("丢弃过期快照: sequence={}, last_applied={}", snapshot.sequence, last);
                self.emit(AggregatorEvent::SnapshotDiscarded {
                    sequence: snapshot.sequence,
                    last_applied: last,
                });
                return ApplyOutcome::Stale {
                    sequence: snapshot.sequence,
                    last_applied: last,
                };
            }
        }

        let sequence = snapshot.sequence;
        self.last_snapshot_len = snapshot.operations.len();

        let mut retained: HashMap<i64, Operation> =
            self.operations.drain(..).map(|op| (op.id, op)).collect();
        let mut merged = Vec::with_capacity(snapshot.operations.len());
        for op_snapshot in snapshot.operations {
            let existing = retained.remove(&op_snapshot.id);
            merged.push(merge_operation(existing, op_snapshot, self.policy, &self.focus));
        }

        if !retained.is_empty() {
            debug!("移除已不在快照中的操作: {:?}", retained.keys().collect::<Vec<_>>());
        }

        self.operations = merged;
        self.last_sequence = Some(sequence);
        self.drop_dangling_focus();

        apply_filters(&mut self.operations, &self.filters);
        self.rebuild_task_index();

        let count = self.operations.len();
        debug!("快照已合并: sequence={}, operations={}", sequence, count);
        self.emit(AggregatorEvent::SnapshotApplied {
            sequence,
            operations: count,
        });

        ApplyOutcome::Applied {
            sequence,
            operations: count,
        }
    }

    /// 记录一次轮询失败，保留树不变
    pub fn record_poll_failure(&self, sequence: u64, error: &Error) {
        warn!("⚠️ 操作轮询失败: sequence={}, error={}", sequence, error);
        self.emit(AggregatorEvent::PollFailed {
            sequence,
            message: error.to_string(),
        });
    }

    fn rebuild_task_index(&mut self) {
        self.task_index.clear();
        for op in &self.operations {
            for host in &op.hosts {
                for task in &host.tasks {
                    self.task_index.insert(
                        task.id,
                        TaskLocation {
                            operation_id: op.id,
                            host_name: host.name.clone(),
                        },
                    );
                }
            }
        }
    }

    /// 聚焦对象被删除时退回到仍然存在的上一级
    fn drop_dangling_focus(&mut self) {
        let Some(op_id) = self.focus.operation_id else {
            return;
        };
        let before = self.focus.level();
        match self.operations.iter().find(|op| op.id == op_id) {
            None => self.focus = Focus::default(),
            Some(op) => {
                if let Some(host_name) = &self.focus.host_name {
                    match op.host(host_name) {
                        None => {
                            self.focus.host_name = None;
                            self.focus.task_id = None;
                        }
                        Some(host) => {
                            if let Some(task_id) = self.focus.task_id {
                                if !host.tasks.iter().any(|t| t.id == task_id) {
                                    self.focus.task_id = None;
                                }
                            }
                        }
                    }
                }
            }
        }
        let after = self.focus.level();
        if before != after {
            self.emit(AggregatorEvent::FocusChanged { level: after });
        }
    }

    // ========================================================================
    // 聚焦
    // ========================================================================

    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    pub fn level(&self) -> ViewLevel {
        self.focus.level()
    }

    /// 展开操作，主机层过滤重置为 all
    pub fn focus_operation(&mut self, operation_id: i64) -> Result<()> {
        self.operation(operation_id)?;
        self.focus = Focus {
            operation_id: Some(operation_id),
            host_name: None,
            task_id: None,
        };
        self.filters.hosts = StatusCategory::All;
        self.after_focus_change();
        Ok(())
    }

    /// 在已聚焦的操作下展开主机，任务层过滤重置为 all
    pub fn focus_host(&mut self, host_name: &str) -> Result<()> {
        let op_id = self.focused_operation_id()?;
        self.host(op_id, host_name)?;
        self.focus.host_name = Some(host_name.to_string());
        self.focus.task_id = None;
        self.filters.tasks = StatusCategory::All;
        self.after_focus_change();
        Ok(())
    }

    /// 在已聚焦的主机下展开任务详情
    pub fn focus_task(&mut self, task_id: i64) -> Result<()> {
        let op_id = self.focused_operation_id()?;
        let host_name = self
            .focus
            .host_name
            .clone()
            .ok_or_else(|| Error::InvalidArgument("尚未选择主机".to_string()))?;
        let host = self.host(op_id, &host_name)?;
        if !host.tasks.iter().any(|t| t.id == task_id) {
            return Err(Error::NotFound(format!("任务 {}", task_id)));
        }
        self.focus.task_id = Some(task_id);
        self.after_focus_change();
        Ok(())
    }

    /// 回到操作列表
    pub fn clear_focus(&mut self) {
        self.focus = Focus::default();
        self.after_focus_change();
    }

    fn after_focus_change(&mut self) {
        apply_filters(&mut self.operations, &self.filters);
        let level = self.focus.level();
        debug!("视图层级切换: {:?}", level);
        self.emit(AggregatorEvent::FocusChanged { level });
    }

    fn focused_operation_id(&self) -> Result<i64> {
        self.focus
            .operation_id
            .ok_or_else(|| Error::InvalidArgument("尚未选择操作".to_string()))
    }

    // ========================================================================
    // 过滤
    // ========================================================================

    pub fn filters(&self) -> LevelFilters {
        self.filters
    }

    pub fn set_operation_filter(&mut self, category: StatusCategory) {
        self.filters.operations = category;
        self.after_filter_change();
    }

    pub fn set_host_filter(&mut self, category: StatusCategory) {
        self.filters.hosts = category;
        self.after_filter_change();
    }

    pub fn set_task_filter(&mut self, category: StatusCategory) {
        self.filters.tasks = category;
        self.after_filter_change();
    }

    fn after_filter_change(&mut self) {
        apply_filters(&mut self.operations, &self.filters);
        self.emit(AggregatorEvent::FiltersChanged {
            filters: self.filters,
        });
    }

    // ========================================================================
    // 轮询参数 / 显示更多
    // ========================================================================

    /// 按当前聚焦状态构造下一次轮询请求
    pub fn poll_request(&self) -> PollRequest {
        PollRequest {
            limit: self.limit,
            level: self.focus.level(),
            operation_id: self.focus.operation_id,
            host_name: self.focus.host_name.clone(),
            task_id: self.focus.task_id,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 多拉取 10 个操作
    pub fn show_more(&mut self) -> usize {
        self.limit += SHOW_MORE_INCREMENT;
        info!("操作列表上限调整为 {}", self.limit);
        self.limit
    }

    /// 上一次快照已填满上限时可以继续加载
    pub fn is_show_more_available(&self) -> bool {
        self.last_sequence.is_some() && self.last_snapshot_len >= self.limit
    }

    // ========================================================================
    // 查询
    // ========================================================================

    fn operation(&self, operation_id: i64) -> Result<&Operation> {
        self.operations
            .iter()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| Error::NotFound(format!("操作 {}", operation_id)))
    }

    fn operation_mut(&mut self, operation_id: i64) -> Result<&mut Operation> {
        self.operations
            .iter_mut()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| Error::NotFound(format!("操作 {}", operation_id)))
    }

    fn host(&self, operation_id: i64, host_name: &str) -> Result<&OperationHost> {
        self.operation(operation_id)?
            .host(host_name)
            .ok_or_else(|| Error::NotFound(format!("主机 {}", host_name)))
    }

    pub fn get_operation(&self, operation_id: i64) -> Result<OperationView> {
        Ok(OperationView::build(self.operation(operation_id)?, Utc::now()))
    }

    pub fn get_operations(&self, filter: StatusCategory) -> Vec<OperationView> {
        let now = Utc::now();
        self.operations
            .iter()
            .filter(|op| filter.matches_operation(op.status))
            .map(|op| OperationView::build(op, now))
            .collect()
    }

    pub fn get_operations_page(&self, filter: StatusCategory, page: Page) -> PageView<OperationView> {
        page.apply(self.get_operations(filter))
    }

    pub fn get_hosts(&self, operation_id: i64, filter: StatusCategory) -> Result<Vec<HostView>> {
        Ok(self
            .operation(operation_id)?
            .hosts
            .iter()
            .filter(|h| filter.matches_operation(h.status))
            .map(HostView::from)
            .collect())
    }

    /// 在当前聚焦的操作下查询主机的任务
    pub fn get_tasks(&self, host_name: &str, filter: StatusCategory) -> Result<Vec<TaskView>> {
        let op_id = self.focused_operation_id()?;
        self.get_operation_tasks(op_id, host_name, filter)
    }

    pub fn get_operation_tasks(
        &self,
        operation_id: i64,
        host_name: &str,
        filter: StatusCategory,
    ) -> Result<Vec<TaskView>> {
        let now = Utc::now();
        Ok(self
            .host(operation_id, host_name)?
            .tasks
            .iter()
            .filter(|t| filter.matches_task(t.status))
            .map(|t| TaskView::build(t, now))
            .collect())
    }

    pub fn get_task(&self, task_id: i64) -> Result<TaskDetailView> {
        let location = self
            .task_index
            .get(&task_id)
            .ok_or_else(|| Error::NotFound(format!("任务 {}", task_id)))?;
        let host = self.host(location.operation_id, &location.host_name)?;
        let task = host
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| Error::Internal(format!("任务索引与保留树不一致: {}", task_id)))?;

        Ok(TaskDetailView {
            operation_id: location.operation_id,
            task: TaskView::build(task, Utc::now()),
            stdout: task.stdout.clone(),
            stderr: task.stderr.clone(),
            output_log: task.output_log.clone(),
            error_log: task.error_log.clone(),
            structured_out: task.structured_out.clone(),
            annotations: task.annotations.clone(),
        })
    }

    pub fn operation_counts(&self) -> CategoryCounts {
        CategoryCounts::tally(
            self.operations
                .iter()
                .map(|op| StatusCategory::of_operation(op.status)),
        )
    }

    pub fn host_counts(&self, operation_id: i64) -> Result<CategoryCounts> {
        Ok(CategoryCounts::tally(
            self.operation(operation_id)?
                .hosts
                .iter()
                .map(|h| StatusCategory::of_operation(h.status)),
        ))
    }

    pub fn task_counts(&self, operation_id: i64, host_name: &str) -> Result<CategoryCounts> {
        Ok(CategoryCounts::tally(
            self.host(operation_id, host_name)?
                .tasks
                .iter()
                .map(|t| StatusCategory::of_task(t.status)),
        ))
    }

    /// 给任务附加客户端标注，后续合并不会覆盖
    pub fn annotate_task(&mut self, task_id: i64, key: &str, value: serde_json::Value) -> Result<()> {
        let location = self
            .task_index
            .get(&task_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("任务 {}", task_id)))?;
        let task = self
            .operation_mut(location.operation_id)?
            .hosts
            .iter_mut()
            .find(|h| h.name == location.host_name)
            .and_then(|h| h.tasks.iter_mut().find(|t| t.id == task_id))
            .ok_or_else(|| Error::Internal(format!("任务索引与保留树不一致: {}", task_id)))?;
        task.annotations.insert(key.to_string(), value);
        Ok(())
    }

    // ========================================================================
    // 中止 / 重试
    // ========================================================================

    /// 中止第一阶段：校验并乐观地关闭 is_abortable
    pub fn begin_abort(&mut self, operation_id: i64) -> Result<()> {
        let op = self.operation_mut(operation_id)?;
        if !op.status.is_abortable() || op.abort_requested {
            return Err(Error::NotAbortable(operation_id));
        }
        op.is_abortable = false;
        op.abort_requested = true;
        self.emit(AggregatorEvent::AbortRequested { operation_id });
        Ok(())
    }

    /// 中止第二阶段：命令失败时按当前状态回滚
    pub fn complete_abort(&mut self, operation_id: i64, outcome: Result<()>) -> Result<()> {
        let error = match outcome {
            Ok(()) => {
                info!("✅ 中止命令已接受: operation_id={}", operation_id);
                return Ok(());
            }
            Err(e) => e,
        };

        let message = error.to_string();
        // 操作可能已在命令在途期间被剪除
        if let Ok(op) = self.operation_mut(operation_id) {
            op.abort_requested = false;
            op.is_abortable = op.status.is_abortable();
        }
        warn!("❌ 中止命令失败: operation_id={}, error={}", operation_id, message);
        self.emit(AggregatorEvent::AbortFailed {
            operation_id,
            message: message.clone(),
        });
        Err(Error::Command(message))
    }

    pub fn check_retryable(&self, operation_id: i64) -> Result<()> {
        let op = self.operation(operation_id)?;
        if op.status.is_retryable() {
            Ok(())
        } else {
            Err(Error::NotRetryable(operation_id))
        }
    }
}
