/// 轮询结果合并
///
/// 操作按 id、主机按名称、任务按 id 原地更新，保留客户端标注

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Operation, OperationHost, Task};
use crate::snapshot::{HostSnapshot, OperationSnapshot, TaskSnapshot};
use crate::status::{calculate_progress, derive_status};

/// 主机派生字段的重算策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecomputePolicy {
    /// 每次合并都重算全部主机
    Always,
    /// 只重算服务端标记为 modified 的主机
    ModifiedOnly,
    /// 重算 modified 的主机以及当前聚焦的主机
    #[default]
    ModifiedOrFocused,
}

impl RecomputePolicy {
    fn should_recompute(&self, modified: bool, focused: bool) -> bool {
        match self {
            RecomputePolicy::Always => true,
            RecomputePolicy::ModifiedOnly => modified,
            RecomputePolicy::ModifiedOrFocused => modified || focused,
        }
    }
}

impl std::str::FromStr for RecomputePolicy {
    type Err = common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(RecomputePolicy::Always),
            "modified_only" => Ok(RecomputePolicy::ModifiedOnly),
            "modified_or_focused" => Ok(RecomputePolicy::ModifiedOrFocused),
            other => Err(common::Error::Config(format!("未知的重算策略: {}", other))),
        }
    }
}

/// 合并时判断主机是否处于聚焦状态
pub(crate) trait FocusLookup {
    fn is_host_focused(&self, operation_id: i64, host_name: &str) -> bool;
}

/// 合并一个操作快照，返回新建或更新后的操作
pub(crate) fn merge_operation(
    existing: Option<Operation>,
    snapshot: OperationSnapshot,
    policy: RecomputePolicy,
    focus: &dyn FocusLookup,
) -> Operation {
    let OperationSnapshot {
        id,
        name,
        status,
        progress,
        start_time,
        end_time,
        hosts,
    } = snapshot;

    let mut op = existing.unwrap_or_else(|| Operation {
        id,
        name: name.clone(),
        status,
        progress: 0,
        is_abortable: false,
        abort_requested: false,
        start_time: None,
        end_time: None,
        hosts: Vec::new(),
        is_visible: true,
    });

    op.name = name;
    op.start_time = start_time;
    op.end_time = end_time;

    let detailed = match hosts {
        Some(host_snapshots) => {
            merge_hosts(&mut op, host_snapshots, policy, focus);
            !op.hosts.is_empty()
        }
        None => false,
    };

    if detailed {
        op.status = derive_status(op.hosts.iter().map(|h| h.status));
        op.progress = calculate_progress(op.tasks().map(|t| t.status));
    } else {
        op.status = status;
        op.progress = progress
            .map(|p| p.min(100))
            .unwrap_or(if status.is_finished() { 100 } else { 0 });
    }

    // 中止请求在状态离开可中止区间后才算被确认
    if !op.status.is_abortable() {
        op.abort_requested = false;
    }
    op.is_abortable = op.status.is_abortable() && !op.abort_requested;

    op
}

/// 快照中带了主机列表时以它为准，缺失的主机被删除
fn merge_hosts(
    op: &mut Operation,
    snapshots: Vec<HostSnapshot>,
    policy: RecomputePolicy,
    focus: &dyn FocusLookup,
) {
    let mut retained: HashMap<String, OperationHost> =
        op.hosts.drain(..).map(|h| (h.name.clone(), h)).collect();

    for snapshot in snapshots {
        let focused = focus.is_host_focused(op.id, &snapshot.name);
        let host = match retained.remove(&snapshot.name) {
            Some(mut host) => {
                let recompute = policy.should_recompute(snapshot.modified, focused);
                merge_tasks(&mut host, snapshot.tasks);
                if recompute {
                    recompute_host(&mut host);
                } else {
                    host.is_stale = true;
                }
                host
            }
            None => {
                let mut host = OperationHost {
                    name: snapshot.name,
                    status: common::OperationStatus::Pending,
                    progress: 0,
                    tasks: Vec::new(),
                    is_visible: true,
                    is_stale: false,
                };
                merge_tasks(&mut host, snapshot.tasks);
                recompute_host(&mut host);
                host
            }
        };
        op.hosts.push(host);
    }
}

fn merge_tasks(host: &mut OperationHost, snapshots: Vec<TaskSnapshot>) {
    let mut retained: HashMap<i64, Task> = host.tasks.drain(..).map(|t| (t.id, t)).collect();

    for snapshot in snapshots {
        let task = match retained.remove(&snapshot.id) {
            Some(mut task) => {
                update_task(&mut task, snapshot);
                task
            }
            None => new_task(snapshot),
        };
        host.tasks.push(task);
    }
}

fn update_task(task: &mut Task, snapshot: TaskSnapshot) {
    task.host_name = snapshot.host_name;
    task.command = snapshot.command;
    task.status = snapshot.status;
    if snapshot.start_time.is_some() {
        task.start_time = snapshot.start_time;
    }
    if snapshot.end_time.is_some() {
        task.end_time = snapshot.end_time;
    }
    if snapshot.stdout.is_some() {
        task.stdout = snapshot.stdout;
    }
    if snapshot.stderr.is_some() {
        task.stderr = snapshot.stderr;
    }
    if snapshot.output_log.is_some() {
        task.output_log = snapshot.output_log;
    }
    if snapshot.error_log.is_some() {
        task.error_log = snapshot.error_log;
    }
    if snapshot.structured_out.is_some() {
        task.structured_out = snapshot.structured_out;
    }
}

fn new_task(snapshot: TaskSnapshot) -> Task {
    Task {
        id: snapshot.id,
        host_name: snapshot.host_name,
        command: snapshot.command,
        status: snapshot.status,
        start_time: snapshot.start_time,
        end_time: snapshot.end_time,
        stdout: snapshot.stdout,
        stderr: snapshot.stderr,
        output_log: snapshot.output_log,
        error_log: snapshot.error_log,
        structured_out: snapshot.structured_out,
        is_visible: true,
        annotations: HashMap::new(),
    }
}

fn recompute_host(host: &mut OperationHost) {
    host.status = derive_status(host.tasks.iter().map(|t| t.status));
    host.progress = calculate_progress(host.tasks.iter().map(|t| t.status));
    host.is_stale = false;
}
