/// 分层过滤
///
/// 过滤只设置可见标记，不删除节点

use common::StatusCategory;
use serde::{Deserialize, Serialize};

use super::Operation;

/// 各层级当前选中的过滤分类
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelFilters {
    pub operations: StatusCategory,
    pub hosts: StatusCategory,
    pub tasks: StatusCategory,
}

pub(crate) fn apply_filters(operations: &mut [Operation], filters: &LevelFilters) {
    for op in operations.iter_mut() {
        op.is_visible = filters.operations.matches_operation(op.status);
        for host in op.hosts.iter_mut() {
            host.is_visible = filters.hosts.matches_operation(host.status);
            for task in host.tasks.iter_mut() {
                task.is_visible = filters.tasks.matches_task(task.status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{OperationHost, Task};
    use common::{OperationStatus, TaskStatus};
    use std::collections::HashMap;

    fn task(id: i64, status: TaskStatus) -> Task {
        Task {
            id,
            host_name: "h1".to_string(),
            command: "INSTALL".to_string(),
            status,
            start_time: None,
            end_time: None,
            stdout: None,
            stderr: None,
            output_log: None,
            error_log: None,
            structured_out: None,
            is_visible: true,
            annotations: HashMap::new(),
        }
    }

    #[test]
    fn test_pending_filter_includes_queued() {
        let mut ops = vec![Operation {
            id: 1,
            name: "Install".to_string(),
            status: OperationStatus::InProgress,
            progress: 10,
            is_abortable: true,
            abort_requested: false,
            start_time: None,
            end_time: None,
            hosts: vec![OperationHost {
                name: "h1".to_string(),
                status: OperationStatus::InProgress,
                progress: 10,
                tasks: vec![
                    task(1, TaskStatus::Queued),
                    task(2, TaskStatus::Pending),
                    task(3, TaskStatus::InProgress),
                ],
                is_visible: true,
                is_stale: false,
            }],
            is_visible: true,
        }];

        let filters = LevelFilters {
            operations: StatusCategory::Failed,
            hosts: StatusCategory::All,
            tasks: StatusCategory::Pending,
        };
        apply_filters(&mut ops, &filters);

        assert!(!ops[0].is_visible);
        assert!(ops[0].hosts[0].is_visible);
        let visible: Vec<i64> = ops[0].hosts[0]
            .tasks
            .iter()
            .filter(|t| t.is_visible)
            .map(|t| t.id)
            .collect();
        assert_eq!(visible, vec![1, 2]);
        assert_eq!(ops[0].hosts[0].tasks.len(), 3);
    }
}
