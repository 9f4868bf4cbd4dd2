/// 状态与进度汇总
///
/// 主机由任务汇总、操作由主机汇总，两级使用同一张优先级表

use common::models::constants::{COMPLETED_WEIGHT, IN_PROGRESS_WEIGHT, QUEUED_WEIGHT};
use common::{OperationStatus, TaskStatus};

/// 按固定优先级汇总子节点状态
///
/// FAILED > ABORTED > TIMEDOUT > IN_PROGRESS > 全部 SUCCESS > PENDING。
/// 一个失败的子节点压过任意数量的成功子节点；空列表视为 PENDING。
pub fn derive_status<I>(children: I) -> OperationStatus
where
    I: IntoIterator,
    I::Item: Into<OperationStatus>,
{
    let mut any = false;
    let mut aborted = false;
    let mut timedout = false;
    let mut in_progress = false;
    let mut all_success = true;

    for status in children {
        any = true;
        match status.into() {
            OperationStatus::Failed => return OperationStatus::Failed,
            OperationStatus::Aborted => aborted = true,
            OperationStatus::Timedout => timedout = true,
            OperationStatus::InProgress => in_progress = true,
            OperationStatus::Success => {}
            OperationStatus::Pending => all_success = false,
        }
    }

    if !any {
        OperationStatus::Pending
    } else if aborted {
        OperationStatus::Aborted
    } else if timedout {
        OperationStatus::Timedout
    } else if in_progress {
        OperationStatus::InProgress
    } else if all_success {
        OperationStatus::Success
    } else {
        OperationStatus::Pending
    }
}

/// 按任务状态计算进度百分比
///
/// `ceil((queued*0.09 + in_progress*0.35 + completed*1.0) / n * 100)`，
/// PENDING 不计入任何一项；空列表为 0
pub fn calculate_progress<I>(tasks: I) -> u8
where
    I: IntoIterator<Item = TaskStatus>,
{
    let mut total = 0usize;
    let mut queued = 0usize;
    let mut in_progress = 0usize;
    let mut completed = 0usize;

    for status in tasks {
        total += 1;
        match status {
            TaskStatus::Queued => queued += 1,
            TaskStatus::InProgress => in_progress += 1,
            s if s.is_completed_class() => completed += 1,
            _ => {}
        }
    }

    if total == 0 {
        return 0;
    }

    let weighted = queued as f64 * QUEUED_WEIGHT
        + in_progress as f64 * IN_PROGRESS_WEIGHT
        + completed as f64 * COMPLETED_WEIGHT;
    // 先四舍到 1e-9 再取整，避免 0.35 之类的浮点误差把整数结果推高一位
    let percent = (weighted / total as f64 * 100.0 * 1e9).round() / 1e9;
    percent.ceil().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(spec: &[(TaskStatus, usize)]) -> Vec<TaskStatus> {
        spec.iter()
            .flat_map(|(status, count)| std::iter::repeat(*status).take(*count))
            .collect()
    }

    #[test]
    fn test_single_failure_dominates() {
        let statuses = tasks(&[(TaskStatus::Completed, 99), (TaskStatus::Failed, 1)]);
        assert_eq!(derive_status(statuses), OperationStatus::Failed);
    }

    #[test]
    fn test_precedence_order() {
        let statuses = tasks(&[(TaskStatus::Aborted, 1), (TaskStatus::Timedout, 1), (TaskStatus::InProgress, 3)]);
        assert_eq!(derive_status(statuses), OperationStatus::Aborted);

        let statuses = tasks(&[(TaskStatus::Timedout, 1), (TaskStatus::InProgress, 3)]);
        assert_eq!(derive_status(statuses), OperationStatus::Timedout);

        let statuses = tasks(&[(TaskStatus::Queued, 2), (TaskStatus::InProgress, 1), (TaskStatus::Completed, 4)]);
        assert_eq!(derive_status(statuses), OperationStatus::InProgress);

        let statuses = tasks(&[(TaskStatus::Completed, 4)]);
        assert_eq!(derive_status(statuses), OperationStatus::Success);

        let statuses = tasks(&[(TaskStatus::Queued, 1), (TaskStatus::Completed, 4)]);
        assert_eq!(derive_status(statuses), OperationStatus::Pending);
    }

    #[test]
    fn test_host_level_rollup_uses_same_table() {
        let hosts = vec![OperationStatus::Success, OperationStatus::Timedout, OperationStatus::InProgress];
        assert_eq!(derive_status(hosts), OperationStatus::Timedout);
    }

    #[test]
    fn test_empty_children() {
        assert_eq!(derive_status(Vec::<TaskStatus>::new()), OperationStatus::Pending);
        assert_eq!(calculate_progress(Vec::new()), 0);
    }

    #[test]
    fn test_progress_formula_example() {
        let statuses = tasks(&[
            (TaskStatus::Queued, 2),
            (TaskStatus::InProgress, 3),
            (TaskStatus::Completed, 5),
        ]);
        assert_eq!(calculate_progress(statuses), 63);
    }

    #[test]
    fn test_progress_bounds() {
        assert_eq!(calculate_progress(tasks(&[(TaskStatus::Completed, 7)])), 100);
        assert_eq!(calculate_progress(tasks(&[(TaskStatus::Pending, 7)])), 0);
        assert_eq!(calculate_progress(tasks(&[(TaskStatus::Failed, 1), (TaskStatus::Pending, 1)])), 50);
        assert_eq!(calculate_progress(tasks(&[(TaskStatus::InProgress, 20)])), 35);
    }

    #[test]
    fn test_progress_monotonic() {
        // 任意组合下 QUEUED->IN_PROGRESS、IN_PROGRESS->COMPLETED 都不会让进度下降
        let n = 8;
        for queued in 0..=n {
            for in_progress in 0..=(n - queued) {
                for completed in 0..=(n - queued - in_progress) {
                    let pending = n - queued - in_progress - completed;
                    let base = calculate_progress(tasks(&[
                        (TaskStatus::Pending, pending),
                        (TaskStatus::Queued, queued),
                        (TaskStatus::InProgress, in_progress),
                        (TaskStatus::Completed, completed),
                    ]));

                    if queued > 0 {
                        let promoted = calculate_progress(tasks(&[
                            (TaskStatus::Pending, pending),
                            (TaskStatus::Queued, queued - 1),
                            (TaskStatus::InProgress, in_progress + 1),
                            (TaskStatus::Completed, completed),
                        ]));
                        assert!(promoted >= base);
                    }
                    if in_progress > 0 {
                        let finished = calculate_progress(tasks(&[
                            (TaskStatus::Pending, pending),
                            (TaskStatus::Queued, queued),
                            (TaskStatus::InProgress, in_progress - 1),
                            (TaskStatus::Completed, completed + 1),
                        ]));
                        assert!(finished >= base);
                    }
                }
            }
        }
    }
}
