/// 聚合器事件转发
///
/// 订阅聚合器的广播事件，转换为前端消息推送给所有页面

use engine::{AggregatorEvent, OperationAggregator};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ws::{FrontendConnectionManager, FrontendMessage};

pub struct OperationEventRelay {
    aggregator: Arc<RwLock<OperationAggregator>>,
    frontend: FrontendConnectionManager,
}

impl OperationEventRelay {
    pub fn new(aggregator: Arc<RwLock<OperationAggregator>>, frontend: FrontendConnectionManager) -> Self {
        Self { aggregator, frontend }
    }

    /// 把一个事件转换为前端消息，不需要推送的事件返回 None
    pub async fn translate(&self, event: AggregatorEvent) -> Option<FrontendMessage> {
        match event {
            AggregatorEvent::SnapshotApplied { sequence, .. } => {
                let aggregator = self.aggregator.read().await;
                Some(FrontendMessage::OperationsUpdated {
                    sequence,
                    counts: aggregator.operation_counts(),
                    show_more_available: aggregator.is_show_more_available(),
                })
            }
            AggregatorEvent::PollFailed { sequence, message } => {
                Some(FrontendMessage::PollFailed { sequence, message })
            }
            AggregatorEvent::AbortFailed { operation_id, message } => {
                Some(FrontendMessage::AbortFailed { operation_id, message })
            }
            other => {
                debug!("不转发的聚合器事件: {:?}", other);
                None
            }
        }
    }

    /// 启动转发任务
    pub async fn spawn(self) -> JoinHandle<()> {
        let mut events = self.aggregator.read().await.subscribe();

        tokio::spawn(async move {
            info!("📡 操作事件转发已启动");
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(msg) = self.translate(event).await {
                            self.frontend.broadcast(msg).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("操作事件积压，跳过 {} 条", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("操作事件转发已停止");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OperationStatus;
    use engine::{OperationSnapshot, RecomputePolicy, Snapshot};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_snapshot_applied_becomes_operations_updated() {
        let aggregator = Arc::new(RwLock::new(OperationAggregator::with_limit(RecomputePolicy::Always, 1)));
        let frontend = FrontendConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        frontend.register("page".to_string(), tx).await;

        let handle = OperationEventRelay::new(aggregator.clone(), frontend).spawn().await;

        aggregator.write().await.apply_snapshot(Snapshot::new(
            1,
            vec![OperationSnapshot {
                id: 1,
                name: "Install".to_string(),
                status: OperationStatus::Failed,
                progress: None,
                start_time: None,
                end_time: None,
                hosts: None,
            }],
        ));

        match rx.recv().await {
            Some(FrontendMessage::OperationsUpdated {
                sequence,
                counts,
                show_more_available,
            }) => {
                assert_eq!(sequence, 1);
                assert_eq!(counts.failed, 1);
                assert!(show_more_available);
            }
            other => panic!("unexpected: {:?}", other),
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_focus_change_is_not_forwarded() {
        let relay = OperationEventRelay::new(
            Arc::new(RwLock::new(OperationAggregator::default())),
            FrontendConnectionManager::new(),
        );
        let msg = relay
            .translate(AggregatorEvent::FocusChanged {
                level: Default::default(),
            })
            .await;
        assert!(msg.is_none());
    }
}
