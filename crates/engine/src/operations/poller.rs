/// 后台轮询器
///
/// 定时或被触发时拉取快照，每次拉取分配递增序号。后台任务同一时刻
/// 只有一次拉取在进行，停止后不再合并任何结果。

use common::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ApplyOutcome, OperationAggregator};
use crate::snapshot::Snapshot;
use crate::source::PollSource;

#[derive(Clone)]
pub struct Poller {
    aggregator: Arc<RwLock<OperationAggregator>>,
    source: Arc<dyn PollSource>,
    interval: Duration,
    sequence: Arc<AtomicU64>,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        aggregator: Arc<RwLock<OperationAggregator>>,
        source: Arc<dyn PollSource>,
        interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            source,
            interval,
            sequence: Arc::new(AtomicU64::new(0)),
            trigger: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// 立即触发一次轮询（例如执行器推送了 operations_changed）
    pub fn poll_now(&self) {
        self.trigger.notify_one();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 停止后台轮询
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 拉取并合并一次
    ///
    /// 请求参数在拉取前按当前聚焦状态生成；拉取期间不持有锁
    pub async fn poll_once(&self) -> Result<ApplyOutcome> {
        let sequence = self.next_sequence();
        let request = self.aggregator.read().await.poll_request();
        debug!("开始轮询: sequence={}, level={:?}", sequence, request.level);

        match self.source.fetch(&request).await {
            Ok(operations) => {
                let mut aggregator = self.aggregator.write().await;
                if self.cancel.is_cancelled() {
                    debug!("轮询器已停止，丢弃快照: sequence={}", sequence);
                    return Err(Error::Poll("轮询器已停止".to_string()));
                }
                Ok(aggregator.apply_snapshot(Snapshot::new(sequence, operations)))
            }
            Err(e) => {
                self.aggregator.read().await.record_poll_failure(sequence, &e);
                Err(e)
            }
        }
    }

    /// 启动后台轮询任务
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🔄 操作轮询已启动，间隔 {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = self.trigger.notified() => {}
                }

                // 拉取期间到来的触发由 Notify 保留一次许可，结束后立即补一轮
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    // 失败已经通过聚合器事件上报，这里只需继续下一轮
                    _ = self.poll_once() => {}
                }
            }
            info!("操作轮询已停止");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::OperationSnapshot;
    use crate::source::PollRequest;
    use crate::AggregatorEvent;
    use async_trait::async_trait;
    use common::OperationStatus;
    use std::sync::atomic::AtomicUsize;

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PollSource for CountingSource {
        async fn fetch(&self, request: &PollRequest) -> Result<Vec<OperationSnapshot>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
            if self.fail {
                return Err(Error::Poll("executor unreachable".to_string()));
            }
            Ok((0..request.limit.min(3) as i64)
                .map(|i| OperationSnapshot {
                    id: i + 1,
                    name: format!("op-{}", i + 1),
                    status: if call == 0 { OperationStatus::InProgress } else { OperationStatus::Success },
                    progress: None,
                    start_time: None,
                    end_time: None,
                    hosts: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_poll_once_assigns_increasing_sequence() {
        let aggregator = Arc::new(RwLock::new(OperationAggregator::default()));
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let poller = Poller::new(aggregator.clone(), source, Duration::from_secs(60));

        let first = poller.poll_once().await.unwrap();
        let second = poller.poll_once().await.unwrap();
        assert_eq!(first, ApplyOutcome::Applied { sequence: 1, operations: 3 });
        assert_eq!(second, ApplyOutcome::Applied { sequence: 2, operations: 3 });
        assert_eq!(
            aggregator.read().await.get_operation(1).unwrap().status,
            OperationStatus::Success
        );
    }

    #[tokio::test]
    async fn test_poll_failure_leaves_tree_untouched() {
        let aggregator = Arc::new(RwLock::new(OperationAggregator::default()));
        let mut events = aggregator.read().await.subscribe();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let poller = Poller::new(aggregator.clone(), source, Duration::from_secs(60));

        assert!(matches!(poller.poll_once().await, Err(Error::Poll(_))));
        assert!(aggregator.read().await.get_operations(Default::default()).is_empty());
        assert_eq!(aggregator.read().await.last_sequence(), None);
        assert!(matches!(
            events.try_recv().unwrap(),
            AggregatorEvent::PollFailed { sequence: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_spawned_poller_stops_on_cancel() {
        let aggregator = Arc::new(RwLock::new(OperationAggregator::default()));
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let poller = Poller::new(aggregator.clone(), source.clone(), Duration::from_millis(10));
        let cancel = poller.cancel_token();
        let handle = poller.spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(source.calls.load(Ordering::SeqCst) >= 1);
    }

    /// 慢速数据源，记录同时进行中的拉取数量
    struct SlowSource {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PollSource for SlowSource {
        async fn fetch(&self, _request: &PollRequest) -> Result<Vec<OperationSnapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![OperationSnapshot {
                id: 1,
                name: "op-1".to_string(),
                status: OperationStatus::InProgress,
                progress: None,
                start_time: None,
                end_time: None,
                hosts: None,
            }])
        }
    }

    #[tokio::test]
    async fn test_slow_fetch_does_not_stack_and_is_dropped_on_shutdown() {
        let aggregator = Arc::new(RwLock::new(OperationAggregator::default()));
        let source = Arc::new(SlowSource::new(Duration::from_millis(300)));
        let poller = Poller::new(aggregator.clone(), source.clone(), Duration::from_millis(10));
        let handle = poller.clone().spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        for _ in 0..5 {
            poller.poll_now();
        }
        poller.shutdown();
        handle.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(aggregator.read().await.last_sequence(), None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_finishing_after_shutdown_is_not_applied() {
        let aggregator = Arc::new(RwLock::new(OperationAggregator::default()));
        let source = Arc::new(SlowSource::new(Duration::from_millis(50)));
        let poller = Poller::new(aggregator.clone(), source, Duration::from_secs(60));

        let pending = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.shutdown();

        assert!(matches!(pending.await.unwrap(), Err(Error::Poll(_))));
        assert_eq!(aggregator.read().await.last_sequence(), None);
        assert!(aggregator.read().await.get_operations(Default::default()).is_empty());
    }
}
