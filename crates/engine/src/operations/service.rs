/// 操作命令服务
///
/// 在聚合器与命令下发方之间协调中止/重试，等待命令期间不持有锁

use common::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::OperationAggregator;
use crate::source::CommandIssuer;

#[derive(Clone)]
pub struct OperationService {
    aggregator: Arc<RwLock<OperationAggregator>>,
    issuer: Arc<dyn CommandIssuer>,
}

impl OperationService {
    pub fn new(aggregator: Arc<RwLock<OperationAggregator>>, issuer: Arc<dyn CommandIssuer>) -> Self {
        Self { aggregator, issuer }
    }

    pub fn aggregator(&self) -> &Arc<RwLock<OperationAggregator>> {
        &self.aggregator
    }

    /// 中止操作
    pub async fn abort(&self, operation_id: i64) -> Result<()> {
        self.aggregator.write().await.begin_abort(operation_id)?;
        info!("🛑 请求中止操作: operation_id={}", operation_id);

        let outcome = self.issuer.abort(operation_id).await;

        self.aggregator
            .write()
            .await
            .complete_abort(operation_id, outcome)
    }

    /// 重试操作，保留树等下一次轮询再更新
    pub async fn retry(&self, operation_id: i64) -> Result<()> {
        self.aggregator.read().await.check_retryable(operation_id)?;
        info!("🔁 请求重试操作: operation_id={}", operation_id);
        self.issuer.retry(operation_id).await
    }
}
