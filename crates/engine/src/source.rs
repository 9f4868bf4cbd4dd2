/// 外部协作方接口
///
/// 轮询源与命令下发方，由宿主程序注入

use async_trait::async_trait;
use common::Result;

use crate::snapshot::OperationSnapshot;

/// 轮询请求，与执行器链路上的 list_operations 请求一致
pub use common::ws_rpc::ListOperationsRequest as PollRequest;

/// 轮询源
///
/// 可重复调用；错误原样上报，聚合器不会自行重试
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    /// 拉取最近的操作快照
    async fn fetch(&self, request: &PollRequest) -> Result<Vec<OperationSnapshot>>;
}

/// 中止/重试命令下发方
#[async_trait]
pub trait CommandIssuer: Send + Sync + 'static {
    /// 请求中止操作
    async fn abort(&self, operation_id: i64) -> Result<()>;

    /// 请求重试操作
    async fn retry(&self, operation_id: i64) -> Result<()>;
}
