/// 应用全局状态

use engine::{OperationAggregator, OperationService, Poller, WizardStepController};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::executor::ExecutorClient;
use crate::ws::FrontendConnectionManager;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    /// 操作保留树
    pub aggregator: Arc<RwLock<OperationAggregator>>,
    /// 中止/重试命令
    pub operation_service: OperationService,
    /// 安装向导
    pub wizard: Arc<WizardStepController>,
    /// 前端 WebSocket 连接管理器
    pub frontend_manager: FrontendConnectionManager,
    /// 执行器链路
    pub executor: ExecutorClient,
    pub poller: Poller,
}

impl AppState {
    pub fn new(
        operation_service: OperationService,
        wizard: Arc<WizardStepController>,
        executor: ExecutorClient,
        poller: Poller,
    ) -> Self {
        Self {
            aggregator: operation_service.aggregator().clone(),
            operation_service,
            wizard,
            frontend_manager: FrontendConnectionManager::new(),
            executor,
            poller,
        }
    }

    pub fn operation_service(&self) -> &OperationService {
        &self.operation_service
    }

    /// 获取安装向导
    pub fn wizard(&self) -> Arc<WizardStepController> {
        self.wizard.clone()
    }

    /// 获取前端连接管理器
    pub fn frontend_manager(&self) -> FrontendConnectionManager {
        self.frontend_manager.clone()
    }

    pub fn executor(&self) -> &ExecutorClient {
        &self.executor
    }

    /// 触发一次立即轮询
    pub fn poll_now(&self) {
        self.poller.poll_now();
    }
}
