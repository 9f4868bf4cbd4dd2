/// Cluster Console - Server
///
/// 控制台后端：安装向导状态机、后台操作轮询与 REST/WebSocket 接口

mod api;
mod app_state;
mod config;
mod executor;
mod services;
mod store;
mod ws;

use axum::{extract::State, routing::get, Json, Router};
use common::ws_rpc::methods;
use engine::{OperationAggregator, OperationService, Poller};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::{
    app_state::AppState,
    executor::{ExecutorClient, LinkState, RpcCommandIssuer, RpcPollSource},
    services::{build_installer, OperationEventRelay},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 加载配置
    let cfg = config::Config::from_env()?;

    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level)),
        )
        .init();

    info!("🚀 启动 Cluster Console Server...");
    info!("✅ 配置加载成功");

    // 向导状态存储
    let store = store::open_store(cfg.redis_url.as_deref()).await?;

    // 安装向导，恢复上次的步骤与保存台账
    let wizard = Arc::new(build_installer(&cfg.wizard_namespace, store)?);
    wizard.restore().await?;
    info!("✅ 安装向导已就绪，当前步骤: {}", wizard.current_step().await);

    // 执行器链路
    let executor = ExecutorClient::new(cfg.executor_ws_url.clone(), cfg.rpc_timeout());

    // 操作聚合器与轮询
    let aggregator = Arc::new(RwLock::new(OperationAggregator::with_limit(
        cfg.recompute_policy,
        cfg.operations_limit,
    )));
    let poller = Poller::new(
        aggregator.clone(),
        Arc::new(RpcPollSource::new(executor.clone())),
        cfg.poll_interval(),
    );
    let operation_service = OperationService::new(
        aggregator.clone(),
        Arc::new(RpcCommandIssuer::new(executor.clone())),
    );

    // 执行器推送变化时立即轮询
    {
        let poller = poller.clone();
        executor
            .router()
            .register(methods::OPERATIONS_CHANGED, move |_payload| {
                poller.poll_now();
                Ok(serde_json::Value::Null)
            })
            .await;
    }

    // 创建应用状态
    let app_state = AppState::new(operation_service, wizard, executor.clone(), poller.clone());

    // 后台任务
    let cancel = poller.cancel_token();
    let executor_task = {
        let executor = executor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { executor.run(cancel).await })
    };
    let poller_task = poller.clone().spawn();
    let relay_task = OperationEventRelay::new(aggregator, app_state.frontend_manager())
        .spawn()
        .await;
    info!("✅ 后台任务已启动，轮询间隔 {} 秒", cfg.poll_interval_secs);

    // 设置CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建应用路由
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws/frontend", get(ws::handle_frontend_websocket))
        .nest("/api", api::api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // 启动服务器
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server_port));
    info!("🎯 服务器监听在 http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    relay_task.abort();
    for task in [executor_task, poller_task] {
        if let Err(e) = task.await {
            error!("后台任务异常退出: {}", e);
        }
    }
    info!("👋 Server 已停止");

    Ok(())
}

/// 等待 Ctrl+C，然后通知后台任务退出
async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("监听退出信号失败: {}", e);
    }
    info!("收到退出信号，正在关闭...");
    cancel.cancel();
}

async fn root_handler() -> &'static str {
    "Cluster Console Server API v1"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    console_id: String,
    executor: LinkState,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        console_id: state.executor().console_id().to_string(),
        executor: state.executor().state().await,
    })
}
