/// 后台操作接口

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use common::StatusCategory;
use engine::operations::{
    CategoryCounts, Focus, HostView, LevelFilters, OperationView, Page, PageView, TaskDetailView,
    TaskView,
};
use common::ws_rpc::ViewLevel;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{api_error, validation_error, ApiError, ApiResponse};
use crate::app_state::AppState;

/// 操作路由
pub fn operation_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_operations))
        .route("/counts", get(get_operation_counts))
        .route("/refresh", post(refresh))
        .route("/show-more", post(show_more))
        .route("/:id", get(get_operation))
        .route("/:id/abort", post(abort_operation))
        .route("/:id/retry", post(retry_operation))
        .route("/:id/hosts", get(list_hosts))
        .route("/:id/hosts/counts", get(get_host_counts))
        .route("/:id/hosts/:host/tasks", get(list_tasks))
        .route("/:id/hosts/:host/tasks/counts", get(get_task_counts))
}

/// 任务路由
pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_task))
        .route("/:id/annotations", put(annotate_task))
}

/// 视图状态路由（聚焦与过滤）
pub fn view_routes() -> Router<AppState> {
    Router::new()
        .route("/focus", get(get_focus).post(set_focus).delete(clear_focus))
        .route("/filters", get(get_filters).put(set_filters))
}

/// 操作列表查询参数
#[derive(Debug, Deserialize, Validate)]
pub struct ListOperationsQuery {
    #[serde(default)]
    pub filter: StatusCategory,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 200))]
    pub limit: usize,
}

fn default_page_size() -> usize {
    20
}

/// 单层过滤参数
#[derive(Debug, Deserialize, Default)]
pub struct FilterQuery {
    #[serde(default)]
    pub filter: StatusCategory,
}

/// 获取操作列表
pub async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<ListOperationsQuery>,
) -> Result<Json<PageView<OperationView>>, ApiError> {
    query.validate().map_err(validation_error)?;

    let aggregator = state.aggregator.read().await;
    Ok(Json(aggregator.get_operations_page(
        query.filter,
        Page::new(query.offset, query.limit),
    )))
}

pub async fn get_operation_counts(State(state): State<AppState>) -> Json<CategoryCounts> {
    Json(state.aggregator.read().await.operation_counts())
}

/// 获取单个操作
pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OperationView>, ApiError> {
    state
        .aggregator
        .read()
        .await
        .get_operation(id)
        .map(Json)
        .map_err(|e| api_error("获取操作失败", e))
}

/// 获取操作下的主机
pub async fn list_hosts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<HostView>>, ApiError> {
    state
        .aggregator
        .read()
        .await
        .get_hosts(id, query.filter)
        .map(Json)
        .map_err(|e| api_error("获取主机列表失败", e))
}

pub async fn get_host_counts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CategoryCounts>, ApiError> {
    state
        .aggregator
        .read()
        .await
        .host_counts(id)
        .map(Json)
        .map_err(|e| api_error("获取主机统计失败", e))
}

/// 获取主机上的任务
pub async fn list_tasks(
    State(state): State<AppState>,
    Path((id, host)): Path<(i64, String)>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<TaskView>>, ApiError> {
    state
        .aggregator
        .read()
        .await
        .get_operation_tasks(id, &host, query.filter)
        .map(Json)
        .map_err(|e| api_error("获取任务列表失败", e))
}

pub async fn get_task_counts(
    State(state): State<AppState>,
    Path((id, host)): Path<(i64, String)>,
) -> Result<Json<CategoryCounts>, ApiError> {
    state
        .aggregator
        .read()
        .await
        .task_counts(id, &host)
        .map(Json)
        .map_err(|e| api_error("获取任务统计失败", e))
}

/// 获取任务详情（含日志与标注）
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TaskDetailView>, ApiError> {
    state
        .aggregator
        .read()
        .await
        .get_task(id)
        .map(Json)
        .map_err(|e| api_error("获取任务失败", e))
}

/// 任务标注
#[derive(Debug, Deserialize, Validate)]
pub struct AnnotateTaskDto {
    #[validate(length(min = 1, max = 64))]
    pub key: String,
    pub value: serde_json::Value,
}

pub async fn annotate_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(dto): Json<AnnotateTaskDto>,
) -> Result<Json<ApiResponse>, ApiError> {
    dto.validate().map_err(validation_error)?;

    state
        .aggregator
        .write()
        .await
        .annotate_task(id, &dto.key, dto.value)
        .map_err(|e| api_error("标注任务失败", e))?;
    Ok(ApiResponse::ok("任务已标注"))
}

/// 中止操作
pub async fn abort_operation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse>, ApiError> {
    info!("收到中止请求: operation_id={}", id);
    state
        .operation_service()
        .abort(id)
        .await
        .map_err(|e| api_error("中止操作失败", e))?;
    state.poll_now();
    Ok(ApiResponse::ok("中止命令已发送"))
}

/// 重试操作
pub async fn retry_operation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse>, ApiError> {
    info!("收到重试请求: operation_id={}", id);
    state
        .operation_service()
        .retry(id)
        .await
        .map_err(|e| api_error("重试操作失败", e))?;
    state.poll_now();
    Ok(ApiResponse::ok("重试命令已发送"))
}

/// 立即刷新
pub async fn refresh(State(state): State<AppState>) -> Json<ApiResponse> {
    state.poll_now();
    ApiResponse::ok("已触发轮询")
}

/// 调整后的上限，以及按新上限计算的可继续加载状态
#[derive(Debug, Serialize)]
pub struct ShowMoreResponse {
    pub limit: usize,
    pub show_more_available: bool,
}

/// 增加拉取的操作数量
pub async fn show_more(State(state): State<AppState>) -> Json<ShowMoreResponse> {
    let response = {
        let mut aggregator = state.aggregator.write().await;
        let limit = aggregator.show_more();
        ShowMoreResponse {
            limit,
            show_more_available: aggregator.is_show_more_available(),
        }
    };
    state.poll_now();
    Json(response)
}

/// 聚焦状态
#[derive(Debug, Serialize)]
pub struct FocusResponse {
    pub focus: Focus,
    pub level: ViewLevel,
}

/// 逐层展开；给出的层级依次应用
#[derive(Debug, Deserialize)]
pub struct FocusDto {
    pub operation_id: Option<i64>,
    pub host_name: Option<String>,
    pub task_id: Option<i64>,
}

pub async fn get_focus(State(state): State<AppState>) -> Json<FocusResponse> {
    let aggregator = state.aggregator.read().await;
    Json(FocusResponse {
        focus: aggregator.focus().clone(),
        level: aggregator.level(),
    })
}

pub async fn set_focus(
    State(state): State<AppState>,
    Json(dto): Json<FocusDto>,
) -> Result<Json<FocusResponse>, ApiError> {
    let response = {
        let mut aggregator = state.aggregator.write().await;
        if let Some(id) = dto.operation_id {
            aggregator.focus_operation(id).map_err(|e| api_error("聚焦操作失败", e))?;
        }
        if let Some(host) = &dto.host_name {
            aggregator.focus_host(host).map_err(|e| api_error("聚焦主机失败", e))?;
        }
        if let Some(id) = dto.task_id {
            aggregator.focus_task(id).map_err(|e| api_error("聚焦任务失败", e))?;
        }
        FocusResponse {
            focus: aggregator.focus().clone(),
            level: aggregator.level(),
        }
    };
    // 新层级需要更详细的快照
    state.poll_now();
    Ok(Json(response))
}

pub async fn clear_focus(State(state): State<AppState>) -> Json<ApiResponse> {
    state.aggregator.write().await.clear_focus();
    ApiResponse::ok("已返回操作列表")
}

pub async fn get_filters(State(state): State<AppState>) -> Json<LevelFilters> {
    Json(state.aggregator.read().await.filters())
}

/// 更新过滤条件，未给出的层级保持不变
#[derive(Debug, Deserialize)]
pub struct FiltersDto {
    pub operations: Option<StatusCategory>,
    pub hosts: Option<StatusCategory>,
    pub tasks: Option<StatusCategory>,
}

pub async fn set_filters(
    State(state): State<AppState>,
    Json(dto): Json<FiltersDto>,
) -> Json<LevelFilters> {
    let mut aggregator = state.aggregator.write().await;
    if let Some(category) = dto.operations {
        aggregator.set_operation_filter(category);
    }
    if let Some(category) = dto.hosts {
        aggregator.set_host_filter(category);
    }
    if let Some(category) = dto.tasks {
        aggregator.set_task_filter(category);
    }
    Json(aggregator.filters())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::testing::offline_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use common::{OperationStatus, TaskStatus};
    use engine::{HostSnapshot, OperationSnapshot, Snapshot, TaskSnapshot};
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        crate::api::api_routes().with_state(state)
    }

    async fn seed(state: &AppState) {
        let mut host = HostSnapshot {
            name: "c6401".to_string(),
            modified: true,
            tasks: vec![],
        };
        host.tasks.push(TaskSnapshot::new(11, "c6401", "INSTALL", TaskStatus::InProgress));
        host.tasks.push(TaskSnapshot::new(12, "c6401", "START", TaskStatus::Queued));

        state.aggregator.write().await.apply_snapshot(Snapshot::new(
            1,
            vec![
                OperationSnapshot {
                    id: 1,
                    name: "Install Services".to_string(),
                    status: OperationStatus::InProgress,
                    progress: None,
                    start_time: None,
                    end_time: None,
                    hosts: Some(vec![host]),
                },
                OperationSnapshot {
                    id: 2,
                    name: "Restart HDFS".to_string(),
                    status: OperationStatus::Failed,
                    progress: None,
                    start_time: None,
                    end_time: None,
                    hosts: None,
                },
            ],
        ));
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_operations_with_filter() {
        let state = offline_state();
        seed(&state).await;

        let response = app(state)
            .oneshot(
                Request::get("/operations?filter=failed")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["items"][0]["id"], 2);
    }

    #[tokio::test]
    async fn test_show_more_reports_state_for_new_limit() {
        let state = offline_state();
        let full_page = (1..=10)
            .map(|id| OperationSnapshot {
                id,
                name: format!("op-{}", id),
                status: OperationStatus::Success,
                progress: None,
                start_time: None,
                end_time: None,
                hosts: None,
            })
            .collect();
        state.aggregator.write().await.apply_snapshot(Snapshot::new(1, full_page));
        assert!(state.aggregator.read().await.is_show_more_available());

        let response = app(state.clone())
            .oneshot(Request::post("/operations/show-more").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["limit"], 20);
        assert_eq!(json["show_more_available"], false);
        assert_eq!(
            json["show_more_available"],
            state.aggregator.read().await.is_show_more_available()
        );
    }

    #[tokio::test]
    async fn test_limit_is_validated() {
        let response = app(offline_state())
            .oneshot(Request::get("/operations?limit=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_found() {
        let response = app(offline_state())
            .oneshot(Request::get("/operations/99").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_abort_rolls_back_when_executor_is_down() {
        let state = offline_state();
        seed(&state).await;

        let response = app(state.clone())
            .oneshot(
                Request::post("/operations/1/abort")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let view = state.aggregator.read().await.get_operation(1).unwrap();
        assert!(view.is_abortable);
    }

    #[tokio::test]
    async fn test_retry_requires_finished_operation() {
        let state = offline_state();
        seed(&state).await;

        let response = app(state)
            .oneshot(
                Request::post("/operations/1/retry")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_focus_walks_down_levels() {
        let state = offline_state();
        seed(&state).await;

        let response = app(state.clone())
            .oneshot(
                Request::post("/view/focus")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"operation_id":1,"host_name":"c6401"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["level"], "TASKS_LIST");

        let response = app(state)
            .oneshot(
                Request::get("/operations/1/hosts/c6401/tasks?filter=pending")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["id"], 12);
    }

    #[tokio::test]
    async fn test_annotation_survives_in_task_detail() {
        let state = offline_state();
        seed(&state).await;

        let response = app(state.clone())
            .oneshot(
                Request::put("/tasks/11/annotations")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"key":"expanded","value":true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(state)
            .oneshot(Request::get("/tasks/11").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["operation_id"], 1);
        assert_eq!(json["annotations"]["expanded"], true);
    }
}
