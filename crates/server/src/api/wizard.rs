/// 安装向导接口

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use engine::wizard::{ContentPatch, StepView, WizardContent};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{api_error, validation_error, ApiError, ApiResponse};
use crate::app_state::AppState;

/// 向导路由
pub fn wizard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_wizard))
        .route("/content", get(get_content))
        .route("/load-prior", post(load_all_prior_steps))
        .route("/watermark", put(set_watermark))
        .route("/finish", post(finish))
        .route("/errors", get(list_errors).post(add_error).delete(clear_errors))
        .route("/steps/:name/goto", post(goto_step))
        .route("/steps/:name/load", post(load_step))
        .route("/steps/:name/save", post(save_step))
        .route("/steps/:name/saved", get(get_saved_state))
        .route("/steps/:name/unsaved", post(set_unsaved))
}

/// 向导概览
#[derive(Debug, Serialize)]
pub struct WizardResponse {
    pub current_step: String,
    pub steps: Vec<StepView>,
    pub has_errors: bool,
}

pub async fn get_wizard(State(state): State<AppState>) -> Json<WizardResponse> {
    let wizard = state.wizard();
    Json(WizardResponse {
        current_step: wizard.current_step().await,
        steps: wizard.steps().await,
        has_errors: wizard.has_errors().await,
    })
}

pub async fn get_content(State(state): State<AppState>) -> Json<WizardContent> {
    Json(state.wizard().content().await)
}

/// 切换步骤
pub async fn goto_step(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    state
        .wizard()
        .goto_step(&name)
        .await
        .map_err(|e| api_error("切换步骤失败", e))?;
    Ok(ApiResponse::ok(format!("当前步骤: {}", name)))
}

/// 执行步骤的加载动作
pub async fn load_step(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    state
        .wizard()
        .load_step(&name)
        .await
        .map_err(|e| api_error("加载步骤失败", e))?;
    Ok(ApiResponse::ok(format!("步骤已加载: {}", name)))
}

/// 步骤提交的内容
#[derive(Debug, Deserialize)]
pub struct SaveStepDto {
    #[serde(default)]
    pub content: ContentPatch,
}

pub async fn save_step(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(dto): Json<SaveStepDto>,
) -> Result<Json<ApiResponse>, ApiError> {
    state
        .wizard()
        .save_step(&name, dto.content)
        .await
        .map_err(|e| api_error("保存步骤失败", e))?;
    Ok(ApiResponse::ok(format!("步骤已保存: {}", name)))
}

#[derive(Debug, Serialize)]
pub struct SavedStateResponse {
    pub step: String,
    pub saved: bool,
}

pub async fn get_saved_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<SavedStateResponse> {
    let saved = state.wizard().get_step_saved_state(&name).await;
    Json(SavedStateResponse { step: name, saved })
}

/// 上游内容变化后，把步骤标记为需要重新保存
pub async fn set_unsaved(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    state
        .wizard()
        .set_step_unsaved(&name)
        .await
        .map_err(|e| api_error("更新保存状态失败", e))?;
    Ok(ApiResponse::ok(format!("步骤已标记为未保存: {}", name)))
}

pub async fn load_all_prior_steps(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    state
        .wizard()
        .load_all_prior_steps()
        .await
        .map_err(|e| api_error("加载之前的步骤失败", e))?;
    Ok(ApiResponse::ok("之前的步骤已加载"))
}

#[derive(Debug, Deserialize)]
pub struct WatermarkDto {
    pub index: usize,
}

/// 禁用下标之前的所有步骤
pub async fn set_watermark(
    State(state): State<AppState>,
    Json(dto): Json<WatermarkDto>,
) -> Result<Json<ApiResponse>, ApiError> {
    state
        .wizard()
        .set_lower_steps_disable(dto.index)
        .await
        .map_err(|e| api_error("设置禁用水位线失败", e))?;
    Ok(ApiResponse::ok(format!("第 {} 步之前的步骤已禁用", dto.index)))
}

/// 结束向导并清除会话
pub async fn finish(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    state
        .wizard()
        .finish()
        .await
        .map_err(|e| api_error("结束向导失败", e))?;
    info!("🏁 安装向导已结束");
    Ok(ApiResponse::ok("向导已结束"))
}

pub async fn list_errors(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.wizard().errors().await)
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddErrorDto {
    #[validate(length(min = 1, max = 1024))]
    pub message: String,
}

pub async fn add_error(
    State(state): State<AppState>,
    Json(dto): Json<AddErrorDto>,
) -> Result<Json<ApiResponse>, ApiError> {
    dto.validate().map_err(validation_error)?;
    state.wizard().add_error(dto.message).await;
    Ok(ApiResponse::ok("错误已记录"))
}

pub async fn clear_errors(State(state): State<AppState>) -> Json<ApiResponse> {
    state.wizard().clear_errors().await;
    ApiResponse::ok("错误已清除")
}
