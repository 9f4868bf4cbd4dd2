pub mod operations;
pub mod wizard;

use axum::{http::StatusCode, Json, Router};
use common::Error;
use serde::Serialize;

use crate::app_state::AppState;

/// 所有 API 路由（统一入口）
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/operations", operations::operation_routes())
        .nest("/tasks", operations::task_routes())
        .nest("/view", operations::view_routes())
        .nest("/wizard", wizard::wizard_routes())
}

/// 通用响应
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// 错误类型对应的 HTTP 状态码
pub fn status_of(error: &Error) -> StatusCode {
    match error {
        Error::UnknownStep(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::StepDisabled(_) | Error::NotAbortable(_) | Error::NotRetryable(_) => StatusCode::CONFLICT,
        Error::InvalidArgument(_) | Error::StepLoad(_) => StatusCode::BAD_REQUEST,
        Error::Command(_) | Error::Poll(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 把业务错误转换为接口错误，context 作为消息前缀
pub fn api_error(context: &str, error: Error) -> ApiError {
    (
        status_of(&error),
        Json(ErrorResponse {
            success: false,
            error: format!("{}: {}", context, error),
        }),
    )
}

/// 请求参数校验失败
pub fn validation_error(error: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            error: format!("验证失败: {}", error),
        }),
    )
}
