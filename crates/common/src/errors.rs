use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("未知步骤: {0}")]
    UnknownStep(String),

    #[error("步骤已禁用: {0}")]
    StepDisabled(String),

    #[error("步骤加载失败: {0}")]
    StepLoad(LoadFailure),

    #[error("轮询失败: {0}")]
    Poll(String),

    #[error("命令执行失败: {0}")]
    Command(String),

    #[error("操作不可中止: {0}")]
    NotAbortable(i64),

    #[error("操作不可重试: {0}")]
    NotRetryable(i64),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// 是否属于配置类错误（调用方应直接失败，不重试）
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::UnknownStep(_) | Error::StepDisabled(_) | Error::Config(_))
    }
}

/// 单个步骤动作的失败信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    /// 动作名称
    pub action: String,
    /// 失败原因
    pub message: String,
}

/// 步骤加载/保存失败的汇总
///
/// 列出所有失败的动作，便于调用方决定单独重试某个动作还是整个步骤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub step: String,
    pub failures: Vec<ActionFailure>,
}

impl LoadFailure {
    /// 失败的动作名称列表
    pub fn failed_actions(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.action.as_str()).collect()
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step={}", self.step)?;
        for failure in &self.failures {
            write!(f, ", [{}] {}", failure.action, failure.message)?;
        }
        Ok(())
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
