/// Cluster Console - 公共库
///
/// 提供引擎、Server 与执行器链路共享的类型、错误处理、工具函数等

pub mod errors;
pub mod models;
pub mod utils;
pub mod ws_rpc;

// 重新导出常用类型
pub use errors::{ActionFailure, Error, LoadFailure, Result};
pub use models::{OperationStatus, StatusCategory, TaskStatus};
pub use ws_rpc::{RpcMessage, RpcError, RpcErrorCode, MessageType};
