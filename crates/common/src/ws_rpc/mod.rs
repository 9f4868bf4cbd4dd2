/// WebSocket RPC 模块
///
/// 控制台与执行器之间基于 WebSocket 的双向 RPC 通信

pub mod message;
pub mod error;
pub mod types;
pub mod client;
pub mod server;

pub use message::{methods, RpcMessage, MessageType};
pub use error::{RpcError, RpcErrorCode};
pub use types::*;
pub use client::WsRpcConnection;
pub use server::RpcRouter;
