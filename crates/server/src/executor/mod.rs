/// 执行器链路
///
/// 控制台通过 WebSocket RPC 向执行器拉取操作快照并下发中止/重试命令

pub mod client;
pub mod source;

pub use client::{ExecutorClient, LinkState};
pub use source::{RpcCommandIssuer, RpcPollSource};
