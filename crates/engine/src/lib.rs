/// Cluster Console - 编排引擎
///
/// 安装向导的步骤状态机，以及后台操作的轮询合并与进度汇总。
/// 与具体的传输方式、UI 无关，协作方通过 trait 注入。

pub mod operations;
pub mod persist;
pub mod snapshot;
pub mod source;
pub mod status;
pub mod wizard;

pub use operations::{
    ApplyOutcome, AggregatorEvent, OperationAggregator, OperationService, Poller,
    RecomputePolicy,
};
pub use persist::{MemoryStore, PersistenceStore};
pub use snapshot::{HostSnapshot, OperationSnapshot, Snapshot, TaskSnapshot};
pub use source::{CommandIssuer, PollRequest, PollSource};
pub use wizard::{StepAction, StepDefinition, WizardConfig, WizardStepController};
