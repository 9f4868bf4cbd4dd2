/// 业务服务层

pub mod installer;
pub mod operation_events;

pub use installer::build_installer;
pub use operation_events::OperationEventRelay;
