/// 安装向导
///
/// 有序步骤、门控、保存台账，以及驱动共享内容模型的加载/保存动作

mod actions;
mod controller;
mod sequencer;

pub use actions::{apply_patch, run_actions, ContentPatch, StepAction, WizardContent};
pub use controller::{GatingPredicate, StepDefinition, StepView, WizardConfig, WizardStepController};
pub use sequencer::StepSequencer;
