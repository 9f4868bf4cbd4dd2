/// 步骤动作
///
/// 同步动作按注册顺序直接修改内容；异步动作并发执行并返回内容补丁。
/// 全部成功后才提交结果，任一失败则内容保持不变。

use common::{ActionFailure, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// 向导共享的内容模型
pub type WizardContent = serde_json::Map<String, serde_json::Value>;

/// 异步动作返回的补丁，按键覆盖到内容上
pub type ContentPatch = serde_json::Map<String, serde_json::Value>;

pub type SyncActionFn = Arc<dyn Fn(&mut WizardContent) -> Result<()> + Send + Sync>;
pub type AsyncActionFn = Arc<dyn Fn(WizardContent) -> BoxFuture<'static, Result<ContentPatch>> + Send + Sync>;

#[derive(Clone)]
pub enum StepAction {
    Sync { name: String, run: SyncActionFn },
    Async { name: String, run: AsyncActionFn },
}

impl StepAction {
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut WizardContent) -> Result<()> + Send + Sync + 'static,
    {
        StepAction::Sync {
            name: name.into(),
            run: Arc::new(f),
        }
    }

    pub fn asynchronous<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(WizardContent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ContentPatch>> + Send + 'static,
    {
        StepAction::Async {
            name: name.into(),
            run: Arc::new(move |content: WizardContent| f(content).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StepAction::Sync { name, .. } | StepAction::Async { name, .. } => name,
        }
    }
}

impl std::fmt::Debug for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            StepAction::Sync { .. } => "Sync",
            StepAction::Async { .. } => "Async",
        };
        write!(f, "StepAction::{}({})", kind, self.name())
    }
}

pub fn apply_patch(content: &mut WizardContent, patch: ContentPatch) {
    for (key, value) in patch {
        content.insert(key, value);
    }
}

/// 在内容副本上执行一组动作
///
/// 返回提交后的新内容，或全部失败动作的列表
pub async fn run_actions(
    actions: &[StepAction],
    content: &WizardContent,
) -> std::result::Result<WizardContent, Vec<ActionFailure>> {
    let mut scratch = content.clone();
    let mut failures = Vec::new();
    let mut pending = Vec::new();

    for action in actions {
        match action {
            StepAction::Sync { name, run } => {
                if let Err(e) = run(&mut scratch) {
                    failures.push(ActionFailure {
                        action: name.clone(),
                        message: e.to_string(),
                    });
                }
            }
            StepAction::Async { name, run } => pending.push((name.clone(), run.clone())),
        }
    }

    // 异步动作看到的是同步动作执行后的内容
    let futures = pending.iter().map(|(_, run)| run(scratch.clone()));
    let results = join_all(futures).await;

    let mut patches = Vec::with_capacity(results.len());
    for ((name, _), result) in pending.iter().zip(results) {
        match result {
            Ok(patch) => patches.push(patch),
            Err(e) => failures.push(ActionFailure {
                action: name.clone(),
                message: e.to_string(),
            }),
        }
    }

    if !failures.is_empty() {
        return Err(failures);
    }

    for patch in patches {
        apply_patch(&mut scratch, patch);
    }
    Ok(scratch)
}
