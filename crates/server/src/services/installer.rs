/// 集群安装向导
///
/// 十个步骤，每步的加载/保存动作在存储与向导内容之间搬运对应的键

use common::utils::namespaced_key;
use common::Result;
use engine::wizard::{ContentPatch, WizardContent};
use engine::{PersistenceStore, StepAction, StepDefinition, WizardConfig, WizardStepController};
use std::sync::Arc;

/// 集群创建后的第一个步骤，回退到它之前会清除集群标记
pub const POINT_OF_NO_RETURN: &str = "step9";

/// 集群创建状态标记，与第一步保存的集群名称分开存放
pub const CLUSTER_STATUS_KEY: &str = "clusterStatus";

/// finish() 时清除的会话键
const SESSION_KEYS: &[&str] = &[
    "cluster",
    CLUSTER_STATUS_KEY,
    "service",
    "hosts",
    "allHostNames",
    "masterComponentHosts",
    "slaveComponentHosts",
    "slaveProperties",
    "sshKey",
    "installOptions",
    "clients",
    "serviceConfigProperties",
];

/// 从存储读出一个键放进内容
fn load_key(store: &Arc<dyn PersistenceStore>, namespace: &str, key: &'static str) -> StepAction {
    let store = store.clone();
    let storage_key = namespaced_key(namespace, key);
    StepAction::asynchronous(format!("load:{}", key), move |_content: WizardContent| {
        let store = store.clone();
        let storage_key = storage_key.clone();
        async move {
            let mut patch = ContentPatch::new();
            if let Some(value) = store.get(&storage_key).await? {
                patch.insert(key.to_string(), value);
            }
            Ok(patch)
        }
    })
}

/// 把内容中的一个键写回存储
fn save_key(store: &Arc<dyn PersistenceStore>, namespace: &str, key: &'static str) -> StepAction {
    let store = store.clone();
    let storage_key = namespaced_key(namespace, key);
    StepAction::asynchronous(format!("save:{}", key), move |content: WizardContent| {
        let store = store.clone();
        let storage_key = storage_key.clone();
        async move {
            if let Some(value) = content.get(key) {
                store.set(&storage_key, value.clone()).await?;
            }
            Ok(ContentPatch::new())
        }
    })
}

fn has_key(content: &WizardContent, key: &str) -> bool {
    content.get(key).map(|v| !v.is_null()).unwrap_or(false)
}

/// 构造安装向导
pub fn build_installer(namespace: &str, store: Arc<dyn PersistenceStore>) -> Result<WizardStepController> {
    let ns = namespace;
    let steps = vec![
        // 集群名称
        StepDefinition::new("step1")
            .on_load(load_key(&store, ns, "cluster"))
            .on_save(save_key(&store, ns, "cluster")),
        // 安装选项与主机列表
        StepDefinition::new("step2")
            .gated_by(|c| has_key(c, "cluster"))
            .on_load(load_key(&store, ns, "installOptions"))
            .on_save(save_key(&store, ns, "installOptions"))
            .on_save(save_key(&store, ns, "hosts")),
        // 主机确认
        StepDefinition::new("step3")
            .gated_by(|c| has_key(c, "installOptions"))
            .on_load(load_key(&store, ns, "hosts"))
            .on_save(save_key(&store, ns, "hosts")),
        // 选择服务
        StepDefinition::new("step4")
            .gated_by(|c| has_key(c, "hosts"))
            .on_load(load_key(&store, ns, "service"))
            .on_save(save_key(&store, ns, "service")),
        // 分配 Master
        StepDefinition::new("step5")
            .gated_by(|c| has_key(c, "service"))
            .on_load(load_key(&store, ns, "masterComponentHosts"))
            .on_load(load_key(&store, ns, "hosts"))
            .on_save(save_key(&store, ns, "masterComponentHosts")),
        // 分配 Slave 与客户端
        StepDefinition::new("step6")
            .gated_by(|c| has_key(c, "masterComponentHosts"))
            .on_load(load_key(&store, ns, "slaveComponentHosts"))
            .on_load(load_key(&store, ns, "clients"))
            .on_save(save_key(&store, ns, "slaveComponentHosts"))
            .on_save(save_key(&store, ns, "clients")),
        // 服务配置
        StepDefinition::new("step7")
            .gated_by(|c| has_key(c, "slaveComponentHosts"))
            .on_load(load_key(&store, ns, "serviceConfigProperties"))
            .on_load(load_key(&store, ns, "slaveProperties"))
            .on_save(save_key(&store, ns, "serviceConfigProperties"))
            .on_save(save_key(&store, ns, "slaveProperties")),
        // 检查并部署
        StepDefinition::new("step8").gated_by(|c| has_key(c, "serviceConfigProperties")),
        // 安装、启动与测试
        StepDefinition::new(POINT_OF_NO_RETURN),
        // 汇总
        StepDefinition::new("step10"),
    ];

    let mut config = WizardConfig::new(namespace);
    config.point_of_no_return = Some(POINT_OF_NO_RETURN.to_string());
    config.cluster_marker_key = CLUSTER_STATUS_KEY.to_string();
    config.session_keys = SESSION_KEYS.iter().map(|k| k.to_string()).collect();

    WizardStepController::new(config, steps, store)
}
