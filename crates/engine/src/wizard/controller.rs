/// 向导步骤控制器
///
/// 组合步骤序列、持久化存储与各步骤的加载/保存动作。内部自带锁，
/// 可以直接以 Arc 共享：加载/保存/结束互斥执行，导航互斥执行，
/// 状态锁只在读写内存状态时短暂持有。

use common::utils::namespaced_key;
use common::{Error, LoadFailure, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::actions::{apply_patch, run_actions, ContentPatch, StepAction, WizardContent};
use super::sequencer::StepSequencer;
use crate::persist::PersistenceStore;

const CURRENT_STEP_KEY: &str = "currentStep";
const STEPS_SAVED_STATE_KEY: &str = "stepsSavedState";

/// 步骤门控条件，返回 false 时步骤禁用
pub type GatingPredicate = Arc<dyn Fn(&WizardContent) -> bool + Send + Sync>;

/// 步骤定义
#[derive(Clone)]
pub struct StepDefinition {
    pub name: String,
    gate: Option<GatingPredicate>,
    load: Vec<StepAction>,
    save: Vec<StepAction>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gate: None,
            load: Vec::new(),
            save: Vec::new(),
        }
    }

    pub fn gated_by<F>(mut self, gate: F) -> Self
    where
        F: Fn(&WizardContent) -> bool + Send + Sync + 'static,
    {
        self.gate = Some(Arc::new(gate));
        self
    }

    pub fn on_load(mut self, action: StepAction) -> Self {
        self.load.push(action);
        self
    }

    pub fn on_save(mut self, action: StepAction) -> Self {
        self.save.push(action);
        self
    }

    fn is_open(&self, content: &WizardContent) -> bool {
        self.gate.as_ref().map(|gate| gate(content)).unwrap_or(true)
    }
}

/// 向导配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    /// 存储键前缀，例如 "installer"
    pub namespace: String,
    /// 过了这一步集群已经创建，再往回走需要清掉集群标记
    pub point_of_no_return: Option<String>,
    /// 集群已创建的标记键
    pub cluster_marker_key: String,
    /// finish() 时从存储中删除的键
    pub session_keys: Vec<String>,
}

impl WizardConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            point_of_no_return: None,
            cluster_marker_key: "clusterStatus".to_string(),
            session_keys: Vec::new(),
        }
    }

    fn key(&self, key: &str) -> String {
        namespaced_key(&self.namespace, key)
    }
}

/// 步骤的对外视图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepView {
    pub name: String,
    pub index: usize,
    pub enabled: bool,
    pub saved: bool,
    pub active: bool,
}

pub struct WizardStepController {
    config: WizardConfig,
    steps: Vec<StepDefinition>,
    index: HashMap<String, usize>,
    point_of_no_return: Option<usize>,
    sequencer: RwLock<StepSequencer>,
    content: RwLock<WizardContent>,
    errors: RwLock<Vec<String>>,
    store: Arc<dyn PersistenceStore>,
    /// 内容的读-改-写（加载、保存、结束）整段持有
    content_guard: Mutex<()>,
    /// 导航整段持有，存储写入成功后才切换当前步骤
    navigation: Mutex<()>,
}

impl WizardStepController {
    pub fn new(
        config: WizardConfig,
        steps: Vec<StepDefinition>,
        store: Arc<dyn PersistenceStore>,
    ) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::Config("向导至少需要一个步骤".to_string()));
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.name.clone(), i).is_some() {
                return Err(Error::Config(format!("步骤名称重复: {}", step.name)));
            }
        }

        let point_of_no_return = match &config.point_of_no_return {
            Some(name) => Some(
                *index
                    .get(name)
                    .ok_or_else(|| Error::Config(format!("不可回退点不是已配置的步骤: {}", name)))?,
            ),
            None => None,
        };

        info!("向导已初始化: namespace={}, steps={}", config.namespace, steps.len());

        Ok(Self {
            sequencer: RwLock::new(StepSequencer::new(steps.len())),
            content: RwLock::new(WizardContent::new()),
            errors: RwLock::new(Vec::new()),
            config,
            steps,
            index,
            point_of_no_return,
            store,
            content_guard: Mutex::new(()),
            navigation: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    // ========================================================================
    // 步骤查询
    // ========================================================================

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn get_step_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownStep(name.to_string()))
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub async fn is_step_disabled(&self, name: &str) -> Result<bool> {
        let index = self.get_step_index(name)?;
        let below = self.sequencer.read().await.is_below_watermark(index);
        if below {
            return Ok(true);
        }
        let content = self.content.read().await;
        Ok(!self.steps[index].is_open(&content))
    }

    pub async fn current_step(&self) -> String {
        let current = self.sequencer.read().await.current();
        self.steps[current].name.clone()
    }

    pub async fn steps(&self) -> Vec<StepView> {
        let sequencer = self.sequencer.read().await.clone();
        let content = self.content.read().await;
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepView {
                name: step.name.clone(),
                index: i,
                enabled: !sequencer.is_below_watermark(i) && step.is_open(&content),
                saved: sequencer.is_saved(i),
                active: sequencer.current() == i,
            })
            .collect()
    }

    // ========================================================================
    // 导航
    // ========================================================================

    /// 切换到指定步骤
    pub async fn goto_step(&self, name: &str) -> Result<()> {
        let target = self.get_step_index(name)?;
        let _navigation = self.navigation.lock().await;
        if self.is_step_disabled(name).await? {
            return Err(Error::StepDisabled(name.to_string()));
        }

        let current = self.sequencer.read().await.current();

        if let Some(ponr) = self.point_of_no_return {
            if current >= ponr && target < ponr {
                warn!("回退到不可回退点之前，清除集群标记: {} -> {}", self.steps[current].name, name);
                self.store.remove(&self.config.key(&self.config.cluster_marker_key)).await?;
            }
        }

        self.store
            .set(&self.config.key(CURRENT_STEP_KEY), serde_json::Value::String(name.to_string()))
            .await?;
        self.sequencer.write().await.set_current(target);
        debug!("向导步骤切换: {} -> {}", self.steps[current].name, name);
        Ok(())
    }

    /// 设置下层禁用水位线
    pub async fn set_lower_steps_disable(&self, index: usize) -> Result<()> {
        if index > self.steps.len() {
            return Err(Error::InvalidArgument(format!("步骤下标越界: {}", index)));
        }
        self.sequencer.write().await.set_lower_steps_disable(index);
        info!("已禁用第 {} 步之前的所有步骤", index);
        Ok(())
    }

    // ========================================================================
    // 保存台账
    // ========================================================================

    /// 未知步骤返回 false
    pub async fn get_step_saved_state(&self, name: &str) -> bool {
        match self.index.get(name) {
            Some(&i) => self.sequencer.read().await.is_saved(i),
            None => false,
        }
    }

    pub async fn set_step_saved(&self, name: &str) -> Result<()> {
        let index = self.get_step_index(name)?;
        let flags = {
            let mut sequencer = self.sequencer.write().await;
            if !sequencer.set_saved(index) {
                return Ok(());
            }
            sequencer.saved_flags().to_vec()
        };
        self.persist_saved_state(&flags).await
    }

    pub async fn set_step_unsaved(&self, name: &str) -> Result<()> {
        let index = self.get_step_index(name)?;
        let flags = {
            let mut sequencer = self.sequencer.write().await;
            sequencer.set_unsaved(index);
            sequencer.saved_flags().to_vec()
        };
        self.persist_saved_state(&flags).await
    }

    async fn persist_saved_state(&self, flags: &[bool]) -> Result<()> {
        let state: serde_json::Map<String, serde_json::Value> = self
            .steps
            .iter()
            .zip(flags)
            .map(|(step, saved)| (step.name.clone(), serde_json::Value::Bool(*saved)))
            .collect();
        self.store
            .set(&self.config.key(STEPS_SAVED_STATE_KEY), serde_json::Value::Object(state))
            .await
    }

    // ========================================================================
    // 加载 / 保存
    // ========================================================================

    /// 执行步骤的加载动作，全部成功才提交内容
    pub async fn load_step(&self, name: &str) -> Result<()> {
        let index = self.get_step_index(name)?;
        let step = &self.steps[index];
        if step.load.is_empty() {
            return Ok(());
        }

        let _guard = self.content_guard.lock().await;
        let snapshot = self.content.read().await.clone();
        match run_actions(&step.load, &snapshot).await {
            Ok(next) => {
                *self.content.write().await = next;
                debug!("步骤已加载: {}", name);
                Ok(())
            }
            Err(failures) => {
                let failure = LoadFailure {
                    step: name.to_string(),
                    failures,
                };
                warn!("步骤加载失败: {}", failure);
                Err(Error::StepLoad(failure))
            }
        }
    }

    /// 合并补丁、执行保存动作，然后标记步骤已保存
    ///
    /// 保存动作失败时内容不变，错误同样以 StepLoad 返回
    pub async fn save_step(&self, name: &str, patch: ContentPatch) -> Result<()> {
        let index = self.get_step_index(name)?;
        let step = &self.steps[index];

        let _guard = self.content_guard.lock().await;
        let mut draft = self.content.read().await.clone();
        apply_patch(&mut draft, patch);

        let next = run_actions(&step.save, &draft).await.map_err(|failures| {
            Error::StepLoad(LoadFailure {
                step: name.to_string(),
                failures,
            })
        })?;
        *self.content.write().await = next;

        self.set_step_saved(name).await?;
        info!("✅ 步骤已保存: {}", name);
        Ok(())
    }

    /// 从第一步到当前步骤依次加载
    pub async fn load_all_prior_steps(&self) -> Result<()> {
        let current = self.sequencer.read().await.current();
        for step in &self.steps[..=current] {
            self.load_step(&step.name).await?;
        }
        Ok(())
    }

    // ========================================================================
    // 会话
    // ========================================================================

    /// 从存储恢复当前步骤与保存台账
    pub async fn restore(&self) -> Result<()> {
        let current = self.store.get(&self.config.key(CURRENT_STEP_KEY)).await?;
        let saved = self.store.get(&self.config.key(STEPS_SAVED_STATE_KEY)).await?;

        let mut sequencer = self.sequencer.write().await;
        if let Some(name) = current.as_ref().and_then(|v| v.as_str()) {
            match self.index.get(name) {
                Some(&i) => sequencer.set_current(i),
                None => warn!("忽略未知的已保存步骤: {}", name),
            }
        }
        if let Some(serde_json::Value::Object(map)) = saved {
            let flags: Vec<bool> = self
                .steps
                .iter()
                .map(|step| map.get(&step.name).and_then(|v| v.as_bool()).unwrap_or(false))
                .collect();
            sequencer.restore_saved(&flags);
        }

        info!(
            "向导状态已恢复: current={}, saved={:?}",
            self.steps[sequencer.current()].name,
            sequencer.saved_flags()
        );
        Ok(())
    }

    /// 结束向导：重置台账与当前步骤，清除会话键
    pub async fn finish(&self) -> Result<()> {
        let _guard = self.content_guard.lock().await;
        self.sequencer.write().await.reset();
        self.content.write().await.clear();
        self.errors.write().await.clear();

        let mut keys = vec![CURRENT_STEP_KEY.to_string(), STEPS_SAVED_STATE_KEY.to_string()];
        keys.extend(self.config.session_keys.iter().cloned());
        for key in keys {
            self.store.remove(&self.config.key(&key)).await?;
        }

        info!("🏁 向导已结束: namespace={}", self.config.namespace);
        Ok(())
    }

    // ========================================================================
    // 内容 / 错误列表
    // ========================================================================

    pub async fn content(&self) -> WizardContent {
        self.content.read().await.clone()
    }

    pub async fn content_value(&self, key: &str) -> Option<serde_json::Value> {
        self.content.read().await.get(key).cloned()
    }

    pub async fn add_error(&self, message: impl Into<String>) {
        self.errors.write().await.push(message.into());
    }

    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
    }

    pub async fn has_errors(&self) -> bool {
        !self.errors.read().await.is_empty()
    }

    pub async fn errors(&self) -> Vec<String> {
        self.errors.read().await.clone()
    }
}
