/// 持久化协作方
///
/// 简单的字符串键值存储，后写覆盖，不提供事务保证

use async_trait::async_trait;
use common::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 持久化存储 Trait
#[async_trait]
pub trait PersistenceStore: Send + Sync + 'static {
    /// 读取键值，不存在时返回 None
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// 写入键值
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// 删除键
    async fn remove(&self, key: &str) -> Result<()>;
}

/// 内存存储
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前键数量
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        store.set("masterComponentHosts", json!(["c6401"])).await.unwrap();
        store.set("masterComponentHosts", json!(["c6402"])).await.unwrap();
        assert_eq!(store.get("masterComponentHosts").await.unwrap(), Some(json!(["c6402"])));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_ok() {
        let store = MemoryStore::new();
        store.remove("cluster").await.unwrap();
        assert!(store.get("cluster").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }
}
