/// Redis 存储
///
/// 值以 JSON 字符串保存，键与内存存储一致

use async_trait::async_trait;
use common::{Error, Result};
use engine::PersistenceStore;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Persistence(format!("Redis 地址无效: {}", e)))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Persistence(format!("Redis 连接失败: {}", e)))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl PersistenceStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| Error::Persistence(format!("Redis get 失败: {}", e)))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let json = serde_json::to_string(&value)?;
        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(key, json)
            .await
            .map_err(|e| Error::Persistence(format!("Redis set 失败: {}", e)))?;
        debug!("Redis 已写入: {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::Persistence(format!("Redis del 失败: {}", e)))?;
        Ok(())
    }
}
