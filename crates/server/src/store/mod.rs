/// 向导状态存储
///
/// 默认使用内存存储；配置了 REDIS_URL 且启用 redis feature 时使用 Redis

#[cfg(feature = "redis")]
pub mod redis_store;

use engine::{MemoryStore, PersistenceStore};
use std::sync::Arc;
use tracing::info;

/// 根据配置打开存储
pub async fn open_store(redis_url: Option<&str>) -> anyhow::Result<Arc<dyn PersistenceStore>> {
    match redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = redis_store::RedisStore::connect(url).await?;
            info!("✅ Redis 存储连接成功");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("设置了 REDIS_URL，但未启用 redis feature"),
        None => {
            info!("使用内存存储，向导状态不会跨进程保留");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
