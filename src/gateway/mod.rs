pub mod common;
pub mod manager;
pub mod videos;

use crate::config::Config;
use crate::credential::KeyDispatcher;
use crate::credential::store::Store;
use crate::gateway::videos::types::ChannelView;
use crate::youtube::YouTubeClient;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

const CHANNEL_CACHE_CAPACITY: u64 = 10_000;
const CHANNEL_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// 所有路由共享的状态。分发器在 main 中构造一次，通过这里传给每个调用方。
pub struct AppState {
    pub cfg: Config,
    pub dispatcher: Arc<KeyDispatcher>,
    pub store: Arc<Store>,
    pub youtube: YouTubeClient,
    pub channel_cache: Cache<String, ChannelView>,
}

impl AppState {
    pub fn new(
        cfg: Config,
        dispatcher: Arc<KeyDispatcher>,
        store: Arc<Store>,
        youtube: YouTubeClient,
    ) -> Self {
        let channel_cache = Cache::builder()
            .max_capacity(CHANNEL_CACHE_CAPACITY)
            .time_to_live(CHANNEL_CACHE_TTL)
            .build();
        Self {
            cfg,
            dispatcher,
            store,
            youtube,
            channel_cache,
        }
    }

    /// 把分发器当前的失败集合落盘；集合未变化时不写文件。
    pub async fn persist_failures(&self) {
        let failed = self.dispatcher.failed_indices().await;
        if let Err(e) = self.store.save_failures(&failed).await {
            tracing::warn!("保存 key 失败状态失败: {e:#}");
        }
    }
}
