use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::{
    blob::{BlobStore, MemoryBlobStore, RestBlobStore},
    config::Config,
    membership::{JoinedChannels, KvStore, MemoryKv, RedisKv, VotedPolls},
    store::{MemoryStore, RestStore, Store},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub joined_channels: JoinedChannels,
    pub voted_polls: VotedPolls,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let (store, blobs): (Arc<dyn Store>, Arc<dyn BlobStore>) = if config.uses_backend() {
            info!("Using hosted backend at {}", config.backend_url);
            (
                Arc::new(RestStore::new(
                    &config.backend_url,
                    &config.backend_service_key,
                )?),
                Arc::new(RestBlobStore::new(
                    &config.backend_url,
                    &config.backend_service_key,
                    &config.storage_bucket,
                )?),
            )
        } else {
            info!("BACKEND_URL not set, keeping posts in memory");
            (Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()))
        };

        let kv: Arc<dyn KvStore> = if config.uses_redis() {
            info!("Connecting to Redis...");
            Arc::new(RedisKv::connect(&config.redis_url).await?)
        } else {
            info!("REDIS_URL not set, keeping memberships in memory");
            Arc::new(MemoryKv::new())
        };

        Ok(Self::from_parts(config, store, blobs, kv))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        kv: Arc<dyn KvStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            blobs,
            joined_channels: JoinedChannels::new(kv.clone()),
            voted_polls: VotedPolls::new(kv),
        })
    }
}
