pub mod channel;
pub mod redis_connection;

pub use channel::*;
pub use redis_connection::*;

use std::sync::Arc;

use anyhow::bail;
use tracing::info;

use crate::config::AppConfig;

/// wire the channel registry from config: a JSON file snapshot when
/// CHANNELS_FILE is set, redis otherwise
pub async fn connect_registry(
    config: &AppConfig,
) -> anyhow::Result<(DynChannelsRepository, Option<Arc<RedisDatabase>>)> {
    if let Some(path) = &config.channels_file {
        let registry = MemoryChannelsRepository::from_file(path)?;
        return Ok((Arc::new(registry) as DynChannelsRepository, None));
    }

    let Some(redis_url) = &config.redis_url else {
        bail!("either CHANNELS_FILE or REDIS_URL must be configured");
    };

    info!("connecting to redis...");
    let redis = Arc::new(RedisDatabase::connect(redis_url).await?);

    Ok((
        Arc::new(RedisChannelsRepository::new(redis.clone())) as DynChannelsRepository,
        Some(redis),
    ))
}
