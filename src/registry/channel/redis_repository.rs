use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::registry::RedisDatabase;

use super::model::{Channel, ChannelsRepository};

pub struct RedisChannelsRepository {
    redis: Arc<RedisDatabase>,
}

impl RedisChannelsRepository {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }

    fn channel_key(id: &str) -> String {
        format!("channel:{}", id)
    }
}

#[async_trait::async_trait]
impl ChannelsRepository for RedisChannelsRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Channel>> {
        let channel: Option<Channel> = self
            .redis
            .get_json(&Self::channel_key(id))
            .await
            .context("channel lookup failed")?;

        if let Some(channel) = &channel {
            debug!("loaded channel {} -> {}", channel.id, channel.url);
        }

        Ok(channel)
    }
}
