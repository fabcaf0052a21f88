use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::model::{Channel, ChannelsRepository};

/// registry snapshot held in memory
///
/// backs the channels-file deployment mode and doubles as the stub the
/// integration tests wire in
pub struct MemoryChannelsRepository {
    channels: HashMap<String, Channel>,
}

impl MemoryChannelsRepository {
    pub fn new(channels: Vec<Channel>) -> Self {
        let channels = channels.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self { channels }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read channels file {}", path.display()))?;
        let channels: Vec<Channel> =
            serde_json::from_str(&raw).context("channels file is not a JSON array of channels")?;

        info!("loaded {} channels from {}", channels.len(), path.display());
        Ok(Self::new(channels))
    }
}

#[async_trait::async_trait]
impl ChannelsRepository for MemoryChannelsRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Channel>> {
        Ok(self.channels.get(id).cloned())
    }
}
