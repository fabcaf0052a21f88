use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// one proxied channel as stored in the registry
///
/// `headers` are extra request headers the upstream wants (Referer,
/// tokens, whatever its player would normally send); they override the
/// browser defaults on every outbound fetch for the channel and all of
/// its descendant resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

pub type DynChannelsRepository = Arc<dyn ChannelsRepository + Send + Sync>;

/// the single read the proxy needs; storage backends are swappable
/// behind it
#[async_trait::async_trait]
pub trait ChannelsRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Channel>>;
}
