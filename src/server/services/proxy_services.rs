use std::sync::Arc;

use tracing::info;

use crate::{
    config::AppConfig,
    registry::{DynChannelsRepository, RedisDatabase},
};

use super::{
    cookie_services::{DynCookieService, MemoryCookieService},
    fetch_services::{DynFetchService, UpstreamFetchService},
};

/// request-time service container, cloned into every handler
#[derive(Clone)]
pub struct ProxyServices {
    pub channels: DynChannelsRepository,
    pub fetch: DynFetchService,
    pub redis: Option<Arc<RedisDatabase>>,
    pub config: Arc<AppConfig>,
}

impl ProxyServices {
    pub fn new(
        channels: DynChannelsRepository,
        redis: Option<Arc<RedisDatabase>>,
        config: Arc<AppConfig>,
    ) -> Self {
        info!("starting proxy services...");

        // one shared client for every upstream transaction, tuned for
        // streaming workloads: generous idle pool and keep-alive so
        // segment fetches reuse connections. No client-wide timeout, the
        // fetch service puts a deadline on each attempt instead.
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(200)
            .connect_timeout(std::time::Duration::from_secs(10))
            .pool_idle_timeout(std::time::Duration::from_secs(120))
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("Failed to build HTTP client");

        // the fetch service owns the cookie jar, nothing else touches it
        let cookies = Arc::new(MemoryCookieService::new()) as DynCookieService;

        let fetch =
            Arc::new(UpstreamFetchService::new(http, cookies)) as DynFetchService;

        Self {
            channels,
            fetch,
            redis,
            config,
        }
    }
}
