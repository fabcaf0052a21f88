use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, warn};

use crate::server::error::{AppResult, Error};
use crate::server::utils::url_utils;

use super::cookie_services::{DynCookieService, extract_domain};

/// wall-clock deadline for one upstream attempt, headers through body
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// transport failures get this many extra attempts
const MAX_RETRIES: u32 = 2;

/// backoff doubles from here between attempts, capped below
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(4000);

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub type DynFetchService = Arc<dyn FetchServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait FetchServiceTrait {
    /// one upstream GET: browser headers plus per-channel overrides,
    /// redirects followed, transport errors retried with backoff
    ///
    /// HTTP error statuses are returned to the caller untouched, only
    /// transport failures (refused, dns, reset, timeout) drive the retry
    /// loop
    async fn fetch(
        &self,
        url: &str,
        custom_headers: &HashMap<String, String>,
    ) -> AppResult<reqwest::Response>;
}

pub struct UpstreamFetchService {
    http: reqwest::Client,
    cookies: DynCookieService,
}

impl UpstreamFetchService {
    pub fn new(http: reqwest::Client, cookies: DynCookieService) -> Self {
        Self { http, cookies }
    }

    /// make the request look like it came from a browser tab running the
    /// upstream's own player
    ///
    /// built as a map with insert semantics: a channel that sets its own
    /// Referer or User-Agent replaces the default, the request never
    /// carries both values
    ///
    /// Accept-Encoding is owned by the client's gzip/deflate/brotli
    /// codecs so text bodies come back transparently decoded; setting it
    /// by hand would turn that off
    fn browser_headers(target_url: &str, custom_headers: &HashMap<String, String>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(BROWSER_USER_AGENT),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("cross-site"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        // scheme://host of the target doubles as Origin/Referer, the way
        // the upstream's own player page would send them
        if let Some(origin) = url_utils::origin_of(target_url) {
            if let Ok(referer) = HeaderValue::from_str(&format!("{}/", origin)) {
                headers.insert(header::REFERER, referer);
            }
            if let Ok(origin) = HeaderValue::from_str(&origin) {
                headers.insert(header::ORIGIN, origin);
            }
        }

        for (name, value) in custom_headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                warn!("skipping invalid header name `{}`", name);
                continue;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                warn!("skipping invalid value for header `{}`", name);
                continue;
            };
            headers.insert(name, value);
        }

        headers
    }
}

#[async_trait::async_trait]
impl FetchServiceTrait for UpstreamFetchService {
    async fn fetch(
        &self,
        url: &str,
        custom_headers: &HashMap<String, String>,
    ) -> AppResult<reqwest::Response> {
        let domain = extract_domain(url);

        let mut headers = Self::browser_headers(url, custom_headers);

        // attach the jar for this domain unless the channel pins its own
        // Cookie header
        if let Some(d) = &domain {
            if !headers.contains_key(header::COOKIE) {
                if let Some(cookies) = self.cookies.get_cookies(d).await {
                    if let Ok(value) = HeaderValue::from_str(&cookies) {
                        headers.insert(header::COOKIE, value);
                    }
                }
            }
        }

        let mut last_error: Option<reqwest::Error> = None;
        let mut delay = RETRY_BASE_DELAY;

        for attempt in 0..=MAX_RETRIES {
            let request_builder = self
                .http
                .get(url)
                .headers(headers.clone())
                .timeout(ATTEMPT_TIMEOUT);

            match request_builder.send().await {
                Ok(response) => {
                    if attempt > 0 {
                        debug!("upstream fetch succeeded after {} retries: {}", attempt, url);
                    }

                    // persist whatever the upstream set for the next fetch
                    // against this domain
                    if let Some(d) = &domain {
                        let set_cookies: Vec<String> = response
                            .headers()
                            .get_all(header::SET_COOKIE)
                            .iter()
                            .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
                            .collect();

                        if !set_cookies.is_empty() {
                            self.cookies.store_cookies(d, &set_cookies).await;
                        }
                    }

                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        "upstream attempt {}/{} failed for {}: {}",
                        attempt + 1,
                        MAX_RETRIES + 1,
                        url,
                        e
                    );
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(MAX_RETRY_DELAY);
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "upstream fetch failed".to_string());

        error!(
            "upstream unreachable after {} attempts: {} - {}",
            MAX_RETRIES + 1,
            url,
            reason
        );
        Err(Error::UpstreamUnreachable(format!(
            "Upstream unreachable: {}",
            reason
        )))
    }
}
