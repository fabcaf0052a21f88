use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// ttl of 24hrs, roughly what a browser session would hold
const COOKIE_TTL: Duration = Duration::from_secs(86400);

pub type DynCookieService = Arc<dyn CookieServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait CookieServiceTrait {
    async fn get_cookies(&self, domain: &str) -> Option<String>;

    async fn store_cookies(&self, domain: &str, cookies: &[String]);
}

/// per-domain cookie jar for outbound fetches
///
/// some upstreams hand out a session cookie with the playlist and expect
/// it back on every segment and key request; the jar keeps those flowing
/// without the player ever seeing them
pub struct MemoryCookieService {
    jar: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCookieService {
    pub fn new() -> Self {
        Self {
            jar: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCookieService {
    fn default() -> Self {
        Self::new()
    }
}

pub fn extract_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

#[async_trait::async_trait]
impl CookieServiceTrait for MemoryCookieService {
    async fn get_cookies(&self, domain: &str) -> Option<String> {
        let mut jar = self.jar.lock().unwrap();

        match jar.get(domain) {
            Some((_, stored_at)) if stored_at.elapsed() > COOKIE_TTL => {
                jar.remove(domain);
                None
            }
            Some((cookies, _)) => {
                debug!(
                    "Loaded cookies for domain {}: {} bytes",
                    domain,
                    cookies.len()
                );
                Some(cookies.clone())
            }
            None => None,
        }
    }

    async fn store_cookies(&self, domain: &str, cookies: &[String]) {
        if cookies.is_empty() {
            return;
        }

        let mut jar = self.jar.lock().unwrap();

        let mut cookie_map: HashMap<String, String> = HashMap::new();

        // merge onto whatever we already hold for the domain
        if let Some((existing, stored_at)) = jar.get(domain) {
            if stored_at.elapsed() <= COOKIE_TTL {
                for cookie_str in existing.split("; ") {
                    if let Some((name, _)) = cookie_str.split_once('=') {
                        cookie_map.insert(name.to_string(), cookie_str.to_string());
                    }
                }
            }
        }

        // Set-Cookie format: name=value; attr1; attr2...
        // only the name=value part matters here, new values override old
        for cookie in cookies {
            let Some(cookie_value) = cookie.split(';').next() else {
                continue;
            };
            let Some((name, _)) = cookie_value.split_once('=') else {
                continue;
            };
            cookie_map.insert(name.trim().to_string(), cookie_value.trim().to_string());
        }

        let cookie_header: String = cookie_map.values().cloned().collect::<Vec<_>>().join("; ");

        debug!(
            "Stored {} cookies for domain {}",
            cookie_map.len(),
            domain
        );
        jar.insert(domain.to_string(), (cookie_header, Instant::now()));
    }
}
