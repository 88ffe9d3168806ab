// src/fetch/mod.rs

//! Single chokepoint for page retrieval.
//!
//! Every data source routes its network access through [`Fetcher::fetch`],
//! which layers caching, per-host pacing, bounded concurrency, retry with
//! backoff and a ladder of fallback strategies:
//!
//! 1. cache hit (rejected if it looks like a challenge page)
//! 2. primary pooled client with rotating user-agent and conditional headers
//! 3. alternate client with a full browser header profile
//! 4. system `curl`
//! 5. headless Chrome render (per-call opt-in, slow last resort)
//! 6. interactive manual paste (config opt-in, single-flight, outside the
//!    bounded pool)
//!
//! Total failure returns `None`, never an error: a page that cannot be
//! retrieved is a skippable condition for callers.

pub mod block;
pub mod external;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use url::Url;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::models::Config;

pub use block::{is_usable_body, meta_refresh_target};

/// HTTP statuses retried with backoff; anything else aborts the attempt.
const RETRY_STATUSES: [u16; 7] = [429, 500, 502, 503, 520, 521, 522];

/// Maximum client-side meta-refresh hops to follow.
const MAX_REFRESH_HOPS: usize = 2;

/// Instrumentation counters, readable at any point during a run.
#[derive(Debug, Default)]
pub struct FetchStats {
    /// Fetches that produced a usable body
    pub success: AtomicU64,
    /// Individual retry sleeps taken
    pub retried: AtomicU64,
    /// Bodies rejected as block/challenge pages
    pub blocked: AtomicU64,
    /// Bodies supplied by a fallback strategy (rungs 3+)
    pub fallback_used: AtomicU64,
    /// Bodies supplied by the headless browser specifically
    pub browser_used: AtomicU64,
}

impl FetchStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.success.load(Ordering::Relaxed),
            self.retried.load(Ordering::Relaxed),
            self.blocked.load(Ordering::Relaxed),
            self.fallback_used.load(Ordering::Relaxed),
            self.browser_used.load(Ordering::Relaxed),
        )
    }
}

/// Shared page fetcher. Cheap to clone via `Arc`.
pub struct Fetcher {
    config: crate::models::HttpConfig,
    manual_ttl_secs: u64,
    cache: Option<Arc<CacheStore>>,
    primary: reqwest::Client,
    browser_profile: reqwest::Client,
    /// Sole cap on total in-flight fetches
    semaphore: Semaphore,
    /// Per-host last-reserved-slot map. Locked only for the wait
    /// computation, never across the sleep or the network call.
    host_last: Mutex<HashMap<String, Instant>>,
    ua_index: AtomicUsize,
    /// Serializes the interactive prompt so only one URL asks at a time
    manual_gate: tokio::sync::Mutex<()>,
    pub stats: FetchStats,
}

impl Fetcher {
    pub fn new(config: &Config, cache: Option<Arc<CacheStore>>) -> Result<Self> {
        let timeout = Duration::from_secs(config.http.timeout_secs);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        default_headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));

        let primary = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers.clone())
            .build()?;

        // Distinct client presenting a fuller browser profile; used when the
        // primary client is turned away.
        let mut browser_headers = default_headers;
        browser_headers.insert("Referer", HeaderValue::from_static("https://www.google.com/"));
        browser_headers.insert("DNT", HeaderValue::from_static("1"));
        browser_headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let browser_profile = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(browser_headers)
            .build()?;

        Ok(Self {
            config: config.http.clone(),
            manual_ttl_secs: config.cache.manual_ttl_secs,
            cache,
            primary,
            browser_profile,
            semaphore: Semaphore::new(config.http.max_concurrent.max(1)),
            host_last: Mutex::new(HashMap::new()),
            ua_index: AtomicUsize::new(0),
            manual_gate: tokio::sync::Mutex::new(()),
            stats: FetchStats::default(),
        })
    }

    /// Retrieve a URL, walking the strategy ladder until something yields a
    /// usable body. `allow_browser` opts this call into the slow headless
    /// render rung.
    pub async fn fetch(&self, url: &str, allow_browser: bool) -> Option<String> {
        // Rung 1: cache. A blocked cached body is kept around only for its
        // conditional-request headers.
        let cached = match &self.cache {
            Some(cache) => cache.get(url).await,
            None => None,
        };
        if let Some((body, _)) = &cached {
            if is_usable_body(body) {
                self.stats.success.fetch_add(1, Ordering::Relaxed);
                return Some(body.clone());
            }
            self.stats.blocked.fetch_add(1, Ordering::Relaxed);
        }

        let network_result = {
            let _permit = self.semaphore.acquire().await.ok()?;

            if let Some(body) = self.fetch_primary(url, cached.as_ref()).await {
                Some(body)
            } else if let Some(body) = self.fetch_alternate(url).await {
                self.stats.fallback_used.fetch_add(1, Ordering::Relaxed);
                Some(body)
            } else if self.config.enable_subprocess_curl {
                match self.fetch_curl(url).await {
                    Some(body) => {
                        self.stats.fallback_used.fetch_add(1, Ordering::Relaxed);
                        Some(body)
                    }
                    None if allow_browser && self.config.enable_browser => {
                        self.fetch_rendered(url).await
                    }
                    None => None,
                }
            } else if allow_browser && self.config.enable_browser {
                self.fetch_rendered(url).await
            } else {
                None
            }
            // Permit released here, before any interactive wait
        };

        if let Some(body) = network_result {
            self.stats.success.fetch_add(1, Ordering::Relaxed);
            return Some(body);
        }

        // Rung 6: manual paste, single-flight, outside the bounded pool.
        if self.config.enable_interactive {
            if let Some(body) = self.fetch_manual(url).await {
                self.stats.success.fetch_add(1, Ordering::Relaxed);
                self.stats.fallback_used.fetch_add(1, Ordering::Relaxed);
                return Some(body);
            }
        }

        log::warn!("All fetch strategies failed for {url}");
        None
    }

    /// Rung 2: pooled client with retries, conditional headers and
    /// meta-refresh chasing.
    async fn fetch_primary(
        &self,
        url: &str,
        cached: Option<&(String, HashMap<String, String>)>,
    ) -> Option<String> {
        for attempt in 0..self.config.max_retries {
            self.pace(url).await;

            let mut request = self
                .primary
                .get(url)
                .header("User-Agent", self.next_user_agent());
            if let Some((_, headers)) = cached {
                if let Some(etag) = headers.get("etag") {
                    request = request.header("If-None-Match", etag);
                }
                if let Some(modified) = headers.get("last-modified") {
                    request = request.header("If-Modified-Since", modified);
                }
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::NOT_MODIFIED {
                        // Origin says the cached body is still current; it
                        // must still pass the usability check before reuse
                        return match cached {
                            Some((body, _)) if is_usable_body(body) => Some(body.clone()),
                            _ => None,
                        };
                    }
                    if RETRY_STATUSES.contains(&status.as_u16()) {
                        self.backoff(attempt).await;
                        continue;
                    }
                    if !status.is_success() {
                        log::debug!("HTTP {status} for {url}");
                        return None;
                    }

                    let headers = header_subset(response.headers());
                    let Ok(text) = response.text().await else {
                        self.backoff(attempt).await;
                        continue;
                    };

                    let (final_url, text, headers) =
                        self.chase_meta_refresh(url, text, headers).await;
                    if !is_usable_body(&text) {
                        self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                        return None;
                    }

                    if let Some(cache) = &self.cache {
                        cache.set(&final_url, &text, &headers).await;
                    }
                    return Some(text);
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    log::debug!("Transient error for {url}: {e}");
                    self.backoff_transient().await;
                }
                Err(e) => {
                    log::debug!("Request failed for {url}: {e}");
                    return None;
                }
            }
        }
        None
    }

    /// Rung 3: one attempt with the browser-profile client.
    async fn fetch_alternate(&self, url: &str) -> Option<String> {
        self.pace(url).await;
        let response = self
            .browser_profile
            .get(url)
            .header("User-Agent", self.next_user_agent())
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;

        let headers = header_subset(response.headers());
        let text = response.text().await.ok()?;
        if !is_usable_body(&text) {
            self.stats.blocked.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if let Some(cache) = &self.cache {
            cache.set(url, &text, &headers).await;
        }
        Some(text)
    }

    /// Rung 4: system curl in a child process.
    async fn fetch_curl(&self, url: &str) -> Option<String> {
        self.pace(url).await;
        let text =
            external::curl_fetch(url, self.next_user_agent(), self.config.timeout_secs).await?;
        if !is_usable_body(&text) {
            self.stats.blocked.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if let Some(cache) = &self.cache {
            // No response headers available; use a short fixed lifetime
            let headers =
                HashMap::from([("cache-control".to_string(), "max-age=600".to_string())]);
            cache.set(url, &text, &headers).await;
        }
        Some(text)
    }

    /// Rung 5: headless browser render.
    async fn fetch_rendered(&self, url: &str) -> Option<String> {
        self.pace(url).await;
        let text =
            external::browser_fetch(url, self.next_user_agent(), self.config.timeout_secs + 15)
                .await?;
        if !is_usable_body(&text) {
            self.stats.blocked.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.stats.browser_used.fetch_add(1, Ordering::Relaxed);
        self.stats.fallback_used.fetch_add(1, Ordering::Relaxed);
        if let Some(cache) = &self.cache {
            let headers =
                HashMap::from([("cache-control".to_string(), "max-age=600".to_string())]);
            cache.set(url, &text, &headers).await;
        }
        Some(text)
    }

    /// Rung 6: operator-supplied page source.
    async fn fetch_manual(&self, url: &str) -> Option<String> {
        let _gate = self.manual_gate.lock().await;
        let url_owned = url.to_string();
        let body = tokio::task::spawn_blocking(move || {
            external::prompt_for_manual_input(&url_owned)
        })
        .await
        .ok()??;

        // An operator can paste the challenge page by mistake; it must not
        // enter the cache with an extended lifetime
        if !is_usable_body(&body) {
            log::warn!("Manual capture for {url} rejected as unusable");
            self.stats.blocked.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if let Some(cache) = &self.cache {
            // Extended lifetime: repeating the manual step is costly
            cache.set_with_ttl(url, &body, self.manual_ttl_secs).await;
        }
        Some(body)
    }

    /// Follow client-side meta-refresh directives, up to two hops. Returns
    /// the final URL alongside its body and headers; the caller caches the
    /// body under that final URL.
    async fn chase_meta_refresh(
        &self,
        url: &str,
        mut text: String,
        mut headers: HashMap<String, String>,
    ) -> (String, String, HashMap<String, String>) {
        let mut current = url.to_string();
        for _ in 0..MAX_REFRESH_HOPS {
            let Some(target) = meta_refresh_target(&text).map(str::to_string) else {
                break;
            };
            let Some(next_url) = Url::parse(&current)
                .ok()
                .and_then(|base| base.join(&target).ok())
            else {
                break;
            };

            self.pace(next_url.as_str()).await;
            let response = match self
                .primary
                .get(next_url.as_str())
                .header("User-Agent", self.next_user_agent())
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(r) => r,
                Err(e) => {
                    log::debug!("Meta-refresh hop failed for {next_url}: {e}");
                    break;
                }
            };

            headers = header_subset(response.headers());
            match response.text().await {
                Ok(t) => text = t,
                Err(_) => break,
            }
            current = next_url.into();
        }
        (current, text, headers)
    }

    /// Wait out the per-host pacing interval. The lock covers only the slot
    /// reservation; the sleep happens outside it, so unrelated hosts are
    /// never serialized behind one another.
    async fn pace(&self, url: &str) {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        else {
            return;
        };

        let interval = Duration::from_millis(self.config.per_host_interval_ms);
        let wait = {
            let mut last = self.host_last.lock().expect("host pacing lock");
            let now = Instant::now();
            let slot = match last.get(&host) {
                Some(prev) => (*prev + interval).max(now),
                None => now,
            };
            last.insert(host, slot);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Exponential backoff with jitter before the next retry attempt.
    async fn backoff(&self, attempt: u32) {
        self.stats.retried.fetch_add(1, Ordering::Relaxed);
        let base = self.config.backoff_base_secs.max(0.0);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.3);
        let secs = base.powi(attempt as i32) + jitter;
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// Short fixed delay for timeouts and connection errors, which tend to
    /// clear much faster than rate-limit windows.
    async fn backoff_transient(&self) {
        self.stats.retried.fetch_add(1, Ordering::Relaxed);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.3);
        tokio::time::sleep(Duration::from_secs_f64(0.5 + jitter)).await;
    }

    fn next_user_agent(&self) -> &str {
        let agents = &self.config.user_agents;
        let idx = self.ua_index.fetch_add(1, Ordering::Relaxed) % agents.len().max(1);
        agents
            .get(idx)
            .map(String::as_str)
            .unwrap_or("Mozilla/5.0 (compatible; racescan/0.1)")
    }
}

/// Lowercased header map for cache storage; the store keeps only the
/// conditional-request subset.
fn header_subset(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}
