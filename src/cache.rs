// src/cache.rs

//! Durable page cache.
//!
//! One body file per URL-hash key plus a single `metadata.json` carrying
//! fetch time, expiry and a conditional-request header subset. Both survive
//! process restarts; stale entries are pruned lazily on the next access.
//!
//! ## Layout
//!
//! ```text
//! {dir}/
//! ├── metadata.json         # expiry + header subset per key
//! └── {sha256[..24]}.html   # stored body
//! ```
//!
//! Any read or parse failure degrades to a cache miss, never an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::CacheConfig;

/// Response headers worth keeping for conditional requests.
const KEPT_HEADERS: [&str; 4] = ["etag", "last-modified", "content-type", "cache-control"];

/// Metadata for one cached body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Original URL (for debugging; the key is its hash)
    pub url: String,

    /// When the body was stored
    pub cached_at: DateTime<Utc>,

    /// Unix timestamp past which the entry is stale
    pub expires: i64,

    /// Lowercased header subset for conditional requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Filesystem-backed page cache with header-derived TTLs.
pub struct CacheStore {
    dir: PathBuf,
    config: CacheConfig,
    /// Metadata map. Lock scoped to the read-modify-write only, never held
    /// across file I/O.
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Gates metadata.json persistence; snapshots are taken under this
    /// lock so a later snapshot can never be overwritten by an earlier one.
    meta_io: tokio::sync::Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    /// Open (or create) a cache rooted at the given directory.
    ///
    /// Corrupt metadata is discarded and the cache starts empty.
    pub fn open(dir: impl Into<PathBuf>, config: CacheConfig) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let meta_path = dir.join("metadata.json");
        let entries = match std::fs::read(&meta_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Discarding corrupt cache metadata: {e}");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            dir,
            config,
            entries: Mutex::new(entries),
            meta_io: tokio::sync::Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn cache_key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))[..24].to_string()
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.html"))
    }

    /// Look up a URL. Returns the body and the stored header subset, or
    /// `None` when absent, expired or unreadable. Stale entries are deleted.
    pub async fn get(&self, url: &str) -> Option<(String, HashMap<String, String>)> {
        let key = Self::cache_key(url);
        let now = Utc::now().timestamp();

        let entry = {
            let mut entries = self.entries.lock().expect("cache metadata lock");
            match entries.get(&key) {
                Some(e) if now > e.expires => {
                    entries.remove(&key);
                    None
                }
                Some(e) => Some(e.clone()),
                None => None,
            }
        };

        let Some(entry) = entry else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            // Remove a stale body file if one was left behind
            let _ = tokio::fs::remove_file(self.body_path(&key)).await;
            self.persist_metadata().await;
            return None;
        };

        match tokio::fs::read_to_string(self.body_path(&key)).await {
            Ok(body) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some((body, entry.headers))
            }
            Err(e) => {
                log::debug!("Cache body read failed for {url}: {e}");
                self.entries
                    .lock()
                    .expect("cache metadata lock")
                    .remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.persist_metadata().await;
                None
            }
        }
    }

    /// Store a body with a TTL derived from the response headers.
    pub async fn set(&self, url: &str, body: &str, headers: &HashMap<String, String>) {
        let ttl = self.ttl_from_headers(headers);
        self.store(url, body, ttl, headers).await;
    }

    /// Store a body with an explicit TTL in seconds. Used for manual
    /// captures, which get an extended lifetime since repeating the manual
    /// step is costly.
    pub async fn set_with_ttl(&self, url: &str, body: &str, ttl_secs: u64) {
        self.store(url, body, ttl_secs, &HashMap::new()).await;
    }

    async fn store(&self, url: &str, body: &str, ttl_secs: u64, headers: &HashMap<String, String>) {
        let key = Self::cache_key(url);

        if let Err(e) = self.write_atomic(&self.body_path(&key), body.as_bytes()).await {
            log::debug!("Cache body write failed for {url}: {e}");
            return;
        }

        let now = Utc::now();
        let entry = CacheEntry {
            url: url.to_string(),
            cached_at: now,
            expires: now.timestamp() + ttl_secs as i64,
            headers: headers
                .iter()
                .filter(|(k, _)| KEPT_HEADERS.contains(&k.to_lowercase().as_str()))
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        };

        self.entries
            .lock()
            .expect("cache metadata lock")
            .insert(key, entry);
        self.persist_metadata().await;
    }

    /// TTL from a cache-control max-age, clamped to the configured bounds.
    fn ttl_from_headers(&self, headers: &HashMap<String, String>) -> u64 {
        let cc = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("cache-control"))
            .map(|(_, v)| v.as_str());

        if let Some(cc) = cc {
            if let Some(raw) = cc
                .split(',')
                .filter_map(|d| d.trim().strip_prefix("max-age="))
                .next()
            {
                if let Ok(secs) = raw.trim().parse::<u64>() {
                    return secs.clamp(self.config.min_ttl_secs, self.config.max_ttl_secs);
                }
            }
        }
        self.config.default_ttl_secs
    }

    /// Write the current metadata snapshot to disk (atomic, ordered).
    async fn persist_metadata(&self) {
        // Snapshot under the writer gate: serializing before taking it
        // would let an older snapshot win the race and be written last
        let _guard = self.meta_io.lock().await;
        let snapshot = {
            let entries = self.entries.lock().expect("cache metadata lock");
            serde_json::to_vec_pretty(&*entries)
        };
        let bytes = match snapshot {
            Ok(b) => b,
            Err(e) => {
                log::debug!("Cache metadata serialize failed: {e}");
                return;
            }
        };

        if let Err(e) = self.write_atomic(&self.dir.join("metadata.json"), &bytes).await {
            log::debug!("Cache metadata write failed: {e}");
        }
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_atomic(&self, path: &PathBuf, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// (hits, misses) counters for run statistics.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Expiry timestamp recorded for a URL, if cached. Mainly for tests
    /// and diagnostics.
    pub fn expires_at(&self, url: &str) -> Option<i64> {
        let key = Self::cache_key(url);
        self.entries
            .lock()
            .expect("cache metadata lock")
            .get(&key)
            .map(|e| e.expires)
    }
}
