use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    endpoint: String,
    fetched_at: u64,
    body: String,
}

/// Where a body handed out by [`ApiCache::get_or_fetch`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHit {
    Fresh,
    Fetched,
    Stale,
}

/// File-per-request response cache keyed by endpoint + params.
#[derive(Debug, Clone)]
pub struct ApiCache {
    dir: PathBuf,
}

impl ApiCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Body cached for this request if it is younger than `max_age`.
    pub fn get(&self, endpoint: &str, params: &[(&str, &str)], max_age: Duration) -> Option<String> {
        let entry = self.load_entry(endpoint, params)?;
        let now = system_time_to_secs(SystemTime::now()).unwrap_or_default();
        let age = now.saturating_sub(entry.fetched_at);
        if age > max_age.as_secs() {
            debug!(endpoint, age, "api cache entry expired");
            return None;
        }
        Some(entry.body)
    }

    /// Body cached for this request regardless of age.
    pub fn get_stale(&self, endpoint: &str, params: &[(&str, &str)]) -> Option<String> {
        self.load_entry(endpoint, params).map(|e| e.body)
    }

    pub fn store(&self, endpoint: &str, params: &[(&str, &str)], body: &str) -> Result<()> {
        self.store_at(endpoint, params, body, SystemTime::now())
    }

    pub fn store_at(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        body: &str,
        fetched_at: SystemTime,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).context("create api cache dir")?;
        let path = self.entry_path(endpoint, params);
        let entry = CacheEntry {
            version: CACHE_VERSION,
            endpoint: endpoint.to_string(),
            fetched_at: system_time_to_secs(fetched_at).unwrap_or_default(),
            body: body.to_string(),
        };
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&entry).context("serialize api cache entry")?;
        fs::write(&tmp, json).context("write api cache entry")?;
        fs::rename(&tmp, &path).context("swap api cache entry")?;
        Ok(())
    }

    /// Serves a fresh cached body, otherwise calls `fetch` and caches its result.
    /// When `fetch` fails, an expired entry is served instead of the error.
    pub fn get_or_fetch(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        max_age: Duration,
        fetch: impl FnOnce() -> Result<String>,
    ) -> Result<(String, CacheHit)> {
        if let Some(body) = self.get(endpoint, params, max_age) {
            return Ok((body, CacheHit::Fresh));
        }
        match fetch() {
            Ok(body) => {
                if let Err(err) = self.store(endpoint, params, &body) {
                    warn!(endpoint, "failed to cache response: {err:#}");
                }
                Ok((body, CacheHit::Fetched))
            }
            Err(err) => match self.get_stale(endpoint, params) {
                Some(body) => {
                    warn!(endpoint, "fetch failed, serving stale cache: {err:#}");
                    Ok((body, CacheHit::Stale))
                }
                None => Err(err),
            },
        }
    }

    pub fn entry_path(&self, endpoint: &str, params: &[(&str, &str)]) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(endpoint, params)))
    }

    fn load_entry(&self, endpoint: &str, params: &[(&str, &str)]) -> Option<CacheEntry> {
        let raw = fs::read_to_string(self.entry_path(endpoint, params)).ok()?;
        let entry = serde_json::from_str::<CacheEntry>(&raw).ok()?;
        if entry.version != CACHE_VERSION || entry.endpoint != endpoint {
            return None;
        }
        Some(entry)
    }
}

/// Stable key: params are sorted so their order does not matter. Secrets
/// (`key`, `apiKey`) are left out so rotating a key keeps the cache.
pub fn cache_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params
        .iter()
        .copied()
        .filter(|(k, _)| !matches!(*k, "key" | "apiKey" | "api_key"))
        .collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    for (k, v) in sorted {
        hasher.update(b"\x1f");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_param_order_and_secrets() {
        let a = cache_key("league-teams", &[("season_id", "1625"), ("key", "abc")]);
        let b = cache_key("league-teams", &[("key", "zzz"), ("season_id", "1625")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, cache_key("league-teams", &[("season_id", "1626")]));
        assert_ne!(a, cache_key("team", &[("season_id", "1625")]));
    }
}
