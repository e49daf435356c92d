//! Keyed TTL cache for LLM answers and advisory lookups.
//!
//! One JSON file per entry, named by the SHA-256 of `{"ns": namespace, ...params}`
//! serialized with sorted keys. Entries carry their write time and TTL; expired or
//! unreadable entries are deleted on read and reported as misses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ScoutError;

#[derive(Debug, Clone)]
pub struct TtlCache {
    dir: Option<PathBuf>,
    ttl: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    data: serde_json::Value,
    cached_at: i64,
    ttl: u64,
}

impl TtlCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: Some(dir.into()),
            ttl,
        }
    }

    /// A cache that never hits and never writes.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        params: &serde_json::Value,
    ) -> Option<T> {
        let dir = self.dir.as_deref()?;
        let path = entry_path(dir, namespace, params);
        let raw = tokio::fs::read(&path).await.ok()?;

        let entry = match serde_json::from_slice::<CacheEntry>(&raw) {
            Ok(entry) => entry,
            Err(_) => {
                evict(&path, namespace).await;
                return None;
            }
        };

        let age = now_unix().saturating_sub(entry.cached_at).max(0) as u64;
        if age > entry.ttl {
            debug!(namespace, age, "Cache expired");
            evict(&path, namespace).await;
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(value) => {
                debug!(namespace, "Cache hit");
                Some(value)
            }
            Err(_) => {
                evict(&path, namespace).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        params: &serde_json::Value,
        data: &T,
        ttl: Option<Duration>,
    ) -> Result<(), ScoutError> {
        let Some(dir) = self.dir.as_deref() else {
            return Ok(());
        };
        let entry = CacheEntry {
            data: serde_json::to_value(data)?,
            cached_at: now_unix(),
            ttl: ttl.unwrap_or(self.ttl).as_secs(),
        };
        let path = entry_path(dir, namespace, params);
        save_atomic(&path, &serde_json::to_vec(&entry)?).await
    }
}

/// Deterministic hex digest over the namespace and the params (object keys sorted).
pub fn cache_key(namespace: &str, params: &serde_json::Value) -> String {
    let mut keyed: BTreeMap<&str, &serde_json::Value> = BTreeMap::new();
    let ns = serde_json::Value::String(namespace.to_string());
    keyed.insert("ns", &ns);
    match params {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                keyed.insert(k.as_str(), v);
            }
        }
        other => {
            keyed.insert("params", other);
        }
    }
    let canonical = serde_json::to_string(&keyed).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn entry_path(dir: &Path, namespace: &str, params: &serde_json::Value) -> PathBuf {
    dir.join(format!("{}.json", cache_key(namespace, params)))
}

/// Removes a dead entry. Failures are logged and otherwise ignored.
async fn evict(path: &Path, namespace: &str) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(err) => {
            debug!(namespace, path = %path.display(), "Failed to remove cache entry: {err}");
            false
        }
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

async fn save_atomic(path: &Path, content: &[u8]) -> Result<(), ScoutError> {
    let Some(dir) = path.parent() else {
        return Err(ScoutError::InvalidArgument(
            "Invalid cache path (no parent directory)".into(),
        ));
    };
    tokio::fs::create_dir_all(dir).await?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("entry");
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut opened = None;
    for attempt in 0..32_u32 {
        let candidate = dir.join(format!(
            ".{stem}.{}.{}.tmp",
            std::process::id(),
            seed.saturating_add(attempt as u128)
        ));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => {
                opened = Some((candidate, file));
                break;
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
    let Some((tmp_path, mut file)) = opened else {
        return Err(ScoutError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "Unable to allocate temporary cache file",
        )));
    };
    file.write_all(content).await?;
    file.flush().await?;
    drop(file);

    // Last write wins: entries for the same key are interchangeable.
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn scratch_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!(
        "indication-scout-test-{label}-{}-{nanos}",
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_is_deterministic_and_order_independent() {
        let a = cache_key("organ_term", &json!({"disease_name": "colorectal cancer", "x": 1}));
        let b = cache_key("organ_term", &json!({"x": 1, "disease_name": "colorectal cancer"}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn cache_key_separates_namespaces_and_params() {
        let params = json!({"disease_name": "colorectal cancer"});
        assert_ne!(cache_key("organ_term", &params), cache_key("disease_norm", &params));
        assert_ne!(
            cache_key("organ_term", &params),
            cache_key("organ_term", &json!({"disease_name": "lung cancer"}))
        );
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = TtlCache::new(scratch_dir("roundtrip"), Duration::from_secs(60));
        let params = json!({"raw_term": "atopic eczema"});
        cache
            .set("disease_norm", &params, &"eczema OR dermatitis", None)
            .await
            .unwrap();

        let hit: Option<String> = cache.get("disease_norm", &params).await;
        assert_eq!(hit.as_deref(), Some("eczema OR dermatitis"));
        let miss: Option<String> = cache.get("disease_norm", &json!({"raw_term": "other"})).await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_misses_and_deleted() {
        let dir = scratch_dir("expired");
        let cache = TtlCache::new(&dir, Duration::from_secs(60));
        let params = json!({"query": "metformin AND (colon)"});

        let stale = CacheEntry {
            data: json!(42),
            cached_at: now_unix() - 120,
            ttl: 60,
        };
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = entry_path(&dir, "pubmed_count", &params);
        tokio::fs::write(&path, serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();

        let hit: Option<u64> = cache.get("pubmed_count", &params).await;
        assert!(hit.is_none());
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn corrupt_entries_are_misses() {
        let dir = scratch_dir("corrupt");
        let cache = TtlCache::new(&dir, Duration::from_secs(60));
        let params = json!({"k": "v"});
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = entry_path(&dir, "ns", &params);
        tokio::fs::write(&path, b"{truncated").await.unwrap();

        let hit: Option<String> = cache.get("ns", &params).await;
        assert!(hit.is_none());
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn evict_reports_failed_delete_without_erroring() {
        let dir = scratch_dir("evict");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = entry_path(&dir, "ns", &json!({"k": "gone"}));
        assert!(!evict(&path, "ns").await);

        tokio::fs::write(&path, b"{}").await.unwrap();
        assert!(evict(&path, "ns").await);
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = TtlCache::disabled();
        let params = json!({"k": "v"});
        cache.set("ns", &params, &"value", None).await.unwrap();
        let hit: Option<String> = cache.get("ns", &params).await;
        assert!(hit.is_none());
        assert!(!cache.is_enabled());
    }
}
