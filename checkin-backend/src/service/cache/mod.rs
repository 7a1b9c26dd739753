use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use crate::shared::config;
use crate::shared::entities::UnifiedResult;
use crate::shared::utils::short_key;

const HASH_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug)]
struct CacheEntry {
    data: UnifiedResult,
    timestamp: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    /// Serialized size of the cached results, in bytes.
    pub approx_memory_usage: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Transcription results keyed by the SHA-256 of the audio content.
///
/// Expired entries are never returned: `get` deletes them on sight, and
/// [`prune_expired`](Self::prune_expired) sweeps the rest. Once `max_entries` is
/// reached, the oldest tenth is evicted before the next insert, under the same lock.
pub struct ContentAddressedCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
    max_entries: usize,
}

impl ContentAddressedCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_env() -> Self {
        let cfg = config::cache_config();
        Self::new(cfg.ttl, cfg.max_entries)
    }

    /// Looks up a cached result for the file's content. Hashing failures count as a miss.
    pub async fn get(&self, audio_path: &Path) -> Option<UnifiedResult> {
        match hash_file(audio_path).await {
            Ok(key) => self.get_by_key(&key).await,
            Err(err) => {
                log::warn!(
                    "[cache] hashing failed, treating as miss ({}): {}",
                    audio_path.display(),
                    err
                );
                None
            }
        }
    }

    /// Best-effort store; hashing failures are logged and ignored.
    pub async fn set(&self, audio_path: &Path, data: &UnifiedResult) {
        match hash_file(audio_path).await {
            Ok(key) => self.set_by_key(key, data.clone()).await,
            Err(err) => {
                log::warn!(
                    "[cache] hashing failed, result not cached ({}): {}",
                    audio_path.display(),
                    err
                );
            }
        }
    }

    pub async fn get_by_key(&self, key: &str) -> Option<UnifiedResult> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            None => {
                log::debug!("[cache] miss key={}", short_key(key));
                return None;
            }
            Some(entry) => now >= entry.expires_at,
        };
        if expired {
            entries.remove(key);
            log::debug!("[cache] expired key={}", short_key(key));
            return None;
        }
        log::info!("[cache] hit key={}", short_key(key));
        entries.get(key).map(|entry| entry.data.clone())
    }

    pub async fn set_by_key(&self, key: String, data: UnifiedResult) {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let evicted = evict_oldest_locked(&mut entries, (self.max_entries / 10).max(1));
            log::info!("[cache] evicted {} oldest entries", evicted);
        }
        log::debug!("[cache] store key={}", short_key(&key));
        entries.insert(
            key,
            CacheEntry {
                data,
                timestamp: now,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Removes every expired entry; returns how many were dropped.
    pub async fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        let pruned = before - entries.len();
        if pruned > 0 {
            log::info!("[cache] pruned {} expired entries", pruned);
        }
        pruned
    }

    /// Evicts the `count` entries with the oldest insertion timestamps.
    pub async fn evict_oldest(&self, count: usize) -> usize {
        let mut entries = self.entries.lock().await;
        evict_oldest_locked(&mut entries, count)
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        let approx_memory_usage = entries
            .iter()
            .map(|(key, entry)| key.len() + serde_json::to_vec(&entry.data).map_or(0, |v| v.len()))
            .sum();
        CacheStats {
            total_entries: entries.len(),
            approx_memory_usage,
            oldest_entry: entries.values().map(|entry| entry.timestamp).min(),
            newest_entry: entries.values().map(|entry| entry.timestamp).max(),
        }
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        log::info!("[cache] cleared {} entries", count);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

fn evict_oldest_locked(entries: &mut HashMap<String, CacheEntry>, count: usize) -> usize {
    if count == 0 || entries.is_empty() {
        return 0;
    }
    let mut by_age: Vec<(DateTime<Utc>, String)> = entries
        .iter()
        .map(|(key, entry)| (entry.timestamp, key.clone()))
        .collect();
    by_age.sort();
    let mut evicted = 0;
    for (_, key) in by_age.into_iter().take(count) {
        if entries.remove(&key).is_some() {
            evicted += 1;
        }
    }
    evicted
}

/// Hex SHA-256 of the file content, read in chunks.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
