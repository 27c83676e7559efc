//! Content-addressed cache for mask batches and image embeddings
//!
//! Entries are keyed by the SHA-256 of the raw image bytes, so re-uploading
//! the same picture under another name still hits. Entries older than the
//! configured TTL read as misses and are replaced by the next `put`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use super::store::{CacheStore, JsonFileStore, MemoryStore};
use crate::config::EngineConfig;
use crate::domain::mask::base64_bytes;
use crate::domain::{GenerationParams, Mask};

const MASKS_PREFIX: &str = "masks/";
const EMBEDDING_PREFIX: &str = "embedding/";

/// Lowercase hex SHA-256 of the image bytes
pub fn image_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A cached mask batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub image_hash: String,
    pub masks: Vec<Mask>,
    pub params: GenerationParams,
    pub timestamp: DateTime<Utc>,
}

/// A cached image embedding; the bytes are opaque to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub image_hash: String,
    #[serde(with = "base64_bytes")]
    pub embedding: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStatus {
    /// Live mask batches
    pub entries: usize,
    pub total_cached_masks: usize,
    /// Live embeddings
    pub embeddings: usize,
    pub enabled: bool,
}

trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for CacheEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for EmbeddingEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

pub struct CacheManager {
    store: Box<dyn CacheStore>,
    ttl: Duration,
    enabled: bool,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    pub fn new(store: Box<dyn CacheStore>, ttl: Duration, enabled: bool) -> Self {
        Self {
            store,
            ttl,
            enabled,
        }
    }

    /// File-backed cache under the configured cache directory
    pub fn from_config(config: &EngineConfig) -> Self {
        let dir = config.cache_dir();
        log::debug!("Mask cache at {}", dir.display());
        Self::new(
            Box::new(JsonFileStore::new(dir)),
            Duration::hours(i64::from(config.cache_ttl_hours)),
            config.cache_enabled,
        )
    }

    /// Memory-backed cache with the configured TTL and switch
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::new(
            Box::new(MemoryStore::new()),
            Duration::hours(i64::from(config.cache_ttl_hours)),
            config.cache_enabled,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(timestamp) > self.ttl
    }

    /// Read and decode a key; errors and corrupt values are logged misses
    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = match self.store.get(key) {
            Ok(text) => text?,
            Err(err) => {
                log::warn!("Cache read failed for {}: {:#}", key, err);
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("Ignoring corrupt cache entry {}: {}", key, err);
                None
            }
        }
    }

    fn read_live<T: DeserializeOwned + Timestamped>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let value: T = self.read(key)?;
        if self.is_expired(value.timestamp(), now) {
            log::info!("Cache entry {} expired", key);
            return None;
        }
        Some(value)
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) -> bool {
        if !self.enabled {
            return false;
        }
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                log::error!("Failed to serialize cache entry {}: {}", key, err);
                return false;
            }
        };
        match self.store.put(key, json) {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to write cache entry {}: {:#}", key, err);
                false
            }
        }
    }

    // ========================================================================
    // Mask batches
    // ========================================================================

    pub fn get(&self, hash: &str) -> Option<CacheEntry> {
        self.get_at(hash, Utc::now())
    }

    /// Lookup as of `now`
    pub fn get_at(&self, hash: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry: CacheEntry = self.read_live(&format!("{MASKS_PREFIX}{hash}"), now)?;
        log::debug!("Cache hit for {} ({} masks)", hash, entry.masks.len());
        Some(entry)
    }

    /// Store a batch; returns false if the cache is disabled or the write failed
    pub fn put(&mut self, hash: &str, masks: &[Mask], params: GenerationParams) -> bool {
        self.put_at(hash, masks, params, Utc::now())
    }

    pub fn put_at(
        &mut self,
        hash: &str,
        masks: &[Mask],
        params: GenerationParams,
        now: DateTime<Utc>,
    ) -> bool {
        let entry = CacheEntry {
            image_hash: hash.to_string(),
            masks: masks.to_vec(),
            params,
            timestamp: now,
        };
        let written = self.write(&format!("{MASKS_PREFIX}{hash}"), &entry);
        if written {
            log::info!("Cached {} masks for {}", masks.len(), hash);
        }
        written
    }

    // ========================================================================
    // Embeddings
    // ========================================================================

    pub fn get_embedding(&self, hash: &str) -> Option<Vec<u8>> {
        self.get_embedding_at(hash, Utc::now())
    }

    pub fn get_embedding_at(&self, hash: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let entry: EmbeddingEntry = self.read_live(&format!("{EMBEDDING_PREFIX}{hash}"), now)?;
        Some(entry.embedding)
    }

    pub fn put_embedding(&mut self, hash: &str, embedding: Vec<u8>) -> bool {
        self.put_embedding_at(hash, embedding, Utc::now())
    }

    pub fn put_embedding_at(&mut self, hash: &str, embedding: Vec<u8>, now: DateTime<Utc>) -> bool {
        let entry = EmbeddingEntry {
            image_hash: hash.to_string(),
            embedding,
            timestamp: now,
        };
        self.write(&format!("{EMBEDDING_PREFIX}{hash}"), &entry)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop every entry; returns how many were removed
    pub fn clear(&mut self) -> usize {
        match self.store.clear() {
            Ok(count) => {
                log::info!("Cleared {} cache entries", count);
                count
            }
            Err(err) => {
                log::error!("Failed to clear cache: {:#}", err);
                0
            }
        }
    }

    pub fn status(&self) -> CacheStatus {
        self.status_at(Utc::now())
    }

    /// Count live entries as of `now`
    pub fn status_at(&self, now: DateTime<Utc>) -> CacheStatus {
        let mut status = CacheStatus {
            enabled: self.enabled,
            ..Default::default()
        };
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                log::warn!("Failed to list cache: {:#}", err);
                return status;
            }
        };
        for key in keys {
            if key.starts_with(MASKS_PREFIX) {
                if let Some(entry) = self.read::<CacheEntry>(&key)
                    && !self.is_expired(entry.timestamp, now)
                {
                    status.entries += 1;
                    status.total_cached_masks += entry.masks.len();
                }
            } else if key.starts_with(EMBEDDING_PREFIX)
                && let Some(entry) = self.read::<EmbeddingEntry>(&key)
                && !self.is_expired(entry.timestamp, now)
            {
                status.embeddings += 1;
            }
        }
        status
    }
}
