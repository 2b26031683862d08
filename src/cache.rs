use dashmap::DashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::clock::Clock;
use crate::metrics::{CACHE_HITS, CACHE_MISSES};

pub const CACHE_PREFIX: &str = "cache_";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Stored key is not valid: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

// Persistent string key/value store the cache writes through
pub trait KvStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

// In-process store, lost on restart
#[derive(Default)]
pub struct MemoryStore {
    items: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.items.iter().map(|e| e.key().clone()).collect())
    }
}

// One file per key, file name is the hex encoded key
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(hex::encode(key.as_bytes()))
    }
}

impl KvStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        // unique temp file per write, then rename so readers never see half a file
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(".tmp") {
                continue;
            }
            let bytes =
                hex::decode(name).map_err(|_| StoreError::InvalidKey(name.to_string()))?;
            let key =
                String::from_utf8(bytes).map_err(|_| StoreError::InvalidKey(name.to_string()))?;
            keys.push(key);
        }
        Ok(keys)
    }
}

// Cache entry as persisted: payload, creation time (ms) and ttl (ms)
#[derive(Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) > self.ttl
    }
}

// TTL cache over a KvStore.
// Expired entries are only removed when they are read again, there is no sweep.
pub struct TtlCache {
    store: Arc<dyn KvStore>,
    prefix: String,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KvStore>, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            prefix: CACHE_PREFIX.to_string(),
            default_ttl,
            clock,
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data: value,
            timestamp: self.clock.now_ms(),
            ttl: ttl.unwrap_or(self.default_ttl).as_millis() as u64,
        };
        let json = serde_json::to_string(&entry)?;
        self.store.set_item(&self.namespaced(key), &json)?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.lookup(key) {
            Ok(Some(data)) => {
                CACHE_HITS.inc();
                tracing::debug!(key, "Cache HIT");
                Some(data)
            }
            Ok(None) => {
                CACHE_MISSES.inc();
                tracing::debug!(key, "Cache MISS");
                None
            }
            Err(CacheError::Parse(e)) => {
                CACHE_MISSES.inc();
                tracing::warn!(key, "Discarding corrupted cache entry: {}", e);
                if let Err(e) = self.store.remove_item(&self.namespaced(key)) {
                    tracing::warn!(key, "Failed to remove corrupted cache entry: {}", e);
                }
                None
            }
            Err(e) => {
                CACHE_MISSES.inc();
                tracing::warn!(key, "Cache read failed: {}", e);
                None
            }
        }
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let namespaced = self.namespaced(key);
        let Some(raw) = self.store.get_item(&namespaced)? else {
            return Ok(None);
        };

        let entry: CacheEntry<T> = serde_json::from_str(&raw)?;
        if entry.is_expired(self.clock.now_ms()) {
            self.store.remove_item(&namespaced)?;
            return Ok(None);
        }

        Ok(Some(entry.data))
    }

    // Remove one entry, or every entry under the cache prefix
    pub fn clear(&self, key: Option<&str>) -> Result<(), CacheError> {
        match key {
            Some(key) => self.store.remove_item(&self.namespaced(key))?,
            None => {
                for k in self.store.keys()? {
                    if k.starts_with(&self.prefix) {
                        self.store.remove_item(&k)?;
                    }
                }
            }
        }
        Ok(())
    }
}

// Create a cache key (hash of model + request parts)
pub fn make_cache_key(model: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model);
    for part in parts {
        // length prefix keeps ["ab", "c"] and ["a", "bc"] apart
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}
