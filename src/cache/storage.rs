//! Durable key-value storage and cache envelopes.
//!
//! Every durable entry is one JSON blob per key in the storage
//! directory, with keys carrying a `_v1` version suffix. A
//! [`CacheEnvelope`] pairs a payload with its fetch timestamp;
//! freshness is always derived from the timestamp, never stored.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

/// Cached payloads go stale after 5 minutes.
pub const CACHE_DURATION_SECS: i64 = 5 * 60;

/// Durable key for the session blob
pub const SESSION_KEY: &str = "session_v1";

/// Durable key for the course-catalog envelope
pub const COURSES_KEY: &str = "courses_v1";

/// Durable key for the offline cart/enrollment mirror
pub const CART_KEY: &str = "cart_v1";

/// Durable key for a user's progress envelope
pub fn progress_key(user_id: &str) -> String {
    format!("progress_{}_v1", user_id)
}

/// A cached payload paired with its fetch timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub data: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
        }
    }

    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.fetched_at).num_seconds()
    }

    /// Fresh iff fetched less than [`CACHE_DURATION_SECS`] ago.
    /// Clock skew producing a future timestamp counts as fresh.
    pub fn is_fresh(&self) -> bool {
        self.age_seconds() < CACHE_DURATION_SECS
    }
}

/// Plain JSON blob storage, one file per key.
/// Clone is cheap and every clone points at the same directory.
#[derive(Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.blob_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read storage blob: {}", key))?;

        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse storage blob: {}", key))?;

        Ok(Some(value))
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(value)?;
        std::fs::write(self.blob_path(key), contents)
            .with_context(|| format!("Failed to write storage blob: {}", key))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove storage blob: {}", key))?;
        }
        Ok(())
    }

    /// Load a cache envelope, treating unreadable blobs as absent.
    pub fn load_envelope<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEnvelope<T>> {
        match self.load(key) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(key, error = %e, "Failed to load cache envelope");
                None
            }
        }
    }

    /// Best-effort envelope write; a failed write costs a refetch, not
    /// an error to the caller.
    pub fn save_envelope<T: Serialize>(&self, key: &str, envelope: &CacheEnvelope<T>) {
        if let Err(e) = self.save(key, envelope) {
            warn!(key, error = %e, "Failed to write cache envelope");
        }
    }
}
