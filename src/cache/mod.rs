//! Response cache with expiry and durable storage
//!
//! Content-addressed store mapping request fingerprints to previously
//! computed completions. Entries expire after a TTL; expired entries are
//! never returned as hits. The cache persists to a single JSON file using
//! a write-new-then-rename strategy so a crash mid-write never corrupts
//! previously stored entries. One cache instance is shared by all
//! concurrent runs.

pub mod fingerprint;

pub use fingerprint::{fingerprint, normalize_prompt};

use crate::llm::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// A cached completion. Mutated only by insertion and pruning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub response: String,
    pub usage: Usage,
    /// Unix timestamp (seconds) when the entry was stored.
    pub created_at: i64,
    /// Unix timestamp (seconds) after which the entry is a miss.
    pub expires_at: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

/// On-disk shape of the cache file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

const CACHE_FILE_VERSION: u32 = 1;

/// Shared response cache.
///
/// Constructed explicitly and passed by reference; opened at run start and
/// written through on every store. Concurrent lookups and stores are
/// serialized by an internal mutex; a lost update between two identical
/// fingerprint computations is harmless because stores are idempotent.
pub struct ResponseCache {
    path: Option<PathBuf>,
    debug: bool,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Open a cache backed by the given file, loading any existing entries.
    ///
    /// An unreadable or corrupt file degrades to an empty cache with a
    /// logged warning; the conversation continues uncached rather than
    /// failing.
    pub fn open(path: impl Into<PathBuf>, debug: bool) -> Self {
        let path = path.into();
        let entries = match load_entries(&path) {
            Ok(entries) => {
                debug!(path = %path.display(), count = entries.len(), "loaded response cache");
                entries
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "response cache unreadable, starting empty"
                );
                HashMap::new()
            }
        };

        Self {
            path: Some(path),
            debug,
            entries: Mutex::new(entries),
        }
    }

    /// A cache that lives only for the process. Used by tests and callers
    /// that explicitly opt out of persistence.
    pub fn in_memory(debug: bool) -> Self {
        Self {
            path: None,
            debug,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a fingerprint. Expired entries are misses.
    pub fn lookup(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entries = self.entries.lock().unwrap();
        let hit = entries
            .get(fingerprint)
            .filter(|entry| !entry.is_expired(now))
            .cloned();

        if self.debug {
            match &hit {
                Some(entry) => debug!(
                    fingerprint = &fingerprint[..8.min(fingerprint.len())],
                    expires_at = entry.expires_at,
                    "cache hit"
                ),
                None => debug!(
                    fingerprint = &fingerprint[..8.min(fingerprint.len())],
                    "cache miss"
                ),
            }
        }

        hit
    }

    /// Store a completion under its fingerprint.
    ///
    /// Storing an existing fingerprint overwrites idempotently. Persistence
    /// failures are logged and non-fatal: the in-memory entry still serves
    /// this process.
    pub fn store(&self, fingerprint: &str, response: &str, usage: Usage, ttl: Duration, now: DateTime<Utc>) {
        let entry = CacheEntry {
            response: response.to_string(),
            usage,
            created_at: now.timestamp(),
            expires_at: now.timestamp() + ttl.as_secs() as i64,
        };

        let mut entries = self.entries.lock().unwrap();
        entries.insert(fingerprint.to_string(), entry);
        if self.debug {
            debug!(
                fingerprint = &fingerprint[..8.min(fingerprint.len())],
                total = entries.len(),
                "cache store"
            );
        }
        self.persist(&entries);
    }

    /// Remove all expired entries. Opportunistic: never required for
    /// correctness, only for bounded storage growth.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "pruned expired cache entries");
            self.persist(&entries);
        }
        removed
    }

    /// Drop every entry and delete the backing file.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
        if let Some(path) = &self.path {
            if path.exists() {
                if let Err(err) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %err, "failed to remove cache file");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the whole entry map to `<path>.tmp`, then rename over the
    /// target. The rename is the commit point.
    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        let Some(path) = &self.path else {
            return;
        };

        let file = CacheFile {
            version: CACHE_FILE_VERSION,
            entries: entries.clone(),
        };

        if let Err(err) = write_atomically(path, &file) {
            warn!(path = %path.display(), error = %err, "failed to persist response cache");
        }
    }
}

fn load_entries(path: &Path) -> std::io::Result<HashMap<String, CacheEntry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let file: CacheFile = serde_json::from_str(&raw)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    Ok(file.entries)
}

fn write_atomically(path: &Path, file: &CacheFile) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    let payload = serde_json::to_string_pretty(file)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    std::fs::write(&tmp, payload)?;
    std::fs::rename(&tmp, path)
}
