//! Runtime configuration
//!
//! Holds the knobs that belong to the host process rather than to a
//! particular setup: cache location and TTL, retry policy, and the prompt
//! window. Constructed explicitly and handed to the runtime; environment
//! overrides are applied only where the caller asks for them.

use crate::constants::{CACHE_FILE_NAME, DEFAULT_CACHE_TTL_SECS};
use crate::llm::RetryConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Response cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Backing file; `None` keeps the cache in memory only.
    pub path: Option<PathBuf>,
    /// Lifetime of stored entries.
    pub ttl: Duration,
    /// Log hit/miss decisions and fingerprints at debug level.
    pub debug: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            debug: false,
        }
    }
}

impl CacheConfig {
    /// Cache file inside the user's cache directory, falling back to the
    /// working directory when the platform offers none.
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convoke")
            .join(CACHE_FILE_NAME)
    }
}

/// Host-level runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    /// How many prior messages feed each prompt; `None` means the full
    /// transcript.
    pub prompt_window: Option<usize>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `CONVOKE_*` environment overrides on top of the current
    /// values.
    pub fn apply_env(mut self) -> Self {
        if let Ok(path) = std::env::var("CONVOKE_CACHE_FILE") {
            if !path.trim().is_empty() {
                self.cache.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(ttl) = std::env::var("CONVOKE_CACHE_TTL_SECS") {
            if let Ok(secs) = ttl.parse::<u64>() {
                self.cache.ttl = Duration::from_secs(secs);
            }
        }
        if let Ok(flag) = std::env::var("CONVOKE_CACHE_DEBUG") {
            self.cache.debug = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(window) = std::env::var("CONVOKE_PROMPT_WINDOW") {
            if let Ok(n) = window.parse::<usize>() {
                self.prompt_window = Some(n);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_with_three_day_ttl() {
        let config = RuntimeConfig::new();
        assert!(config.cache.path.is_none());
        assert_eq!(config.cache.ttl, Duration::from_secs(3 * 24 * 60 * 60));
        assert!(config.prompt_window.is_none());
    }

    #[test]
    fn default_cache_path_ends_with_the_cache_file_name() {
        let path = CacheConfig::default_path();
        assert!(path.ends_with(PathBuf::from("convoke").join(CACHE_FILE_NAME)));
    }
}
