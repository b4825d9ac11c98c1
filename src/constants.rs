//! Shared constants for caching, retry behavior, and transcript output.

/// Default lifetime of a cached response (3 days).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3 * 24 * 60 * 60;

/// File name of the response cache inside the cache directory.
pub const CACHE_FILE_NAME: &str = "responses.json";

/// Speaker name used for system-authored transcript messages
/// (goal checks, failure placeholders).
pub const SYSTEM_SPEAKER: &str = "System";

/// Speaker name manager overhead is attributed to in usage accounting.
pub const MANAGER_SPEAKER: &str = "Manager";

/// Constant system primer sent with every character request.
/// Must stay constant: it is not part of the cache fingerprint.
pub const SYSTEM_PRIMER: &str =
    "You are a role-playing participant in a simulated meeting. Stay in character \
     and keep your replies concise.";

/// Reading speed used for the reading-time soft limit (words per minute).
pub const READING_WPM: u32 = 200;

/// Default maximum generation attempts per turn.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between retries (1 second).
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Maximum waiting time between retries (30 seconds).
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Default per-attempt request timeout for model calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Prefix for transcript log files.
pub const LOG_FILE_PREFIX: &str = "meeting_log";

/// Failed turns a character may accumulate before being excused from
/// further selection. Keeps a persistently failing backend from stalling
/// the rotation forever.
pub const MAX_TURN_FAILURES: u32 = 2;
