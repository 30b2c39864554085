//! Sync configuration parsed from environment variables.

use std::time::Duration;

use crate::error::ConfigError;
use crate::ident::IdScheme;
use crate::merge::MergePolicy;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3000/ws";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_DEDUPE_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_CURSOR_INTERVAL_MS: u64 = 33;
pub const DEFAULT_MIN_SHAPE_SIZE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub api_url: String,
    pub ws_url: String,
    pub timeouts: HttpTimeouts,
    /// Period of the self-healing deduplication sweep.
    pub dedupe_interval: Duration,
    /// Minimum spacing between outbound cursor broadcasts.
    pub cursor_interval: Duration,
    /// Drag-out shapes at or below this extent are discarded as clicks.
    pub min_shape_size: f64,
    pub merge_policy: MergePolicy,
    pub id_scheme: IdScheme,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            timeouts: HttpTimeouts {
                request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            dedupe_interval: Duration::from_millis(DEFAULT_DEDUPE_INTERVAL_MS),
            cursor_interval: Duration::from_millis(DEFAULT_CURSOR_INTERVAL_MS),
            min_shape_size: DEFAULT_MIN_SHAPE_SIZE,
            merge_policy: MergePolicy::default(),
            id_scheme: IdScheme::default(),
        }
    }
}

impl SyncConfig {
    /// Build typed config from environment variables.
    ///
    /// All optional:
    /// - `BOARDSYNC_API_URL`: REST base URL
    /// - `BOARDSYNC_WS_URL`: realtime socket URL
    /// - `BOARDSYNC_REQUEST_TIMEOUT_SECS`: default 10
    /// - `BOARDSYNC_CONNECT_TIMEOUT_SECS`: default 5
    /// - `BOARDSYNC_DEDUPE_INTERVAL_MS`: default 5000
    /// - `BOARDSYNC_CURSOR_INTERVAL_MS`: default 33, `0` disables throttling
    /// - `BOARDSYNC_MIN_SHAPE_SIZE`: default 5.0
    /// - `BOARDSYNC_MERGE_POLICY`: `optimistic` (default), `local_wins`, `remote_wins`
    /// - `BOARDSYNC_ID_SCHEME`: `timestamp` (default) or `uuid`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that are present but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let api_url = env_string("BOARDSYNC_API_URL").unwrap_or(defaults.api_url);
        let ws_url = env_string("BOARDSYNC_WS_URL").unwrap_or(defaults.ws_url);
        let timeouts = HttpTimeouts {
            request: Duration::from_secs(env_parse("BOARDSYNC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?),
            connect: Duration::from_secs(env_parse("BOARDSYNC_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?),
        };
        let dedupe_ms = env_parse("BOARDSYNC_DEDUPE_INTERVAL_MS", DEFAULT_DEDUPE_INTERVAL_MS)?;
        if dedupe_ms == 0 {
            return Err(ConfigError::Invalid { var: "BOARDSYNC_DEDUPE_INTERVAL_MS", reason: "must be positive".into() });
        }
        let cursor_ms = env_parse("BOARDSYNC_CURSOR_INTERVAL_MS", DEFAULT_CURSOR_INTERVAL_MS)?;
        let min_shape_size = env_parse("BOARDSYNC_MIN_SHAPE_SIZE", DEFAULT_MIN_SHAPE_SIZE)?;
        if !min_shape_size.is_finite() || min_shape_size < 0.0 {
            return Err(ConfigError::Invalid {
                var: "BOARDSYNC_MIN_SHAPE_SIZE",
                reason: format!("expected a non-negative number, got {min_shape_size}"),
            });
        }
        let merge_policy = match env_string("BOARDSYNC_MERGE_POLICY") {
            None => defaults.merge_policy,
            Some(raw) => MergePolicy::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "BOARDSYNC_MERGE_POLICY",
                reason: format!("unknown policy '{raw}' (expected optimistic, local_wins or remote_wins)"),
            })?,
        };
        let id_scheme = match env_string("BOARDSYNC_ID_SCHEME").as_deref() {
            None | Some("timestamp") => IdScheme::Timestamp,
            Some("uuid") => IdScheme::Uuid,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "BOARDSYNC_ID_SCHEME",
                    reason: format!("unknown scheme '{other}' (expected timestamp or uuid)"),
                });
            }
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_owned(),
            ws_url,
            timeouts,
            dedupe_interval: Duration::from_millis(dedupe_ms),
            cursor_interval: Duration::from_millis(cursor_ms),
            min_shape_size,
            merge_policy,
            id_scheme,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::Invalid { var: key, reason: format!("'{raw}': {e}") }),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
