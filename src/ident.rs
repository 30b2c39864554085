//! Object identity generation.
//!
//! DESIGN
//! ======
//! IDs are minted client-side with no central allocator. `TimestampIds`
//! keeps the readable `{prefix}_{millis}_{counter}_{random}_{user}` layout so
//! an ID tells you what made it and who; `UuidIds` trades that for 122 random
//! bits. Neither is a proof of uniqueness: the object store drops duplicates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 9;
const USER_SUFFIX_LEN: usize = 4;
const ANON_SUFFIX: &str = "anon";

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Source of object identifiers.
pub trait IdGenerator: Send + Sync {
    /// Mint a new ID starting with `prefix`. `acting_user` is the user on whose
    /// behalf the object is created, if known.
    fn generate(&self, prefix: &str, acting_user: Option<&str>) -> String;
}

/// Which [`IdGenerator`] a session uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdScheme {
    #[default]
    Timestamp,
    Uuid,
}

impl IdScheme {
    #[must_use]
    pub fn generator(self) -> Box<dyn IdGenerator> {
        match self {
            Self::Timestamp => Box::new(TimestampIds::new()),
            Self::Uuid => Box::new(UuidIds),
        }
    }
}

/// `{prefix}_{epochMillis}_{counter}_{randomBase36}_{last4OfUserIdOrAnon}`.
#[derive(Debug, Default)]
pub struct TimestampIds {
    counter: AtomicU64,
}

impl TimestampIds {
    #[must_use]
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(0) }
    }
}

impl IdGenerator for TimestampIds {
    fn generate(&self, prefix: &str, acting_user: Option<&str>) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{}_{counter}_{}_{}", now_ms(), random_base36(RANDOM_LEN), user_suffix(acting_user))
    }
}

/// `{prefix}_{uuid-v4}`. Collision odds across `n` IDs are about `n² / 2^123`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn generate(&self, prefix: &str, _acting_user: Option<&str>) -> String {
        format!("{prefix}_{}", Uuid::new_v4().simple())
    }
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}

fn user_suffix(acting_user: Option<&str>) -> String {
    let Some(user) = acting_user.map(str::trim).filter(|u| !u.is_empty()) else {
        return ANON_SUFFIX.to_owned();
    };
    let chars: Vec<char> = user.chars().collect();
    chars[chars.len().saturating_sub(USER_SUFFIX_LEN)..].iter().collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "ident_test.rs"]
mod tests;
