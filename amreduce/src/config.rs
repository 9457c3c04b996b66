//! Runtime-configurable tuning parameters for amreduce.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `AMREDUCE_`) or by constructing a custom `AmReduceConfig`.

use crate::types::Algorithm;
use std::time::Duration;

/// Default `Algorithm::Auto` switch-over point (64 KiB).
pub const DEFAULT_LARGE_MSG_BYTES: usize = 64 * 1024;

/// Tuning parameters for reductions and the in-process runtime.
#[derive(Debug, Clone)]
pub struct AmReduceConfig {
    /// How long a caller waits for a reduction's completion callback.
    ///
    /// The engines themselves never time out; a missing peer message stalls
    /// a reduction forever, and this bound is what surfaces it.
    pub completion_timeout: Duration,

    /// Engine used when the caller does not pick one explicitly.
    pub algorithm: Algorithm,

    /// With `Algorithm::Auto`, vectors at least this many bytes use
    /// reduce-scatter/allgather; smaller ones use distance doubling.
    pub large_msg_bytes: usize,

    /// Upper bound on messages a participant holds for stamps it has not
    /// initialized yet.
    pub max_parked_messages: usize,

    /// How many completed stamps a participant remembers in order to reject
    /// late traffic for them.
    pub max_retired_stamps: usize,
}

impl Default for AmReduceConfig {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(30),
            algorithm: Algorithm::Auto,
            large_msg_bytes: DEFAULT_LARGE_MSG_BYTES,
            max_parked_messages: 4096,
            max_retired_stamps: 65536,
        }
    }
}

impl AmReduceConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `AMREDUCE_COMPLETION_TIMEOUT_SECS`
    /// - `AMREDUCE_ALGORITHM` (`rsag`, `distance-doubling`, `auto`)
    /// - `AMREDUCE_LARGE_MSG_BYTES`
    /// - `AMREDUCE_MAX_PARKED_MESSAGES`
    /// - `AMREDUCE_MAX_RETIRED_STAMPS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("AMREDUCE_COMPLETION_TIMEOUT_SECS")
            && let Ok(s) = v.parse::<u64>()
        {
            cfg.completion_timeout = Duration::from_secs(s);
        }
        if let Some(v) = lookup("AMREDUCE_ALGORITHM") {
            match v.parse::<Algorithm>() {
                Ok(alg) => cfg.algorithm = alg,
                Err(e) => tracing::warn!("ignoring AMREDUCE_ALGORITHM: {e}"),
            }
        }
        if let Some(v) = lookup("AMREDUCE_LARGE_MSG_BYTES")
            && let Ok(n) = v.parse::<usize>()
        {
            cfg.large_msg_bytes = n;
        }
        if let Some(v) = lookup("AMREDUCE_MAX_PARKED_MESSAGES")
            && let Ok(n) = v.parse::<usize>()
        {
            cfg.max_parked_messages = n;
        }
        if let Some(v) = lookup("AMREDUCE_MAX_RETIRED_STAMPS")
            && let Ok(n) = v.parse::<usize>()
        {
            cfg.max_retired_stamps = n;
        }

        cfg
    }
}
