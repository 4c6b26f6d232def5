//! Wall-clock helpers for expirations and the LRU clock.
//!
//! Expirations are absolute unix-epoch milliseconds so they survive a
//! snapshot/restart cycle. The LRU clock is unix-epoch seconds
//! truncated to 32 bits; only relative ordering matters to the evictor.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current unix time in milliseconds.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Returns `true` if the given absolute expiry has passed.
#[inline]
pub fn has_passed(expires_at_ms: u64) -> bool {
    now_ms() >= expires_at_ms
}

/// Converts a TTL duration into an absolute expiry timestamp.
#[inline]
pub fn expiry_in(ttl: Duration) -> u64 {
    now_ms().saturating_add(ttl.as_millis() as u64)
}

/// Returns the current 32-bit LRU clock value (unix seconds).
#[inline]
pub fn lru_clock() -> u32 {
    (now_ms() / 1000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        // 2020-01-01 in epoch ms
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn past_expiry_has_passed() {
        assert!(has_passed(now_ms().saturating_sub(1)));
        assert!(!has_passed(now_ms() + 60_000));
    }

    #[test]
    fn expiry_in_is_in_the_future() {
        let at = expiry_in(Duration::from_secs(10));
        assert!(at > now_ms());
        assert!(at <= now_ms() + 10_001);
    }
}
