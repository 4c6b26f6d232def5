//! Memory-bounded eviction.
//!
//! When a memory limit is configured, every size-increasing write first
//! charges its estimated delta against the accountant and then asks the
//! evictor to bring usage back under the limit, up to a bounded number
//! of victims per write. If the limit still can't be met (or the policy
//! is `noeviction`) the charge is rolled back and the write fails with
//! an out-of-memory error.
//!
//! LRU policies are approximated by sampling: draw a handful of random
//! candidates (without replacement) and evict the one with the oldest
//! access clock. LFU policies currently share the LRU approximation; a
//! distinct frequency counter is a future refinement.

use std::str::FromStr;

use rand::seq::IteratorRandom;
use tracing::debug;

use crate::store::{Store, StoreError};

/// Default candidate sample size for the approximate-LRU policies.
pub const DEFAULT_SAMPLES: usize = 5;

/// Upper bound on victims evicted for a single triggering write.
const MAX_EVICTIONS_PER_WRITE: usize = 10;

/// What to do when used memory exceeds the configured maximum.
///
/// "allkeys" policies consider every key; "volatile" policies only keys
/// that carry an expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Fail writes with an out-of-memory error.
    #[default]
    NoEviction,
    /// Evict the approximately least-recently-used key.
    AllKeysLru,
    /// Evict the approximately least-recently-used key among those with
    /// an expiry.
    VolatileLru,
    /// Evict the approximately least-frequently-used key.
    AllKeysLfu,
    /// Evict the approximately least-frequently-used key among those
    /// with an expiry.
    VolatileLfu,
    /// Evict a uniformly random key.
    AllKeysRandom,
    /// Evict a uniformly random key among those with an expiry.
    VolatileRandom,
    /// Evict the key with the nearest expiry.
    VolatileTtl,
}

impl EvictionPolicy {
    /// Returns the configuration name of this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::NoEviction => "noeviction",
            EvictionPolicy::AllKeysLru => "allkeys-lru",
            EvictionPolicy::VolatileLru => "volatile-lru",
            EvictionPolicy::AllKeysLfu => "allkeys-lfu",
            EvictionPolicy::VolatileLfu => "volatile-lfu",
            EvictionPolicy::AllKeysRandom => "allkeys-random",
            EvictionPolicy::VolatileRandom => "volatile-random",
            EvictionPolicy::VolatileTtl => "volatile-ttl",
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "noeviction" => Ok(EvictionPolicy::NoEviction),
            "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
            "volatile-lru" => Ok(EvictionPolicy::VolatileLru),
            "allkeys-lfu" => Ok(EvictionPolicy::AllKeysLfu),
            "volatile-lfu" => Ok(EvictionPolicy::VolatileLfu),
            "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
            "volatile-random" => Ok(EvictionPolicy::VolatileRandom),
            "volatile-ttl" => Ok(EvictionPolicy::VolatileTtl),
            other => Err(format!("unknown eviction policy '{other}'")),
        }
    }
}

/// Memory-limit configuration for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionConfig {
    /// Byte cap. 0 disables enforcement entirely.
    pub max_memory: u64,
    /// Victim-selection policy once the cap is exceeded.
    pub policy: EvictionPolicy,
    /// Sample size for the approximate-LRU policies.
    pub samples: usize,
}

impl EvictionConfig {
    /// Builds a config; a non-positive sample count falls back to
    /// [`DEFAULT_SAMPLES`].
    pub fn new(max_memory: u64, policy: EvictionPolicy, samples: i64) -> EvictionConfig {
        EvictionConfig {
            max_memory,
            policy,
            samples: if samples <= 0 {
                DEFAULT_SAMPLES
            } else {
                samples as usize
            },
        }
    }
}

impl Store {
    fn over_limit(&self) -> bool {
        match &self.eviction {
            Some(cfg) if cfg.max_memory > 0 => self.used_memory > cfg.max_memory as i64,
            _ => false,
        }
    }

    /// Charges `delta` bytes for a write to `key` against the
    /// accountant, evicting as needed. On failure the charge is rolled
    /// back and the caller must not apply its write.
    ///
    /// `key` itself is never selected as a victim: evicting it would
    /// free nothing once the write lands, and its old size has already
    /// been folded into `delta`.
    pub(crate) fn charge(&mut self, key: &str, delta: i64) -> Result<(), StoreError> {
        self.used_memory += delta;
        if let Err(err) = self.evict_until_under_limit(key) {
            self.used_memory -= delta;
            return Err(err);
        }
        Ok(())
    }

    /// Evicts victims until usage is back under the limit, bounded at
    /// [`MAX_EVICTIONS_PER_WRITE`] per call.
    fn evict_until_under_limit(&mut self, writing: &str) -> Result<(), StoreError> {
        if !self.over_limit() {
            return Ok(());
        }
        let policy = self
            .eviction
            .as_ref()
            .map(|cfg| cfg.policy)
            .unwrap_or_default();
        if policy == EvictionPolicy::NoEviction {
            return Err(StoreError::OutOfMemory);
        }

        for _ in 0..MAX_EVICTIONS_PER_WRITE {
            if !self.over_limit() {
                return Ok(());
            }
            match self.perform_eviction(policy, writing) {
                Some(victim) => debug!(key = %victim, policy = policy.as_str(), "evicted key"),
                None => return Err(StoreError::OutOfMemory),
            }
        }

        if self.over_limit() {
            Err(StoreError::OutOfMemory)
        } else {
            Ok(())
        }
    }

    /// Selects and deletes one victim per the policy. Returns the
    /// evicted key, or `None` when the candidate pool is empty.
    fn perform_eviction(&mut self, policy: EvictionPolicy, writing: &str) -> Option<String> {
        match policy {
            EvictionPolicy::NoEviction => None,
            EvictionPolicy::AllKeysLru | EvictionPolicy::AllKeysLfu => {
                self.evict_sampled(false, writing)
            }
            EvictionPolicy::VolatileLru | EvictionPolicy::VolatileLfu => {
                self.evict_sampled(true, writing)
            }
            EvictionPolicy::AllKeysRandom => self.evict_random(false, writing),
            EvictionPolicy::VolatileRandom => self.evict_random(true, writing),
            EvictionPolicy::VolatileTtl => self.evict_shortest_ttl(writing),
        }
    }

    /// Draws `samples` distinct candidates and evicts the one with the
    /// oldest access clock.
    fn evict_sampled(&mut self, volatile_only: bool, writing: &str) -> Option<String> {
        let samples = self
            .eviction
            .as_ref()
            .map(|cfg| cfg.samples)
            .unwrap_or(DEFAULT_SAMPLES);
        let mut rng = rand::rng();

        // choose_multiple samples without replacement
        let sampled: Vec<String> = if volatile_only {
            self.expires
                .keys()
                .filter(|key| key.as_str() != writing)
                .choose_multiple(&mut rng, samples)
                .into_iter()
                .cloned()
                .collect()
        } else {
            self.data
                .keys()
                .filter(|key| key.as_str() != writing)
                .choose_multiple(&mut rng, samples)
                .into_iter()
                .cloned()
                .collect()
        };

        let mut victim: Option<String> = None;
        let mut oldest = u32::MAX;
        for key in sampled {
            if let Some(obj) = self.data.get(&key) {
                if victim.is_none() || obj.lru() < oldest {
                    oldest = obj.lru();
                    victim = Some(key);
                }
            }
        }

        let key = victim?;
        self.evict_key(&key);
        Some(key)
    }

    /// Evicts one key drawn uniformly from the candidate pool.
    fn evict_random(&mut self, volatile_only: bool, writing: &str) -> Option<String> {
        let mut rng = rand::rng();
        let key = if volatile_only {
            self.expires
                .keys()
                .filter(|key| key.as_str() != writing)
                .choose(&mut rng)
                .cloned()
        } else {
            self.data
                .keys()
                .filter(|key| key.as_str() != writing)
                .choose(&mut rng)
                .cloned()
        }?;
        self.evict_key(&key);
        Some(key)
    }

    /// Scans the expiry map and evicts the key closest to expiring.
    fn evict_shortest_ttl(&mut self, writing: &str) -> Option<String> {
        let key = self
            .expires
            .iter()
            .filter(|(key, _)| key.as_str() != writing && self.data.contains_key(*key))
            .min_by_key(|(_, &at_ms)| at_ms)
            .map(|(key, _)| key.clone())?;
        self.evict_key(&key);
        Some(key)
    }

    fn evict_key(&mut self, key: &str) {
        self.remove_entry(key);
        self.evicted_total += 1;
        self.notify_modified(key);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::store::SetResult;
    use crate::time;

    fn set(store: &mut Store, key: &str, value: &str) -> SetResult {
        store.set(key, Bytes::copy_from_slice(value.as_bytes()), None, false, false)
    }

    fn set_volatile(store: &mut Store, key: &str, value: &str, ttl_ms: u64) -> SetResult {
        store.set(
            key,
            Bytes::copy_from_slice(value.as_bytes()),
            Some(time::now_ms() + ttl_ms),
            false,
            false,
        )
    }

    #[test]
    fn policy_names_round_trip() {
        for policy in [
            EvictionPolicy::NoEviction,
            EvictionPolicy::AllKeysLru,
            EvictionPolicy::VolatileLru,
            EvictionPolicy::AllKeysLfu,
            EvictionPolicy::VolatileLfu,
            EvictionPolicy::AllKeysRandom,
            EvictionPolicy::VolatileRandom,
            EvictionPolicy::VolatileTtl,
        ] {
            assert_eq!(policy.as_str().parse::<EvictionPolicy>().unwrap(), policy);
        }
        assert!("lru-ish".parse::<EvictionPolicy>().is_err());
    }

    #[test]
    fn config_defaults_samples_when_non_positive() {
        let cfg = EvictionConfig::new(1024, EvictionPolicy::AllKeysLru, 0);
        assert_eq!(cfg.samples, DEFAULT_SAMPLES);
        let cfg = EvictionConfig::new(1024, EvictionPolicy::AllKeysLru, -3);
        assert_eq!(cfg.samples, DEFAULT_SAMPLES);
        let cfg = EvictionConfig::new(1024, EvictionPolicy::AllKeysLru, 7);
        assert_eq!(cfg.samples, 7);
    }

    #[test]
    fn noeviction_rejects_write_and_leaves_store_unchanged() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            100,
            EvictionPolicy::NoEviction,
            5,
        ));
        assert_eq!(set(&mut store, "a", "val"), SetResult::Ok);
        let before = store.used_memory();

        assert_eq!(set(&mut store, "b", "val"), SetResult::OutOfMemory);
        assert!(store.exists("a"));
        assert!(!store.exists("b"));
        assert_eq!(store.used_memory(), before, "failed write must roll back");
    }

    #[test]
    fn zero_max_memory_disables_enforcement() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            0,
            EvictionPolicy::NoEviction,
            5,
        ));
        for i in 0..100 {
            assert_eq!(set(&mut store, &format!("k{i}"), "value"), SetResult::Ok);
        }
    }

    #[test]
    fn allkeys_lru_makes_room() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            100,
            EvictionPolicy::AllKeysLru,
            5,
        ));
        assert_eq!(set(&mut store, "a", "val"), SetResult::Ok);
        assert_eq!(set(&mut store, "b", "val"), SetResult::Ok);
        // one key had to go to fit the other
        assert_eq!(store.keys().len(), 1);
    }

    #[test]
    fn allkeys_random_keeps_accepting_writes() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            500,
            EvictionPolicy::AllKeysRandom,
            5,
        ));
        for i in 0..50 {
            assert_eq!(
                set(&mut store, &format!("key:{i}"), "v"),
                SetResult::Ok,
                "write {i} should succeed by evicting"
            );
        }
        // far fewer than 50 keys survive under a 500-byte cap
        assert!(store.keys().len() < 50);
        assert!(!store.keys().is_empty());
    }

    #[test]
    fn volatile_random_has_no_victims_without_expiries() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            100,
            EvictionPolicy::VolatileRandom,
            5,
        ));
        assert_eq!(set(&mut store, "a", "val"), SetResult::Ok);
        // pool of expiring keys is empty, so the write cannot be satisfied
        assert_eq!(set(&mut store, "b", "val"), SetResult::OutOfMemory);
    }

    #[test]
    fn volatile_ttl_prefers_the_shortest_ttl() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            250,
            EvictionPolicy::VolatileTtl,
            5,
        ));
        assert_eq!(set_volatile(&mut store, "short", "v", 1_000), SetResult::Ok);
        assert_eq!(set_volatile(&mut store, "medium", "v", 10_000), SetResult::Ok);
        assert_eq!(set_volatile(&mut store, "long", "v", 100_000), SetResult::Ok);

        // push over the limit; the nearest-expiry key must go first
        assert_eq!(set_volatile(&mut store, "more1", "v", 50_000), SetResult::Ok);
        assert!(!store.exists("short"), "shortest TTL should be evicted first");
        assert!(store.exists("long"));
    }

    #[test]
    fn volatile_ttl_eviction_storm_spares_long_ttl() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            700,
            EvictionPolicy::VolatileTtl,
            5,
        ));
        set_volatile(&mut store, "short_ttl", "v", 1_000);
        set_volatile(&mut store, "medium_ttl", "v", 10_000);
        set_volatile(&mut store, "long_ttl", "v", 100_000);
        for i in 0..10 {
            set_volatile(&mut store, &format!("filler{i}"), "v", 50_000);
        }
        assert!(store.exists("long_ttl"));
        assert!(!store.exists("short_ttl"));
    }

    #[test]
    fn sampled_lru_evicts_coldest_of_two() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            10_000,
            EvictionPolicy::AllKeysLru,
            // sample size covers the whole keyspace, so selection is
            // exact LRU and the test is deterministic
            64,
        ));
        set(&mut store, "cold", "v");
        set(&mut store, "warm", "v");

        // age the clock so "warm"'s later touch is strictly newer
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let _ = store.get("warm");

        store.set_eviction_config(EvictionConfig::new(160, EvictionPolicy::AllKeysLru, 64));
        assert_eq!(set(&mut store, "new", "v"), SetResult::Ok);
        assert!(store.exists("warm") || store.exists("new"));
        assert!(!store.exists("cold"), "the coldest key should be evicted");
    }

    #[test]
    fn eviction_counts_are_reported() {
        let mut store = Store::with_eviction(EvictionConfig::new(
            100,
            EvictionPolicy::AllKeysRandom,
            5,
        ));
        set(&mut store, "a", "val");
        set(&mut store, "b", "val");
        assert!(store.stats().evicted_total >= 1);
    }
}
