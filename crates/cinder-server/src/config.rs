//! Server configuration.
//!
//! Holds the runtime-visible settings (CONFIG GET reads them, a couple
//! of CONFIG SET keys update them) and the helpers that convert
//! CLI-friendly strings like "100mb" into internal values.

use std::path::PathBuf;

use cinder_core::EvictionPolicy;
use cinder_persistence::aof::FsyncPolicy;

/// Runtime configuration for one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen port.
    pub port: u16,
    /// Snapshot file path.
    pub db_filename: PathBuf,
    /// Whether the command log is enabled.
    pub append_only: bool,
    /// Command log path.
    pub append_filename: PathBuf,
    /// Command log fsync discipline.
    pub append_fsync: FsyncPolicy,
    /// Memory cap in bytes; 0 disables eviction.
    pub max_memory: u64,
    /// Eviction policy once the cap is exceeded.
    pub max_memory_policy: EvictionPolicy,
    /// Sample size for the approximate-LRU policies.
    pub max_memory_samples: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 6379,
            db_filename: PathBuf::from("dump.rdb"),
            append_only: false,
            append_filename: PathBuf::from("appendonly.aof"),
            append_fsync: FsyncPolicy::EverySec,
            max_memory: 0,
            max_memory_policy: EvictionPolicy::NoEviction,
            max_memory_samples: 5,
        }
    }
}

/// Parses a human-readable byte size into a number of bytes.
///
/// Supports suffixes K/KB, M/MB, G/GB (binary multiples); plain numbers
/// are bytes. Case insensitive.
pub fn parse_byte_size(input: &str) -> Result<u64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty byte size string".into());
    }

    let upper = input.to_ascii_uppercase();

    let (num_str, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('G') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix('M') {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix('K') {
        (n, 1024)
    } else {
        (upper.as_str(), 1)
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid byte size: '{input}'"))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("byte size overflow: '{input}'"))
}
