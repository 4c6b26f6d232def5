//! Connection and introspection commands: PING, ECHO, COMMAND, INFO,
//! CONFIG.

use std::sync::Arc;

use cinder_core::EvictionConfig;
use cinder_protocol::Frame;

use super::{arg, arity_error, str_arg, CommandTable};
use crate::config::parse_byte_size;
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("PING", ping);
    table.register("ECHO", echo);
    table.register("COMMAND", |_state, _args| Frame::Array(Vec::new()));
    table.register("INFO", info);
    table.register("CONFIG", config);
}

fn ping(_state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    match args.len() {
        0 => Frame::Simple("PONG".into()),
        1 => match &args[0] {
            Frame::Bulk(_) => args[0].clone(),
            _ => Frame::error("ERR invalid argument type"),
        },
        _ => arity_error("ping"),
    }
}

fn echo(_state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("echo");
    }
    match &args[0] {
        Frame::Bulk(_) => args[0].clone(),
        _ => Frame::error("ERR invalid argument type"),
    }
}

fn info(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    let section = if args.is_empty() {
        None
    } else {
        Some(arg!(str_arg(args, 0)).to_ascii_lowercase())
    };

    let mut out = String::new();
    let wants = |name: &str| section.as_deref().is_none_or(|s| s == name);

    if wants("server") {
        out.push_str("# Server\r\n");
        out.push_str("redis_version:7.0.0-cinder\r\n");
        out.push_str("redis_mode:standalone\r\n");
        out.push_str("arch_bits:64\r\n");
    }
    if wants("clients") {
        out.push_str("# Clients\r\n");
        out.push_str("connected_clients:1\r\n");
    }
    if wants("keyspace") {
        let stats = state.store.read().stats();
        out.push_str("# Keyspace\r\n");
        out.push_str(&format!(
            "db0:keys={},expires={}\r\n",
            stats.keys, stats.expires
        ));
        out.push_str(&format!("used_memory:{}\r\n", stats.used_memory));
        out.push_str(&format!("expired_keys:{}\r\n", stats.expired_total));
        out.push_str(&format!("evicted_keys:{}\r\n", stats.evicted_total));
    }

    if out.is_empty() {
        out.push_str("# Server\r\nredis_version:7.0.0-cinder\r\n");
    }
    Frame::bulk(out)
}

fn config(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.is_empty() {
        return arity_error("config");
    }
    let subcommand = arg!(str_arg(args, 0)).to_ascii_uppercase();
    match subcommand.as_str() {
        "GET" => {
            if args.len() < 2 {
                return arity_error("config|get");
            }
            let key = arg!(str_arg(args, 1)).to_ascii_lowercase();
            config_get(state, &key)
        }
        "SET" => {
            if args.len() < 3 {
                return arity_error("config|set");
            }
            let key = arg!(str_arg(args, 1)).to_ascii_lowercase();
            let value = arg!(str_arg(args, 2));
            config_set(state, &key, value)
        }
        other => Frame::error(format!("ERR unknown subcommand '{other}'. Try CONFIG HELP.")),
    }
}

fn config_get(state: &Arc<ServerState>, key: &str) -> Frame {
    let cfg = state.config.lock();
    let value = match key {
        "port" => cfg.port.to_string(),
        "dbfilename" => cfg.db_filename.display().to_string(),
        "appendonly" => (if cfg.append_only { "yes" } else { "no" }).to_string(),
        "appendfilename" => cfg.append_filename.display().to_string(),
        "appendfsync" => cfg.append_fsync.as_str().to_string(),
        "maxmemory" => cfg.max_memory.to_string(),
        "maxmemory-policy" => cfg.max_memory_policy.as_str().to_string(),
        "maxmemory-samples" => cfg.max_memory_samples.to_string(),
        _ => return Frame::Array(Vec::new()),
    };
    Frame::Array(vec![Frame::bulk(key.to_owned()), Frame::bulk(value)])
}

fn config_set(state: &Arc<ServerState>, key: &str, value: &str) -> Frame {
    match key {
        "maxmemory-policy" => {
            let policy = match value.parse() {
                Ok(policy) => policy,
                Err(err) => return Frame::error(format!("ERR {err}")),
            };
            let mut cfg = state.config.lock();
            cfg.max_memory_policy = policy;
            state.store.write().set_eviction_config(EvictionConfig::new(
                cfg.max_memory,
                policy,
                cfg.max_memory_samples,
            ));
            Frame::ok()
        }
        "maxmemory-samples" => {
            let samples: i64 = match value.parse() {
                Ok(samples) => samples,
                Err(_) => return Frame::error("ERR value is not an integer or out of range"),
            };
            let mut cfg = state.config.lock();
            cfg.max_memory_samples = samples;
            state.store.write().set_eviction_config(EvictionConfig::new(
                cfg.max_memory,
                cfg.max_memory_policy,
                samples,
            ));
            Frame::ok()
        }
        "maxmemory" => {
            let bytes = match parse_byte_size(value) {
                Ok(bytes) => bytes,
                Err(err) => return Frame::error(format!("ERR {err}")),
            };
            let mut cfg = state.config.lock();
            cfg.max_memory = bytes;
            state.store.write().set_eviction_config(EvictionConfig::new(
                bytes,
                cfg.max_memory_policy,
                cfg.max_memory_samples,
            ));
            Frame::ok()
        }
        // remaining keys are accepted but only take effect at startup
        _ => Frame::ok(),
    }
}
