use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use cinder_core::{EvictionConfig, EvictionPolicy, Store};
use cinder_persistence::aof::{self, AofWriter, FsyncPolicy};
use cinder_persistence::snapshot;
use cinder_protocol::Frame;
use cinder_server::config::{parse_byte_size, ServerConfig};
use cinder_server::server::{self, ServerState};
use cinder_server::session::Session;

/// A Redis-compatible, single-node, in-memory key-value server.
#[derive(Debug, Parser)]
#[command(name = "cinder-server", version)]
struct Flags {
    /// Port to listen on.
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// Snapshot file name.
    #[arg(long, default_value = "dump.rdb")]
    dbfilename: PathBuf,

    /// Enable the append-only command log.
    #[arg(long, default_value_t = false)]
    appendonly: bool,

    /// Command log file name.
    #[arg(long, default_value = "appendonly.aof")]
    appendfilename: PathBuf,

    /// Command log fsync policy: always, everysec, no.
    #[arg(long, default_value = "everysec")]
    appendfsync: String,

    /// Memory cap, e.g. "100mb" (0 = no limit).
    #[arg(long, default_value = "0")]
    maxmemory: String,

    /// Eviction policy once the cap is exceeded.
    #[arg(long = "maxmemory-policy", default_value = "noeviction")]
    maxmemory_policy: String,

    /// Sample size for the approximate-LRU policies.
    #[arg(long = "maxmemory-samples", default_value_t = 5)]
    maxmemory_samples: i64,
}

impl Flags {
    fn into_config(self) -> Result<ServerConfig, String> {
        Ok(ServerConfig {
            port: self.port,
            db_filename: self.dbfilename,
            append_only: self.appendonly,
            append_filename: self.appendfilename,
            append_fsync: self.appendfsync.parse::<FsyncPolicy>()?,
            max_memory: parse_byte_size(&self.maxmemory)?,
            max_memory_policy: self.maxmemory_policy.parse::<EvictionPolicy>()?,
            max_memory_samples: self.maxmemory_samples,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=info".into()),
        )
        .init();

    let config = match Flags::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = if config.max_memory > 0 {
        info!(
            max_memory = config.max_memory,
            policy = config.max_memory_policy.as_str(),
            samples = config.max_memory_samples,
            "memory eviction enabled"
        );
        Store::with_eviction(EvictionConfig::new(
            config.max_memory,
            config.max_memory_policy,
            config.max_memory_samples,
        ))
    } else {
        Store::new()
    };

    let state = ServerState::new(config.clone(), store);

    // restore from the command log when enabled, otherwise from the
    // last snapshot
    if config.append_only {
        let mut replayer = Session::new(state.clone());
        match aof::load(&config.append_filename, |items| {
            replayer.execute(Frame::Array(items))
        }) {
            Ok(count) => info!(commands = count, "command log replayed"),
            Err(err) => warn!(error = %err, "failed to replay command log"),
        }

        match AofWriter::open(&config.append_filename, config.append_fsync) {
            Ok(writer) => {
                *state.aof.lock() = Some(writer);
            }
            Err(err) => {
                error!(error = %err, "failed to open command log");
                return ExitCode::FAILURE;
            }
        }
    } else {
        match snapshot::load(&config.db_filename, &mut state.store.write()) {
            Ok(count) => info!(keys = count, "snapshot loaded"),
            Err(err) => warn!(error = %err, "failed to load snapshot"),
        }
    }

    // ctrl-c folds into the same shutdown path as the SHUTDOWN command
    let signal_state = state.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_state.shutdown.notify_one();
        }
    });

    let result = server::run(state.clone()).await;

    // flush and fsync the log before exiting
    if let Some(mut writer) = state.aof.lock().take() {
        if let Err(err) = writer.close() {
            warn!(error = %err, "error closing command log");
        }
    }

    match result {
        Ok(()) => {
            info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "server error");
            ExitCode::FAILURE
        }
    }
}
