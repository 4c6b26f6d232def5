//! Persistence commands: SAVE, BGSAVE, BGREWRITEAOF, LASTSAVE,
//! SHUTDOWN.

use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tracing::{error, info, warn};

use cinder_persistence::{aof, snapshot};
use cinder_protocol::Frame;

use super::{arg, arity_error, str_arg, CommandTable};
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("SAVE", save);
    table.register("BGSAVE", bgsave);
    table.register("BGREWRITEAOF", bgrewriteaof);
    table.register("LASTSAVE", lastsave);
    table.register("SHUTDOWN", shutdown);
}

fn save(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if !args.is_empty() {
        return arity_error("save");
    }
    let snap = state.store.read().snapshot();
    let path = state.config.lock().db_filename.clone();
    match snapshot::save(&path, &snap) {
        Ok(()) => Frame::ok(),
        Err(err) => {
            error!(error = %err, "SAVE failed");
            Frame::error(format!("ERR save failed: {err}"))
        }
    }
}

fn bgsave(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if !args.is_empty() {
        return arity_error("bgsave");
    }
    if !state.try_begin_bgsave() {
        return Frame::error("ERR Background save already in progress");
    }

    // copy the keyspace under the read lock, then write with no lock held
    let snap = state.store.read().snapshot();
    let path = state.config.lock().db_filename.clone();
    let state = state.clone();
    std::thread::spawn(move || {
        match snapshot::save(&path, &snap) {
            Ok(()) => info!("background save finished"),
            Err(err) => error!(error = %err, "background save failed"),
        }
        state.end_bgsave();
    });

    Frame::Simple("Background saving started".into())
}

fn bgrewriteaof(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if !args.is_empty() {
        return arity_error("bgrewriteaof");
    }
    if !state.try_begin_rewrite() {
        return Frame::error("ERR Background AOF rewrite already in progress");
    }

    let snap = state.store.read().snapshot();
    let path = state.config.lock().append_filename.clone();
    let state = state.clone();
    std::thread::spawn(move || {
        match aof::rewrite(&path, &snap) {
            Ok(()) => info!("background log rewrite finished"),
            Err(err) => error!(error = %err, "background log rewrite failed"),
        }
        state.end_rewrite();
    });

    Frame::Simple("Background append only file rewriting started".into())
}

fn lastsave(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if !args.is_empty() {
        return arity_error("lastsave");
    }
    let path = state.config.lock().db_filename.clone();
    let mtime = std::fs::metadata(&path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_secs() as i64)
        .unwrap_or(0);
    Frame::Integer(mtime)
}

fn shutdown(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() > 1 {
        return arity_error("shutdown");
    }
    let do_save = if args.is_empty() {
        true
    } else {
        match arg!(str_arg(args, 0)).to_ascii_uppercase().as_str() {
            "SAVE" => true,
            "NOSAVE" => false,
            _ => return Frame::error("ERR syntax error"),
        }
    };

    if do_save {
        let snap = state.store.read().snapshot();
        let path = state.config.lock().db_filename.clone();
        if let Err(err) = snapshot::save(&path, &snap) {
            warn!(error = %err, "failed to save snapshot during shutdown");
        }
    }

    info!("shutdown command received");
    state.shutdown.notify_one();
    Frame::ok()
}
