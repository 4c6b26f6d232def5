//! Generic keyspace commands: DEL, EXISTS, TYPE, DBSIZE, KEYS,
//! FLUSHDB/FLUSHALL, and the expiry setters.

use std::sync::Arc;

use cinder_core::time;
use cinder_protocol::Frame;

use super::{arg, arity_error, int_arg, str_arg, CommandTable};
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("DEL", del);
    table.register("EXISTS", exists);
    table.register("TYPE", key_type);
    table.register("DBSIZE", dbsize);
    table.register("KEYS", keys);
    table.register("FLUSHDB", flush);
    table.register("FLUSHALL", flush);
    table.register("EXPIRE", expire);
    table.register("PEXPIREAT", pexpireat);
}

fn del(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.is_empty() {
        return arity_error("del");
    }
    let mut store = state.store.write();
    let mut count = 0i64;
    for i in 0..args.len() {
        let key = arg!(str_arg(args, i));
        if store.del(key) {
            count += 1;
        }
    }
    Frame::Integer(count)
}

fn exists(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.is_empty() {
        return arity_error("exists");
    }
    let mut store = state.store.write();
    let mut count = 0i64;
    for i in 0..args.len() {
        let key = arg!(str_arg(args, i));
        if store.exists(key) {
            count += 1;
        }
    }
    Frame::Integer(count)
}

fn key_type(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("type");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().kind(key) {
        Some(kind) => Frame::Simple(kind.type_name().into()),
        None => Frame::Simple("none".into()),
    }
}

fn dbsize(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if !args.is_empty() {
        return arity_error("dbsize");
    }
    Frame::Integer(state.store.read().len() as i64)
}

fn keys(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    // the single supported pattern is the match-all "*"; it is also
    // what an absent argument means
    if args.len() > 1 {
        return arity_error("keys");
    }
    let all = state.store.read().keys();
    Frame::Array(all.into_iter().map(Frame::bulk).collect())
}

fn flush(state: &Arc<ServerState>, _args: &[Frame]) -> Frame {
    state.store.write().flush();
    Frame::ok()
}

fn expire(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 2 {
        return arity_error("expire");
    }
    let key = arg!(str_arg(args, 0));
    let seconds = arg!(int_arg(args, 1));
    // a non-positive TTL expires the key on its next access
    let at_ms = if seconds <= 0 {
        time::now_ms()
    } else {
        time::now_ms().saturating_add((seconds as u64).saturating_mul(1000))
    };
    Frame::Integer(state.store.write().expire_at_ms(key, at_ms) as i64)
}

fn pexpireat(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 2 {
        return arity_error("pexpireat");
    }
    let key = arg!(str_arg(args, 0));
    let at_ms = arg!(int_arg(args, 1)).max(0) as u64;
    Frame::Integer(state.store.write().expire_at_ms(key, at_ms) as i64)
}
