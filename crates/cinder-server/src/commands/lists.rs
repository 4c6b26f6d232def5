//! List commands.

use std::sync::Arc;

use bytes::Bytes;

use cinder_protocol::Frame;

use super::{arg, arity_error, bytes_arg, int_arg, str_arg, CommandTable};
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("LPUSH", |state, args| push(state, args, "lpush", true));
    table.register("RPUSH", |state, args| push(state, args, "rpush", false));
    table.register("LPOP", |state, args| pop(state, args, "lpop", true));
    table.register("RPOP", |state, args| pop(state, args, "rpop", false));
    table.register("LLEN", llen);
    table.register("LRANGE", lrange);
}

fn push(state: &Arc<ServerState>, args: &[Frame], cmd: &str, head: bool) -> Frame {
    if args.len() < 2 {
        return arity_error(cmd);
    }
    let key = arg!(str_arg(args, 0));
    let mut values: Vec<Bytes> = Vec::with_capacity(args.len() - 1);
    for i in 1..args.len() {
        values.push(arg!(bytes_arg(args, i)));
    }

    let mut store = state.store.write();
    let result = if head {
        store.lpush(key, &values)
    } else {
        store.rpush(key, &values)
    };
    match result {
        Ok(len) => Frame::Integer(len as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn pop(state: &Arc<ServerState>, args: &[Frame], cmd: &str, head: bool) -> Frame {
    if args.len() != 1 {
        return arity_error(cmd);
    }
    let key = arg!(str_arg(args, 0));
    let mut store = state.store.write();
    let result = if head { store.lpop(key) } else { store.rpop(key) };
    match result {
        Ok(Some(value)) => Frame::Bulk(value),
        Ok(None) => Frame::NullBulk,
        Err(err) => Frame::error(err.to_string()),
    }
}

fn llen(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("llen");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().llen(key) {
        Ok(len) => Frame::Integer(len as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn lrange(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 3 {
        return arity_error("lrange");
    }
    let key = arg!(str_arg(args, 0));
    let start = arg!(int_arg(args, 1));
    let stop = arg!(int_arg(args, 2));
    match state.store.write().lrange(key, start, stop) {
        Ok(values) => Frame::Array(values.into_iter().map(Frame::Bulk).collect()),
        Err(err) => Frame::error(err.to_string()),
    }
}
