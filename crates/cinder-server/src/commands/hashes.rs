//! Hash commands.

use std::sync::Arc;

use bytes::Bytes;

use cinder_protocol::Frame;

use super::{arg, arity_error, bytes_arg, str_arg, CommandTable};
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("HSET", hset);
    table.register("HGET", hget);
    table.register("HDEL", hdel);
    table.register("HEXISTS", hexists);
    table.register("HLEN", hlen);
    table.register("HGETALL", hgetall);
    table.register("HKEYS", hkeys);
    table.register("HVALS", hvals);
}

fn hset(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    // key plus at least one field/value pair, and pairs must be even
    if args.len() < 3 || (args.len() - 1) % 2 != 0 {
        return arity_error("hset");
    }
    let key = arg!(str_arg(args, 0));
    let mut pairs: Vec<(String, Bytes)> = Vec::with_capacity((args.len() - 1) / 2);
    let mut i = 1;
    while i < args.len() {
        let field = arg!(str_arg(args, i)).to_owned();
        let value = arg!(bytes_arg(args, i + 1));
        pairs.push((field, value));
        i += 2;
    }

    match state.store.write().hset(key, &pairs) {
        Ok(created) => Frame::Integer(created as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn hget(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 2 {
        return arity_error("hget");
    }
    let key = arg!(str_arg(args, 0));
    let field = arg!(str_arg(args, 1));
    match state.store.write().hget(key, field) {
        Ok(Some(value)) => Frame::Bulk(value),
        Ok(None) => Frame::NullBulk,
        Err(err) => Frame::error(err.to_string()),
    }
}

fn hdel(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() < 2 {
        return arity_error("hdel");
    }
    let key = arg!(str_arg(args, 0));
    let mut fields = Vec::with_capacity(args.len() - 1);
    for i in 1..args.len() {
        fields.push(arg!(str_arg(args, i)).to_owned());
    }
    match state.store.write().hdel(key, &fields) {
        Ok(removed) => Frame::Integer(removed as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn hexists(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 2 {
        return arity_error("hexists");
    }
    let key = arg!(str_arg(args, 0));
    let field = arg!(str_arg(args, 1));
    match state.store.write().hexists(key, field) {
        Ok(found) => Frame::Integer(found as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn hlen(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("hlen");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().hlen(key) {
        Ok(len) => Frame::Integer(len as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn hgetall(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("hgetall");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().hgetall(key) {
        Ok(pairs) => {
            let mut items = Vec::with_capacity(pairs.len() * 2);
            for (field, value) in pairs {
                items.push(Frame::bulk(field));
                items.push(Frame::Bulk(value));
            }
            Frame::Array(items)
        }
        Err(err) => Frame::error(err.to_string()),
    }
}

fn hkeys(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("hkeys");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().hkeys(key) {
        Ok(fields) => Frame::Array(fields.into_iter().map(Frame::bulk).collect()),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn hvals(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("hvals");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().hvals(key) {
        Ok(values) => Frame::Array(values.into_iter().map(Frame::Bulk).collect()),
        Err(err) => Frame::error(err.to_string()),
    }
}
