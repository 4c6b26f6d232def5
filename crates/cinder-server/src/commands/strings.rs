//! SET / GET / INCR / DECR.

use std::sync::Arc;

use cinder_core::store::{SetResult, StoreError};
use cinder_core::time;
use cinder_protocol::Frame;

use super::{arg, arity_error, bytes_arg, str_arg, CommandTable};
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("SET", set);
    table.register("GET", get);
    table.register("INCR", |state, args| incr_by(state, args, "incr", 1));
    table.register("DECR", |state, args| incr_by(state, args, "decr", -1));
}

fn set(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() < 2 {
        return arity_error("set");
    }
    let key = arg!(str_arg(args, 0));
    let value = arg!(bytes_arg(args, 1));

    let mut nx = false;
    let mut xx = false;
    let mut expires_at_ms = None;

    let mut i = 2;
    while i < args.len() {
        let option = arg!(str_arg(args, i)).to_ascii_uppercase();
        match option.as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "EX" | "PX" => {
                i += 1;
                if i >= args.len() {
                    return Frame::error("ERR syntax error");
                }
                let amount: i64 = match arg!(str_arg(args, i)).parse() {
                    Ok(n) => n,
                    Err(_) => return Frame::error("ERR invalid expire time in 'set' command"),
                };
                let millis = if option == "EX" {
                    amount.checked_mul(1000)
                } else {
                    Some(amount)
                };
                match millis {
                    Some(ms) if ms > 0 => {
                        expires_at_ms = Some(time::now_ms().saturating_add(ms as u64));
                    }
                    _ => return Frame::error("ERR invalid expire time in 'set' command"),
                }
            }
            _ => return Frame::error("ERR syntax error"),
        }
        i += 1;
    }

    if nx && xx {
        return Frame::error("ERR syntax error");
    }

    match state.store.write().set(key, value, expires_at_ms, nx, xx) {
        SetResult::Ok => Frame::ok(),
        SetResult::Blocked => Frame::NullBulk,
        SetResult::OutOfMemory => Frame::error(StoreError::OutOfMemory.to_string()),
    }
}

fn get(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("get");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().get(key) {
        Ok(Some(value)) => Frame::Bulk(value),
        Ok(None) => Frame::NullBulk,
        Err(err) => Frame::error(err.to_string()),
    }
}

fn incr_by(state: &Arc<ServerState>, args: &[Frame], cmd: &str, delta: i64) -> Frame {
    if args.len() != 1 {
        return arity_error(cmd);
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().incr_by(key, delta) {
        Ok(value) => Frame::Integer(value),
        Err(err) => Frame::error(err.to_string()),
    }
}
