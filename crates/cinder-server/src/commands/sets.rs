//! Set commands.

use std::sync::Arc;

use cinder_protocol::Frame;

use super::{arg, arity_error, str_arg, CommandTable};
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("SADD", sadd);
    table.register("SREM", srem);
    table.register("SISMEMBER", sismember);
    table.register("SMEMBERS", smembers);
    table.register("SCARD", scard);
    table.register("SPOP", spop);
}

fn member_args(args: &[Frame]) -> Result<Vec<String>, Frame> {
    let mut members = Vec::with_capacity(args.len() - 1);
    for i in 1..args.len() {
        members.push(str_arg(args, i)?.to_owned());
    }
    Ok(members)
}

fn sadd(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() < 2 {
        return arity_error("sadd");
    }
    let key = arg!(str_arg(args, 0));
    let members = arg!(member_args(args));
    match state.store.write().sadd(key, &members) {
        Ok(added) => Frame::Integer(added as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn srem(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() < 2 {
        return arity_error("srem");
    }
    let key = arg!(str_arg(args, 0));
    let members = arg!(member_args(args));
    match state.store.write().srem(key, &members) {
        Ok(removed) => Frame::Integer(removed as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn sismember(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 2 {
        return arity_error("sismember");
    }
    let key = arg!(str_arg(args, 0));
    let member = arg!(str_arg(args, 1));
    match state.store.write().sismember(key, member) {
        Ok(found) => Frame::Integer(found as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn smembers(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("smembers");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().smembers(key) {
        Ok(members) => Frame::Array(members.into_iter().map(Frame::bulk).collect()),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn scard(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("scard");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().scard(key) {
        Ok(card) => Frame::Integer(card as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn spop(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("spop");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().spop(key) {
        Ok(Some(member)) => Frame::bulk(member),
        Ok(None) => Frame::NullBulk,
        Err(err) => Frame::error(err.to_string()),
    }
}
