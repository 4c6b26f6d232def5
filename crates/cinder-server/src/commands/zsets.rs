//! Sorted-set commands.

use std::sync::Arc;

use cinder_protocol::Frame;

use super::{arg, arity_error, int_arg, str_arg, CommandTable};
use crate::server::ServerState;

pub fn register(table: &mut CommandTable) {
    table.register("ZADD", zadd);
    table.register("ZREM", zrem);
    table.register("ZSCORE", zscore);
    table.register("ZCARD", zcard);
    table.register("ZRANK", zrank);
    table.register("ZRANGE", zrange);
}

fn score_arg(args: &[Frame], index: usize) -> Result<f64, Frame> {
    let score: f64 = str_arg(args, index)?
        .parse()
        .map_err(|_| Frame::error("ERR value is not a valid float"))?;
    if score.is_nan() {
        return Err(Frame::error("ERR value is not a valid float"));
    }
    Ok(score)
}

/// Formats a score for a reply: plain integers for whole numbers,
/// shortest round-tripping decimal otherwise.
fn format_score(score: f64) -> String {
    if score == score.trunc() && score.is_finite() && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}

fn zadd(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    // key plus at least one score/member pair, and pairs must be even
    if args.len() < 3 || (args.len() - 1) % 2 != 0 {
        return arity_error("zadd");
    }
    let key = arg!(str_arg(args, 0));
    let mut pairs: Vec<(f64, String)> = Vec::with_capacity((args.len() - 1) / 2);
    let mut i = 1;
    while i < args.len() {
        let score = arg!(score_arg(args, i));
        let member = arg!(str_arg(args, i + 1)).to_owned();
        pairs.push((score, member));
        i += 2;
    }

    match state.store.write().zadd(key, &pairs) {
        Ok(added) => Frame::Integer(added as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn zrem(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() < 2 {
        return arity_error("zrem");
    }
    let key = arg!(str_arg(args, 0));
    let mut members = Vec::with_capacity(args.len() - 1);
    for i in 1..args.len() {
        members.push(arg!(str_arg(args, i)).to_owned());
    }
    match state.store.write().zrem(key, &members) {
        Ok(removed) => Frame::Integer(removed as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn zscore(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 2 {
        return arity_error("zscore");
    }
    let key = arg!(str_arg(args, 0));
    let member = arg!(str_arg(args, 1));
    match state.store.write().zscore(key, member) {
        Ok(Some(score)) => Frame::bulk(format_score(score)),
        Ok(None) => Frame::NullBulk,
        Err(err) => Frame::error(err.to_string()),
    }
}

fn zcard(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 1 {
        return arity_error("zcard");
    }
    let key = arg!(str_arg(args, 0));
    match state.store.write().zcard(key) {
        Ok(card) => Frame::Integer(card as i64),
        Err(err) => Frame::error(err.to_string()),
    }
}

fn zrank(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 2 {
        return arity_error("zrank");
    }
    let key = arg!(str_arg(args, 0));
    let member = arg!(str_arg(args, 1));
    match state.store.write().zrank(key, member) {
        Ok(Some(rank)) => Frame::Integer(rank as i64),
        Ok(None) => Frame::NullBulk,
        Err(err) => Frame::error(err.to_string()),
    }
}

fn zrange(state: &Arc<ServerState>, args: &[Frame]) -> Frame {
    if args.len() != 3 && args.len() != 4 {
        return arity_error("zrange");
    }
    let key = arg!(str_arg(args, 0));
    let start = arg!(int_arg(args, 1));
    let stop = arg!(int_arg(args, 2));
    let with_scores = if args.len() == 4 {
        if !arg!(str_arg(args, 3)).eq_ignore_ascii_case("WITHSCORES") {
            return Frame::error("ERR syntax error");
        }
        true
    } else {
        false
    };

    match state.store.write().zrange(key, start, stop) {
        Ok(members) => {
            let mut items = Vec::with_capacity(members.len() * if with_scores { 2 } else { 1 });
            for (member, score) in members {
                items.push(Frame::bulk(member));
                if with_scores {
                    items.push(Frame::bulk(format_score(score)));
                }
            }
            Frame::Array(items)
        }
        Err(err) => Frame::error(err.to_string()),
    }
}
