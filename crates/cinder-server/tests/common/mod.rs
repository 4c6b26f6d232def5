#![allow(dead_code)]

use std::sync::Arc;

use cinder_core::Store;
use cinder_protocol::Frame;
use cinder_server::{Dispatch, ServerConfig, ServerState, Session};

/// Fresh state with default config and an empty store.
pub fn fresh_state() -> Arc<ServerState> {
    ServerState::new(ServerConfig::default(), Store::new())
}

/// Fresh state with explicit config and store.
pub fn state_with(config: ServerConfig, store: Store) -> Arc<ServerState> {
    ServerState::new(config, store)
}

/// Builds a command array of bulk strings.
pub fn cmd(parts: &[&str]) -> Frame {
    Frame::Array(parts.iter().map(|p| Frame::bulk((*p).to_owned())).collect())
}

/// Dispatches a command and unwraps the non-closing reply.
pub fn reply(session: &mut Session, parts: &[&str]) -> Frame {
    match session.dispatch(cmd(parts)) {
        Dispatch::Reply(frame) => frame,
        Dispatch::Close(frame) => panic!("unexpected connection close: {frame:?}"),
    }
}

/// Asserts a `+OK` reply.
pub fn expect_ok(session: &mut Session, parts: &[&str]) {
    assert_eq!(reply(session, parts), Frame::ok(), "command {parts:?}");
}

/// Asserts a bulk reply with the given payload.
pub fn expect_bulk(session: &mut Session, parts: &[&str], want: &str) {
    assert_eq!(
        reply(session, parts),
        Frame::bulk(want.to_owned()),
        "command {parts:?}"
    );
}

/// Asserts an integer reply.
pub fn expect_int(session: &mut Session, parts: &[&str], want: i64) {
    assert_eq!(reply(session, parts), Frame::Integer(want), "command {parts:?}");
}
