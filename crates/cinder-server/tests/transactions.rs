//! End-to-end transaction and WATCH behavior, driven through the
//! session dispatcher exactly as a connection would.

mod common;

use common::{cmd, expect_bulk, expect_int, expect_ok, fresh_state, reply};

use cinder_protocol::Frame;
use cinder_server::{Dispatch, Session};

#[test]
fn transaction_commits_queued_commands() {
    let state = fresh_state();
    let mut session = Session::new(state);

    expect_ok(&mut session, &["MULTI"]);
    assert_eq!(
        reply(&mut session, &["SET", "k1", "v1"]),
        Frame::Simple("QUEUED".into())
    );
    assert_eq!(
        reply(&mut session, &["SET", "k2", "v2"]),
        Frame::Simple("QUEUED".into())
    );

    assert_eq!(
        reply(&mut session, &["EXEC"]),
        Frame::Array(vec![Frame::ok(), Frame::ok()])
    );

    expect_bulk(&mut session, &["GET", "k1"], "v1");
    expect_bulk(&mut session, &["GET", "k2"], "v2");
}

#[test]
fn queued_commands_do_not_run_before_exec() {
    let state = fresh_state();
    let mut writer = Session::new(state.clone());
    let mut observer = Session::new(state);

    expect_ok(&mut writer, &["MULTI"]);
    reply(&mut writer, &["SET", "pending", "value"]);

    assert_eq!(reply(&mut observer, &["GET", "pending"]), Frame::NullBulk);

    reply(&mut writer, &["EXEC"]);
    expect_bulk(&mut observer, &["GET", "pending"], "value");
}

#[test]
fn watch_conflict_aborts_exec_with_null_bulk() {
    let state = fresh_state();
    let mut alice = Session::new(state.clone());
    let mut bob = Session::new(state);

    expect_ok(&mut alice, &["SET", "k1", "value1"]);
    expect_ok(&mut alice, &["WATCH", "k1"]);
    expect_ok(&mut alice, &["MULTI"]);
    assert_eq!(
        reply(&mut alice, &["SET", "k1", "a1"]),
        Frame::Simple("QUEUED".into())
    );

    // a competing write lands between WATCH and EXEC
    expect_ok(&mut bob, &["SET", "k1", "client2value"]);

    assert_eq!(reply(&mut alice, &["EXEC"]), Frame::NullBulk);
    expect_bulk(&mut alice, &["GET", "k1"], "client2value");
}

#[test]
fn exec_succeeds_when_watched_key_untouched() {
    let state = fresh_state();
    let mut alice = Session::new(state.clone());
    let mut bob = Session::new(state);

    expect_ok(&mut alice, &["SET", "watched", "v"]);
    expect_ok(&mut alice, &["WATCH", "watched"]);
    expect_ok(&mut alice, &["MULTI"]);
    reply(&mut alice, &["SET", "watched", "updated"]);

    // writes to unrelated keys don't dirty the watcher
    expect_ok(&mut bob, &["SET", "other", "x"]);

    assert_eq!(
        reply(&mut alice, &["EXEC"]),
        Frame::Array(vec![Frame::ok()])
    );
    expect_bulk(&mut alice, &["GET", "watched"], "updated");
}

#[test]
fn own_write_between_watch_and_multi_dirties_the_session() {
    let state = fresh_state();
    let mut session = Session::new(state);

    expect_ok(&mut session, &["SET", "k", "v"]);
    expect_ok(&mut session, &["WATCH", "k"]);
    expect_ok(&mut session, &["SET", "k", "changed"]);
    expect_ok(&mut session, &["MULTI"]);
    reply(&mut session, &["SET", "k", "from-tx"]);

    assert_eq!(reply(&mut session, &["EXEC"]), Frame::NullBulk);
    expect_bulk(&mut session, &["GET", "k"], "changed");
}

#[test]
fn unwatch_clears_the_conflict() {
    let state = fresh_state();
    let mut alice = Session::new(state.clone());
    let mut bob = Session::new(state);

    expect_ok(&mut alice, &["SET", "k", "v"]);
    expect_ok(&mut alice, &["WATCH", "k"]);
    expect_ok(&mut bob, &["SET", "k", "dirtying"]);

    expect_ok(&mut alice, &["UNWATCH"]);
    expect_ok(&mut alice, &["MULTI"]);
    reply(&mut alice, &["SET", "k", "committed"]);

    assert_eq!(
        reply(&mut alice, &["EXEC"]),
        Frame::Array(vec![Frame::ok()])
    );
    expect_bulk(&mut alice, &["GET", "k"], "committed");
}

#[test]
fn exec_collects_results_in_order() {
    let state = fresh_state();
    let mut session = Session::new(state);

    expect_ok(&mut session, &["SET", "n", "10"]);
    expect_ok(&mut session, &["MULTI"]);
    reply(&mut session, &["INCR", "n"]);
    reply(&mut session, &["INCR", "n"]);
    reply(&mut session, &["GET", "n"]);

    assert_eq!(
        reply(&mut session, &["EXEC"]),
        Frame::Array(vec![
            Frame::Integer(11),
            Frame::Integer(12),
            Frame::bulk("12".to_owned()),
        ])
    );
}

#[test]
fn errors_inside_exec_do_not_stop_the_queue() {
    let state = fresh_state();
    let mut session = Session::new(state);

    expect_ok(&mut session, &["SET", "text", "abc"]);
    expect_ok(&mut session, &["MULTI"]);
    reply(&mut session, &["INCR", "text"]);
    reply(&mut session, &["SET", "after", "done"]);

    let results = match reply(&mut session, &["EXEC"]) {
        Frame::Array(items) => items,
        other => panic!("expected array, got {other:?}"),
    };
    assert!(matches!(results[0], Frame::Error(_)));
    assert_eq!(results[1], Frame::ok());
    expect_bulk(&mut session, &["GET", "after"], "done");
}

#[test]
fn transaction_state_machine_errors() {
    let state = fresh_state();
    let mut session = Session::new(state);

    assert_eq!(
        reply(&mut session, &["EXEC"]),
        Frame::error("ERR EXEC without MULTI")
    );
    assert_eq!(
        reply(&mut session, &["DISCARD"]),
        Frame::error("ERR DISCARD without MULTI")
    );

    expect_ok(&mut session, &["MULTI"]);
    assert_eq!(
        reply(&mut session, &["MULTI"]),
        Frame::error("ERR MULTI calls can not be nested")
    );
    assert_eq!(
        reply(&mut session, &["WATCH", "k"]),
        Frame::error("ERR WATCH inside MULTI is not allowed")
    );
    expect_ok(&mut session, &["DISCARD"]);
}

#[test]
fn watch_requires_at_least_one_key() {
    let state = fresh_state();
    let mut session = Session::new(state);
    assert_eq!(
        reply(&mut session, &["WATCH"]),
        Frame::error("ERR wrong number of arguments for 'watch' command")
    );
}

#[test]
fn discard_drops_the_queue_and_watches() {
    let state = fresh_state();
    let mut alice = Session::new(state.clone());
    let mut bob = Session::new(state);

    expect_ok(&mut alice, &["WATCH", "k"]);
    expect_ok(&mut alice, &["MULTI"]);
    reply(&mut alice, &["SET", "k", "queued"]);
    expect_ok(&mut alice, &["DISCARD"]);

    assert_eq!(reply(&mut alice, &["GET", "k"]), Frame::NullBulk);

    // watches were dropped with the transaction, so a later write by
    // bob followed by a fresh transaction commits fine
    expect_ok(&mut bob, &["SET", "k", "from-bob"]);
    expect_ok(&mut alice, &["MULTI"]);
    reply(&mut alice, &["SET", "k", "after-discard"]);
    assert_eq!(
        reply(&mut alice, &["EXEC"]),
        Frame::Array(vec![Frame::ok()])
    );
}

#[test]
fn dropped_session_unregisters_its_watches() {
    let state = fresh_state();
    let mut bob = Session::new(state.clone());

    {
        let mut alice = Session::new(state.clone());
        expect_ok(&mut alice, &["WATCH", "shared"]);
    }

    // alice is gone; writing the key she watched must not panic or leak
    expect_ok(&mut bob, &["SET", "shared", "v"]);
}

#[test]
fn non_array_frame_closes_the_connection() {
    let state = fresh_state();
    let mut session = Session::new(state);
    match session.dispatch(Frame::Integer(42)) {
        Dispatch::Close(Frame::Error(msg)) => assert!(msg.contains("protocol error")),
        other => panic!("expected close, got {other:?}"),
    }
}

#[test]
fn non_bulk_command_name_closes_the_connection() {
    let state = fresh_state();
    let mut session = Session::new(state);
    match session.dispatch(Frame::Array(vec![Frame::Integer(1)])) {
        Dispatch::Close(Frame::Error(msg)) => assert!(msg.contains("protocol error")),
        other => panic!("expected close, got {other:?}"),
    }
}

#[test]
fn unknown_command_reports_uppercased_name() {
    let state = fresh_state();
    let mut session = Session::new(state);
    assert_eq!(
        reply(&mut session, &["frobnicate", "x"]),
        Frame::error("ERR unknown command 'FROBNICATE'")
    );
}

#[test]
fn arity_and_type_errors_on_the_wire_surface() {
    let state = fresh_state();
    let mut session = Session::new(state);

    assert_eq!(
        reply(&mut session, &["GET"]),
        Frame::error("ERR wrong number of arguments for 'get' command")
    );
    assert_eq!(
        reply(&mut session, &["SET", "only-key"]),
        Frame::error("ERR wrong number of arguments for 'set' command")
    );

    expect_int(&mut session, &["LPUSH", "list", "a"], 1);
    assert_eq!(
        reply(&mut session, &["GET", "list"]),
        Frame::error("WRONGTYPE Operation against a key holding the wrong kind of value")
    );
}

#[test]
fn set_nx_and_xx_null_replies() {
    let state = fresh_state();
    let mut session = Session::new(state);

    expect_ok(&mut session, &["SET", "k", "v", "NX"]);
    assert_eq!(reply(&mut session, &["SET", "k", "other", "NX"]), Frame::NullBulk);
    expect_bulk(&mut session, &["GET", "k"], "v");

    assert_eq!(reply(&mut session, &["SET", "ghost", "v", "XX"]), Frame::NullBulk);
    assert_eq!(reply(&mut session, &["GET", "ghost"]), Frame::NullBulk);
}

#[test]
fn command_surface_smoke() {
    let state = fresh_state();
    let mut session = Session::new(state);

    assert_eq!(reply(&mut session, &["PING"]), Frame::Simple("PONG".into()));
    expect_bulk(&mut session, &["PING", "hello"], "hello");
    expect_bulk(&mut session, &["ECHO", "echoed"], "echoed");
    assert_eq!(reply(&mut session, &["COMMAND"]), Frame::Array(vec![]));

    expect_ok(&mut session, &["SET", "s", "1"]);
    expect_int(&mut session, &["DBSIZE"], 1);
    assert_eq!(reply(&mut session, &["TYPE", "s"]), Frame::Simple("string".into()));
    assert_eq!(reply(&mut session, &["TYPE", "none"]), Frame::Simple("none".into()));
    expect_int(&mut session, &["DEL", "s", "missing"], 1);
    expect_ok(&mut session, &["FLUSHDB"]);
    expect_int(&mut session, &["DBSIZE"], 0);
}

#[test]
fn keys_lists_live_keys() {
    let state = fresh_state();
    let mut session = Session::new(state);

    expect_ok(&mut session, &["SET", "a", "1"]);
    expect_ok(&mut session, &["SET", "b", "2"]);

    let mut keys: Vec<String> = match reply(&mut session, &["KEYS"]) {
        Frame::Array(items) => items
            .into_iter()
            .map(|f| match f {
                Frame::Bulk(b) => String::from_utf8_lossy(&b).into_owned(),
                other => panic!("expected bulk key, got {other:?}"),
            })
            .collect(),
        other => panic!("expected array, got {other:?}"),
    };
    keys.sort();
    assert_eq!(keys, vec!["a".to_owned(), "b".to_owned()]);
}

#[test]
fn config_get_and_set_round_trip() {
    let state = fresh_state();
    let mut session = Session::new(state);

    assert_eq!(
        reply(&mut session, &["CONFIG", "GET", "maxmemory-policy"]),
        Frame::Array(vec![
            Frame::bulk("maxmemory-policy".to_owned()),
            Frame::bulk("noeviction".to_owned()),
        ])
    );

    expect_ok(&mut session, &["CONFIG", "SET", "maxmemory-policy", "allkeys-lru"]);
    assert_eq!(
        reply(&mut session, &["CONFIG", "GET", "maxmemory-policy"]),
        Frame::Array(vec![
            Frame::bulk("maxmemory-policy".to_owned()),
            Frame::bulk("allkeys-lru".to_owned()),
        ])
    );

    assert_eq!(
        reply(&mut session, &["CONFIG", "GET", "no-such-setting"]),
        Frame::Array(vec![])
    );
}

#[test]
fn empty_command_array_is_an_error_but_not_fatal() {
    let state = fresh_state();
    let mut session = Session::new(state);
    match session.dispatch(cmd(&[])) {
        Dispatch::Reply(Frame::Error(msg)) => assert!(msg.contains("empty")),
        other => panic!("expected error reply, got {other:?}"),
    }
}
