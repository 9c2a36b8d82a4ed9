use silo::dispatch::{self, Outcome};
use silo::resp::Request;
use silo::{Config, KeyMode, Store};
use tempfile::tempdir;

fn open_store(root: &std::path::Path, mode: KeyMode) -> Store {
    let config = Config {
        datapath: root.join("data"),
        indexpath: root.join("index"),
        mode,
        ..Config::default()
    };
    Store::open(config).expect("store open")
}

fn exec(store: &mut Store, parts: &[&[u8]]) -> Vec<u8> {
    let request = Request {
        args: parts.iter().map(|part| part.to_vec()).collect(),
    };
    let mut out = Vec::new();
    dispatch::dispatch(store, &request, &mut out);
    out
}

#[test]
fn set_get_del_round_trip() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(dir.path(), KeyMode::UserKey);

    assert_eq!(exec(&mut store, &[b"SET", b"foo", b"bar"]), b"$3\r\nfoo\r\n");
    assert_eq!(exec(&mut store, &[b"GET", b"foo"]), b"$3\r\nbar\r\n");
    assert_eq!(exec(&mut store, &[b"DEL", b"foo"]), b"+OK\r\n");
    assert_eq!(exec(&mut store, &[b"GET", b"foo"]), b"$-1\r\n");
}

#[test]
fn overwrite_returns_latest_value() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(dir.path(), KeyMode::UserKey);

    exec(&mut store, &[b"SET", b"k", b"v1"]);
    exec(&mut store, &[b"SET", b"k", b"v2"]);
    assert_eq!(exec(&mut store, &[b"GET", b"k"]), b"$2\r\nv2\r\n");
}

#[test]
fn set_after_delete_revives_key() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(dir.path(), KeyMode::UserKey);

    exec(&mut store, &[b"SET", b"k", b"old"]);
    exec(&mut store, &[b"DEL", b"k"]);
    assert_eq!(exec(&mut store, &[b"GET", b"k"]), b"$-1\r\n");
    exec(&mut store, &[b"SET", b"k", b"new"]);
    assert_eq!(exec(&mut store, &[b"GET", b"k"]), b"$3\r\nnew\r\n");
}

#[test]
fn ping_and_unknown_command() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(dir.path(), KeyMode::UserKey);

    assert_eq!(exec(&mut store, &[b"PING"]), b"+PONG\r\n");
    assert_eq!(
        exec(&mut store, &[b"FLUSHALL"]),
        b"-Command not supported\r\n"
    );
}

#[test]
fn argument_validation() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(dir.path(), KeyMode::UserKey);

    assert_eq!(
        exec(&mut store, &[b"SET", b"lonely"]),
        b"-Invalid argument\r\n"
    );
    assert_eq!(
        exec(&mut store, &[b"SET", b"empty", b""]),
        b"-Invalid argument\r\n"
    );
    assert_eq!(
        exec(&mut store, &[b"SET", b"", b"value"]),
        b"-Invalid argument\r\n"
    );

    let long_key = vec![b'k'; 256];
    assert_eq!(
        exec(&mut store, &[b"SET", &long_key, b"value"]),
        b"-Key too large\r\n"
    );
    assert_eq!(exec(&mut store, &[b"GET", &long_key]), b"-Invalid key\r\n");
    assert_eq!(exec(&mut store, &[b"DEL", &long_key]), b"-Invalid key\r\n");

    assert_eq!(
        exec(&mut store, &[b"DEL", b"missing"]),
        b"-Cannot delete key\r\n"
    );
}

#[cfg(debug_assertions)]
#[test]
fn stop_drains_the_listener() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(dir.path(), KeyMode::UserKey);

    let request = Request {
        args: vec![b"STOP".to_vec()],
    };
    let mut out = Vec::new();
    let outcome = dispatch::dispatch(&mut store, &request, &mut out);
    assert_eq!(out, b"+Stopping\r\n");
    assert_eq!(outcome, Outcome::Stop);
}
