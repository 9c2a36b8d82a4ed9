use silo::dispatch;
use silo::resp::Request;
use silo::{Config, KeyMode, Store};
use tempfile::tempdir;

fn config(root: &std::path::Path, mode: KeyMode) -> Config {
    Config {
        datapath: root.join("data"),
        indexpath: root.join("index"),
        mode,
        ..Config::default()
    }
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
fn values_survive_restart() {
    let dir = tempdir().expect("tempdir");
    {
        let mut store = Store::open(config(dir.path(), KeyMode::UserKey)).expect("open");
        assert_eq!(exec(&mut store, &[b"SET", b"a", b"1"]), b"$1\r\na\r\n");
    }

    let mut store = Store::open(config(dir.path(), KeyMode::UserKey)).expect("reopen");
    assert_eq!(exec(&mut store, &[b"GET", b"a"]), b"$1\r\n1\r\n");
}

#[test]
fn overwrites_and_deletes_survive_restart() {
    let dir = tempdir().expect("tempdir");
    {
        let mut store = Store::open(config(dir.path(), KeyMode::UserKey)).expect("open");
        exec(&mut store, &[b"SET", b"kept", b"first"]);
        exec(&mut store, &[b"SET", b"kept", b"second"]);
        exec(&mut store, &[b"SET", b"gone", b"x"]);
        exec(&mut store, &[b"DEL", b"gone"]);
    }

    let mut store = Store::open(config(dir.path(), KeyMode::UserKey)).expect("reopen");
    assert_eq!(exec(&mut store, &[b"GET", b"kept"]), b"$6\r\nsecond\r\n");
    assert_eq!(exec(&mut store, &[b"GET", b"gone"]), b"$-1\r\n");
}
