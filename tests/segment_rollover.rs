use silo::dispatch;
use silo::resp::Request;
use silo::{Config, KeyMode, Store};
use tempfile::tempdir;

fn config(root: &std::path::Path) -> Config {
    Config {
        datapath: root.join("data"),
        indexpath: root.join("index"),
        mode: KeyMode::UserKey,
        max_segment_size: 4096,
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

fn bulk(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    silo::resp::write_bulk(&mut out, payload);
    out
}

#[test]
fn writes_roll_to_the_next_segment_pair() {
    let dir = tempdir().expect("tempdir");
    let mut store = Store::open(config(dir.path())).expect("open");

    let value = vec![b'v'; 1024];
    for i in 0u32..5 {
        let key = format!("key-{i}");
        let reply = exec(&mut store, &[b"SET", key.as_bytes(), &value]);
        assert_eq!(reply[0], b'$', "set must succeed: {reply:?}");
    }

    assert!(dir.path().join("data").join("data-00001").exists());
    assert!(dir.path().join("index").join("index-00001").exists());

    // Values on both sides of the roll stay readable.
    for i in 0u32..5 {
        let key = format!("key-{i}");
        assert_eq!(
            exec(&mut store, &[b"GET", key.as_bytes()]),
            bulk(&value),
            "missing key-{i}"
        );
    }
}

#[test]
fn rolled_segments_survive_restart() {
    let dir = tempdir().expect("tempdir");
    let value = vec![b'v'; 1024];
    {
        let mut store = Store::open(config(dir.path())).expect("open");
        for i in 0u32..6 {
            let key = format!("key-{i}");
            exec(&mut store, &[b"SET", key.as_bytes(), &value]);
        }
    }

    let mut store = Store::open(config(dir.path())).expect("reopen");
    for i in 0u32..6 {
        let key = format!("key-{i}");
        assert_eq!(
            exec(&mut store, &[b"GET", key.as_bytes()]),
            bulk(&value),
            "missing key-{i}"
        );
    }
}

#[test]
fn oversize_record_rolls_immediately_after() {
    let dir = tempdir().expect("tempdir");
    let mut store = Store::open(config(dir.path())).expect("open");

    // A single record may exceed the threshold; the cap is soft.
    let huge = vec![b'h'; 8192];
    assert_eq!(
        exec(&mut store, &[b"SET", b"big", &huge])[0], b'$'
    );
    exec(&mut store, &[b"SET", b"after", b"small"]);

    assert!(dir.path().join("data").join("data-00001").exists());
    assert_eq!(exec(&mut store, &[b"GET", b"big"]), bulk(&huge));
    assert_eq!(exec(&mut store, &[b"GET", b"after"]), b"$5\r\nsmall\r\n");
}
