//! Command dispatcher: binds parsed requests to the store, one keying mode
//! fixed for the process lifetime. Replies are appended to a buffer; the
//! dispatcher never touches sockets.

use log::{debug, error};

use crate::config::KeyMode;
use crate::data::MAX_KEY_LENGTH;
use crate::resp::{self, Request};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Drain the listener and shut down. Debug builds only.
    #[cfg(debug_assertions)]
    Stop,
}

pub fn dispatch(store: &mut Store, request: &Request, out: &mut Vec<u8>) -> Outcome {
    match request.arg(0) {
        b"PING" => {
            debug!("PING");
            resp::write_status(out, "PONG");
            Outcome::Continue
        }
        b"SET" | b"SETX" => {
            handle_set(store, request, out);
            Outcome::Continue
        }
        b"GET" => {
            handle_get(store, request, out);
            Outcome::Continue
        }
        b"DEL" => {
            handle_del(store, request, out);
            Outcome::Continue
        }
        #[cfg(debug_assertions)]
        b"STOP" => {
            resp::write_status(out, "Stopping");
            Outcome::Stop
        }
        _ => {
            debug!("unsupported command");
            resp::write_error(out, "Command not supported");
            Outcome::Continue
        }
    }
}

fn handle_set(store: &mut Store, request: &Request, out: &mut Vec<u8>) {
    if request.argc() != 3 || request.arg(2).is_empty() {
        resp::write_error(out, "Invalid argument");
        return;
    }
    let key = request.arg(1);
    let value = request.arg(2);
    if key.len() > MAX_KEY_LENGTH {
        resp::write_error(out, "Key too large");
        return;
    }

    let result = match store.mode() {
        KeyMode::UserKey => {
            if key.is_empty() {
                resp::write_error(out, "Invalid argument");
                return;
            }
            store
                .set_user_key(key, value)
                .map(|offset| (key.to_vec(), offset))
        }
        KeyMode::Sequential => store.set_sequential(value),
        KeyMode::PositionEncoded => store.set_position(value),
    };

    match result {
        Ok((effective_key, offset)) => {
            debug!(
                "set: {} byte key, {} byte value at offset {offset}",
                effective_key.len(),
                value.len()
            );
            resp::write_bulk(out, &effective_key);
            if let Err(err) = store.roll_if_needed(offset, value.len() as u64) {
                error!("segment rollover failed: {err}");
            }
        }
        Err(err) => {
            debug!("set failed: {err}");
            resp::write_null_bulk(out);
        }
    }
}

fn handle_get(store: &mut Store, request: &Request, out: &mut Vec<u8>) {
    if request.argc() != 2 {
        resp::write_error(out, "Invalid argument");
        return;
    }
    let key = request.arg(1);
    if key.len() > MAX_KEY_LENGTH {
        resp::write_error(out, "Invalid key");
        return;
    }

    let entry = match store.mode() {
        KeyMode::UserKey | KeyMode::Sequential => store.lookup(key).copied(),
        KeyMode::PositionEncoded => Store::position_entry(key),
    };
    let entry = match entry {
        Some(entry) if !entry.is_deleted() => entry,
        _ => {
            debug!("get: key not found");
            resp::write_null_bulk(out);
            return;
        }
    };

    match store.read_value(&entry, key.len() as u8) {
        Ok(payload) => resp::write_bulk(out, &payload),
        Err(err) => {
            error!("cannot read payload: {err}");
            resp::write_error(out, "Internal Error");
        }
    }
}

fn handle_del(store: &mut Store, request: &Request, out: &mut Vec<u8>) {
    if request.argc() != 2 {
        resp::write_error(out, "Invalid argument");
        return;
    }
    let key = request.arg(1);
    if key.len() > MAX_KEY_LENGTH {
        resp::write_error(out, "Invalid key");
        return;
    }
    // Position-encoded stores keep no index entry to flag.
    if store.mode() == KeyMode::PositionEncoded {
        resp::write_error(out, "Cannot delete key");
        return;
    }

    match store.delete(key) {
        Ok(()) => resp::write_status(out, "OK"),
        Err(err) => {
            debug!("delete failed: {err}");
            resp::write_error(out, "Cannot delete key");
        }
    }
}
