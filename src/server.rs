//! Single-threaded TCP front end. One connection is serviced at a time, one
//! request to completion; append ordering and the sequential counter need no
//! locks because nothing here is concurrent.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use log::{debug, info, warn};

use crate::dispatch::{self, Outcome};
use crate::error::Result;
use crate::resp::RequestParser;
use crate::store::Store;

const READ_CHUNK_SIZE: usize = 8192;

enum ConnectionEnd {
    Disconnected,
    #[cfg(debug_assertions)]
    Stopped,
}

/// Accepts and services connections until a STOP drains the listener.
/// Returning hands the store back to the caller for an orderly drop.
pub fn serve(store: &mut Store) -> Result<()> {
    let listener = TcpListener::bind((store.config().listen.as_str(), store.config().port))?;
    info!(
        "listening on {}:{}",
        store.config().listen,
        store.config().port
    );

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(err) => {
                warn!("accept failed: {err}");
                continue;
            }
        };
        match serve_connection(store, stream) {
            Ok(ConnectionEnd::Disconnected) => {}
            #[cfg(debug_assertions)]
            Ok(ConnectionEnd::Stopped) => {
                info!("stop requested, draining");
                return Ok(());
            }
            Err(err) => debug!("connection closed: {err}"),
        }
    }
    Ok(())
}

fn serve_connection(store: &mut Store, mut stream: TcpStream) -> Result<ConnectionEnd> {
    if let Ok(peer) = stream.peer_addr() {
        debug!("client connected: {peer}");
    }

    let mut parser = RequestParser::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut replies = Vec::new();

    loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            debug!("client disconnected");
            return Ok(ConnectionEnd::Disconnected);
        }
        parser.feed(&chunk[..read]);

        // A framing error propagates and closes the connection.
        while let Some(request) = parser.next_request()? {
            replies.clear();
            let outcome = dispatch::dispatch(store, &request, &mut replies);
            stream.write_all(&replies)?;
            match outcome {
                Outcome::Continue => {}
                #[cfg(debug_assertions)]
                Outcome::Stop => return Ok(ConnectionEnd::Stopped),
            }
        }
    }
}
