//! Append-only segmented key/value store speaking a RESP subset over TCP.
//!
//! Values append to `data-NNNNN` segments; keys live in an in-memory map
//! persisted as a parallel `index-NNNNN` append-log that is replayed at
//! startup. Keys are client-supplied, drawn from a monotonic counter, or
//! encode the record position itself, fixed per store at startup.

pub mod config;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod resp;
pub mod server;
pub mod signal;
pub mod store;

pub use config::{Config, KeyMode};
pub use error::{Error, Result};
pub use store::Store;
