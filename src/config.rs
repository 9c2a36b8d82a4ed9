use std::path::PathBuf;

use clap::ValueEnum;

pub const DEFAULT_PORT: u16 = 9900;

/// Segment rollover threshold (256 MB). A single record may exceed it; the
/// check runs after the write, never against one record.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

/// How keys are assigned and located. Fixed at startup and part of the store
/// identity; mixing modes across restarts of one directory is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyMode {
    /// Keys are supplied by the client.
    UserKey,
    /// Keys are drawn from a monotonic 32-bit counter.
    Sequential,
    /// Keys encode the record's segment id and offset; no index is kept.
    PositionEncoded,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `data-NNNNN` segments, created if missing.
    pub datapath: PathBuf,
    /// Directory holding `index-NNNNN` segments, created if missing.
    pub indexpath: PathBuf,
    pub listen: String,
    pub port: u16,
    pub verbose: bool,
    /// Force every append to stable storage before acknowledging it.
    pub sync: bool,
    /// Replay and print the index instead of serving.
    pub dump: bool,
    pub mode: KeyMode,
    pub max_segment_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datapath: PathBuf::from("./silo-data"),
            indexpath: PathBuf::from("./silo-index"),
            listen: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            verbose: false,
            sync: false,
            dump: false,
            mode: KeyMode::UserKey,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}
