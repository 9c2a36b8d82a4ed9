//! The store ties the configuration, the data log and the index together and
//! carries the per-mode write and lookup primitives the dispatcher builds
//! on.

use byteorder::{ByteOrder, LittleEndian};
use log::info;

use crate::config::{Config, KeyMode};
use crate::data::DataLog;
use crate::error::Result;
use crate::index::{Index, IndexEntry};

/// A position-encoded key: `segment id u16` then `offset u64`, little
/// endian. The wire bytes and the on-disk encoding are identical so keys
/// round-trip between clients and storage.
pub const POSITION_KEY_SIZE: usize = 10;

pub struct Store {
    config: Config,
    data: DataLog,
    index: Index,
}

impl Store {
    /// Opens the index first (replaying its segments) and the data log on
    /// the same active id, so `data-NNNNN` and `index-NNNNN` stay paired.
    pub fn open(config: Config) -> Result<Self> {
        let index = Index::open(&config.indexpath, config.sync)?;
        let data = DataLog::open(&config.datapath, index.segment_id(), config.sync)?;
        Ok(Self {
            config,
            data,
            index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> KeyMode {
        self.config.mode
    }

    /// SET with a client-supplied key. Data first, index second: a failed
    /// data write records nothing, a failed index write orphans the record
    /// (invisible, reclaimable by compaction).
    pub fn set_user_key(&mut self, key: &[u8], value: &[u8]) -> Result<u64> {
        let offset = self.data.insert(value, key)?;
        self.index
            .insert(key, self.data.segment_id(), offset, value.len() as u64)?;
        Ok(offset)
    }

    /// SET with a generated 4-byte key; returns the key to echo to the
    /// client.
    pub fn set_sequential(&mut self, value: &[u8]) -> Result<(Vec<u8>, u64)> {
        let key = self.index.next_id().to_le_bytes().to_vec();
        let offset = self.data.insert(value, &key)?;
        self.index
            .insert(&key, self.data.segment_id(), offset, value.len() as u64)?;
        Ok((key, offset))
    }

    /// SET whose key is the record position itself; the index is not
    /// touched. The key embedded in the record is written before the offset
    /// is known and carries zero there; the key handed back to the client
    /// carries the real offset and is the only copy that matters.
    pub fn set_position(&mut self, value: &[u8]) -> Result<(Vec<u8>, u64)> {
        let mut key = [0u8; POSITION_KEY_SIZE];
        LittleEndian::write_u16(&mut key[0..2], self.data.segment_id());
        let offset = self.data.insert(value, &key)?;
        LittleEndian::write_u64(&mut key[2..10], offset);
        Ok((key.to_vec(), offset))
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.index.get(key)
    }

    /// Decodes a position-encoded key into an entry. Zero length makes the
    /// data log take the payload size from the record header.
    pub fn position_entry(key: &[u8]) -> Option<IndexEntry> {
        if key.len() != POSITION_KEY_SIZE {
            return None;
        }
        Some(IndexEntry {
            flags: 0,
            segment_id: LittleEndian::read_u16(&key[0..2]),
            offset: LittleEndian::read_u64(&key[2..10]),
            length: 0,
        })
    }

    pub fn read_value(&self, entry: &IndexEntry, idlength: u8) -> Result<Vec<u8>> {
        self.data
            .get(entry.offset, entry.length, entry.segment_id, idlength)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.index.delete(key)
    }

    /// Rolls both segments once a write ends past the size threshold. The
    /// threshold is soft: the record that crossed it stays where it was
    /// written.
    pub fn roll_if_needed(&mut self, offset: u64, value_length: u64) -> Result<()> {
        if offset + value_length > self.config.max_segment_size {
            let new_id = self.index.jump_next()?;
            self.data.jump_to(new_id)?;
            info!("rolled data and index to segment {new_id}");
        }
        Ok(())
    }
}
