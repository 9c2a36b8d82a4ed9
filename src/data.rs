//! The data log: segmented append-only files of `(header, key, value)`
//! records.
//!
//! Each record is a 5-byte header (`idlength: u8`, `datalength: u32` little
//! endian) followed by the key bytes and the payload. The key embedded in
//! every record makes a bare data segment self-describing: the index can be
//! rebuilt by scanning, and position-encoded reads recover the payload
//! length from the header alone.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::signal;

pub const RECORD_HEADER_SIZE: usize = 5;

/// The on-disk header stores the key length in one byte.
pub const MAX_KEY_LENGTH: usize = 255;

pub fn segment_filename(id: u16) -> String {
    format!("data-{:05}", id)
}

pub fn segment_path(dir: &Path, id: u16) -> PathBuf {
    dir.join(segment_filename(id))
}

pub struct DataLog {
    dir: PathBuf,
    segment_id: u16,
    file: File,
    write_offset: u64,
    sync: bool,
}

impl DataLog {
    /// Opens the segment paired with the index's active id, creating the
    /// directory and the file as needed. The write offset picks up at the
    /// end of whatever the segment already holds.
    pub fn open(dir: impl AsRef<Path>, segment_id: u16, sync: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let file = open_active(&dir, segment_id)?;
        let write_offset = file.metadata()?.len();
        signal::register_data_fd(&file);
        debug!(
            "data log open: {} at offset {}",
            segment_filename(segment_id),
            write_offset
        );
        Ok(Self {
            dir,
            segment_id,
            file,
            write_offset,
            sync,
        })
    }

    pub fn segment_id(&self) -> u16 {
        self.segment_id
    }

    /// Appends one record and returns the offset of its header. A failed
    /// write truncates the file back to its pre-write length so replay by
    /// scan never sees a torn record; the caller must not record an index
    /// entry for a failed insert.
    pub fn insert(&mut self, value: &[u8], key: &[u8]) -> Result<u64> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(Error::InvalidArgument("key length out of range"));
        }
        if value.len() as u64 > u64::from(u32::MAX) {
            return Err(Error::InvalidArgument("value exceeds record capacity"));
        }

        let offset = self.write_offset;
        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + key.len() + value.len());
        let mut header = [0u8; RECORD_HEADER_SIZE];
        header[0] = key.len() as u8;
        LittleEndian::write_u32(&mut header[1..5], value.len() as u32);
        record.extend_from_slice(&header);
        record.extend_from_slice(key);
        record.extend_from_slice(value);

        if let Err(err) = self.file.write_all(&record) {
            if let Err(trunc) = self.file.set_len(offset) {
                warn!(
                    "cannot truncate {} after failed write: {trunc}",
                    segment_filename(self.segment_id)
                );
            }
            return Err(err.into());
        }
        if self.sync {
            self.file.sync_data()?;
        }

        self.write_offset += record.len() as u64;
        Ok(offset)
    }

    /// Reads the payload of the record whose header starts at `offset` in
    /// segment `segment_id`. The stored header's key length is checked
    /// against `idlength`. A zero `length` means the caller does not know
    /// the payload size and it is taken from the header instead (the
    /// position-encoded read path).
    pub fn get(&self, offset: u64, length: u64, segment_id: u16, idlength: u8) -> Result<Vec<u8>> {
        if segment_id == self.segment_id {
            read_record(&self.file, offset, length, idlength)
        } else {
            // Sealed segments are immutable; open per read.
            let file = File::open(segment_path(&self.dir, segment_id))?;
            read_record(&file, offset, length, idlength)
        }
    }

    /// Seals the active segment and starts appending to `data-NEW_ID`.
    pub fn jump_to(&mut self, new_id: u16) -> Result<()> {
        self.file.sync_data()?;
        let file = open_active(&self.dir, new_id)?;
        signal::register_data_fd(&file);
        self.write_offset = file.metadata()?.len();
        self.file = file;
        self.segment_id = new_id;
        debug!("data log jumped to {}", segment_filename(new_id));
        Ok(())
    }
}

fn open_active(dir: &Path, id: u16) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(segment_path(dir, id))?;
    Ok(file)
}

fn read_record(file: &File, offset: u64, length: u64, idlength: u8) -> Result<Vec<u8>> {
    let mut header = [0u8; RECORD_HEADER_SIZE];
    file.read_exact_at(&mut header, offset)?;
    if header[0] != idlength {
        return Err(Error::Corrupt("record key length mismatch"));
    }

    let datalength = u64::from(LittleEndian::read_u32(&header[1..5]));
    let payload_length = if length == 0 { datalength } else { length };

    let mut payload = vec![0u8; payload_length as usize];
    let payload_offset = offset + RECORD_HEADER_SIZE as u64 + u64::from(idlength);
    file.read_exact_at(&mut payload, payload_offset)?;
    Ok(payload)
}
