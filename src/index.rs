//! The key index: an in-memory map from key to record location, persisted as
//! an append-only log of entries parallel to the data segments.
//!
//! On startup every `index-NNNNN` file is replayed in id order; a later
//! record for the same key supersedes the earlier one and a tombstone marks
//! the key absent. A truncated trailing record (crash mid-append) loses only
//! itself; everything before it survives.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use fnv::FnvHashMap;
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::signal;

/// Fixed prefix of an entry record: `idlength u8, flags u8, dataid u16,
/// offset u64, length u64`, then `idlength` key bytes.
pub const ENTRY_PREFIX_SIZE: usize = 20;

pub const FLAG_DELETED: u8 = 1;

/// Where a key's latest value lives. The on-disk record is this plus the key
/// bytes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub flags: u8,
    pub segment_id: u16,
    pub offset: u64,
    pub length: u64,
}

impl IndexEntry {
    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }
}

pub fn segment_filename(id: u16) -> String {
    format!("index-{:05}", id)
}

pub fn segment_path(dir: &Path, id: u16) -> PathBuf {
    dir.join(segment_filename(id))
}

fn parse_segment_filename(name: &str) -> Option<u16> {
    let digits = name.strip_prefix("index-")?;
    if digits.len() != 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Sorted ids of the index segments present in `dir`.
fn discover_segments(dir: &Path) -> Result<Vec<u16>> {
    let mut ids = Vec::new();
    if !dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if let Some(id) = parse_segment_filename(name) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

pub struct Index {
    dir: PathBuf,
    segment_id: u16,
    file: File,
    write_offset: u64,
    entries: FnvHashMap<Vec<u8>, IndexEntry>,
    next_sequence: u32,
    sync: bool,
}

impl Index {
    /// Replays every index segment into memory and opens the highest id for
    /// append (id 0 in a fresh directory). The data log must open the
    /// segment with the same id.
    pub fn open(dir: impl AsRef<Path>, sync: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let ids = discover_segments(&dir)?;
        let mut entries = FnvHashMap::default();
        let mut next_sequence = 0u32;
        for &id in &ids {
            replay_file(&segment_path(&dir, id), &mut entries, &mut next_sequence)?;
        }

        let segment_id = ids.last().copied().unwrap_or(0);
        let file = open_active(&dir, segment_id)?;
        let write_offset = file.metadata()?.len();
        signal::register_index_fd(&file);
        info!(
            "index ready: {} entries from {} segment(s), active {}",
            entries.len(),
            ids.len(),
            segment_filename(segment_id)
        );

        Ok(Self {
            dir,
            segment_id,
            file,
            write_offset,
            entries,
            next_sequence,
            sync,
        })
    }

    pub fn segment_id(&self) -> u16 {
        self.segment_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocates the next sequential-mode key. Base 0; replay seeds the
    /// counter past every 4-byte key already on disk.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        id
    }

    /// Lookup, deleted entries included; callers treat the flag as absence.
    pub fn get(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Records the location of a freshly appended value. The entry reaches
    /// disk before the map so a failed append leaves memory and disk
    /// agreeing.
    pub fn insert(&mut self, key: &[u8], segment_id: u16, offset: u64, length: u64) -> Result<()> {
        let entry = IndexEntry {
            flags: 0,
            segment_id,
            offset,
            length,
        };
        self.append_record(key, &entry)?;
        self.entries.insert(key.to_vec(), entry);
        Ok(())
    }

    /// Marks a key deleted with a tombstone record. Absent and
    /// already-deleted keys are an error. The value bytes stay in the data
    /// segment; only the index makes them unreachable.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let entry = match self.entries.get(key) {
            Some(entry) if !entry.is_deleted() => *entry,
            _ => return Err(Error::NotFound),
        };
        let tombstone = IndexEntry {
            flags: entry.flags | FLAG_DELETED,
            ..entry
        };
        self.append_record(key, &tombstone)?;
        self.entries.insert(key.to_vec(), tombstone);
        Ok(())
    }

    /// Seals the active segment and opens the next id for append, keeping
    /// the index in lockstep with the data log.
    pub fn jump_next(&mut self) -> Result<u16> {
        self.file.sync_data()?;
        let new_id = self.segment_id + 1;
        let file = open_active(&self.dir, new_id)?;
        signal::register_index_fd(&file);
        self.write_offset = file.metadata()?.len();
        self.file = file;
        self.segment_id = new_id;
        debug!("index jumped to {}", segment_filename(new_id));
        Ok(new_id)
    }

    fn append_record(&mut self, key: &[u8], entry: &IndexEntry) -> Result<()> {
        let record = encode_entry(key, entry);
        if let Err(err) = self.file.write_all(&record) {
            if let Err(trunc) = self.file.set_len(self.write_offset) {
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

fn encode_entry(key: &[u8], entry: &IndexEntry) -> Vec<u8> {
    let mut record = Vec::with_capacity(ENTRY_PREFIX_SIZE + key.len());
    let mut prefix = [0u8; ENTRY_PREFIX_SIZE];
    prefix[0] = key.len() as u8;
    prefix[1] = entry.flags;
    LittleEndian::write_u16(&mut prefix[2..4], entry.segment_id);
    LittleEndian::write_u64(&mut prefix[4..12], entry.offset);
    LittleEndian::write_u64(&mut prefix[12..20], entry.length);
    record.extend_from_slice(&prefix);
    record.extend_from_slice(key);
    record
}

/// Reads one entry record. `Ok(None)` is a clean end of file; any error in
/// the middle of a record means a truncated or damaged tail.
fn read_entry(reader: &mut impl Read) -> Result<Option<(Vec<u8>, IndexEntry)>> {
    let mut prefix = [0u8; ENTRY_PREFIX_SIZE];
    match reader.read_exact(&mut prefix[..1]) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let idlength = prefix[0] as usize;
    if idlength == 0 {
        return Err(Error::Corrupt("entry with zero-length key"));
    }
    reader.read_exact(&mut prefix[1..])?;

    let entry = IndexEntry {
        flags: prefix[1],
        segment_id: LittleEndian::read_u16(&prefix[2..4]),
        offset: LittleEndian::read_u64(&prefix[4..12]),
        length: LittleEndian::read_u64(&prefix[12..20]),
    };
    let mut key = vec![0u8; idlength];
    reader.read_exact(&mut key)?;
    Ok(Some((key, entry)))
}

fn replay_file(
    path: &Path,
    entries: &mut FnvHashMap<Vec<u8>, IndexEntry>,
    next_sequence: &mut u32,
) -> Result<()> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut position = 0u64;
    loop {
        match read_entry(&mut reader) {
            Ok(Some((key, entry))) => {
                position += (ENTRY_PREFIX_SIZE + key.len()) as u64;
                if key.len() == 4 {
                    let sequence = LittleEndian::read_u32(&key);
                    if sequence >= *next_sequence {
                        *next_sequence = sequence.wrapping_add(1);
                    }
                }
                entries.insert(key, entry);
            }
            Ok(None) => break,
            Err(err) => {
                warn!(
                    "{}: dropping damaged tail at byte {position}: {err}",
                    path.display()
                );
                break;
            }
        }
    }
    Ok(())
}

/// Replays every index segment to `out`, one line per record in replay
/// order, tombstones included. Used by the dump mode instead of a server.
pub fn dump(dir: &Path, out: &mut impl Write) -> Result<()> {
    for id in discover_segments(dir)? {
        let path = segment_path(dir, id);
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);
        loop {
            match read_entry(&mut reader) {
                Ok(Some((key, entry))) => {
                    writeln!(
                        out,
                        "{}: key {} -> segment {} offset {} length {}{}",
                        segment_filename(id),
                        hex(&key),
                        entry.segment_id,
                        entry.offset,
                        entry.length,
                        if entry.is_deleted() { " (deleted)" } else { "" }
                    )?;
                }
                Ok(None) => break,
                Err(err) => {
                    writeln!(out, "{}: damaged tail: {err}", segment_filename(id))?;
                    break;
                }
            }
        }
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        text.push_str(&format!("{byte:02x}"));
    }
    text
}
