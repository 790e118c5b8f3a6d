//! In-memory key index and its on-disk sidecar.
//!
//! The sidecar serializes one data file's slice of the keydir so the next
//! open can skip scanning that file:
//!
//! ```text
//! [magic: u32 BE][key_size: u32 BE][data_len: u64 BE][count: u64 BE]
//! [key: K bytes][offset: u64 BE][len: u32 BE]   * count
//! ```
//!
//! `data_len` records the data file's length at save time; a mismatch on
//! load marks the sidecar stale. Anything short of a fully valid sidecar is
//! answered with "rebuild from the data file" — correctness never depends on
//! a sidecar being present.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::StoreError;

/// Sidecar magic; the trailing digit is the layout version.
const SIDECAR_MAGIC: u32 = 0x4B56_4431; // "KVD1"

/// Where a key's current value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    /// Position of the data file (not its on-disk number).
    pub file: u32,
    /// Byte offset of the first value byte.
    pub offset: u64,
    /// Value length in bytes.
    pub len: u32,
}

/// Hash index from key to [`Slot`]. Later inserts overwrite earlier ones,
/// which gives last-write-wins when data files are replayed in order.
#[derive(Default)]
pub(crate) struct Keydir {
    map: HashMap<Box<[u8]>, Slot>,
}

impl Keydir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &[u8], slot: Slot) {
        self.map.insert(key.into(), slot);
    }

    pub fn insert_boxed(&mut self, key: Box<[u8]>, slot: Slot) {
        self.map.insert(key, slot);
    }

    pub fn get(&self, key: &[u8]) -> Option<&Slot> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.map.keys().map(|k| k.as_ref())
    }

    /// Entries whose current value lives in the data file at `file`.
    pub fn entries_for_file(&self, file: u32) -> impl Iterator<Item = (&[u8], &Slot)> {
        self.map
            .iter()
            .filter(move |(_, slot)| slot.file == file)
            .map(|(k, slot)| (k.as_ref(), slot))
    }
}

/// Writes a sidecar atomically (tmp file, fsync, rename).
pub(crate) fn save_sidecar(
    path: &Path,
    key_size: usize,
    data_len: u64,
    entries: &[(&[u8], &Slot)],
) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        let mut w = BufWriter::new(file);
        w.write_u32::<BigEndian>(SIDECAR_MAGIC)?;
        w.write_u32::<BigEndian>(key_size as u32)?;
        w.write_u64::<BigEndian>(data_len)?;
        w.write_u64::<BigEndian>(entries.len() as u64)?;
        for (key, slot) in entries {
            w.write_all(key)?;
            w.write_u64::<BigEndian>(slot.offset)?;
            w.write_u32::<BigEndian>(slot.len)?;
        }
        w.flush()?;
        w.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads a sidecar, returning `Ok(None)` whenever the file should instead be
/// rebuilt from its data file: missing, unknown magic, stale `data_len`, or
/// truncated contents.
///
/// # Errors
///
/// [`StoreError::KeySize`] if the sidecar was written with a different key
/// width than the store is configured for — the store itself is being opened
/// wrong, and a rebuild would silently misparse the data files.
pub(crate) fn load_sidecar(
    path: &Path,
    key_size: usize,
    data_len: u64,
) -> Result<Option<Vec<(Box<[u8]>, u64, u32)>>, StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut r = BufReader::new(file);

    let magic = match r.read_u32::<BigEndian>() {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if magic != SIDECAR_MAGIC {
        warn!(sidecar = %path.display(), "unrecognized keydir version; rebuilding");
        return Ok(None);
    }

    let ks = match r.read_u32::<BigEndian>() {
        Ok(v) => v as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if ks != key_size {
        return Err(StoreError::KeySize {
            expected: key_size,
            actual: ks,
        });
    }

    let recorded_len = match r.read_u64::<BigEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if recorded_len != data_len {
        debug!(sidecar = %path.display(), "stale keydir sidecar; rebuilding");
        return Ok(None);
    }

    let count = match r.read_u64::<BigEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // More entries than the data file could hold records means garbage.
    let max_entries = data_len / (key_size as u64 + 4) + 1;
    if count > max_entries {
        warn!(sidecar = %path.display(), count, "implausible keydir entry count; rebuilding");
        return Ok(None);
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut key = vec![0u8; key_size];
        match r.read_exact(&mut key) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let offset = match r.read_u64::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let len = match r.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        entries.push((key.into_boxed_slice(), offset, len));
    }

    Ok(Some(entries))
}
