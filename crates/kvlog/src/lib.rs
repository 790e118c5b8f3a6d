//! # KvLog — append-only key-value store
//!
//! The embedded index store behind the ROM depot. Keys have a fixed width per
//! store (the depot uses 20-byte SHA-1 keys, plus 16-byte MD5 and 4-byte CRC
//! stores); values are arbitrary byte strings. All writes are appends: an
//! update never rewrites an existing record, it appends a new one and rebinds
//! the in-memory index, so the latest record for a key wins.
//!
//! ## On-Disk Layout
//!
//! A store root holds an ordered family of data files plus one optional
//! *keydir sidecar* per data file:
//!
//! ```text
//! <root>/data_0      record stream (sealed)
//! <root>/keydir_0    serialized index for data_0 (optimization)
//! <root>/data_1      record stream (active, append-only)
//! <root>/keydir_1    rewritten on every flush
//! ```
//!
//! Each record is:
//!
//! ```text
//! [key: K bytes][len: u32 BE][value: len bytes]
//! ```
//!
//! The in-memory keydir maps each key to `(file, offset, len)` where `offset`
//! points at the first value byte. Sidecars are pure optimization: a missing,
//! truncated, stale, or version-mismatched sidecar causes the data file to be
//! scanned front to back instead, which rebuilds the same index (last write
//! wins in file order, `data_{i+1}` shadowing `data_i`).
//!
//! ## Crash Safety
//!
//! Appends go to the highest-numbered data file. A crash mid-append leaves a
//! partial record at its tail; on the next open the scan detects it and
//! truncates the file back to the last complete record boundary before
//! reopening it for append. Lower-numbered files were sealed by a rollover
//! and must end on a record boundary — a partial record there is reported as
//! [`StoreError::Corrupt`] rather than silently dropped.
//!
//! After [`Store::flush`] returns, every previously appended record has been
//! fsynced. The active file rolls to a fresh one once it exceeds the
//! configurable soft size cap (see [`StoreOptions`]).

mod keydir;
mod recovery;

use byteorder::{BigEndian, WriteBytesExt};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use keydir::{Keydir, Slot};

/// Data file name prefix; the full name is `data_<i>`.
pub const DATA_PREFIX: &str = "data_";
/// Keydir sidecar name prefix; the full name is `keydir_<i>`.
pub const KEYDIR_PREFIX: &str = "keydir_";

/// Largest value a single record may carry. Appends beyond this are rejected
/// up front, and a scanned length field above it marks the file corrupt.
pub const MAX_VALUE_LEN: u64 = 256 * 1024 * 1024;

/// Default soft cap on a data file before the store rolls to the next one.
pub const DEFAULT_MAX_DATA_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Errors surfaced by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A sealed data file contains a record that cannot be reconciled by
    /// tail truncation.
    #[error("corrupt store: unreadable record in {path} at offset {offset}")]
    Corrupt { path: PathBuf, offset: u64 },

    /// A key or sidecar does not match the configured key width.
    #[error("key size mismatch: store uses {expected}-byte keys, found {actual}")]
    KeySize { expected: usize, actual: usize },
}

/// Tuning knobs for [`Store::open_with`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Soft cap on the active data file. Once its size reaches this value the
    /// next append rolls to a fresh file.
    pub max_data_file_size: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_data_file_size: DEFAULT_MAX_DATA_FILE_SIZE,
        }
    }
}

/// An open store handle.
///
/// The handle owns the append descriptor for the active data file and one
/// read descriptor per data file. It is single-writer: concurrent users must
/// serialize access externally (the depot DB wraps each store in a mutex).
pub struct Store {
    root: PathBuf,
    key_size: usize,
    opts: StoreOptions,
    keydir: Keydir,
    /// One read handle per data file, indexed by file position.
    readers: Vec<Mutex<File>>,
    /// On-disk numbers of the data files, in position order.
    file_numbers: Vec<u32>,
    /// Append handle for the highest-numbered data file.
    active: File,
    active_size: u64,
    /// Reusable append scratch buffer.
    scratch: Vec<u8>,
    /// Set by appends, cleared by flush; drives the best-effort flush on drop.
    dirty: bool,
}

impl Store {
    /// Opens (or creates) a store under `root` with the default options.
    pub fn open<P: AsRef<Path>>(root: P, key_size: usize) -> Result<Store, StoreError> {
        Self::open_with(root, key_size, StoreOptions::default())
    }

    /// Opens (or creates) a store under `root`.
    ///
    /// Discovers the existing data files in numeric order and loads each
    /// file's keydir sidecar, falling back to a full scan of the data file
    /// whenever the sidecar is absent or untrustworthy. A torn record at the
    /// tail of the active file is truncated away before the file is reopened
    /// for append.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] on storage failure, [`StoreError::Corrupt`] for a
    /// damaged sealed file, [`StoreError::KeySize`] if a sidecar was written
    /// with a different key width than `key_size`.
    pub fn open_with<P: AsRef<Path>>(
        root: P,
        key_size: usize,
        opts: StoreOptions,
    ) -> Result<Store, StoreError> {
        assert!(key_size > 0, "key size must be positive");
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut file_numbers = discover_data_files(&root)?;
        if file_numbers.is_empty() {
            File::create(data_path(&root, 0))?;
            file_numbers.push(0);
        }

        let mut keydir = Keydir::new();
        let mut readers = Vec::with_capacity(file_numbers.len());
        let mut active_size = 0;
        let last = file_numbers.len() - 1;

        for (pos, &number) in file_numbers.iter().enumerate() {
            let dpath = data_path(&root, number);
            let kpath = keydir_path(&root, number);
            let file_len = fs::metadata(&dpath)?.len();
            let mut size = file_len;

            match keydir::load_sidecar(&kpath, key_size, file_len)? {
                Some(entries) => {
                    debug!(file = %dpath.display(), entries = entries.len(), "loaded keydir sidecar");
                    for (key, offset, len) in entries {
                        keydir.insert_boxed(
                            key,
                            Slot {
                                file: pos as u32,
                                offset,
                                len,
                            },
                        );
                    }
                }
                None => {
                    size = recovery::scan_data_file(
                        &mut keydir,
                        &dpath,
                        pos as u32,
                        key_size,
                        pos == last,
                    )?;
                    // Sealed files never change again; persist the rebuilt
                    // index now. The active file's sidecar is written on the
                    // next flush.
                    if pos != last {
                        let entries: Vec<_> = keydir.entries_for_file(pos as u32).collect();
                        keydir::save_sidecar(&kpath, key_size, size, &entries)?;
                    }
                }
            }

            readers.push(Mutex::new(File::open(&dpath)?));
            if pos == last {
                active_size = size;
            }
        }

        let active = OpenOptions::new()
            .create(true)
            .append(true)
            .open(data_path(&root, file_numbers[last]))?;

        info!(
            root = %root.display(),
            files = file_numbers.len(),
            keys = keydir.len(),
            "store opened"
        );

        Ok(Store {
            root,
            key_size,
            opts,
            keydir,
            readers,
            file_numbers,
            active,
            active_size,
            scratch: Vec::with_capacity(256),
            dirty: false,
        })
    }

    /// Appends `(key, value)` and rebinds the key's index entry.
    ///
    /// The append either completes fully or, if interrupted, is recoverable
    /// by tail truncation on the next open; the handle stays usable either
    /// way.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeySize`] if `key` is not the configured width,
    /// [`StoreError::Io`] on write failure or an over-large value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if key.len() != self.key_size {
            return Err(StoreError::KeySize {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        if value.len() as u64 > MAX_VALUE_LEN {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "value exceeds maximum record size",
            )));
        }

        if self.active_size >= self.opts.max_data_file_size {
            self.roll()?;
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(key);
        self.scratch.write_u32::<BigEndian>(value.len() as u32)?;
        self.scratch.extend_from_slice(value);

        self.active.write_all(&self.scratch)?;

        let pos = (self.file_numbers.len() - 1) as u32;
        self.keydir.insert(
            key,
            Slot {
                file: pos,
                offset: self.active_size + self.key_size as u64 + 4,
                len: value.len() as u32,
            },
        );
        self.active_size += self.scratch.len() as u64;
        self.dirty = true;
        Ok(())
    }

    /// Returns the most recent value for `key`, or `None`.
    ///
    /// A key of the wrong width cannot be present and yields `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(slot) = self.keydir.get(key) else {
            return Ok(None);
        };
        let mut file = self.readers[slot.file as usize].lock();
        file.seek(SeekFrom::Start(slot.offset))?;
        let mut value = vec![0u8; slot.len as usize];
        file.read_exact(&mut value)?;
        Ok(Some(value))
    }

    /// Fsyncs the active data file and rewrites its keydir sidecar.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.active.sync_all()?;
        let pos = (self.file_numbers.len() - 1) as u32;
        let number = self.file_numbers[pos as usize];
        let entries: Vec<_> = self.keydir.entries_for_file(pos).collect();
        keydir::save_sidecar(
            &keydir_path(&self.root, number),
            self.key_size,
            self.active_size,
            &entries,
        )?;
        self.dirty = false;
        Ok(())
    }

    /// Flushes and releases the handle.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.flush()
    }

    /// Number of distinct keys currently bound.
    pub fn len(&self) -> usize {
        self.keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keydir.len() == 0
    }

    /// Configured key width.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Number of data files backing the store.
    pub fn data_file_count(&self) -> usize {
        self.file_numbers.len()
    }

    /// Calls `f` with every bound key, in unspecified order.
    pub fn for_each_key<F: FnMut(&[u8])>(&self, mut f: F) {
        for key in self.keydir.keys() {
            f(key);
        }
    }

    /// Seals the active file and opens the next one.
    ///
    /// Order matters: the sealed file is fsynced and its sidecar written
    /// before the new file exists, so a crash at any point leaves a store
    /// that recovers to the same contents.
    fn roll(&mut self) -> Result<(), StoreError> {
        self.active.sync_all()?;
        let pos = (self.file_numbers.len() - 1) as u32;
        let sealed = self.file_numbers[pos as usize];
        let entries: Vec<_> = self.keydir.entries_for_file(pos).collect();
        keydir::save_sidecar(
            &keydir_path(&self.root, sealed),
            self.key_size,
            self.active_size,
            &entries,
        )?;

        let next = sealed + 1;
        let dpath = data_path(&self.root, next);
        self.active = OpenOptions::new().create(true).append(true).open(&dpath)?;
        self.readers.push(Mutex::new(File::open(&dpath)?));
        self.file_numbers.push(next);
        self.active_size = 0;
        info!(file = %dpath.display(), "rolled to new data file");
        Ok(())
    }
}

/// Best-effort flush on drop; the data is still recoverable by a scan even
/// if this fails, since appends are unbuffered.
impl Drop for Store {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                warn!(root = %self.root.display(), error = %e, "flush on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("key_size", &self.key_size)
            .field("keys", &self.keydir.len())
            .field("data_files", &self.file_numbers.len())
            .field("active_size", &self.active_size)
            .finish()
    }
}

fn data_path(root: &Path, number: u32) -> PathBuf {
    root.join(format!("{DATA_PREFIX}{number}"))
}

fn keydir_path(root: &Path, number: u32) -> PathBuf {
    root.join(format!("{KEYDIR_PREFIX}{number}"))
}

fn discover_data_files(root: &Path) -> Result<Vec<u32>, StoreError> {
    let mut numbers = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(rest) = name.strip_prefix(DATA_PREFIX) {
                if let Ok(n) = rest.parse::<u32>() {
                    numbers.push(n);
                }
            }
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

#[cfg(test)]
mod tests;
