//! Data file scanning: the keydir rebuild path.
//!
//! A scan replays every complete record in file order, overwriting the
//! keydir bucket each time a key reappears, so the final index reflects
//! last-write-wins regardless of how the sidecar was lost. Only the record
//! frames are read; value bytes are skipped over.

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::warn;

use crate::keydir::{Keydir, Slot};
use crate::{StoreError, MAX_VALUE_LEN};

/// Scans the data file at `path`, filling `keydir`, and returns the file's
/// usable length.
///
/// A partial record at the tail of the active file (crash mid-append) is
/// truncated away and the shortened length returned. The same condition in a
/// sealed file, or a length field beyond [`MAX_VALUE_LEN`] anywhere, is
/// [`StoreError::Corrupt`].
pub(crate) fn scan_data_file(
    keydir: &mut Keydir,
    path: &Path,
    file_pos: u32,
    key_size: usize,
    is_active: bool,
) -> Result<u64, StoreError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(file);

    let header = key_size as u64 + 4;
    let mut offset = 0u64;
    let mut key = vec![0u8; key_size];

    while offset < file_len {
        let remaining = file_len - offset;
        if remaining < header {
            // Torn frame: not even the key and length made it to disk.
            break;
        }
        r.read_exact(&mut key)?;
        let len = u64::from(r.read_u32::<BigEndian>()?);
        if len > MAX_VALUE_LEN {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                offset,
            });
        }
        if remaining - header < len {
            // Torn value: the frame promised more bytes than the file holds.
            break;
        }
        keydir.insert(
            &key,
            Slot {
                file: file_pos,
                offset: offset + header,
                len: len as u32,
            },
        );
        r.seek_relative(len as i64)?;
        offset += header + len;
    }

    if offset == file_len {
        return Ok(file_len);
    }

    // Partial tail record. Only the active file can legitimately end this
    // way; sealed files were fsynced on a record boundary at rollover.
    if !is_active {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            offset,
        });
    }

    warn!(
        file = %path.display(),
        offset,
        dropped = file_len - offset,
        "truncating torn tail record"
    );
    drop(r);
    let f = OpenOptions::new().write(true).open(path)?;
    f.set_len(offset)?;
    f.sync_all()?;
    Ok(offset)
}
