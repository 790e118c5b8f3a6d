//! # Hashes — fingerprint pipeline
//!
//! Computes the three fingerprints the depot cares about — CRC-32/IEEE, MD5
//! and SHA-1 — in a single pass over a byte stream. The stream is consumed
//! exactly once: one buffered read loop feeds all three digest states, so the
//! cost of fingerprinting is dominated by I/O rather than by re-reading the
//! input per algorithm.
//!
//! SHA-1 is the depot's primary key (storage paths and index keys are derived
//! from it); [`sha1_for_reader`] is the fast path for callers that need only
//! the primary fingerprint.
//!
//! ## Example
//!
//! ```rust
//! use hashes::Digests;
//!
//! let d = Digests::for_reader(&b"hello\n"[..]).unwrap();
//! assert_eq!(d.sha1_hex(), "f572d396fae9206628714fb2ce00f72e94f2258f");
//! ```

use crc32fast::Hasher as Crc32;
use md5::{Digest, Md5};
use sha1::Sha1;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Width of a CRC-32 fingerprint in bytes.
pub const CRC_SIZE: usize = 4;
/// Width of an MD5 fingerprint in bytes.
pub const MD5_SIZE: usize = 16;
/// Width of a SHA-1 fingerprint in bytes.
pub const SHA1_SIZE: usize = 20;

/// Chunk size for the read loop. Keeps memory bounded for arbitrarily large
/// inputs while staying big enough to amortize syscall overhead.
const READ_BUF_SIZE: usize = 64 * 1024;

/// The three fingerprints of one byte stream, computed in a single pass.
///
/// CRC-32 is stored big-endian, matching its canonical hex rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Digests {
    pub crc: [u8; CRC_SIZE],
    pub md5: [u8; MD5_SIZE],
    pub sha1: [u8; SHA1_SIZE],
}

impl Digests {
    /// Fingerprints everything `reader` yields, consuming it exactly once.
    ///
    /// # Errors
    ///
    /// Returns the underlying `io::Error` on read failure; no digests are
    /// produced for a partially read stream.
    pub fn for_reader<R: Read>(mut reader: R) -> io::Result<Digests> {
        let mut crc = Crc32::new();
        let mut md5 = Md5::new();
        let mut sha1 = Sha1::new();

        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let chunk = &buf[..n];
            crc.update(chunk);
            md5.update(chunk);
            sha1.update(chunk);
        }

        Ok(Digests {
            crc: crc.finalize().to_be_bytes(),
            md5: md5.finalize().into(),
            sha1: sha1.finalize().into(),
        })
    }

    /// Fingerprints the contents of the file at `path`.
    pub fn for_file<P: AsRef<Path>>(path: P) -> io::Result<Digests> {
        let file = File::open(path)?;
        Self::for_reader(BufReader::new(file))
    }

    /// Lowercase hex of the CRC-32 fingerprint.
    pub fn crc_hex(&self) -> String {
        hex::encode(self.crc)
    }

    /// Lowercase hex of the MD5 fingerprint.
    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    /// Lowercase hex of the SHA-1 fingerprint.
    pub fn sha1_hex(&self) -> String {
        hex::encode(self.sha1)
    }
}

/// SHA-1-only fast path: one buffered read loop, one digest state.
pub fn sha1_for_reader<R: Read>(mut reader: R) -> io::Result<[u8; SHA1_SIZE]> {
    let mut sha1 = Sha1::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sha1.update(&buf[..n]);
    }
    Ok(sha1.finalize().into())
}

/// SHA-1 of the contents of the file at `path`.
pub fn sha1_for_file<P: AsRef<Path>>(path: P) -> io::Result<[u8; SHA1_SIZE]> {
    let file = File::open(path)?;
    sha1_for_reader(BufReader::new(file))
}
