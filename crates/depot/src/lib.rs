//! # Depot — content-addressed ROM storage
//!
//! Maps a SHA-1 fingerprint to a location in a sharded directory tree and
//! handles the compressed file I/O at that location. A ROM whose SHA-1 hex is
//! `f572d396fae9206628714fb2ce00f72e94f2258f` lives at
//!
//! ```text
//! <root>/f5/72/d3/96/f572d396fae9206628714fb2ce00f72e94f2258f.gz
//! ```
//!
//! Four two-hex shard levels keep per-directory entry counts bounded no
//! matter how many ROMs the depot holds. The archived bytes are gzip; any
//! conformant decoder recovers the original bytes, whose SHA-1 is the path's
//! fingerprint.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hashes::{Digests, SHA1_SIZE};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Suffix for archived ROM files.
pub const GZ_SUFFIX: &str = ".gz";

/// Errors surfaced by depot I/O.
#[derive(Debug, Error)]
pub enum DepotError {
    /// An underlying I/O error (including malformed gzip data on read).
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Builds the sharded path for the fingerprint hex `sha1_hex` under `root`.
///
/// The first eight hex digits become four directory levels of two digits
/// each; the full hex plus `suffix` is the file name.
pub fn path_for(root: &Path, sha1_hex: &str, suffix: &str) -> PathBuf {
    assert!(
        sha1_hex.len() >= 8 && sha1_hex.is_ascii(),
        "fingerprint hex too short to shard"
    );
    let mut path = root.to_path_buf();
    for i in 0..4 {
        path.push(&sha1_hex[2 * i..2 * i + 2]);
    }
    path.push(format!("{sha1_hex}{suffix}"));
    path
}

/// Sharded `.gz` path for a raw SHA-1.
pub fn rom_path(root: &Path, sha1: &[u8; SHA1_SIZE]) -> PathBuf {
    path_for(root, &hex::encode(sha1), GZ_SUFFIX)
}

/// Whether `path` names an existing filesystem entry.
///
/// Non-existence is not an error; anything else (permissions, bad mount) is.
pub fn exists(path: &Path) -> Result<bool, DepotError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Streams `reader` into a gzip archive at `out_path`, creating parent
/// directories as needed. Returns the compressed size in bytes.
///
/// The encoder is finished and the file flushed before returning; on the
/// failure path both are closed by drop, so no descriptor outlives the call.
pub fn archive<R: Read>(out_path: &Path, reader: R) -> Result<u64, DepotError> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let out = File::create(out_path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let mut src = BufReader::new(reader);
    io::copy(&mut src, &mut encoder)?;

    let mut buf_out = encoder.finish()?;
    buf_out.flush()?;
    Ok(buf_out.get_ref().metadata()?.len())
}

/// Reads an archived ROM back, returning the original (decompressed) bytes.
pub fn read_archived(path: &Path) -> Result<Vec<u8>, DepotError> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Fingerprints the file at `path` and archives it under `root` when the
/// depot does not already hold it.
///
/// Returns the digests, the sharded destination, and whether a new archive
/// was written.
pub fn store_file(root: &Path, path: &Path) -> Result<(Digests, PathBuf, bool), DepotError> {
    let digests = Digests::for_file(path)?;
    let dest = rom_path(root, &digests.sha1);

    if exists(&dest)? {
        debug!(sha1 = %digests.sha1_hex(), "already archived");
        return Ok((digests, dest, false));
    }

    let src = File::open(path)?;
    let compressed = archive(&dest, src)?;
    debug!(
        sha1 = %digests.sha1_hex(),
        src = %path.display(),
        compressed,
        "archived rom"
    );
    Ok((digests, dest, true))
}
