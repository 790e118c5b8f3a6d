//! # Db — the depot's index database
//!
//! Ties the storage substrate together: four [`kvlog`] stores index
//! fingerprints to catalogs, batches coordinate parallel writers, and the
//! refresh/ingest drivers run the [`worker`] pool over catalog and ROM
//! trees.
//!
//! ## Index stores
//!
//! | Store | Key | Value |
//! |---|---|---|
//! | `dats` | DAT SHA-1 | generation-stamped, binary-encoded [`types::Dat`] |
//! | `sha1_index` | ROM SHA-1 | packed list of 20-byte DAT SHA-1s |
//! | `md5_index` | ROM MD5 | packed list of 20-byte ROM SHA-1s |
//! | `crc_index` | ROM CRC-32 | packed list of 20-byte ROM SHA-1s |
//!
//! The SHA-1 index answers "which catalogs reference this file?"; the MD5
//! and CRC indexes resolve a ROM whose primary fingerprint is unknown.
//!
//! ## Refresh epochs
//!
//! Catalog records carry the generation they were last indexed under. A
//! refresh stages `next = current + 1`, rewrites every catalog it sees with
//! `next`, and commits `current = next` at the end. Catalogs that failed to
//! reappear keep their old generation and are treated as absent from then
//! on — the append-only store never has to delete them.

mod batch;
mod codec;
mod ingest;
mod parser;
mod refresh;
mod store;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub use batch::Batch;
pub use ingest::ingest;
pub use parser::{DatParser, XmlDatParser};
pub use refresh::{refresh, refresh_with_parser};
pub use store::Db;

/// A batch flushes itself once its accumulated value bytes reach this size.
pub const MAX_BATCH_SIZE: u64 = 10 * 1024 * 1024;

/// Name of the refresh-counter file at the DB root.
pub const GENERATION_FILENAME: &str = "romba-generation";

/// Append-if-absent merge for the packed fixed-width lists the indexes
/// store.
///
/// All items under one key share `item`'s width. Returns the new value to
/// write, or `None` when `item` is already present and no write is needed.
pub fn merge_item(existing: Option<&[u8]>, item: &[u8]) -> Option<Vec<u8>> {
    debug_assert!(!item.is_empty());
    match existing {
        None => Some(item.to_vec()),
        Some(old) => {
            if old.chunks_exact(item.len()).any(|chunk| chunk == item) {
                return None;
            }
            let mut merged = Vec::with_capacity(old.len() + item.len());
            merged.extend_from_slice(old);
            merged.extend_from_slice(item);
            Some(merged)
        }
    }
}

/// Reads the generation counter at `root`, creating it with `0` on first
/// open.
pub fn read_generation_file(root: &Path) -> Result<u64> {
    let path = root.join(GENERATION_FILENAME);
    let contents = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            write_generation_file(root, 0)?;
            return Ok(0);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    contents
        .trim()
        .parse::<u64>()
        .with_context(|| format!("malformed generation file {}", path.display()))
}

/// Writes the generation counter at `root`.
pub fn write_generation_file(root: &Path, generation: u64) -> Result<()> {
    let path = root.join(GENERATION_FILENAME);
    fs::write(&path, generation.to_string())
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests;
