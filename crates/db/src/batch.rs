//! Worker-owned write batches.

use anyhow::{ensure, Result};
use hashes::SHA1_SIZE;
use std::sync::Arc;
use tracing::debug;
use types::{Dat, Rom};

use crate::{codec, Db};

/// Buffers index operations for one worker and applies them on
/// [`Batch::flush`].
///
/// `size()` tracks the approximate value bytes the buffered operations will
/// write; callers flush once it crosses [`crate::MAX_BATCH_SIZE`]. Batches
/// never merge with each other — each applies its own operations through the
/// shared [`Db`], whose per-store locks serialize the writes.
pub struct Batch {
    db: Arc<Db>,
    roms: Vec<Rom>,
    dats: Vec<([u8; SHA1_SIZE], Dat)>,
    size: u64,
    closed: bool,
}

impl Batch {
    pub(crate) fn new(db: Arc<Db>) -> Batch {
        Batch {
            db,
            roms: Vec::new(),
            dats: Vec::new(),
            size: 0,
            closed: false,
        }
    }

    /// Queues a ROM for the secondary indexes.
    pub fn index_rom(&mut self, rom: &Rom) -> Result<()> {
        ensure!(!self.closed, "batch is closed");
        // One packed sha1 per secondary fingerprint the rom carries.
        if rom.md5.is_some() {
            self.size += SHA1_SIZE as u64;
        }
        if rom.crc.is_some() {
            self.size += SHA1_SIZE as u64;
        }
        self.roms.push(rom.clone());
        Ok(())
    }

    /// Queues a catalog and its ROM back-links.
    pub fn index_dat(&mut self, dat: &Dat, sha1: &[u8; SHA1_SIZE]) -> Result<()> {
        ensure!(!self.closed, "batch is closed");
        self.size += codec::encoded_len(dat);
        self.size += dat
            .games
            .iter()
            .map(|g| g.roms.len() as u64 * SHA1_SIZE as u64)
            .sum::<u64>();
        self.dats.push((*sha1, dat.clone()));
        Ok(())
    }

    /// Approximate value bytes the buffered operations will write.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Applies every buffered operation and resets the buffer.
    pub fn flush(&mut self) -> Result<()> {
        if self.roms.is_empty() && self.dats.is_empty() {
            self.size = 0;
            return Ok(());
        }
        debug!(
            roms = self.roms.len(),
            dats = self.dats.len(),
            bytes = self.size,
            "flushing batch"
        );
        for rom in self.roms.drain(..) {
            self.db.index_rom(&rom)?;
        }
        for (sha1, dat) in self.dats.drain(..) {
            self.db.index_dat(&dat, &sha1)?;
        }
        self.size = 0;
        Ok(())
    }

    /// Flushes and permanently disables the batch.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }
}
