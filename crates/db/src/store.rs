//! The concrete index database over four [`kvlog`] stores.

use anyhow::{Context, Result};
use hashes::{CRC_SIZE, MD5_SIZE, SHA1_SIZE};
use kvlog::Store;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use types::{Dat, Rom};

use crate::{codec, merge_item, read_generation_file, write_generation_file, Batch};

const DATS_DIR: &str = "dats";
const SHA1_INDEX_DIR: &str = "sha1_index";
const MD5_INDEX_DIR: &str = "md5_index";
const CRC_INDEX_DIR: &str = "crc_index";

#[derive(Debug, Clone, Copy)]
struct Generations {
    /// Committed generation; catalogs stamped below this are orphans.
    current: u64,
    /// Generation new catalog records are stamped with. Equal to `current`
    /// outside a refresh epoch.
    next: u64,
}

/// The index database.
///
/// Each underlying store is single-writer, so every store sits behind its
/// own mutex; callers (including concurrent batches) go through `&self`
/// methods and the read-modify-write of a merge happens entirely under the
/// owning store's lock.
pub struct Db {
    root: PathBuf,
    dats: Mutex<Store>,
    sha1_index: Mutex<Store>,
    md5_index: Mutex<Store>,
    crc_index: Mutex<Store>,
    generations: Mutex<Generations>,
}

impl Db {
    /// Opens (or creates) the index database under `root`.
    ///
    /// Creates the generation file with `0` on first open and recovers each
    /// store from its data files as needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Db> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create db root {}", root.display()))?;
        let generation = read_generation_file(&root)?;

        let open_store = |dir: &str, key_size: usize| -> Result<Mutex<Store>> {
            let store = Store::open(root.join(dir), key_size)
                .with_context(|| format!("failed to open {dir} store"))?;
            Ok(Mutex::new(store))
        };

        let db = Db {
            dats: open_store(DATS_DIR, SHA1_SIZE)?,
            sha1_index: open_store(SHA1_INDEX_DIR, SHA1_SIZE)?,
            md5_index: open_store(MD5_INDEX_DIR, MD5_SIZE)?,
            crc_index: open_store(CRC_INDEX_DIR, CRC_SIZE)?,
            generations: Mutex::new(Generations {
                current: generation,
                next: generation,
            }),
            root,
        };
        info!(root = %db.root.display(), generation, "index database opened");
        Ok(db)
    }

    /// Records a ROM's secondary fingerprints so a SHA-1 can later be
    /// resolved from its MD5 or CRC. A ROM without a SHA-1 has no identity
    /// to index and is skipped.
    pub fn index_rom(&self, rom: &Rom) -> Result<()> {
        let Some(sha1) = rom.sha1 else {
            debug!(name = %rom.name, "rom has no sha1; not indexed");
            return Ok(());
        };
        if let Some(md5) = rom.md5 {
            let mut store = self.md5_index.lock();
            let existing = store.get(&md5)?;
            if let Some(merged) = merge_item(existing.as_deref(), &sha1) {
                store.put(&md5, &merged)?;
            }
        }
        if let Some(crc) = rom.crc {
            let mut store = self.crc_index.lock();
            let existing = store.get(&crc)?;
            if let Some(merged) = merge_item(existing.as_deref(), &sha1) {
                store.put(&crc, &merged)?;
            }
        }
        Ok(())
    }

    /// Indexes a catalog under its identity `sha1`: stores the stamped
    /// record and links every contained ROM back to it.
    pub fn index_dat(&self, dat: &Dat, sha1: &[u8; SHA1_SIZE]) -> Result<()> {
        let generation = self.generations.lock().next;
        let record = codec::encode_record(generation, dat);
        self.dats.lock().put(sha1, &record)?;

        for game in &dat.games {
            for rom in &game.roms {
                self.index_rom(rom)?;
                if let Some(rom_sha1) = rom.sha1 {
                    let mut store = self.sha1_index.lock();
                    let existing = store.get(&rom_sha1)?;
                    if let Some(merged) = merge_item(existing.as_deref(), sha1) {
                        store.put(&rom_sha1, &merged)?;
                    }
                }
            }
        }
        debug!(dat = %dat.name, sha1 = %hex::encode(sha1), generation, "indexed dat");
        Ok(())
    }

    /// Returns the catalog stored under `sha1`, or `None` if it was never
    /// indexed or has been orphaned by a completed refresh.
    pub fn get_dat(&self, sha1: &[u8; SHA1_SIZE]) -> Result<Option<Dat>> {
        let Some(bytes) = self.dats.lock().get(sha1)? else {
            return Ok(None);
        };
        let (generation, dat) = codec::decode_record(&bytes)?;
        if generation < self.generations.lock().current {
            return Ok(None);
        }
        Ok(Some(dat))
    }

    /// All live catalogs referencing `rom`, resolving its SHA-1 through the
    /// secondary indexes when necessary.
    pub fn dats_for_rom(&self, rom: &Rom) -> Result<Vec<Dat>> {
        let sha1 = match rom.sha1 {
            Some(s) => Some(s),
            None => self.resolve_sha1(rom)?,
        };
        let Some(sha1) = sha1 else {
            return Ok(Vec::new());
        };

        let Some(packed) = self.sha1_index.lock().get(&sha1)? else {
            return Ok(Vec::new());
        };
        let mut dats = Vec::new();
        for chunk in packed.chunks_exact(SHA1_SIZE) {
            let dat_sha1: [u8; SHA1_SIZE] = chunk.try_into().expect("chunk width is SHA1_SIZE");
            if let Some(dat) = self.get_dat(&dat_sha1)? {
                dats.push(dat);
            }
        }
        Ok(dats)
    }

    /// Fills in a missing SHA-1 from the MD5 or CRC index. Returns whether
    /// the ROM ends up with a SHA-1.
    pub fn complete_rom(&self, rom: &mut Rom) -> Result<bool> {
        if rom.sha1.is_some() {
            return Ok(true);
        }
        if let Some(sha1) = self.resolve_sha1(rom)? {
            rom.sha1 = Some(sha1);
            return Ok(true);
        }
        Ok(false)
    }

    fn resolve_sha1(&self, rom: &Rom) -> Result<Option<[u8; SHA1_SIZE]>> {
        if let Some(md5) = rom.md5 {
            if let Some(packed) = self.md5_index.lock().get(&md5)? {
                if let Some(first) = packed.chunks_exact(SHA1_SIZE).next() {
                    return Ok(Some(first.try_into().expect("chunk width is SHA1_SIZE")));
                }
            }
        }
        if let Some(crc) = rom.crc {
            if let Some(packed) = self.crc_index.lock().get(&crc)? {
                if let Some(first) = packed.chunks_exact(SHA1_SIZE).next() {
                    return Ok(Some(first.try_into().expect("chunk width is SHA1_SIZE")));
                }
            }
        }
        Ok(None)
    }

    /// Stages a refresh epoch: every currently indexed catalog becomes an
    /// orphan candidate until it is re-indexed under the new generation.
    pub fn orphan_dats(&self) -> Result<()> {
        let mut generations = self.generations.lock();
        generations.next = generations.current + 1;
        info!(
            current = generations.current,
            next = generations.next,
            "staged refresh epoch; existing dats marked orphan candidates"
        );
        Ok(())
    }

    /// Start-of-epoch hook; stages the epoch if [`Db::orphan_dats`] has not
    /// already done so.
    pub fn begin_dat_refresh(&self) -> Result<()> {
        let mut generations = self.generations.lock();
        if generations.next == generations.current {
            generations.next = generations.current + 1;
        }
        debug!(generation = generations.next, "dat refresh began");
        Ok(())
    }

    /// Commits the epoch: catalogs that did not reappear keep their old
    /// stamp and read as absent from now on.
    pub fn end_dat_refresh(&self) -> Result<()> {
        let mut generations = self.generations.lock();
        generations.current = generations.next;
        write_generation_file(&self.root, generations.current)?;
        info!(generation = generations.current, "dat refresh complete");
        Ok(())
    }

    /// Flushes every store.
    pub fn flush(&self) -> Result<()> {
        self.dats.lock().flush()?;
        self.sha1_index.lock().flush()?;
        self.md5_index.lock().flush()?;
        self.crc_index.lock().flush()?;
        Ok(())
    }

    /// Flushes and releases every store.
    pub fn close(self) -> Result<()> {
        self.dats.into_inner().close()?;
        self.sha1_index.into_inner().close()?;
        self.md5_index.into_inner().close()?;
        self.crc_index.into_inner().close()?;
        Ok(())
    }

    /// Creates a batch bound to this database. Each parallel worker owns its
    /// own batch; the stores themselves serialize the actual writes.
    pub fn start_batch(self: &Arc<Self>) -> Batch {
        Batch::new(Arc::clone(self))
    }

    /// Human-readable store counts.
    pub fn stats(&self) -> String {
        format!(
            "generation: {}\ndats: {}\nroms indexed by sha1: {}\nmd5 fingerprints: {}\ncrc fingerprints: {}\n",
            self.generations.lock().current,
            self.dats.lock().len(),
            self.sha1_index.lock().len(),
            self.md5_index.lock().len(),
            self.crc_index.lock().len(),
        )
    }

    /// DB root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let generations = self.generations.lock();
        f.debug_struct("Db")
            .field("root", &self.root)
            .field("generation", &generations.current)
            .finish()
    }
}
