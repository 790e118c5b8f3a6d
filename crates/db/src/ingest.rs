//! ROM ingest: drives the worker pool over directory trees of loose files,
//! archiving each into the depot and indexing its fingerprints.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use worker::{Master, ProgressTracker, Worker};

use crate::{Batch, Db, MAX_BATCH_SIZE};

struct IngestWorker {
    batch: Batch,
    depot_root: PathBuf,
}

impl Worker for IngestWorker {
    fn process(&mut self, path: &Path, size: u64) -> Result<()> {
        if self.batch.size() >= MAX_BATCH_SIZE {
            info!(bytes = self.batch.size(), "flushing batch");
            self.batch.flush().context("failed to flush batch")?;
        }

        let (digests, dest, added) = depot::store_file(&self.depot_root, path)
            .with_context(|| format!("failed to archive {}", path.display()))?;
        if added {
            debug!(sha1 = %digests.sha1_hex(), dest = %dest.display(), "archived");
        }

        let rom = types::Rom {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: size as i64,
            crc: Some(digests.crc),
            md5: Some(digests.md5),
            sha1: Some(digests.sha1),
        };
        self.batch.index_rom(&rom)
    }

    fn close(&mut self) -> Result<()> {
        self.batch.close()
    }
}

struct IngestMaster {
    db: Arc<Db>,
    depot_root: PathBuf,
    num_workers: usize,
    pt: Arc<dyn ProgressTracker>,
}

impl Master for IngestMaster {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn accept(&self, _path: &Path) -> bool {
        true
    }

    fn new_worker(&mut self, _worker_index: usize) -> Box<dyn Worker> {
        Box::new(IngestWorker {
            batch: self.db.start_batch(),
            depot_root: self.depot_root.clone(),
        })
    }

    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn progress_tracker(&self) -> Arc<dyn ProgressTracker> {
        Arc::clone(&self.pt)
    }

    fn scanned(&mut self, num_files: u64, num_bytes: u64, common_root: &Path) {
        debug!(
            files = num_files,
            bytes = num_bytes,
            root = %common_root.display(),
            "roms counted"
        );
    }

    fn finish_up(&mut self) -> Result<()> {
        self.db.flush()
    }
}

/// Archives every regular file under `roots` into the depot at `depot_root`
/// and indexes its fingerprints.
pub fn ingest(
    db: Arc<Db>,
    depot_root: &Path,
    roots: &[PathBuf],
    num_workers: usize,
    pt: Arc<dyn ProgressTracker>,
) -> Result<String> {
    let mut master = IngestMaster {
        db,
        depot_root: depot_root.to_path_buf(),
        num_workers,
        pt,
    };
    worker::work("archive roms", roots, &mut master)
}
