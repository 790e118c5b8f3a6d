//! Catalog refresh: drives the worker pool over a DAT tree, bracketed by a
//! refresh epoch so catalogs that vanished from the tree are orphaned.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use worker::{Master, ProgressTracker, Worker};

use crate::{Batch, DatParser, Db, XmlDatParser, MAX_BATCH_SIZE};

struct RefreshWorker {
    batch: Batch,
    parser: Arc<dyn DatParser>,
}

impl Worker for RefreshWorker {
    fn process(&mut self, path: &Path, _size: u64) -> Result<()> {
        if self.batch.size() >= MAX_BATCH_SIZE {
            info!(bytes = self.batch.size(), "flushing batch");
            self.batch.flush().context("failed to flush batch")?;
        }
        let (dat, sha1) = self.parser.parse(path)?;
        self.batch.index_dat(&dat, &sha1)
    }

    fn close(&mut self) -> Result<()> {
        self.batch.close()
    }
}

struct RefreshMaster {
    db: Arc<Db>,
    parser: Arc<dyn DatParser>,
    num_workers: usize,
    pt: Arc<dyn ProgressTracker>,
}

impl Master for RefreshMaster {
    fn start(&mut self) -> Result<()> {
        self.db.begin_dat_refresh()
    }

    fn accept(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("dat") || e.eq_ignore_ascii_case("xml"))
    }

    fn new_worker(&mut self, _worker_index: usize) -> Box<dyn Worker> {
        Box::new(RefreshWorker {
            batch: self.db.start_batch(),
            parser: Arc::clone(&self.parser),
        })
    }

    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn progress_tracker(&self) -> Arc<dyn ProgressTracker> {
        Arc::clone(&self.pt)
    }

    fn scanned(&mut self, num_files: u64, num_bytes: u64, _common_root: &Path) {
        debug!(files = num_files, bytes = num_bytes, "catalogs counted");
    }

    fn finish_up(&mut self) -> Result<()> {
        self.db.flush()?;
        self.db.end_dat_refresh()
    }
}

/// Refreshes the catalog index from every `.dat`/`.xml` file under
/// `dats_path` using the bundled XML parser.
pub fn refresh(
    db: Arc<Db>,
    dats_path: &Path,
    num_workers: usize,
    pt: Arc<dyn ProgressTracker>,
) -> Result<String> {
    refresh_with_parser(db, dats_path, num_workers, pt, Arc::new(XmlDatParser))
}

/// [`refresh`] with an explicit parser.
pub fn refresh_with_parser(
    db: Arc<Db>,
    dats_path: &Path,
    num_workers: usize,
    pt: Arc<dyn ProgressTracker>,
    parser: Arc<dyn DatParser>,
) -> Result<String> {
    db.orphan_dats()?;
    let mut master = RefreshMaster {
        db,
        parser,
        num_workers,
        pt,
    };
    worker::work("refresh dats", &[dats_path.to_path_buf()], &mut master)
}
