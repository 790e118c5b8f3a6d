//! # Worker — parallel ingest pool
//!
//! Drives a set of worker threads over the files of one or more directory
//! trees. Every bulk operation the depot performs (archiving ROM
//! directories, refreshing DAT catalogs) is one [`work`] call with a
//! caller-supplied [`Master`] that decides which files matter and what to do
//! with each.
//!
//! ## Two passes
//!
//! 1. **Counting pass.** Walk every root, counting accepted files and bytes
//!    and folding their paths into a common root. The totals seed the
//!    progress tracker so percentage output is meaningful from the start.
//! 2. **Dispatch pass.** Spawn `num_workers` threads, walk the same roots
//!    again, and push each accepted file through a rendezvous channel. The
//!    zero-capacity channel gives back-pressure: the walk can never run
//!    ahead of the workers by more than the in-flight items.
//!
//! ## Failure semantics
//!
//! A failed item does not stop its worker; the first failure per worker is
//! retained, and the first across workers is returned after every worker has
//! drained and closed. A failed *walk* shuts the pool down gracefully: the
//! channel closes, in-flight items finish, and the walk error is returned.

mod path;
mod progress;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use walkdir::WalkDir;

pub use path::common_root;
pub use progress::Progress;

/// Receives progress updates from the supervisor and every worker; must be
/// internally synchronized.
pub trait ProgressTracker: Send + Sync {
    fn set_total_bytes(&self, n: u64);
    fn set_total_files(&self, n: u32);
    fn add_bytes_from_file(&self, n: u64);
    fn finished(&self);
}

/// One worker's processing capability. Items arrive in dispatch order for
/// this worker; interleaving across workers is unspecified.
pub trait Worker: Send {
    /// Processes one accepted file.
    fn process(&mut self, path: &Path, size: u64) -> Result<()>;

    /// Called once after the work channel closes, before the worker exits.
    fn close(&mut self) -> Result<()>;
}

/// The orchestrating capability set for one [`work`] call.
pub trait Master {
    /// Called before any filesystem access. A failure aborts the call.
    fn start(&mut self) -> Result<()>;

    /// Whether a regular file should be counted and dispatched.
    fn accept(&self, path: &Path) -> bool;

    /// Creates the worker for slot `worker_index`.
    fn new_worker(&mut self, worker_index: usize) -> Box<dyn Worker>;

    fn num_workers(&self) -> usize;

    fn progress_tracker(&self) -> Arc<dyn ProgressTracker>;

    /// Counting-pass results: accepted file count, byte total, and the
    /// longest common path prefix of all accepted files.
    fn scanned(&mut self, num_files: u64, num_bytes: u64, common_root: &Path);

    /// Called after all workers have drained and closed.
    fn finish_up(&mut self) -> Result<()>;
}

struct WorkUnit {
    path: PathBuf,
    size: u64,
}

/// Runs `master` over every accepted file under `roots`.
///
/// Returns a human-readable summary on success. Returns the first error in
/// this priority order: `start` failure, counting-pass walk error,
/// dispatch-pass walk error (after draining workers), `finish_up` failure,
/// first worker `process` failure.
pub fn work(work_name: &str, roots: &[PathBuf], master: &mut dyn Master) -> Result<String> {
    let pt = master.progress_tracker();

    info!(work = work_name, "starting");
    let start_time = Instant::now();

    master.start().context("failed to start master")?;

    let roots: Vec<PathBuf> = roots
        .iter()
        .map(|p| path::absolutize(p))
        .collect::<Result<_>>()?;

    // Counting pass.
    let mut num_files: u64 = 0;
    let mut num_bytes: u64 = 0;
    let mut common: Option<PathBuf> = None;
    for root in &roots {
        debug!(root = %root.display(), "initial scan to determine amount of work");
        for entry in WalkDir::new(root) {
            let entry = entry
                .with_context(|| format!("failed to count files under {}", root.display()))?;
            if !accepted(master, &entry) {
                continue;
            }
            num_files += 1;
            num_bytes += entry
                .metadata()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?
                .len();
            common = Some(match common {
                None => entry.path().to_path_buf(),
                Some(prev) => common_root(&prev, entry.path()),
            });
        }
    }

    info!(
        work = work_name,
        files = num_files,
        bytes = num_bytes,
        "counted work"
    );
    let common = common.unwrap_or_default();
    master.scanned(num_files, num_bytes, &common);
    pt.set_total_bytes(num_bytes);
    pt.set_total_files(num_files as u32);

    // Dispatch pass.
    let n = master.num_workers();
    let mut workers: Vec<Box<dyn Worker>> = (0..n).map(|i| master.new_worker(i)).collect();
    // Zero capacity: the producer blocks until a worker takes each item.
    let (tx, rx) = crossbeam_channel::bounded::<WorkUnit>(0);

    let mut walk_err: Option<anyhow::Error> = None;
    let mut first_worker_err: Option<anyhow::Error> = None;

    std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(n);
        for (i, w) in workers.drain(..).enumerate() {
            let rx = rx.clone();
            let pt = Arc::clone(&pt);
            handles.push(s.spawn(move || drain_work(i, w, rx, pt, work_name)));
        }
        drop(rx);

        'walk: for root in &roots {
            for entry in WalkDir::new(root) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        error!(root = %root.display(), error = %e, "dispatch walk failed");
                        walk_err = Some(
                            anyhow::Error::new(e)
                                .context(format!("failed to scan {}", root.display())),
                        );
                        break 'walk;
                    }
                };
                if !accepted(master, &entry) {
                    continue;
                }
                let size = match entry.metadata() {
                    Ok(m) => m.len(),
                    Err(e) => {
                        walk_err = Some(
                            anyhow::Error::new(e)
                                .context(format!("failed to stat {}", entry.path().display())),
                        );
                        break 'walk;
                    }
                };
                let unit = WorkUnit {
                    path: entry.into_path(),
                    size,
                };
                if tx.send(unit).is_err() {
                    // All workers are gone; nothing left to feed.
                    break 'walk;
                }
            }
        }
        // Closing the channel lets the workers drain and exit.
        drop(tx);

        for handle in handles {
            match handle.join() {
                Ok(Some(err)) => {
                    if first_worker_err.is_none() {
                        first_worker_err = Some(err);
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    if first_worker_err.is_none() {
                        first_worker_err = Some(anyhow!("worker thread panicked"));
                    }
                }
            }
        }
    });

    pt.finished();

    if let Some(err) = walk_err {
        info!(work = work_name, "aborted after walk failure; workers drained");
        return Err(err);
    }

    master.finish_up().context("failed to finish up master")?;

    if let Some(err) = first_worker_err {
        return Err(err.context(format!("{work_name} failed")));
    }

    let elapsed = start_time.elapsed();
    let summary = format!(
        "finished {work_name}\ntotal number of files: {num_files}\n\
         total number of bytes: {num_bytes}\nelapsed time: {}\n",
        path::format_duration(elapsed)
    );
    info!(work = work_name, elapsed = ?elapsed, "done");
    Ok(summary)
}

fn accepted(master: &dyn Master, entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_file()
        && entry.file_name() != ".DS_Store"
        && master.accept(entry.path())
}

fn drain_work(
    index: usize,
    mut worker: Box<dyn Worker>,
    rx: Receiver<WorkUnit>,
    pt: Arc<dyn ProgressTracker>,
    work_name: &str,
) -> Option<anyhow::Error> {
    debug!(worker = index, work = work_name, "worker started");
    let mut first_err: Option<anyhow::Error> = None;

    while let Ok(unit) = rx.recv() {
        if let Err(err) = worker.process(&unit.path, unit.size) {
            error!(
                worker = index,
                path = %unit.path.display(),
                error = %err,
                "failed to process"
            );
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
        // Progress advances for failed items too; totals must add up.
        pt.add_bytes_from_file(unit.size);
    }

    if let Err(err) = worker.close() {
        error!(worker = index, error = %err, "failed to close worker");
    }
    debug!(worker = index, work = work_name, "worker exiting");
    first_err
}

#[cfg(test)]
mod tests;
