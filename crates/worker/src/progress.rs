use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::ProgressTracker;

/// Atomic [`ProgressTracker`]: totals set by the supervisor, byte counts
/// bumped from every worker. Readers (a UI loop, tests) poll the accessors.
#[derive(Debug, Default)]
pub struct Progress {
    total_bytes: AtomicU64,
    total_files: AtomicU32,
    done_bytes: AtomicU64,
    done: AtomicBool,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn total_files(&self) -> u32 {
        self.total_files.load(Ordering::Relaxed)
    }

    pub fn bytes_done(&self) -> u64 {
        self.done_bytes.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl ProgressTracker for Progress {
    fn set_total_bytes(&self, n: u64) {
        self.total_bytes.store(n, Ordering::Relaxed);
    }

    fn set_total_files(&self, n: u32) {
        self.total_files.store(n, Ordering::Relaxed);
    }

    fn add_bytes_from_file(&self, n: u64) {
        self.done_bytes.fetch_add(n, Ordering::Relaxed);
    }

    fn finished(&self) {
        self.done.store(true, Ordering::Release);
    }
}
