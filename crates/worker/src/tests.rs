use super::*;
use anyhow::bail;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::tempdir;

// -------------------- common_root (pure) --------------------

#[test]
fn common_root_of_siblings() {
    assert_eq!(
        common_root(Path::new("/a/b/c"), Path::new("/a/b/d")),
        PathBuf::from("/a/b")
    );
}

#[test]
fn common_root_of_identical_paths() {
    assert_eq!(
        common_root(Path::new("/a/b/c"), Path::new("/a/b/c")),
        PathBuf::from("/a/b/c")
    );
}

#[test]
fn common_root_cleans_before_comparing() {
    assert_eq!(
        common_root(Path::new("/a/b/../c/x"), Path::new("/a/c/y")),
        PathBuf::from("/a/c")
    );
    assert_eq!(
        common_root(Path::new("/a//b/"), Path::new("/a/b/z")),
        PathBuf::from("/a")
    );
}

#[test]
fn common_root_with_nothing_shared_is_separator() {
    assert_eq!(
        common_root(Path::new("/x/1"), Path::new("/y/2")),
        PathBuf::from("/")
    );
}

#[test]
fn common_root_with_different_volumes_is_empty() {
    assert_eq!(
        common_root(Path::new("c:/data/a"), Path::new("d:/data/a")),
        PathBuf::new()
    );
}

#[test]
fn common_root_of_nested_paths() {
    assert_eq!(
        common_root(Path::new("/a/b"), Path::new("/a/b/c/d")),
        PathBuf::from("/a/b")
    );
}

// -------------------- Progress --------------------

#[test]
fn progress_accumulates() {
    let p = Progress::new();
    p.set_total_bytes(100);
    p.set_total_files(3);
    p.add_bytes_from_file(40);
    p.add_bytes_from_file(60);
    assert_eq!(p.total_bytes(), 100);
    assert_eq!(p.total_files(), 3);
    assert_eq!(p.bytes_done(), 100);
    assert!(!p.is_finished());
    p.finished();
    assert!(p.is_finished());
}

// -------------------- work() harness --------------------

#[derive(Default)]
struct Shared {
    processed: Mutex<Vec<PathBuf>>,
    closed_workers: AtomicUsize,
    finish_called: AtomicBool,
    scanned: Mutex<Option<(u64, u64, PathBuf)>>,
    fail_on: Option<&'static str>,
}

struct TestWorker {
    shared: Arc<Shared>,
}

impl Worker for TestWorker {
    fn process(&mut self, path: &Path, _size: u64) -> Result<()> {
        self.shared
            .processed
            .lock()
            .unwrap()
            .push(path.to_path_buf());
        if let Some(bad) = self.shared.fail_on {
            if path.file_name().is_some_and(|n| n == bad) {
                bail!("injected failure for {bad}");
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.shared.closed_workers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct TestMaster {
    shared: Arc<Shared>,
    pt: Arc<Progress>,
    num_workers: usize,
    ext: &'static str,
    start_fails: bool,
}

impl TestMaster {
    fn new(num_workers: usize, ext: &'static str, fail_on: Option<&'static str>) -> Self {
        Self {
            shared: Arc::new(Shared {
                fail_on,
                ..Shared::default()
            }),
            pt: Arc::new(Progress::new()),
            num_workers,
            ext,
            start_fails: false,
        }
    }
}

impl Master for TestMaster {
    fn start(&mut self) -> Result<()> {
        if self.start_fails {
            bail!("start refused");
        }
        Ok(())
    }

    fn accept(&self, path: &Path) -> bool {
        path.extension().is_some_and(|e| e == self.ext)
    }

    fn new_worker(&mut self, _worker_index: usize) -> Box<dyn Worker> {
        Box::new(TestWorker {
            shared: Arc::clone(&self.shared),
        })
    }

    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn progress_tracker(&self) -> Arc<dyn ProgressTracker> {
        Arc::clone(&self.pt) as Arc<dyn ProgressTracker>
    }

    fn scanned(&mut self, num_files: u64, num_bytes: u64, common_root: &Path) {
        *self.shared.scanned.lock().unwrap() =
            Some((num_files, num_bytes, common_root.to_path_buf()));
    }

    fn finish_up(&mut self) -> Result<()> {
        self.shared.finish_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates `count` accepted files split across two subdirectories, plus a
/// `.DS_Store` and a rejected extension. Returns the total accepted bytes.
fn populate(root: &Path, count: usize) -> u64 {
    fs::create_dir_all(root.join("sub1")).unwrap();
    fs::create_dir_all(root.join("sub2")).unwrap();
    let mut total = 0u64;
    for i in 0..count {
        let sub = if i % 2 == 0 { "sub1" } else { "sub2" };
        let size = i + 1;
        fs::write(
            root.join(sub).join(format!("file_{i:03}.bin")),
            vec![0xAB; size],
        )
        .unwrap();
        total += size as u64;
    }
    fs::write(root.join(".DS_Store"), b"finder junk").unwrap();
    fs::write(root.join("notes.txt"), b"not a rom").unwrap();
    total
}

#[test]
fn dispatches_every_accepted_file() {
    let dir = tempdir().unwrap();
    let total = populate(dir.path(), 20);

    let mut master = TestMaster::new(2, "bin", None);
    let summary = work("test ingest", &[dir.path().to_path_buf()], &mut master).unwrap();

    let (files, bytes, common) = master.shared.scanned.lock().unwrap().clone().unwrap();
    assert_eq!(files, 20);
    assert_eq!(bytes, total);
    assert_eq!(common, dir.path());

    let mut processed = master.shared.processed.lock().unwrap().clone();
    processed.sort();
    assert_eq!(processed.len(), 20);
    assert!(processed.iter().all(|p| p.extension().unwrap() == "bin"));

    assert_eq!(master.pt.total_bytes(), total);
    assert_eq!(master.pt.bytes_done(), total);
    assert!(master.pt.is_finished());
    assert_eq!(
        master.shared.closed_workers.load(Ordering::SeqCst),
        2,
        "every worker must close"
    );
    assert!(master.shared.finish_called.load(Ordering::SeqCst));
    assert!(summary.contains("total number of files: 20"));
}

#[test]
fn first_error_is_returned_with_full_progress() {
    let dir = tempdir().unwrap();
    let total = populate(dir.path(), 200);

    let mut master = TestMaster::new(8, "bin", Some("file_137.bin"));
    let result = work("test ingest", &[dir.path().to_path_buf()], &mut master);

    assert!(result.is_err());
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("injected failure"), "unexpected error: {err}");

    // Every dispatched item, including the failing one, reaches the tracker.
    assert_eq!(master.pt.bytes_done(), total);
    assert_eq!(master.shared.processed.lock().unwrap().len(), 200);
    assert_eq!(master.shared.closed_workers.load(Ordering::SeqCst), 8);
    // finish_up still runs after a worker failure.
    assert!(master.shared.finish_called.load(Ordering::SeqCst));
}

#[test]
fn processing_continues_after_a_failed_item() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 10);

    // One worker, so every item flows through the same failing worker.
    let mut master = TestMaster::new(1, "bin", Some("file_003.bin"));
    let result = work("test ingest", &[dir.path().to_path_buf()], &mut master);

    assert!(result.is_err());
    assert_eq!(master.shared.processed.lock().unwrap().len(), 10);
}

#[test]
fn walk_error_aborts_before_dispatch() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("not-there");

    let mut master = TestMaster::new(2, "bin", None);
    let result = work("test ingest", &[missing], &mut master);

    assert!(result.is_err());
    assert!(master.shared.scanned.lock().unwrap().is_none());
    assert!(master.shared.processed.lock().unwrap().is_empty());
}

#[test]
fn start_failure_short_circuits() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 5);

    let mut master = TestMaster::new(2, "bin", None);
    master.start_fails = true;
    let result = work("test ingest", &[dir.path().to_path_buf()], &mut master);

    assert!(result.is_err());
    assert!(master.shared.scanned.lock().unwrap().is_none());
    assert!(!master.shared.finish_called.load(Ordering::SeqCst));
}

#[test]
fn empty_tree_finishes_cleanly() {
    let dir = tempdir().unwrap();

    let mut master = TestMaster::new(4, "bin", None);
    let summary = work("test ingest", &[dir.path().to_path_buf()], &mut master).unwrap();

    let (files, bytes, _) = master.shared.scanned.lock().unwrap().clone().unwrap();
    assert_eq!((files, bytes), (0, 0));
    assert!(summary.contains("total number of files: 0"));
}

#[test]
fn multiple_roots_are_all_walked() {
    let dir = tempdir().unwrap();
    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");
    fs::create_dir_all(&root_a).unwrap();
    fs::create_dir_all(&root_b).unwrap();
    fs::write(root_a.join("one.bin"), b"11").unwrap();
    fs::write(root_b.join("two.bin"), b"222").unwrap();

    let mut master = TestMaster::new(2, "bin", None);
    work("test ingest", &[root_a, root_b], &mut master).unwrap();

    let (files, bytes, _) = master.shared.scanned.lock().unwrap().clone().unwrap();
    assert_eq!(files, 2);
    assert_eq!(bytes, 5);
    assert_eq!(master.pt.bytes_done(), 5);
}
