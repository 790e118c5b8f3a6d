//! Path helpers for the pool: lexical cleaning, common-root folding, and
//! small formatting utilities for the end-of-work summary.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::time::Duration;

/// Longest common ancestor of two paths.
///
/// Both paths are lexically cleaned first. The result is the longest shared
/// prefix that ends at a path separator, with these fixed points:
///
/// - different volume names ⇒ empty path;
/// - byte-identical cleaned paths ⇒ that path;
/// - nothing shared beyond the root ⇒ the volume root (`/` on POSIX).
pub fn common_root(pa: &Path, pb: &Path) -> PathBuf {
    let pa = pa.to_string_lossy();
    let pb = pb.to_string_lossy();
    if pa.is_empty() || pb.is_empty() {
        return PathBuf::new();
    }

    let pac = clean(&pa);
    let pbc = clean(&pb);

    let va = volume_name(&pac);
    let vb = volume_name(&pbc);
    if va != vb {
        return PathBuf::new();
    }

    let sa = pac[va.len()..].as_bytes();
    let sb = pbc[vb.len()..].as_bytes();
    let sep = MAIN_SEPARATOR as u8;

    let mut cursor = 0usize;
    let mut last_sep: Option<usize> = None;
    while cursor < sa.len() && cursor < sb.len() && sa[cursor] == sb[cursor] {
        if sa[cursor] == sep {
            last_sep = Some(cursor);
        }
        cursor += 1;
    }

    if cursor == sa.len() && sa.len() == sb.len() {
        return PathBuf::from(pac);
    }

    match last_sep {
        None => PathBuf::from(format!("{va}{MAIN_SEPARATOR}")),
        Some(ls) => {
            let res = &pac[..va.len() + ls];
            if res.is_empty() {
                PathBuf::from(MAIN_SEPARATOR.to_string())
            } else {
                PathBuf::from(res)
            }
        }
    }
}

/// Lexically normalizes a path: collapses separators, drops `.`, and
/// resolves `..` against preceding components where possible.
fn clean(path: &str) -> String {
    let mut out = PathBuf::new();
    for comp in Path::new(path).components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let pops = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if pops {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        ".".to_string()
    } else {
        out.to_string_lossy().into_owned()
    }
}

/// Drive-letter volume prefix (`C:`), empty on POSIX-style paths.
fn volume_name(path: &str) -> &str {
    let b = path.as_bytes();
    if b.len() >= 2 && b[1] == b':' && b[0].is_ascii_alphabetic() {
        &path[..2]
    } else {
        ""
    }
}

/// Absolute form of `path` without touching the filesystem beyond the
/// current directory lookup.
pub(crate) fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    Ok(cwd.join(path))
}

/// `1h2m3s`-style rendering for the end-of-work summary.
pub(crate) fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, mins, secs) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{mins}m{secs}s")
    } else if mins > 0 {
        format!("{mins}m{secs}s")
    } else {
        format!("{secs}s")
    }
}
