//! # romdepot — command-line front end
//!
//! Thin driver over the depot libraries. Commands:
//!
//! ```text
//! romdepot archive <path>...   Archive loose ROM files into the depot
//! romdepot refresh <dats-dir>  Refresh the catalog index from a DAT tree
//! romdepot dat <sha1-hex>      Print the catalog stored under a fingerprint
//! romdepot rom <sha1-hex>      List the catalogs referencing a ROM
//! romdepot stats               Print index store counts
//! ```
//!
//! ## Configuration
//!
//! All settings come from environment variables:
//!
//! ```text
//! DEPOT_ROOT     depot directory            (default: "data/depot")
//! DEPOT_DB       index database directory   (default: "data/db")
//! DEPOT_WORKERS  parallel worker count      (default: 4)
//! DEPOT_LOG      tracing filter             (default: "info")
//! ```

use anyhow::{anyhow, bail, Context, Result};
use db::Db;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use worker::Progress;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn usage() -> ! {
    eprintln!(
        "usage: romdepot <command> [args]\n\n\
         commands:\n\
         \x20 archive <path>...   archive loose ROM files into the depot\n\
         \x20 refresh <dats-dir>  refresh the catalog index from a DAT tree\n\
         \x20 dat <sha1-hex>      print the catalog stored under a fingerprint\n\
         \x20 rom <sha1-hex>      list the catalogs referencing a ROM\n\
         \x20 stats               print index store counts"
    );
    std::process::exit(2);
}

fn parse_sha1(hex_str: &str) -> Result<[u8; 20]> {
    let bytes = hex::decode(hex_str).context("fingerprint is not hex")?;
    bytes[..]
        .try_into()
        .map_err(|_| anyhow!("fingerprint must be 20 bytes, got {}", bytes.len()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DEPOT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let depot_root = PathBuf::from(env_or("DEPOT_ROOT", "data/depot"));
    let db_root = PathBuf::from(env_or("DEPOT_DB", "data/db"));
    let workers: usize = env_or("DEPOT_WORKERS", "4").parse().unwrap_or(4);

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else { usage() };
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "archive" => {
            if rest.is_empty() {
                bail!("archive needs at least one path");
            }
            let roots: Vec<PathBuf> = rest.iter().map(PathBuf::from).collect();
            let db = Arc::new(Db::open(&db_root)?);
            let pt = Arc::new(Progress::new());
            let summary = db::ingest(Arc::clone(&db), &depot_root, &roots, workers, pt)?;
            if let Ok(db) = Arc::try_unwrap(db) {
                db.close()?;
            }
            print!("{summary}");
        }
        "refresh" => {
            let [dats_dir] = rest.as_slice() else {
                bail!("refresh needs exactly one DAT directory");
            };
            let db = Arc::new(Db::open(&db_root)?);
            let pt = Arc::new(Progress::new());
            let summary = db::refresh(Arc::clone(&db), &PathBuf::from(dats_dir), workers, pt)?;
            if let Ok(db) = Arc::try_unwrap(db) {
                db.close()?;
            }
            print!("{summary}");
        }
        "dat" => {
            let [sha1_hex] = rest.as_slice() else {
                bail!("dat needs exactly one sha1 fingerprint");
            };
            let sha1 = parse_sha1(sha1_hex)?;
            let db = Db::open(&db_root)?;
            match db.get_dat(&sha1)? {
                Some(dat) => {
                    let stdout = std::io::stdout();
                    types::compose_dat(&dat, &mut stdout.lock())?;
                }
                None => println!("no dat stored under {sha1_hex}"),
            }
        }
        "rom" => {
            let [sha1_hex] = rest.as_slice() else {
                bail!("rom needs exactly one sha1 fingerprint");
            };
            let sha1 = parse_sha1(sha1_hex)?;
            let db = Db::open(&db_root)?;
            let rom = types::Rom {
                sha1: Some(sha1),
                ..types::Rom::default()
            };
            let dats = db.dats_for_rom(&rom)?;
            if dats.is_empty() {
                println!("no dats reference {sha1_hex}");
            } else {
                let archived = depot::exists(&depot::rom_path(&depot_root, &sha1))?;
                println!("archived in depot: {}", if archived { "yes" } else { "no" });
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                types::compose_dat_index(&dats, &mut out)?;
                out.flush()?;
            }
        }
        "stats" => {
            let db = Db::open(&db_root)?;
            print!("{}", db.stats());
        }
        _ => usage(),
    }

    Ok(())
}
