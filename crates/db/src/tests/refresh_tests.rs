use crate::{ingest, refresh, Db};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use types::Rom;
use worker::{Progress, ProgressTracker};

fn catalog_xml(name: &str, rom_sha1_hex: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<datafile>
  <header>
    <name>{name}</name>
    <description>{name} catalog</description>
  </header>
  <game name="{name}-game">
    <description>{name} game</description>
    <rom name="{name}.bin" size="6" sha1="{rom_sha1_hex}"/>
  </game>
</datafile>
"#
    )
}

const SHA1_X: &str = "f572d396fae9206628714fb2ce00f72e94f2258f";
const SHA1_Y: &str = "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12";

fn write_catalog(dir: &Path, file: &str, name: &str, rom_sha1: &str) -> [u8; 20] {
    let path = dir.join(file);
    fs::write(&path, catalog_xml(name, rom_sha1)).unwrap();
    hashes::sha1_for_file(&path).unwrap()
}

fn tracker() -> Arc<dyn ProgressTracker> {
    Arc::new(Progress::new())
}

// -------------------- Refresh epochs --------------------

#[test]
fn refresh_indexes_every_catalog() {
    let tmp = tempdir().unwrap();
    let dats = tmp.path().join("dats");
    fs::create_dir_all(&dats).unwrap();
    let id_x = write_catalog(&dats, "x.dat", "X", SHA1_X);
    let id_y = write_catalog(&dats, "y.xml", "Y", SHA1_Y);
    // Files with other extensions are ignored.
    fs::write(dats.join("readme.txt"), "not a catalog").unwrap();

    let db = Arc::new(Db::open(tmp.path().join("db")).unwrap());
    refresh(Arc::clone(&db), &dats, 2, tracker()).unwrap();

    assert_eq!(db.get_dat(&id_x).unwrap().unwrap().name, "X");
    assert_eq!(db.get_dat(&id_y).unwrap().unwrap().name, "Y");
}

#[test]
fn vanished_catalog_is_orphaned_by_next_refresh() {
    let tmp = tempdir().unwrap();
    let dats = tmp.path().join("dats");
    fs::create_dir_all(&dats).unwrap();
    let id_x = write_catalog(&dats, "x.dat", "X", SHA1_X);
    let id_y = write_catalog(&dats, "y.dat", "Y", SHA1_Y);

    let db = Arc::new(Db::open(tmp.path().join("db")).unwrap());
    refresh(Arc::clone(&db), &dats, 2, tracker()).unwrap();
    assert!(db.get_dat(&id_y).unwrap().is_some());

    fs::remove_file(dats.join("y.dat")).unwrap();
    refresh(Arc::clone(&db), &dats, 2, tracker()).unwrap();

    assert_eq!(db.get_dat(&id_x).unwrap().unwrap().name, "X");
    assert!(db.get_dat(&id_y).unwrap().is_none(), "Y must be orphaned");

    // Orphaning survives reopen: the committed generation is persisted.
    db.flush().unwrap();
    drop(db);
    let db = Db::open(tmp.path().join("db")).unwrap();
    assert!(db.get_dat(&id_x).unwrap().is_some());
    assert!(db.get_dat(&id_y).unwrap().is_none());
}

#[test]
fn refresh_links_roms_to_their_catalogs() {
    let tmp = tempdir().unwrap();
    let dats = tmp.path().join("dats");
    fs::create_dir_all(&dats).unwrap();
    write_catalog(&dats, "x.dat", "X", SHA1_X);

    let db = Arc::new(Db::open(tmp.path().join("db")).unwrap());
    refresh(Arc::clone(&db), &dats, 1, tracker()).unwrap();

    let rom = Rom {
        sha1: Some(
            hex::decode(SHA1_X).unwrap()[..]
                .try_into()
                .unwrap(),
        ),
        ..Rom::default()
    };
    let dats_for = db.dats_for_rom(&rom).unwrap();
    assert_eq!(dats_for.len(), 1);
    assert_eq!(dats_for[0].name, "X");
}

#[test]
fn unparseable_catalog_fails_the_refresh_but_indexes_the_rest() {
    let tmp = tempdir().unwrap();
    let dats = tmp.path().join("dats");
    fs::create_dir_all(&dats).unwrap();
    let id_x = write_catalog(&dats, "x.dat", "X", SHA1_X);
    fs::write(dats.join("broken.dat"), "definitely not a catalog").unwrap();

    let db = Arc::new(Db::open(tmp.path().join("db")).unwrap());
    let result = refresh(Arc::clone(&db), &dats, 1, tracker());

    assert!(result.is_err(), "first worker error must surface");
    // The epoch still completed and the good catalog is live.
    assert!(db.get_dat(&id_x).unwrap().is_some());
}

#[test]
fn refresh_progress_accounts_for_all_catalog_bytes() {
    let tmp = tempdir().unwrap();
    let dats = tmp.path().join("dats");
    fs::create_dir_all(&dats).unwrap();
    write_catalog(&dats, "x.dat", "X", SHA1_X);
    write_catalog(&dats, "y.dat", "Y", SHA1_Y);
    let total: u64 = fs::read_dir(&dats)
        .unwrap()
        .map(|e| e.unwrap().metadata().unwrap().len())
        .sum();

    let db = Arc::new(Db::open(tmp.path().join("db")).unwrap());
    let pt = Arc::new(Progress::new());
    refresh(Arc::clone(&db), &dats, 4, pt.clone()).unwrap();

    assert_eq!(pt.total_bytes(), total);
    assert_eq!(pt.bytes_done(), total);
    assert!(pt.is_finished());
}

// -------------------- Ingest --------------------

#[test]
fn ingest_archives_and_indexes_roms() {
    let tmp = tempdir().unwrap();
    let roms = tmp.path().join("roms");
    fs::create_dir_all(&roms).unwrap();
    fs::write(roms.join("hello.bin"), b"hello\n").unwrap();
    fs::write(roms.join("fox.bin"), b"The quick brown fox jumps over the lazy dog").unwrap();

    let depot_root = tmp.path().join("depot");
    let db = Arc::new(Db::open(tmp.path().join("db")).unwrap());
    ingest(
        Arc::clone(&db),
        &depot_root,
        &[roms.clone()],
        2,
        tracker(),
    )
    .unwrap();

    // The known file landed at its sharded path and round-trips.
    let path = depot::path_for(&depot_root, SHA1_X, depot::GZ_SUFFIX);
    assert!(path.exists());
    assert_eq!(depot::read_archived(&path).unwrap(), b"hello\n");

    // Its fingerprints are resolvable through the secondary indexes.
    let digests = hashes::Digests::for_reader(&b"hello\n"[..]).unwrap();
    let mut rom = Rom {
        md5: Some(digests.md5),
        ..Rom::default()
    };
    assert!(db.complete_rom(&mut rom).unwrap());
    assert_eq!(rom.sha1, Some(digests.sha1));

    // Re-ingesting is idempotent.
    ingest(Arc::clone(&db), &depot_root, &[roms], 2, tracker()).unwrap();
}
