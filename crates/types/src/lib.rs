//! Logical records for catalogs and the files they describe, plus the
//! textual composer used by lookup output.

use std::io::{self, Write};

/// A single file identified by its fingerprints. Identity is `sha1`; the
/// other fingerprints are optional because not every catalog carries them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rom {
    pub name: String,
    pub size: i64,
    pub crc: Option<[u8; 4]>,
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
}

/// A named group of ROMs within a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Game {
    pub name: String,
    pub description: String,
    pub roms: Vec<Rom>,
}

/// A catalog: a named collection of games. `path` records where the source
/// catalog file was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dat {
    pub name: String,
    pub description: String,
    pub path: String,
    pub games: Vec<Game>,
}

fn hex_or_dash(bytes: Option<&[u8]>) -> String {
    match bytes {
        Some(b) => hex::encode(b),
        None => "-".to_string(),
    }
}

/// Writes the full textual listing of a catalog: header, games, and one
/// `rom (...)` line per ROM.
pub fn compose_dat<W: Write>(dat: &Dat, w: &mut W) -> io::Result<()> {
    writeln!(w, "dat (")?;
    writeln!(w, "\tname \"{}\"", dat.name)?;
    writeln!(w, "\tdescription \"{}\"", dat.description)?;
    writeln!(w, "\tpath \"{}\"", dat.path)?;
    writeln!(w, ")")?;
    for game in &dat.games {
        writeln!(w, "game (")?;
        writeln!(w, "\tname \"{}\"", game.name)?;
        writeln!(w, "\tdescription \"{}\"", game.description)?;
        for rom in &game.roms {
            writeln!(
                w,
                "\trom ( name \"{}\" size {} crc {} md5 {} sha1 {} )",
                rom.name,
                rom.size,
                hex_or_dash(rom.crc.as_ref().map(|b| &b[..])),
                hex_or_dash(rom.md5.as_ref().map(|b| &b[..])),
                hex_or_dash(rom.sha1.as_ref().map(|b| &b[..])),
            )?;
        }
        writeln!(w, ")")?;
    }
    Ok(())
}

/// Writes only the headers of a list of catalogs; used by reverse lookups
/// ("which catalogs reference this ROM?").
pub fn compose_dat_index<W: Write>(dats: &[Dat], w: &mut W) -> io::Result<()> {
    for dat in dats {
        writeln!(w, "dat (")?;
        writeln!(w, "\tname \"{}\"", dat.name)?;
        writeln!(w, "\tdescription \"{}\"", dat.description)?;
        writeln!(w, "\tpath \"{}\"", dat.path)?;
        writeln!(w, ")")?;
    }
    Ok(())
}
