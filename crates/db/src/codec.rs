//! Binary encoding for stored catalog records.
//!
//! A record is the catalog's generation stamp followed by the catalog
//! itself:
//!
//! ```text
//! [generation: u64 BE]
//! [name][description][path]            strings: u32 BE length + UTF-8 bytes
//! [game count: u32 BE]
//!   per game: [name][description][rom count: u32 BE]
//!     per rom: [name][size: i64 BE][crc?][md5?][sha1?]
//!              optional hashes: u8 presence flag + raw bytes
//! ```

use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;
use types::{Dat, Game, Rom};

pub(crate) fn encode_record(generation: u64, dat: &Dat) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&generation.to_be_bytes());
    encode_dat(dat, &mut out);
    out
}

pub(crate) fn decode_record(bytes: &[u8]) -> Result<(u64, Dat)> {
    let mut r = bytes;
    let generation = r
        .read_u64::<BigEndian>()
        .context("truncated dat record: missing generation")?;
    let dat = decode_dat(&mut r)?;
    Ok((generation, dat))
}

/// Encoded size of a catalog without its generation stamp; used for batch
/// size accounting.
pub(crate) fn encoded_len(dat: &Dat) -> u64 {
    let mut out = Vec::new();
    encode_dat(dat, &mut out);
    out.len() as u64
}

fn encode_dat(dat: &Dat, out: &mut Vec<u8>) {
    encode_str(&dat.name, out);
    encode_str(&dat.description, out);
    encode_str(&dat.path, out);
    out.extend_from_slice(&(dat.games.len() as u32).to_be_bytes());
    for game in &dat.games {
        encode_str(&game.name, out);
        encode_str(&game.description, out);
        out.extend_from_slice(&(game.roms.len() as u32).to_be_bytes());
        for rom in &game.roms {
            encode_str(&rom.name, out);
            out.extend_from_slice(&rom.size.to_be_bytes());
            encode_hash(rom.crc.as_ref().map(|b| &b[..]), out);
            encode_hash(rom.md5.as_ref().map(|b| &b[..]), out);
            encode_hash(rom.sha1.as_ref().map(|b| &b[..]), out);
        }
    }
}

fn decode_dat(r: &mut &[u8]) -> Result<Dat> {
    let name = decode_str(r)?;
    let description = decode_str(r)?;
    let path = decode_str(r)?;
    let game_count = r.read_u32::<BigEndian>().context("truncated dat record")?;
    let mut games = Vec::with_capacity(game_count.min(1024) as usize);
    for _ in 0..game_count {
        let name = decode_str(r)?;
        let description = decode_str(r)?;
        let rom_count = r.read_u32::<BigEndian>().context("truncated dat record")?;
        let mut roms = Vec::with_capacity(rom_count.min(4096) as usize);
        for _ in 0..rom_count {
            let name = decode_str(r)?;
            let size = r.read_i64::<BigEndian>().context("truncated dat record")?;
            roms.push(Rom {
                name,
                size,
                crc: decode_hash::<4>(r)?,
                md5: decode_hash::<16>(r)?,
                sha1: decode_hash::<20>(r)?,
            });
        }
        games.push(Game {
            name,
            description,
            roms,
        });
    }
    Ok(Dat {
        name,
        description,
        path,
        games,
    })
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn decode_str(r: &mut &[u8]) -> Result<String> {
    let len = r.read_u32::<BigEndian>().context("truncated dat record")? as usize;
    if len > r.len() {
        bail!("truncated dat record: string runs past the end");
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).context("truncated dat record")?;
    String::from_utf8(buf).context("dat record string is not UTF-8")
}

fn encode_hash(hash: Option<&[u8]>, out: &mut Vec<u8>) {
    match hash {
        Some(bytes) => {
            out.push(1);
            out.extend_from_slice(bytes);
        }
        None => out.push(0),
    }
}

fn decode_hash<const N: usize>(r: &mut &[u8]) -> Result<Option<[u8; N]>> {
    let present = r.read_u8().context("truncated dat record")?;
    match present {
        0 => Ok(None),
        1 => {
            let mut buf = [0u8; N];
            r.read_exact(&mut buf).context("truncated dat record")?;
            Ok(Some(buf))
        }
        other => bail!("dat record has invalid hash flag {other}"),
    }
}
