//! Catalog parsing.
//!
//! The refresh driver only needs the [`DatParser`] capability; the bundled
//! [`XmlDatParser`] reads Logiqx-style `<datafile>` XML, which is what both
//! `.xml` and most `.dat` catalogs contain.

use anyhow::{bail, Context, Result};
use hashes::{sha1_for_reader, SHA1_SIZE};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;
use types::{Dat, Game, Rom};

/// Turns a catalog file into a [`Dat`] plus the catalog's identity SHA-1,
/// taken over the raw file bytes.
pub trait DatParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<(Dat, [u8; SHA1_SIZE])>;
}

/// Parser for Logiqx `<datafile>` XML catalogs.
pub struct XmlDatParser;

impl DatParser for XmlDatParser {
    fn parse(&self, path: &Path) -> Result<(Dat, [u8; SHA1_SIZE])> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let sha1 = sha1_for_reader(&bytes[..])?;
        let mut dat = parse_datafile(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        dat.path = path.display().to_string();
        Ok((dat, sha1))
    }
}

/// Which element's text content is currently being captured.
enum Capture {
    HeaderName,
    HeaderDescription,
    GameDescription,
}

fn parse_datafile(bytes: &[u8]) -> Result<Dat> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut dat = Dat::default();
    let mut in_header = false;
    let mut game: Option<Game> = None;
    let mut capture: Option<Capture> = None;
    let mut saw_datafile = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .context("malformed catalog xml")?
        {
            Event::Start(e) => match e.name().as_ref() {
                b"datafile" => saw_datafile = true,
                b"header" => in_header = true,
                b"game" | b"machine" => {
                    game = Some(Game {
                        name: attr(&e, b"name").unwrap_or_default(),
                        ..Game::default()
                    });
                }
                b"name" if in_header => capture = Some(Capture::HeaderName),
                b"description" if in_header => capture = Some(Capture::HeaderDescription),
                b"description" if game.is_some() => capture = Some(Capture::GameDescription),
                b"rom" => {
                    if let Some(g) = game.as_mut() {
                        g.roms.push(parse_rom(&e)?);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"rom" {
                    if let Some(g) = game.as_mut() {
                        g.roms.push(parse_rom(&e)?);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(target) = &capture {
                    let text = String::from_utf8_lossy(t.as_ref()).trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    match target {
                        Capture::HeaderName => dat.name = text,
                        Capture::HeaderDescription => dat.description = text,
                        Capture::GameDescription => {
                            if let Some(g) = game.as_mut() {
                                g.description = text;
                            }
                        }
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"header" => in_header = false,
                b"game" | b"machine" => {
                    if let Some(g) = game.take() {
                        dat.games.push(g);
                    }
                }
                b"name" | b"description" => capture = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_datafile {
        bail!("catalog has no <datafile> element");
    }
    Ok(dat)
}

fn parse_rom(e: &BytesStart<'_>) -> Result<Rom> {
    let size = match attr(e, b"size") {
        Some(s) => s
            .parse::<i64>()
            .with_context(|| format!("rom has invalid size attribute {s:?}"))?,
        None => 0,
    };
    Ok(Rom {
        name: attr(e, b"name").unwrap_or_default(),
        size,
        crc: hex_attr::<4>(e, b"crc")?,
        md5: hex_attr::<16>(e, b"md5")?,
        sha1: hex_attr::<20>(e, b"sha1")?,
    })
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn hex_attr<const N: usize>(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<[u8; N]>> {
    let Some(text) = attr(e, name) else {
        return Ok(None);
    };
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return Ok(None);
    }
    let bytes = hex::decode(text)
        .with_context(|| format!("rom has non-hex {} attribute", String::from_utf8_lossy(name)))?;
    if bytes.len() != N {
        bail!(
            "rom {} attribute is {} bytes, expected {N}",
            String::from_utf8_lossy(name),
            bytes.len()
        );
    }
    Ok(Some(bytes[..].try_into().expect("length checked above")))
}
