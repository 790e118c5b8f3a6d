mod codec_tests;
mod merge_tests;
mod refresh_tests;

use types::{Dat, Game, Rom};

pub(crate) fn sample_rom(tag: u8) -> Rom {
    Rom {
        name: format!("rom_{tag}.bin"),
        size: 1024 + tag as i64,
        crc: Some([tag, 1, 2, 3]),
        md5: Some([tag; 16]),
        sha1: Some([tag; 20]),
    }
}

pub(crate) fn sample_dat(name: &str, rom_tags: &[u8]) -> Dat {
    Dat {
        name: name.to_string(),
        description: format!("{name} description"),
        path: format!("/dats/{name}.dat"),
        games: vec![Game {
            name: format!("{name} game"),
            description: "a game".to_string(),
            roms: rom_tags.iter().map(|&t| sample_rom(t)).collect(),
        }],
    }
}
