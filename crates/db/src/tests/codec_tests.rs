use super::{sample_dat, sample_rom};
use crate::codec::{decode_record, encode_record, encoded_len};
use types::{Dat, Game};

#[test]
fn record_roundtrip() {
    let dat = sample_dat("roundtrip", &[1, 2, 3]);
    let encoded = encode_record(7, &dat);

    let (generation, decoded) = decode_record(&encoded).unwrap();
    assert_eq!(generation, 7);
    assert_eq!(decoded, dat);
}

#[test]
fn roundtrip_with_absent_hashes_and_empty_games() {
    let mut rom = sample_rom(9);
    rom.md5 = None;
    rom.crc = None;
    let dat = Dat {
        name: "sparse".to_string(),
        description: String::new(),
        path: "/x".to_string(),
        games: vec![
            Game {
                name: "empty".to_string(),
                description: String::new(),
                roms: vec![],
            },
            Game {
                name: "one".to_string(),
                description: "d".to_string(),
                roms: vec![rom],
            },
        ],
    };

    let (_, decoded) = decode_record(&encode_record(0, &dat)).unwrap();
    assert_eq!(decoded, dat);
    assert_eq!(decoded.games[1].roms[0].md5, None);
}

#[test]
fn encoded_len_matches_payload() {
    let dat = sample_dat("sized", &[1]);
    let record = encode_record(3, &dat);
    // Record = 8-byte generation stamp + payload.
    assert_eq!(encoded_len(&dat), record.len() as u64 - 8);
}

#[test]
fn truncated_record_is_an_error() {
    let dat = sample_dat("cut", &[1, 2]);
    let encoded = encode_record(1, &dat);

    assert!(decode_record(&encoded[..encoded.len() - 5]).is_err());
    assert!(decode_record(&encoded[..4]).is_err());
    assert!(decode_record(&[]).is_err());
}

#[test]
fn oversized_string_length_is_an_error() {
    let dat = sample_dat("bad", &[]);
    let mut encoded = encode_record(1, &dat);
    // Corrupt the first string length (right after the generation stamp).
    encoded[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
    assert!(decode_record(&encoded).is_err());
}
