use crate::{Store, StoreOptions};
use rand::{Rng, SeedableRng};
use std::path::Path;

pub const SHA1_SIZE: usize = 20;

pub fn rng(seed: u64) -> rand::rngs::StdRng {
    rand::rngs::StdRng::seed_from_u64(seed)
}

pub fn random_bytes(rng: &mut impl Rng, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rng.fill(&mut buf[..]);
    buf
}

/// Opens a store with a tiny rollover cap so tests can force multiple data
/// files with little data.
pub fn open_small(root: &Path, key_size: usize, cap: u64) -> Store {
    Store::open_with(
        root,
        key_size,
        StoreOptions {
            max_data_file_size: cap,
        },
    )
    .unwrap()
}

/// Generates `n` distinct key-value pairs with 20-byte keys.
pub fn random_pairs(seed: u64, n: usize, value_len: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut r = rng(seed);
    (0..n)
        .map(|_| {
            (
                random_bytes(&mut r, SHA1_SIZE),
                random_bytes(&mut r, value_len),
            )
        })
        .collect()
}
