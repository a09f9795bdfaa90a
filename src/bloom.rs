//! Per-SSTable bloom filter.
//!
//! The filter is a plain byte buffer: `bits` bytes of bitmap followed by a
//! single trailing byte holding the probe count `k`. The buffer is written
//! verbatim into the SSTable (length-prefixed), so its layout is part of
//! the file format and must not change.
//!
//! Keys are hashed once with [`hash::hash`] under [`hash::BLOOM_SEED`];
//! the `k` probe positions are derived from that digest by delta rotation,
//! so `add` and `may_contain` agree without rehashing.
//!
//! # Guarantee
//!
//! Every key added to a filter is reported as present — there are no
//! false negatives. False positives occur at a rate controlled by
//! `bits_per_key`.

use crate::hash;

/// Hashes a user key for bloom filter insertion or lookup.
pub fn bloom_hash(user_key: &[u8]) -> u64 {
    hash::hash(user_key, hash::BLOOM_SEED)
}

/// Allocates an empty filter sized for `num_keys` entries at
/// `bits_per_key` bits each.
///
/// The probe count is derived as `bits_per_key * ln 2` and clamped to
/// `1..=30`. A minimum of 64 bits avoids degenerate tiny filters.
pub fn create(num_keys: usize, bits_per_key: usize) -> Vec<u8> {
    let k = ((bits_per_key as f64) * 0.69) as usize;
    let k = k.clamp(1, 30);

    let bits = (num_keys * bits_per_key).max(64);
    let bytes = bits.div_ceil(8);

    let mut filter = vec![0u8; bytes + 1];
    filter[bytes] = k as u8;
    filter
}

/// Sets the probe bits for a pre-hashed key.
pub fn add(key_hash: u64, filter: &mut [u8]) {
    let Some((&k, bitmap_len)) = filter.split_last().map(|(k, b)| (k, b.len())) else {
        return;
    };
    let bits = (bitmap_len * 8) as u64;

    let delta = key_hash.rotate_right(17);
    let mut h = key_hash;
    for _ in 0..k {
        let bit = (h % bits) as usize;
        filter[bit / 8] |= 1 << (bit % 8);
        h = h.wrapping_add(delta);
    }
}

/// Tests whether `user_key` may be present.
///
/// Returns `true` when the key may exist (including for filters too short
/// to carry a bitmap, which cannot exclude anything) and `false` only when
/// the key is definitely absent.
pub fn may_contain(user_key: &[u8], filter: &[u8]) -> bool {
    if filter.len() < 2 {
        return true;
    }
    let (k, bitmap) = (filter[filter.len() - 1], &filter[..filter.len() - 1]);
    if k == 0 || k > 30 {
        // Reserved / corrupt probe count: do not exclude.
        return true;
    }
    let bits = (bitmap.len() * 8) as u64;

    let key_hash = bloom_hash(user_key);
    let delta = key_hash.rotate_right(17);
    let mut h = key_hash;
    for _ in 0..k {
        let bit = (h % bits) as usize;
        if bitmap[bit / 8] & (1 << (bit % 8)) == 0 {
            return false;
        }
        h = h.wrapping_add(delta);
    }
    true
}
