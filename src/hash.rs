//! MurmurHash2, 64-bit variant (64A).
//!
//! These digests are part of the on-disk and in-memory contracts of the
//! engine: bloom filters hash user keys with [`BLOOM_SEED`], and the hash
//! join combines per-column hashes by seed chaining starting from
//! [`JOIN_SEED`]. Two builds of this crate must produce identical 64-bit
//! digests for identical inputs, so the implementation is pinned here
//! rather than taken from a hashing crate.

/// Seed used when hashing user keys for bloom filters.
pub const BLOOM_SEED: u64 = 0;

/// Initial seed of the hash-join per-column seed chain.
pub const JOIN_SEED: u64 = 0x1234;

const M: u64 = 0xc6a4_a793_5bd1_e995;
const R: u32 = 47;

/// Hashes an arbitrary byte slice.
///
/// Bytes are consumed in 8-byte little-endian chunks; the remaining tail
/// (0–7 bytes) is folded in last.
pub fn hash(data: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (data.len() as u64).wrapping_mul(M);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        // chunks_exact guarantees 8 bytes.
        let mut k = u64::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (i, &byte) in tail.iter().enumerate() {
            h ^= (byte as u64) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}

/// Hashes a single 8-byte scalar.
///
/// Faster than routing the value through [`hash`]; used for integer and
/// float join keys (floats are hashed by their raw bit pattern).
pub fn hash8(data: u64, seed: u64) -> u64 {
    let mut h = seed ^ M;

    let mut k = data;
    k = k.wrapping_mul(M);
    k ^= k >> R;
    k = k.wrapping_mul(M);
    h ^= k;
    h = h.wrapping_mul(M);

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash(b"wrendb", 0), hash(b"wrendb", 0));
        assert_eq!(hash8(42, JOIN_SEED), hash8(42, JOIN_SEED));
    }

    #[test]
    fn seed_changes_digest() {
        assert_ne!(hash(b"wrendb", 0), hash(b"wrendb", 1));
        assert_ne!(hash8(42, 0), hash8(42, 1));
    }

    #[test]
    fn input_changes_digest() {
        assert_ne!(hash(b"a", 0), hash(b"b", 0));
        assert_ne!(hash8(1, 0), hash8(2, 0));
    }

    #[test]
    fn tail_lengths_all_distinct() {
        // Exercise every tail length 0..=7.
        let data = b"abcdefghijklmnop";
        let mut seen = std::collections::HashSet::new();
        for len in 0..=15 {
            assert!(seen.insert(hash(&data[..len], 0)));
        }
    }
}
