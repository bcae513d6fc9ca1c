//! World seed hashing.

use sha2::{Digest, Sha256};

/// Hashed seeds fall in `1..=SEED_RANGE`.
pub const SEED_RANGE: u32 = 100_000;

/// Hashes a seed string into a bounded positive integer.
///
/// The result is stable across platforms and runs, so the same seed string
/// always produces the same noise offsets.
pub fn hash_seed(seed: &str) -> u32 {
    let digest = Sha256::digest(seed.as_bytes());
    let value = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    value % SEED_RANGE + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_seed_is_deterministic() {
        assert_eq!(hash_seed("hello"), hash_seed("hello"));
    }

    #[test]
    fn test_hash_seed_in_range() {
        for seed in ["", "a", "default", "a much longer seed string", "ÿ"] {
            let value = hash_seed(seed);
            assert!((1..=SEED_RANGE).contains(&value), "{} -> {}", seed, value);
        }
    }

    #[test]
    fn test_hash_seed_differs_between_seeds() {
        assert_ne!(hash_seed("terrain"), hash_seed("forest"));
    }
}
