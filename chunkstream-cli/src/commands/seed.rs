//! Seed command - print the hashed form of a seed string.

use chunkstream::config::{hash_seed, SEED_RANGE};

/// Run the seed command.
pub fn run(seed: &str) {
    println!("Seed:   {:?}", seed);
    println!("Hashed: {} (range 1..={})", hash_seed(seed), SEED_RANGE);
}
