//! Deterministic jitter RNG using PCG32 with BLAKE3 seed derivation.
//!
//! Every crowd output draws its jitter from its own stream, derived from the
//! run seed, the record index and the output key. Outputs never share a
//! generator, so they can be rendered in any order (or concurrently) and
//! still reproduce exactly.

use rand::SeedableRng;
use rand_pcg::Pcg32;

/// Creates a PCG32 RNG from a 64-bit seed.
pub fn create_rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}

/// Derives the seed for one output of one record.
///
/// Hashes the run seed, the record index and the output key (e.g.
/// `"sci_agree"`) with BLAKE3 and keeps the first 8 bytes.
pub fn derive_output_seed(run_seed: u64, record_index: usize, key: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&run_seed.to_le_bytes());
    hasher.update(&(record_index as u64).to_le_bytes());
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

/// Creates the RNG for one output of one record.
pub fn output_rng(run_seed: u64, record_index: usize, key: &str) -> Pcg32 {
    create_rng(derive_output_seed(run_seed, record_index, key))
}
