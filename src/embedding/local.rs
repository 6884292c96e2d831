//! Deterministic local embedding fallback.
//!
//! A hash-seeded random projection, normalized to unit length. It is NOT a
//! learned embedding - it exists so the vector view and everything
//! downstream stay exercisable offline, with reproducible values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Project `text` to a unit vector of `dim` components. Empty text maps to
/// the zero vector. The same text always yields bitwise-identical output.
pub fn local_embedding(text: &str, dim: usize) -> Vec<f32> {
    if text.is_empty() || dim == 0 {
        return vec![0.0; dim];
    }

    let digest = Sha256::digest(text.as_bytes());
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed_bytes));

    let mut vector: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0f32)).collect();

    let norm = vector.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v = (*v as f64 / norm) as f32;
        }
    }
    vector
}
