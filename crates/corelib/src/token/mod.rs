//! Ring tokens.
//!
//! Tokens are `u32` positions on the ring. Every member owns a set of them;
//! across all members that still count (not LEFT) they must be unique.

use std::collections::HashSet;

use rand::Rng;

/// Size of the token space, used to turn distances into ownership fractions.
pub const TOKEN_SPACE: f64 = (u32::MAX as f64) + 1.0;

/// Generate `n` random tokens that are not in `taken`, sorted ascending.
///
/// # Performance
/// - **Time**: O(n log n) expected, collisions are retried
/// - **Space**: O(n)
pub fn generate_tokens<R: Rng + ?Sized>(rng: &mut R, n: usize, taken: &HashSet<u32>) -> Vec<u32> {
    let mut picked = HashSet::with_capacity(n);
    let mut tokens = Vec::with_capacity(n);
    while tokens.len() < n {
        let candidate: u32 = rng.gen();
        if taken.contains(&candidate) || !picked.insert(candidate) {
            continue;
        }
        tokens.push(candidate);
    }
    tokens.sort_unstable();
    tokens
}

/// Clockwise distance from `from` to `to` on the ring.
///
/// Equal tokens are a full turn apart: a single token owns the whole ring.
#[inline]
pub fn distance(from: u32, to: u32) -> u64 {
    if to > from {
        (to - from) as u64
    } else {
        (u32::MAX - from) as u64 + to as u64 + 1
    }
}

/// True if `tokens` is strictly ascending (sorted and free of duplicates).
pub fn is_strictly_sorted(tokens: &[u32]) -> bool {
    tokens.windows(2).all(|w| w[0] < w[1])
}
