//! Key partitioning.
//!
//! Partitioners turn request keys (tenant, series, ...) into the `u32` ring
//! position that `Ring::get` walks from.

use xxhash_rust::xxh3::xxh3_64;

/// A partitioner converts keys into ring positions.
///
/// Partitioners are stateless and thread-safe.
pub trait Partitioner: Send + Sync + 'static {
    /// Converts a key into a ring position.
    fn partition(&self, key: &[u8]) -> u32;

    /// Returns the name of this partitioner.
    fn name(&self) -> &'static str;
}

/// XXH3-based partitioner, folding the 64-bit digest into 32 bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn partition(&self, key: &[u8]) -> u32 {
        fold(xxh3_64(key))
    }

    fn name(&self) -> &'static str {
        "Xxh3Partitioner"
    }
}

/// Ring position for all series of `metric_name` owned by `tenant`.
///
/// The separator byte keeps `("ab", "c")` and `("a", "bc")` apart.
pub fn tenant_token(tenant: &str, metric_name: &str) -> u32 {
    let mut buf = Vec::with_capacity(tenant.len() + metric_name.len() + 1);
    buf.extend_from_slice(tenant.as_bytes());
    buf.push(0);
    buf.extend_from_slice(metric_name.as_bytes());
    Xxh3Partitioner.partition(&buf)
}

#[inline]
fn fold(digest: u64) -> u32 {
    (digest ^ (digest >> 32)) as u32
}
