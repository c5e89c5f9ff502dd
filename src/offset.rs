use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro128PlusPlus;

/// Stream of starting nonce offsets for one worker. Seeded from the miner id
/// plus per-process entropy, so concurrent workers (and restarts of the same
/// worker) draw from disjoint regions of the u64 nonce space.
pub struct OffsetStream(Xoshiro128PlusPlus);

impl OffsetStream {
    pub fn new(miner_id: &str) -> Self {
        let mut entropy = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut entropy);
        Self::from_parts(miner_id, &entropy)
    }

    pub(crate) fn from_parts(miner_id: &str, entropy: &[u8; 16]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(miner_id.as_bytes());
        hasher.update(entropy);
        let mut seed = [0u8; 16];
        seed.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
        Self(Xoshiro128PlusPlus::from_seed(seed))
    }

    pub fn next_start(&mut self) -> u64 {
        self.0.next_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_parts_same_stream() {
        let mut a = OffsetStream::from_parts("cpu-1", &[1u8; 16]);
        let mut b = OffsetStream::from_parts("cpu-1", &[1u8; 16]);
        for _ in 0..8 {
            assert_eq!(a.next_start(), b.next_start());
        }
    }

    #[test]
    fn distinct_miners_draw_distinct_starts() {
        let mut a = OffsetStream::from_parts("cpu-1", &[1u8; 16]);
        let mut b = OffsetStream::from_parts("cpu-2", &[1u8; 16]);
        assert_ne!(a.next_start(), b.next_start());
    }

    #[test]
    fn successive_draws_differ() {
        let mut s = OffsetStream::from_parts("gpu-1", &[3u8; 16]);
        let first = s.next_start();
        assert_ne!(first, s.next_start());
    }
}
