use sha2::{Digest, Sha256};

/// Fixed binary header (40 bytes): generation u64 LE + 32-byte seed.
pub const HEADER_LEN: usize = 40;

pub fn make_header(generation: u64, seed: &[u8; 32]) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&generation.to_le_bytes());
    header.extend_from_slice(seed);
    header
}

/// Work digest: SHA-256 over header || nonce (u64 LE). Coordinator and
/// workers must compute this identically.
pub fn digest(header: &[u8], nonce: u64) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(header);
    h.update(nonce.to_le_bytes());
    h.finalize().into()
}

pub fn leading_zero_bits(digest: &[u8; 32]) -> u32 {
    let mut bits = 0;
    for &byte in digest {
        if byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

pub fn meets_difficulty(digest: &[u8; 32], difficulty_bits: u32) -> bool {
    leading_zero_bits(digest) >= difficulty_bits
}
