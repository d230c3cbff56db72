//! SHA-3 subsystem: an append-only hash buffer fed by `sha3_*_absorb` and
//! drained by `sha3_*_digest`. The Keccak-f permutation itself is an
//! external collaborator here (spec §1) — we depend on the `sha3` crate's
//! audited implementation exactly as the teacher depends on `sha3` for its
//! in-VM hashing opcodes.

use sha3::{Digest, Sha3_256, Sha3_512};

/// The buffer `sha3_absorb` instructions append to and `sha3_digest`
/// instructions consume and clear.
#[derive(Debug, Default, Clone)]
pub struct HashBuffer {
    bytes: Vec<u8>,
}

impl HashBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Pushes a polynomial's coefficients, each serialized as 4
    /// big-endian bytes, preserving the source's concatenation order.
    pub fn absorb_poly(&mut self, poly: &[u32]) {
        for &c in poly {
            self.bytes.extend_from_slice(&c.to_be_bytes());
        }
    }

    /// Pushes a 32-byte seed register.
    pub fn absorb_reg(&mut self, reg: &[u8; 32]) {
        self.bytes.extend_from_slice(reg);
    }

    /// Computes the SHA3-256 digest of the buffer and clears it.
    pub fn digest_256(&mut self) -> [u8; 32] {
        let digest = Sha3_256::digest(&self.bytes);
        self.clear();
        digest.into()
    }

    /// Computes the SHA3-512 digest of the buffer and clears it, returning
    /// the raw 64 bytes for the caller to split into (r0, r1).
    pub fn digest_512(&mut self) -> [u8; 64] {
        let digest = Sha3_512::digest(&self.bytes);
        self.clear();
        digest.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_32_zero_bytes_is_deterministic() {
        let mut buf1 = HashBuffer::new();
        buf1.absorb_reg(&[0u8; 32]);
        let mut buf2 = HashBuffer::new();
        buf2.absorb_reg(&[0u8; 32]);
        assert_eq!(buf1.digest_256(), buf2.digest_256());
    }

    #[test]
    fn digest_clears_buffer() {
        let mut buf = HashBuffer::new();
        buf.absorb_reg(&[1u8; 32]);
        buf.digest_256();
        assert!(buf.bytes.is_empty());
    }
}
