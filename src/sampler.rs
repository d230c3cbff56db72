//! SHAKE-driven sampler suite: rejection, binomial, CDT-Gaussian, uniform,
//! and the three trinary distributions. Every sampler seeds its SHAKE
//! instance with the 36-byte concatenation `r || c0 || c1` (spec §4.3 states
//! 96 bytes, but the 32+2+2-byte seed the source of record actually builds
//! and feeds to SHAKE is 36 bytes; we follow the source here, per the
//! resolution recorded in DESIGN.md).
//!
//! Cycle costs are SHAKE-squeeze-dominated and are returned by each sampler
//! alongside the filled coefficients, exactly as the reference core
//! computes them inline rather than via a separate cost table.

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{Shake128, Shake256};

use crate::error::{ErrorKind, SimError, SimResult};

/// SHAKE-128 vs. SHAKE-256, used both to pick the XOF and to select which
/// of the two rate-derived cycle-cost heuristics applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShakeMode {
    Shake128,
    Shake256,
}

impl ShakeMode {
    pub fn from_u32(v: u32, line: usize, instr: &str) -> SimResult<Self> {
        match v {
            128 => Ok(ShakeMode::Shake128),
            256 => Ok(ShakeMode::Shake256),
            _ => Err(SimError::new(
                line,
                instr,
                ErrorKind::Operand("only SHAKE-128 and SHAKE-256 are supported".into()),
            )),
        }
    }

    fn ceil_div_factor(self, count: u64) -> u64 {
        match self {
            // ceil(count * 29/42)
            ShakeMode::Shake128 => (count * 29).div_ceil(42),
            // ceil(count * 33/34)
            ShakeMode::Shake256 => (count * 33).div_ceil(34),
        }
    }
}

/// Builds the 36-byte `r || c0 || c1` SHAKE seed.
pub fn build_seed(r: &[u8; 32], c0: u16, c1: u16) -> [u8; 36] {
    let mut seed = [0u8; 36];
    seed[0..32].copy_from_slice(r);
    seed[32..34].copy_from_slice(&c0.to_be_bytes());
    seed[34..36].copy_from_slice(&c1.to_be_bytes());
    seed
}

/// Squeezes 4-byte (u32) or 2-byte (u16) big-endian words on demand, mirroring
/// the way real hardware only draws from the Keccak sponge as needed instead
/// of materializing a fixed-length buffer up front.
struct Squeezer {
    reader: Box<dyn XofReader>,
}

impl Squeezer {
    fn new(mode: ShakeMode, seed: &[u8]) -> Self {
        let reader: Box<dyn XofReader> = match mode {
            ShakeMode::Shake128 => {
                let mut h = Shake128::default();
                h.update(seed);
                Box::new(h.finalize_xof())
            }
            ShakeMode::Shake256 => {
                let mut h = Shake256::default();
                h.update(seed);
                Box::new(h.finalize_xof())
            }
        };
        Self { reader }
    }

    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.reader.read(&mut buf);
        u32::from_be_bytes(buf)
    }

    fn next_u16(&mut self) -> u16 {
        let mut buf = [0u8; 2];
        self.reader.read(&mut buf);
        u16::from_be_bytes(buf)
    }
}

const BASE_COST: u64 = 2 + 1;

/// `rejection_sample`: fills `poly` with n coefficients in `[0, q)`.
pub fn rejection_sample(
    n: usize,
    q: u32,
    mode: ShakeMode,
    fast_factor: u32,
    seed: &[u8],
    poly: &mut [u32],
) -> u64 {
    let bound = (fast_factor as u64) * (q as u64);
    let bits = 64 - (bound - 1).leading_zeros();
    let mut squeezer = Squeezer::new(mode, seed);
    let mut count: u64 = 0;
    let mut i = 0;
    while i < n {
        let sample = (squeezer.next_u32() as u64) % (1u64 << bits);
        count += 1;
        if sample < bound {
            poly[i] = (sample % q as u64) as u32;
            i += 1;
        }
    }
    BASE_COST + 25 + 25 + mode.ceil_div_factor(count) + count
}

/// `binomial_sample`: centered binomial with parameter `k`.
pub fn binomial_sample(
    n: usize,
    q: u32,
    k: u32,
    mode: ShakeMode,
    seed: &[u8],
    poly: &mut [u32],
) -> u64 {
    let mut squeezer = Squeezer::new(mode, seed);
    let wide = k > 16;
    for c in poly.iter_mut().take(n) {
        let (a, b) = if wide {
            (squeezer.next_u32() as u64, squeezer.next_u32() as u64)
        } else {
            (squeezer.next_u16() as u64, squeezer.next_u16() as u64)
        };
        let mask = (1u64 << k) - 1;
        let hw_a = (a & mask).count_ones();
        let hw_b = (b & mask).count_ones();
        *c = ((hw_a as i64 - hw_b as i64).rem_euclid(q as i64)) as u32;
    }
    let n = n as u64;
    match (mode, wide) {
        (ShakeMode::Shake128, false) => BASE_COST + 25 + 25 + (n * 29).div_ceil(42) + n,
        (ShakeMode::Shake128, true) => BASE_COST + 25 + 25 + (n * 29).div_ceil(21) + n,
        (ShakeMode::Shake256, false) => BASE_COST + 25 + 25 + (n * 33).div_ceil(34) + n,
        (ShakeMode::Shake256, true) => BASE_COST + 25 + 25 + (n * 33).div_ceil(17) + n,
    }
}

/// `cdt_sample`: discrete Gaussian from an externally supplied cumulative
/// table.
pub fn cdt_sample(
    n: usize,
    q: u32,
    r: u32,
    mode: ShakeMode,
    seed: &[u8],
    cdt: &[u32],
    poly: &mut [u32],
) -> u64 {
    let mut squeezer = Squeezer::new(mode, seed);
    for c in poly.iter_mut().take(n) {
        let draw = squeezer.next_u32();
        let val = draw % (1u32 << (r - 1));
        let sign_is_negative = (draw >> (r - 1)) % 2 == 1;
        let magnitude = cdt.iter().filter(|&&t| t < val).count() as i64;
        let signed = if sign_is_negative { -magnitude } else { magnitude };
        *c = signed.rem_euclid(q as i64) as u32;
    }
    let n = n as u64;
    let len = cdt.len() as u64;
    BASE_COST
        + 25
        + 25
        + match mode {
            ShakeMode::Shake128 => (n * 29).div_ceil(42),
            ShakeMode::Shake256 => (n * 33).div_ceil(34),
        }
        + (len + 3) * n
}

/// `uniform_sample`: rejection sampling over `[0, 2eta+1)`, recentered by `eta`.
pub fn uniform_sample(
    n: usize,
    q: u32,
    eta: u32,
    mode: ShakeMode,
    seed: &[u8],
    poly: &mut [u32],
) -> u64 {
    let bound = 2 * eta + 1;
    let bits = 32 - (bound - 1).leading_zeros();
    let mut squeezer = Squeezer::new(mode, seed);
    let mut count: u64 = 0;
    let mut i = 0;
    while i < n {
        let sample = squeezer.next_u32() % (1u32 << bits);
        count += 1;
        if sample < bound {
            poly[i] = (sample as i64 - eta as i64).rem_euclid(q as i64) as u32;
            i += 1;
        }
    }
    BASE_COST + 25 + 25 + mode.ceil_div_factor(count) + count
}

/// `trinary_sample_1`: starts from an all-zero poly, reservoir-places `m`
/// signed unit coefficients.
pub fn trinary_sample_1(
    n: usize,
    q: u32,
    m: usize,
    mode: ShakeMode,
    seed: &[u8],
    poly: &mut [u32],
) -> u64 {
    poly[..n].fill(0);
    let mut squeezer = Squeezer::new(mode, seed);
    let mut count: u64 = 0;
    let mut placed = 0;
    while placed < m {
        let draw = squeezer.next_u32();
        let slot = (draw as u64 % n as u64) as usize;
        let negative = (draw >> 31) & 1 == 1;
        count += 1;
        if poly[slot] == 0 {
            poly[slot] = if negative { q - 1 } else { 1 };
            placed += 1;
        }
    }
    let n = n as u64;
    BASE_COST + 25 + 25 + mode.ceil_div_factor(count) + 2 * count + n
}

/// `trinary_sample_2`: places `m0` +1's, then `m1` -1's.
#[allow(clippy::too_many_arguments)]
pub fn trinary_sample_2(
    n: usize,
    q: u32,
    m0: usize,
    m1: usize,
    mode: ShakeMode,
    seed: &[u8],
    poly: &mut [u32],
) -> u64 {
    poly[..n].fill(0);
    let mut squeezer = Squeezer::new(mode, seed);
    let mut count: u64 = 0;
    let mut placed = 0;
    while placed < m0 {
        let slot = (squeezer.next_u32() as u64 % n as u64) as usize;
        count += 1;
        if poly[slot] == 0 {
            poly[slot] = 1;
            placed += 1;
        }
    }
    placed = 0;
    while placed < m1 {
        let slot = (squeezer.next_u32() as u64 % n as u64) as usize;
        count += 1;
        if poly[slot] == 0 {
            poly[slot] = q - 1;
            placed += 1;
        }
    }
    let n = n as u64;
    BASE_COST + 25 + 25 + mode.ceil_div_factor(count) + 2 * count + n
}

/// `trinary_sample_3`: per-coefficient direct draw, `rho = 1/2^e`.
pub fn trinary_sample_3(
    n: usize,
    q: u32,
    rho: u32,
    mode: ShakeMode,
    seed: &[u8],
    poly: &mut [u32],
) -> u64 {
    let bits = rho.trailing_zeros() + 1;
    let mut squeezer = Squeezer::new(mode, seed);
    for c in poly.iter_mut().take(n) {
        let sample = squeezer.next_u32() % (1 << bits);
        *c = match sample {
            0 => 1,
            1 => q - 1,
            _ => 0,
        };
    }
    let n = n as u64;
    BASE_COST + 25 + 25 + mode.ceil_div_factor(n) + n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_sample_is_deterministic() {
        let seed = build_seed(&[0u8; 32], 0, 0);
        let mut p1 = vec![0u32; 256];
        let mut p2 = vec![0u32; 256];
        rejection_sample(256, 7681, ShakeMode::Shake128, 1, &seed, &mut p1);
        rejection_sample(256, 7681, ShakeMode::Shake128, 1, &seed, &mut p2);
        assert_eq!(p1, p2);
        assert!(p1.iter().all(|&c| c < 7681));
    }

    #[test]
    fn trinary_sample_1_places_exactly_m() {
        let seed = build_seed(&[1u8; 32], 0, 0);
        let mut poly = vec![0u32; 64];
        trinary_sample_1(64, 7681, 10, ShakeMode::Shake256, &seed, &mut poly);
        let nonzero = poly.iter().filter(|&&c| c != 0).count();
        assert_eq!(nonzero, 10);
    }

    #[test]
    fn trinary_sample_3_only_emits_allowed_values() {
        let seed = build_seed(&[2u8; 32], 0, 0);
        let mut poly = vec![0u32; 128];
        trinary_sample_3(128, 7681, 4, ShakeMode::Shake128, &seed, &mut poly);
        assert!(poly.iter().all(|&c| c == 0 || c == 1 || c == 7680));
    }
}
