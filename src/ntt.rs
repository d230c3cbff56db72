//! Number-theoretic transform engine: negacyclic twists and the four
//! NTT/INTT butterfly schedules, following the bit-reversal placement
//! contract in §4.2 exactly (DIF pre/post-shuffles, DIT has none) so that
//! `mult_psi -> DIF_NTT -> DIF_NTT -> poly_op(MUL) -> DIT_INTT ->
//! mult_psi_inv` realizes negacyclic multiplication.

use crate::error::{ErrorKind, SimError, SimResult};
use crate::modarith::{add_mod, inv_mod, mul_mod, pow_mod, sub_mod};
use crate::params::root_of_unity;

fn psi(n: usize, q: u32, line: usize, instr: &str) -> SimResult<u64> {
    root_of_unity(q, 2 * n).ok_or_else(|| {
        SimError::new(
            line,
            instr,
            ErrorKind::Configuration(format!(
                "2n-th root of unity modulo q does not exist for n = {n} and q = {q}"
            )),
        )
    })
}

fn omega(n: usize, q: u32, line: usize, instr: &str) -> SimResult<u64> {
    root_of_unity(q, n).ok_or_else(|| {
        SimError::new(
            line,
            instr,
            ErrorKind::Configuration(format!(
                "n-th root of unity modulo q does not exist for n = {n} and q = {q}"
            )),
        )
    })
}

/// Multiplies `poly[i]` by `psi^i mod q` in place.
pub fn mult_psi(n: usize, q: u32, poly: &mut [u32], line: usize, instr: &str) -> SimResult<()> {
    let psi = psi(n, q, line, instr)? as u32;
    let mut factor = 1u32;
    for coeff in poly.iter_mut().take(n) {
        *coeff = mul_mod(*coeff, factor, q);
        factor = mul_mod(factor, psi, q);
    }
    Ok(())
}

/// Multiplies `poly[i]` by `n^{-1} * psi^{-i} mod q` in place.
pub fn mult_psi_inv(n: usize, q: u32, poly: &mut [u32], line: usize, instr: &str) -> SimResult<()> {
    let psi = psi(n, q, line, instr)? as u32;
    let psi_inv = inv_mod(psi, q);
    let n_inv = inv_mod(n as u32 % q, q);
    let mut factor = 1u32;
    for coeff in poly.iter_mut().take(n) {
        *coeff = mul_mod(mul_mod(*coeff, n_inv, q), factor, q);
        factor = mul_mod(factor, psi_inv, q);
    }
    Ok(())
}

/// Bit-reversal permutation over `log2(n)` bits, applied in place.
fn bitrev_shuffle(poly: &mut [u32], n: usize) {
    let mut j = 0usize;
    for i in 1..n {
        let mut b = n >> 1;
        while j >= b {
            j -= b;
            b >>= 1;
        }
        j += b;
        if j > i {
            poly.swap(i, j);
        }
    }
}

fn butterflies(poly: &mut [u32], n: usize, q: u32, omega: u32) {
    let log2n = n.trailing_zeros();
    let mut trans_size = 2usize;
    for _ in 1..=log2n {
        let wb_step = pow_mod(omega, (n / trans_size) as u32, q);
        let mut wb = 1u32;
        for t in 0..(trans_size >> 1) {
            for trans in 0..(n / trans_size) {
                let i = trans * trans_size + t;
                let j = i + (trans_size >> 1);
                let a = poly[i];
                let b = mul_mod(poly[j], wb, q);
                poly[i] = add_mod(a, b, q);
                poly[j] = sub_mod(a, b, q);
            }
            wb = mul_mod(wb, wb_step, q);
        }
        trans_size <<= 1;
    }
}

/// Every transform requires the 2n-th root (not just the n-th) to be
/// tabulated: `core.py` guards each transform handler on `2*n in
/// roots_of_unity[q]` even though the butterflies themselves only use the
/// n-th root as `omega` — the 2n-th root is what `mult_psi`/`mult_psi_inv`
/// need to pair with this transform for the negacyclic recipe to be valid,
/// so a transform on a (n, q) lacking it is rejected up front rather than
/// left to fail later at the twist step.
fn require_transform_roots(n: usize, q: u32, line: usize, instr: &str) -> SimResult<u32> {
    psi(n, q, line, instr)?;
    omega(n, q, line, instr).map(|o| o as u32)
}

/// Standard input, bit-reversed output.
pub fn dif_ntt(n: usize, q: u32, poly: &mut [u32], line: usize, instr: &str) -> SimResult<()> {
    let omega = require_transform_roots(n, q, line, instr)?;
    bitrev_shuffle(poly, n);
    butterflies(poly, n, q, omega);
    bitrev_shuffle(poly, n);
    Ok(())
}

/// Bit-reversed input, standard output.
pub fn dit_ntt(n: usize, q: u32, poly: &mut [u32], line: usize, instr: &str) -> SimResult<()> {
    let omega = require_transform_roots(n, q, line, instr)?;
    butterflies(poly, n, q, omega);
    Ok(())
}

/// Standard input, bit-reversed output (inverse transform).
pub fn dif_intt(n: usize, q: u32, poly: &mut [u32], line: usize, instr: &str) -> SimResult<()> {
    let omega = require_transform_roots(n, q, line, instr)?;
    let omega_inv = inv_mod(omega, q);
    bitrev_shuffle(poly, n);
    butterflies(poly, n, q, omega_inv);
    bitrev_shuffle(poly, n);
    Ok(())
}

/// Bit-reversed input, standard output (inverse transform).
pub fn dit_intt(n: usize, q: u32, poly: &mut [u32], line: usize, instr: &str) -> SimResult<()> {
    let omega = require_transform_roots(n, q, line, instr)?;
    let omega_inv = inv_mod(omega, q);
    butterflies(poly, n, q, omega_inv);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dif_ntt_then_dit_intt_is_identity() {
        let n = 256usize;
        let q = 7681u32;
        let mut poly: Vec<u32> = (0..n as u32).map(|i| i % q).collect();
        let original = poly.clone();
        dif_ntt(n, q, &mut poly, 0, "transform").unwrap();
        dit_intt(n, q, &mut poly, 0, "transform").unwrap();
        // dit_intt as defined produces the n-scaled-down, bit-reversal-free
        // inverse of dif_ntt's bit-reversed output only when paired per the
        // documented negacyclic recipe (mult_psi on both ends); bare NTT
        // round trip here instead checks DIF_NTT -> DIT_NTT(inverse omega)
        // without the scaling psi step, so we apply the n^{-1} factor by hand.
        let n_inv = inv_mod(n as u32 % q, q);
        for c in poly.iter_mut() {
            *c = mul_mod(*c, n_inv, q);
        }
        assert_eq!(poly, original);
    }

    #[test]
    fn transform_requires_2n_root_even_when_n_root_exists() {
        // q=7681 tables omega for n'=512 (the n-th root dif_ntt butterflies
        // against) but has no entry for 2n=1024, so the 2n-th root mult_psi
        // would need is absent; the transform must reject this (n, q) up
        // front rather than silently run the butterflies with the n-th root.
        let mut poly = vec![0u32; 512];
        assert!(dif_ntt(512, 7681, &mut poly, 1, "transform(mode=DIF_NTT,poly_dst=8,poly_src=0)").is_err());
        assert!(dit_ntt(512, 7681, &mut poly, 1, "transform(mode=DIT_NTT,poly_dst=8,poly_src=0)").is_err());
        assert!(dif_intt(512, 7681, &mut poly, 1, "transform(mode=DIF_INTT,poly_dst=8,poly_src=0)").is_err());
        assert!(dit_intt(512, 7681, &mut poly, 1, "transform(mode=DIT_INTT,poly_dst=8,poly_src=0)").is_err());
    }

    #[test]
    fn missing_root_is_configuration_error() {
        // 3329's table tops out at n'=256, so 2n=1024 (n=512) has no root.
        let mut poly = vec![0u32; 512];
        let err = mult_psi(512, 3329, &mut poly, 1, "mult_psi(poly=0)");
        assert!(err.is_err());
    }
}
