//! Polynomial store: the bank of length-n coefficient vectors, the
//! low/high partition rule, and the polynomial ALU (`poly_op`, `shift_poly`,
//! `eq_check`, `inf_norm_check`, `max`/`sum` reductions, `poly_copy`,
//! `init`).

use crate::error::{ErrorKind, SimError, SimResult};
use crate::modarith::{add_mod, mul_mod, sub_mod};

/// Which half of the bank a slot index falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Low,
    High,
}

/// The polynomial bank: `8192/n` slots of `n` coefficients each, split into
/// equal low/high halves.
#[derive(Debug, Clone)]
pub struct PolyBank {
    n: usize,
    q: u32,
    slots: Vec<Vec<u32>>,
}

impl PolyBank {
    pub fn new(n: usize, q: u32) -> Self {
        let count = crate::consts::POLY_BANK_COEFFS / n;
        Self {
            n,
            q,
            slots: vec![vec![0u32; n]; count],
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn q(&self) -> u32 {
        self.q
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn half_boundary(&self) -> usize {
        self.slot_count() / 2
    }

    pub fn half_of(&self, index: usize) -> Half {
        if index < self.half_boundary() {
            Half::Low
        } else {
            Half::High
        }
    }

    pub fn validate_index(&self, index: usize, line: usize, instr: &str, label: &str) -> SimResult<()> {
        if index >= self.slot_count() {
            return Err(SimError::new(
                line,
                instr,
                ErrorKind::Operand(format!(
                    "no such polynomial \"{label} = {index}\", allowed polynomials for n = {} are 0 to {}",
                    self.n,
                    self.slot_count() - 1
                )),
            ));
        }
        Ok(())
    }

    /// Enforces the partition rule: the two operands must straddle the
    /// low/high boundary.
    pub fn validate_partition(
        &self,
        dst: usize,
        src: usize,
        line: usize,
        instr: &str,
    ) -> SimResult<()> {
        self.validate_index(dst, line, instr, "poly_dst")?;
        self.validate_index(src, line, instr, "poly_src")?;
        if self.half_of(dst) == self.half_of(src) {
            let boundary = self.half_boundary();
            return Err(SimError::new(
                line,
                instr,
                ErrorKind::Partition(format!(
                    "polynomial pair \"poly_dst = {dst}, poly_src = {src}\" is not allowed for n = {}, ensure poly_dst < {boundary}, poly_src >= {boundary} or the reverse",
                    self.n
                )),
            ));
        }
        Ok(())
    }

    pub fn slot(&self, index: usize) -> &[u32] {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut [u32] {
        &mut self.slots[index]
    }

    pub fn set_slot(&mut self, index: usize, values: Vec<u32>) {
        self.slots[index] = values;
    }

    /// Mutable borrows of two distinct slots at once.
    fn two_slots_mut(&mut self, a: usize, b: usize) -> (&mut [u32], &mut [u32]) {
        assert_ne!(a, b);
        if a < b {
            let (left, right) = self.slots.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.slots.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    pub fn init(&mut self, index: usize) {
        self.slots[index] = vec![0u32; self.n];
    }

    /// Returns true if `dst`/`src` straddle the partition (fast path).
    pub fn copy(&mut self, dst: usize, src: usize) -> bool {
        let cross = self.half_of(dst) != self.half_of(src);
        self.slots[dst] = self.slots[src].clone();
        cross
    }

    pub fn eq_check(&self, p0: usize, p1: usize) -> bool {
        self.slots[p0] == self.slots[p1]
    }

    /// `inf_norm_check`: true iff every coefficient, read in the centered
    /// range `(-q/2, q/2]`, has absolute value `<= bound`.
    pub fn inf_norm_check(&self, index: usize, bound: u32) -> bool {
        let q = self.q;
        self.slots[index]
            .iter()
            .all(|&c| !(c > bound && c < q - bound))
    }

    /// Signed-interpreted maximum magnitude of coefficients.
    pub fn max_abs(&self, index: usize) -> u32 {
        let q = self.q;
        let half = q / 2;
        let mut best = 0u32;
        for &c in &self.slots[index] {
            if c < half && c > best {
                best = c;
            } else if c >= half && (q - c) > best {
                best = q - c;
            }
        }
        best
    }

    /// Signed-interpreted sum of coefficients, stored as its absolute value.
    pub fn sum_abs(&self, index: usize) -> u32 {
        let q = self.q as i64;
        let half = q / 2;
        let mut total: i64 = 0;
        for &c in &self.slots[index] {
            let c = c as i64;
            total += if c < half { c } else { c - q };
        }
        total.unsigned_abs() as u32
    }

    /// `shift_poly`: multiplication by x, cyclic (`ring = '-'`) or
    /// negacyclic (`ring = '+'`).
    pub fn shift(&mut self, ring: char, dst: usize, src: usize) {
        let n = self.n;
        let q = self.q;
        let last = self.slots[src][n - 1];
        let wrap = if ring == '+' { q - last } else { last };
        if dst == src {
            let mut tmp = self.slots[src].clone();
            for i in (1..n).rev() {
                tmp[i] = tmp[i - 1];
            }
            tmp[0] = wrap;
            self.slots[dst] = tmp;
        } else {
            let (dst_slot, src_slot) = self.two_slots_mut(dst, src);
            for i in (1..n).rev() {
                dst_slot[i] = src_slot[i - 1];
            }
            dst_slot[0] = wrap;
        }
    }

    pub fn bitrev(&mut self, dst: usize, src: usize) {
        let n = self.n;
        let log2n = n.trailing_zeros();
        let mut out = vec![0u32; n];
        for i in 0..n {
            let rev = (i as u32).reverse_bits() >> (u32::BITS - log2n);
            out[rev as usize] = self.slots[src][i];
        }
        self.slots[dst] = out;
    }

    fn apply_elementwise<F: Fn(u32, u32) -> u32>(&mut self, dst: usize, src: usize, f: F) {
        if dst == src {
            // unreachable given the partition rule, but kept total.
            let slot = &mut self.slots[dst];
            for c in slot.iter_mut() {
                *c = f(*c, *c);
            }
            return;
        }
        let (dst_slot, src_slot) = self.two_slots_mut(dst, src);
        for (d, s) in dst_slot.iter_mut().zip(src_slot.iter()) {
            *d = f(*d, *s);
        }
    }

    pub fn add(&mut self, dst: usize, src: usize) {
        let q = self.q;
        self.apply_elementwise(dst, src, move |d, s| add_mod(s, d, q));
    }

    /// `SUB` computes `(src - dst) mod q` (note ordering, per spec §4.4).
    pub fn sub(&mut self, dst: usize, src: usize) {
        let q = self.q;
        self.apply_elementwise(dst, src, move |d, s| sub_mod(s, d, q));
    }

    pub fn mul(&mut self, dst: usize, src: usize) {
        let q = self.q;
        self.apply_elementwise(dst, src, move |d, s| mul_mod(s, d, q));
    }

    pub fn const_add(&mut self, dst: usize, src: usize, reg: u32) {
        let q = self.q;
        self.apply_elementwise(dst, src, move |_, s| add_mod(s, reg, q));
    }

    /// `CONST_SUB` computes `(src - reg) mod q`.
    pub fn const_sub(&mut self, dst: usize, src: usize, reg: u32) {
        let q = self.q;
        self.apply_elementwise(dst, src, move |_, s| sub_mod(s, reg, q));
    }

    pub fn const_mul(&mut self, dst: usize, src: usize, reg: u32) {
        let q = self.q;
        self.apply_elementwise(dst, src, move |_, s| mul_mod(s, reg, q));
    }

    pub fn const_and(&mut self, dst: usize, src: usize, reg: u32) {
        self.apply_elementwise(dst, src, move |_, s| s & reg);
    }

    pub fn const_or(&mut self, dst: usize, src: usize, reg: u32) {
        self.apply_elementwise(dst, src, move |_, s| s | reg);
    }

    pub fn const_xor(&mut self, dst: usize, src: usize, reg: u32) {
        self.apply_elementwise(dst, src, move |_, s| s ^ reg);
    }

    pub fn const_rshift(&mut self, dst: usize, src: usize, reg: u32) {
        self.apply_elementwise(dst, src, move |_, s| {
            if reg < 24 {
                (s >> reg) % (1 << 24)
            } else {
                0
            }
        });
    }

    pub fn const_lshift(&mut self, dst: usize, src: usize, reg: u32) {
        self.apply_elementwise(dst, src, move |_, s| {
            if reg < 24 {
                (s << reg) % (1 << 24)
            } else {
                0
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_zeroes_slot() {
        let mut bank = PolyBank::new(256, 7681);
        bank.slot_mut(0)[3] = 42;
        bank.init(0);
        assert!(bank.slot(0).iter().all(|&c| c == 0));
    }

    #[test]
    fn eq_check_against_fresh_init() {
        let bank = PolyBank::new(256, 7681);
        assert!(bank.eq_check(0, 16));
    }

    #[test]
    fn partition_rule_rejects_same_side() {
        let bank = PolyBank::new(256, 7681);
        assert!(bank.validate_partition(0, 1, 1, "poly_op(...)").is_err());
        assert!(bank.validate_partition(0, 16, 1, "poly_op(...)").is_ok());
    }

    #[test]
    fn const_add_then_eq_check_differs() {
        let mut bank = PolyBank::new(256, 7681);
        bank.const_add(16, 0, 1);
        assert!(!bank.eq_check(0, 16));
    }

    #[test]
    fn inf_norm_check_centered_range() {
        let mut bank = PolyBank::new(256, 7681);
        bank.slot_mut(0)[0] = 5;
        bank.slot_mut(0)[1] = 7681 - 5;
        assert!(bank.inf_norm_check(0, 5));
        assert!(!bank.inf_norm_check(0, 4));
    }

    #[test]
    fn shift_negacyclic_wraps_negated() {
        let mut bank = PolyBank::new(4, 13);
        bank.set_slot(0, vec![1, 2, 3, 4]);
        bank.shift('+', 16, 0);
        assert_eq!(bank.slot(16), &[13 - 4, 1, 2, 3]);
    }

    #[test]
    fn shift_cyclic_wraps_unchanged() {
        let mut bank = PolyBank::new(4, 13);
        bank.set_slot(0, vec![1, 2, 3, 4]);
        bank.shift('-', 16, 0);
        assert_eq!(bank.slot(16), &[4, 1, 2, 3]);
    }
}
