//! The owning interpreter. Replaces the teacher's module-level globals
//! (`poly_mem`, `proc_regs`, `ticks`, `power`, `pc`) with a single `Machine`
//! value; instructions are methods dispatched over the typed
//! [`Instruction`] variants from `instruction.rs` (spec §9 redesign note).

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, trace, warn};

use crate::consts::{COUNTER_MODULUS, SCRATCH_MODULUS, VALID_N, VALID_Q, VALID_RHO};
use crate::encoding::{encode_to_bytearray, random_poly_encode, Encoding};
use crate::error::{ErrorKind, SimError, SimResult};
use crate::hash::HashBuffer;
use crate::instruction::{
    AluOp, CmpOp, Instruction, IndexOperand, LoadSaveTarget, PolyOp, PrintTarget, RegPair, ShakeForm,
    TransformMode,
};
use crate::ntt;
use crate::poly::PolyBank;
use crate::power::IddKey;
use crate::program::Program;
use crate::sampler::{self, ShakeMode};

struct CoreState {
    n: usize,
    q: u32,
    bank: PolyBank,
}

/// All architectural state for one run: registers, polynomial bank, hash
/// buffer, flag, pc, and the accumulated cycle/power log.
pub struct Machine {
    core: Option<CoreState>,
    r0: [u8; 32],
    r1: [u8; 32],
    c0: u16,
    c1: u16,
    reg: u32,
    tmp: u32,
    flag: i8,
    pc: usize,
    instr_count: u64,
    ticks: u64,
    power_log: Vec<(IddKey, u64)>,
    hash: HashBuffer,
    cdt: Option<Vec<u32>>,
    free_rw: bool,
    rng: StdRng,
}

impl Machine {
    pub fn new(cdt: Option<Vec<u32>>, free_rw: bool, rng_seed: u64) -> Self {
        Self {
            core: None,
            r0: [0; 32],
            r1: [0; 32],
            c0: 0,
            c1: 0,
            reg: 0,
            tmp: 0,
            flag: 0,
            pc: 0,
            instr_count: 0,
            ticks: 0,
            power_log: Vec::new(),
            hash: HashBuffer::new(),
            cdt,
            free_rw,
            rng: StdRng::seed_from_u64(rng_seed),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn instr_count(&self) -> u64 {
        self.instr_count
    }

    pub fn flag(&self) -> i8 {
        self.flag
    }

    pub fn reg(&self) -> u32 {
        self.reg
    }

    pub fn tmp(&self) -> u32 {
        self.tmp
    }

    pub fn counter(&self, idx: u8) -> u16 {
        if idx == 0 {
            self.c0
        } else {
            self.c1
        }
    }

    pub fn r(&self, which: RegPair) -> &[u8; 32] {
        match which {
            RegPair::R0 => &self.r0,
            RegPair::R1 => &self.r1,
        }
    }

    pub fn poly(&self, index: usize) -> &[u32] {
        self.core.as_ref().expect("config must run first").bank.slot(index)
    }

    pub fn poly_mut(&mut self, index: usize) -> &mut [u32] {
        self.core.as_mut().expect("config must run first").bank.slot_mut(index)
    }

    /// Expands the power log into a per-cycle current/power trace in
    /// microwatts, applying the configured Vdd/frequency noise model.
    pub fn power_trace_uw(&mut self, vdd: f64, f_mhz: f64) -> Vec<f64> {
        let q = self.core.as_ref().map(|c| c.q).unwrap_or(0);
        let mut out = Vec::with_capacity(self.ticks as usize);
        for &(key, count) in &self.power_log {
            for _ in 0..count {
                let i = crate::power::i_cycle(key, q, vdd, f_mhz, &mut self.rng);
                out.push(crate::power::p_cycle(i, vdd));
            }
        }
        out
    }

    fn core(&self) -> SimResult<&CoreState> {
        self.core.as_ref().ok_or_else(|| {
            SimError::new(0, "", ErrorKind::ProgramStructure("config must be the first instruction".into()))
        })
    }

    fn charge(&mut self, key: IddKey, cycles: u64) {
        self.ticks += cycles;
        self.power_log.push((key, cycles));
    }

    fn resolve_index(&self, op: IndexOperand, line: usize, instr: &str) -> SimResult<usize> {
        let n = self.core()?.n;
        match op {
            IndexOperand::Literal(j) => {
                if j >= n {
                    return Err(SimError::new(
                        line,
                        instr,
                        ErrorKind::Operand(format!("index \"{j}\" out of range, allowed indices for n = {n} are 0 to {}", n - 1)),
                    ));
                }
                Ok(j)
            }
            IndexOperand::Counter(c) => {
                let val = if c == 0 { self.c0 as usize } else { self.c1 as usize };
                Ok(val % n)
            }
        }
    }

    fn seed(&self, reg: RegPair) -> [u8; 36] {
        let r = self.r(reg);
        sampler::build_seed(r, self.c0, self.c1)
    }

    /// Executes a full program to completion (until `end`), returning
    /// warnings collected during preprocessing plus any new ones raised
    /// while running (there are none at present; kept for symmetry).
    pub fn run(&mut self, program: &Program, instructions: &[Instruction]) -> SimResult<()> {
        self.pc = 0;
        loop {
            if self.pc >= instructions.len() {
                break;
            }
            let line = program.line_of(self.pc);
            let text = &program.instructions[self.pc];
            let instruction = &instructions[self.pc];
            trace!(pc = self.pc, %text, "fetch");
            let halt = self.step(instruction, program, line, text)?;
            self.instr_count += 1;
            if halt {
                break;
            }
        }
        Ok(())
    }

    /// Executes one instruction. Returns true if this was `end`.
    fn step(&mut self, instruction: &Instruction, program: &Program, line: usize, text: &str) -> SimResult<bool> {
        use Instruction::*;
        match instruction {
            Config { n, q } => {
                if !VALID_N.contains(n) {
                    return Err(SimError::new(line, text, ErrorKind::Configuration(format!("unsupported parameter \"n = {n}\" (valid n: {VALID_N:?})"))));
                }
                if !VALID_Q.contains(q) {
                    return Err(SimError::new(line, text, ErrorKind::Configuration(format!("unsupported parameter \"q = {q}\" (valid prime q: {VALID_Q:?})"))));
                }
                self.core = Some(CoreState { n: *n, q: *q, bank: PolyBank::new(*n, *q) });
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            CounterSet { index, val } => {
                if *index > 1 {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("no such register \"c{index}\", please use c0 or c1"))));
                }
                if *val >= COUNTER_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value {val} too big for 16-bit register \"c{index}\""))));
                }
                if *index == 0 {
                    self.c0 = *val as u16;
                } else {
                    self.c1 = *val as u16;
                }
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            CounterAdjust { index, positive, val } => {
                if *index > 1 {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("no such register \"c{index}\""))));
                }
                if *val >= COUNTER_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value {val} too big for 16-bit register \"c{index}\""))));
                }
                let cur: u32 = if *index == 0 { self.c0.into() } else { self.c1.into() };
                let next = if *positive { (cur + val) % COUNTER_MODULUS } else { (cur + COUNTER_MODULUS - (val % COUNTER_MODULUS)) % COUNTER_MODULUS };
                if *index == 0 {
                    self.c0 = next as u16;
                } else {
                    self.c1 = next as u16;
                }
                self.charge(IddKey::RegAlu, 2);
                self.pc += 1;
            }
            RegSet(val) => {
                if *val >= SCRATCH_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value {val} too big for 24-bit register \"reg\""))));
                }
                self.reg = *val;
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            TmpSet(val) => {
                if *val >= SCRATCH_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value {val} too big for 24-bit register \"tmp\""))));
                }
                self.tmp = *val;
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            RegFromTmp => {
                self.reg = self.tmp;
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            TmpAlu(op) => {
                let q = self.core()?.q;
                self.tmp = match op {
                    AluOp::Add => (self.tmp + self.reg) % q,
                    AluOp::Sub => ((self.tmp as i64 - self.reg as i64).rem_euclid(q as i64)) as u32,
                    AluOp::Mul => ((self.tmp as u64 * self.reg as u64) % q as u64) as u32,
                    AluOp::And => self.tmp & self.reg,
                    AluOp::Or => self.tmp | self.reg,
                    AluOp::Xor => self.tmp ^ self.reg,
                    AluOp::Shr => if self.reg < 24 { (self.tmp >> self.reg) % SCRATCH_MODULUS } else { 0 },
                    AluOp::Shl => if self.reg < 24 { (self.tmp << self.reg) % SCRATCH_MODULUS } else { 0 },
                };
                self.charge(IddKey::RegAlu, 2);
                self.pc += 1;
            }
            RegPolyRead { poly, index } => {
                self.validate_poly(*poly, line, text, "poly")?;
                let idx = self.resolve_index(*index, line, text)?;
                self.reg = self.poly(*poly)[idx];
                self.charge(IddKey::RegPoly, 5);
                self.pc += 1;
            }
            RegPolyWrite { poly, index } => {
                self.validate_poly(*poly, line, text, "poly")?;
                let idx = self.resolve_index(*index, line, text)?;
                let reg = self.reg;
                self.poly_mut(*poly)[idx] = reg;
                self.charge(IddKey::RegPoly, 4);
                self.pc += 1;
            }
            RegMax { poly } => {
                self.validate_poly(*poly, line, text, "poly")?;
                let n = self.core()?.n;
                self.reg = self.core()?.bank.max_abs(*poly);
                self.charge(IddKey::PolyMaxElems, 4 + n as u64);
                self.pc += 1;
            }
            RegSum { poly } => {
                self.validate_poly(*poly, line, text, "poly")?;
                let n = self.core()?.n;
                self.reg = self.core()?.bank.sum_abs(*poly);
                self.charge(IddKey::PolySumElems, 4 + n as u64);
                self.pc += 1;
            }
            Transform { mode, dst, src } => {
                let (n, q) = { let c = self.core()?; (c.n, c.q) };
                self.core.as_ref().unwrap().bank.validate_partition(*dst, *src, line, text)?;
                {
                    let bank = &mut self.core.as_mut().unwrap().bank;
                    let slot = bank.slot_mut(*src);
                    match mode {
                        TransformMode::DifNtt => ntt::dif_ntt(n, q, slot, line, text)?,
                        TransformMode::DitNtt => ntt::dit_ntt(n, q, slot, line, text)?,
                        TransformMode::DifIntt => ntt::dif_intt(n, q, slot, line, text)?,
                        TransformMode::DitIntt => ntt::dit_intt(n, q, slot, line, text)?,
                    }
                    bank.set_slot(*dst, bank.slot(*src).to_vec());
                    let clobber: Vec<u32> = (0..n).map(|_| self.rng.next_u32() % q).collect();
                    bank.set_slot(*src, clobber);
                }
                let log2n = n.trailing_zeros() as u64;
                self.charge(IddKey::PolyNtt, 2 + 1 + (1 + n as u64 / 2) * log2n);
                if log2n % 2 == 0 {
                    self.charge(IddKey::PolyCopy, 2 + 1 + 1 + n as u64 / 4);
                }
                self.pc += 1;
            }
            MultPsi { poly } => {
                let (n, q) = { let c = self.core()?; (c.n, c.q) };
                self.validate_poly(*poly, line, text, "poly")?;
                ntt::mult_psi(n, q, self.poly_mut(*poly), line, text)?;
                self.tmp = self.rng.next_u32() % SCRATCH_MODULUS;
                self.charge(IddKey::PolyMultPsi, 2 + 1 + n as u64 + 1);
                self.pc += 1;
            }
            MultPsiInv { poly } => {
                let (n, q) = { let c = self.core()?; (c.n, c.q) };
                self.validate_poly(*poly, line, text, "poly")?;
                ntt::mult_psi_inv(n, q, self.poly_mut(*poly), line, text)?;
                self.tmp = self.rng.next_u32() % SCRATCH_MODULUS;
                self.charge(IddKey::PolyMultPsi, 2 + 1 + n as u64 + 1);
                self.pc += 1;
            }
            RejSample { mode, reg, form, poly } => {
                self.validate_poly(*poly, line, text, "poly")?;
                self.apply_shake_form(*form, false);
                let shake = ShakeMode::from_u32(*mode, line, text)?;
                let seed = self.seed(*reg);
                let (n, q) = { let c = self.core()?; (c.n, c.q) };
                let fast_factor = crate::params::rej_fast_factor(q).ok_or_else(|| {
                    SimError::new(line, text, ErrorKind::Configuration(format!("no rejection fast-factor tabulated for q = {q}")))
                })?;
                let cycles = sampler::rejection_sample(n, q, shake, fast_factor, &seed, self.poly_mut(*poly));
                self.charge(IddKey::SampleRej, cycles);
                self.pc += 1;
            }
            BinSample { mode, reg, form, k, poly } => {
                if *k < 1 || *k > 32 {
                    return Err(SimError::new(line, text, ErrorKind::Operand("value of k must be in the range 1 to 32".into())));
                }
                self.validate_poly(*poly, line, text, "poly")?;
                self.apply_shake_form(*form, false);
                let shake = ShakeMode::from_u32(*mode, line, text)?;
                let seed = self.seed(*reg);
                let (n, q) = { let c = self.core()?; (c.n, c.q) };
                let cycles = sampler::binomial_sample(n, q, *k, shake, &seed, self.poly_mut(*poly));
                self.charge(IddKey::SampleBin, cycles);
                self.pc += 1;
            }
            CdtSample { mode, reg, form, r, poly } => {
                if *r < 1 || *r > 32 {
                    return Err(SimError::new(line, text, ErrorKind::Operand("value of r must be in the range 1 to 32".into())));
                }
                self.validate_poly(*poly, line, text, "poly")?;
                let cdt = self.cdt.clone().ok_or_else(|| {
                    SimError::new(line, text, ErrorKind::ProgramStructure("CDT not provided, please provide a valid CDT file to use CDT-based sampling".into()))
                })?;
                self.apply_shake_form(*form, false);
                let shake = ShakeMode::from_u32(*mode, line, text)?;
                let seed = self.seed(*reg);
                let (n, q) = { let c = self.core()?; (c.n, c.q) };
                let cycles = sampler::cdt_sample(n, q, *r, shake, &seed, &cdt, self.poly_mut(*poly));
                self.charge(IddKey::SampleCdt, cycles);
                self.pc += 1;
            }
            UniSample { mode, reg, form, eta, poly } => {
                let q = self.core()?.q;
                if *eta >= q {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value of eta too large, must be less than {q}"))));
                }
                self.validate_poly(*poly, line, text, "poly")?;
                self.apply_shake_form(*form, true);
                self.reg = *eta;
                let shake = ShakeMode::from_u32(*mode, line, text)?;
                let seed = self.seed(*reg);
                let n = self.core()?.n;
                let cycles = sampler::uniform_sample(n, q, *eta, shake, &seed, self.poly_mut(*poly));
                self.charge(IddKey::SampleUni, cycles);
                self.pc += 1;
            }
            TriSample1 { mode, reg, form, m, poly } => {
                let n = self.core()?.n;
                if *m >= n {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value of m too large, must be less than {n}"))));
                }
                self.validate_poly(*poly, line, text, "poly")?;
                self.apply_shake_form(*form, false);
                let shake = ShakeMode::from_u32(*mode, line, text)?;
                let seed = self.seed(*reg);
                let q = self.core()?.q;
                let cycles = sampler::trinary_sample_1(n, q, *m, shake, &seed, self.poly_mut(*poly));
                self.charge(IddKey::SampleTri1, cycles);
                self.pc += 1;
            }
            TriSample2 { mode, reg, form, m0, m1, poly } => {
                let n = self.core()?.n;
                if *m0 >= n || *m1 >= n || (*m0 + *m1) >= n {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value of m0 + m1 too large, must be less than {n}"))));
                }
                self.validate_poly(*poly, line, text, "poly")?;
                self.apply_shake_form(*form, true);
                self.reg = (*m0 as u32) + (*m1 as u32) * (1 << 12);
                let shake = ShakeMode::from_u32(*mode, line, text)?;
                let seed = self.seed(*reg);
                let q = self.core()?.q;
                let cycles = sampler::trinary_sample_2(n, q, *m0, *m1, shake, &seed, self.poly_mut(*poly));
                self.charge(IddKey::SampleTri2, cycles);
                self.pc += 1;
            }
            TriSample3 { mode, reg, form, rho, poly } => {
                if !VALID_RHO.contains(rho) {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("unsupported parameter \"rho = 1/{rho}\" (valid rho: {VALID_RHO:?})"))));
                }
                self.validate_poly(*poly, line, text, "poly")?;
                self.apply_shake_form(*form, false);
                let shake = ShakeMode::from_u32(*mode, line, text)?;
                let seed = self.seed(*reg);
                let (n, q) = { let c = self.core()?; (c.n, c.q) };
                let cycles = sampler::trinary_sample_3(n, q, *rho, shake, &seed, self.poly_mut(*poly));
                self.charge(IddKey::SampleTri3, cycles);
                self.pc += 1;
            }
            Init { poly } => {
                self.validate_poly(*poly, line, text, "poly")?;
                let n = self.core()?.n;
                self.core.as_mut().unwrap().bank.init(*poly);
                self.charge(IddKey::PolyInit, 4 + n as u64 / 4);
                self.pc += 1;
            }
            PolyCopy { dst, src } => {
                self.validate_poly(*dst, line, text, "poly_dst")?;
                self.validate_poly(*src, line, text, "poly_src")?;
                let n = self.core()?.n;
                let cross = self.core.as_mut().unwrap().bank.copy(*dst, *src);
                self.tmp = self.rng.next_u32() % SCRATCH_MODULUS;
                let cycles = if cross { 4 + n as u64 / 4 } else { 4 + 3 * n as u64 };
                self.charge(IddKey::PolyCopy, cycles);
                self.pc += 1;
            }
            PolyAlu { op, dst, src } => {
                self.core()?.bank.validate_partition(*dst, *src, line, text)?;
                let n = self.core()?.n;
                let reg = self.reg;
                let bank = &mut self.core.as_mut().unwrap().bank;
                let (key, clobbers_tmp) = match op {
                    PolyOp::Add => { bank.add(*dst, *src); (IddKey::PolyPolyAddsub, true) }
                    PolyOp::Sub => { bank.sub(*dst, *src); (IddKey::PolyPolyAddsub, true) }
                    PolyOp::Mul => { bank.mul(*dst, *src); (IddKey::PolyPolyMul, true) }
                    PolyOp::BitRev => { bank.bitrev(*dst, *src); (IddKey::PolyBitrev, false) }
                    PolyOp::ConstAdd => { bank.const_add(*dst, *src, reg); (IddKey::PolyConstAddsub, false) }
                    PolyOp::ConstSub => { bank.const_sub(*dst, *src, reg); (IddKey::PolyConstAddsub, false) }
                    PolyOp::ConstMul => { bank.const_mul(*dst, *src, reg); (IddKey::PolyConstMul, false) }
                    PolyOp::ConstAnd => { bank.const_and(*dst, *src, reg); (IddKey::PolyConstAnd, false) }
                    PolyOp::ConstOr => { bank.const_or(*dst, *src, reg); (IddKey::PolyConstOr, false) }
                    PolyOp::ConstXor => { bank.const_xor(*dst, *src, reg); (IddKey::PolyConstXor, false) }
                    PolyOp::ConstRshift => { bank.const_rshift(*dst, *src, reg); (IddKey::PolyConstShift, false) }
                    PolyOp::ConstLshift => { bank.const_lshift(*dst, *src, reg); (IddKey::PolyConstShift, false) }
                };
                if clobbers_tmp {
                    self.tmp = self.rng.next_u32() % SCRATCH_MODULUS;
                }
                let cycles = if matches!(op, PolyOp::BitRev) { 3 + 1 + n as u64 / 4 } else { 4 + n as u64 };
                self.charge(key, cycles);
                self.pc += 1;
            }
            ShiftPoly { ring, dst, src } => {
                self.core()?.bank.validate_partition(*dst, *src, line, text)?;
                let n = self.core()?.n;
                self.core.as_mut().unwrap().bank.shift(*ring, *dst, *src);
                self.charge(IddKey::PolyShift, 4 + n as u64 / 4);
                self.pc += 1;
            }
            EqCheck { poly0, poly1 } => {
                self.core()?.bank.validate_partition(*poly0, *poly1, line, text)?;
                let n = self.core()?.n;
                self.flag = if self.core()?.bank.eq_check(*poly0, *poly1) { 1 } else { 0 };
                self.tmp = self.rng.next_u32() % SCRATCH_MODULUS;
                self.charge(IddKey::PolyEqCheck, 5 + n as u64);
                self.pc += 1;
            }
            InfNormCheck { poly, bound } => {
                self.validate_poly(*poly, line, text, "poly")?;
                if *bound >= SCRATCH_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("parameter bound = {bound} too large, must be less than 2^24"))));
                }
                self.reg = *bound;
                let n = self.core()?.n;
                self.flag = if self.core()?.bank.inf_norm_check(*poly, *bound) { 1 } else { 0 };
                self.charge(IddKey::PolyNormCheck, 2 + 4 + n as u64);
                self.pc += 1;
            }
            CompareCounter { index, val } => {
                if *index > 1 {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("no such register \"c{index}\""))));
                }
                if *val >= COUNTER_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value {val} too big for 16-bit register \"c{index}\""))));
                }
                let cur: u32 = if *index == 0 { self.c0.into() } else { self.c1.into() };
                self.flag = compare_sign(cur, *val);
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            CompareReg { val } => {
                if *val >= SCRATCH_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value {val} too big for 24-bit register \"reg\""))));
                }
                self.flag = compare_sign(self.reg, *val);
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            CompareTmp { val } => {
                if *val >= SCRATCH_MODULUS {
                    return Err(SimError::new(line, text, ErrorKind::Operand(format!("value {val} too big for 24-bit register \"tmp\""))));
                }
                self.flag = compare_sign(self.tmp, *val);
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            Branch { op, sign, val, label } => {
                let target = program.resolve_label(label, line, text)?;
                let holds = branch_holds(self.flag, *op, *sign, *val);
                self.charge(IddKey::Ctrl, 2);
                self.pc = if holds { target } else { self.pc + 1 };
            }
            Sha3Init => {
                self.hash.clear();
                self.charge(IddKey::Sha3, 2 + 1 + 25);
                self.pc += 1;
            }
            Sha3AbsorbPoly { mode, poly } => {
                if *mode != 256 && *mode != 512 {
                    return Err(SimError::new(line, text, ErrorKind::Operand("only SHA3-256 and SHA3-512 are supported".into())));
                }
                self.validate_poly(*poly, line, text, "poly")?;
                let n = self.core()?.n;
                let poly_data = self.poly(*poly).to_vec();
                self.hash.absorb_poly(&poly_data);
                let cycles = if *mode == 256 {
                    4 + n as u64 + (n as u64).div_ceil(34) * 42
                } else {
                    4 + n as u64 + (n as u64).div_ceil(18) * 34
                };
                self.charge(IddKey::PolyHash, cycles);
                self.pc += 1;
            }
            Sha3AbsorbReg { mode, reg } => {
                if *mode != 256 && *mode != 512 {
                    return Err(SimError::new(line, text, ErrorKind::Operand("only SHA3-256 and SHA3-512 are supported".into())));
                }
                let reg_data = *self.r(*reg);
                self.hash.absorb_reg(&reg_data);
                let cycles = if *mode == 256 { 3 + 42 } else { 3 + 34 };
                self.charge(IddKey::Sha3, cycles);
                self.pc += 1;
            }
            Sha3Digest256 { reg } => {
                let digest = self.hash.digest_256();
                match reg {
                    RegPair::R0 => self.r0 = digest,
                    RegPair::R1 => self.r1 = digest,
                }
                self.charge(IddKey::Sha3, 3 + 52);
                self.pc += 1;
            }
            Sha3Digest512 => {
                let digest = self.hash.digest_512();
                self.r0.copy_from_slice(&digest[..32]);
                self.r1.copy_from_slice(&digest[32..]);
                self.charge(IddKey::Sha3, 3 + 53);
                self.pc += 1;
            }
            End => {
                self.charge(IddKey::Ctrl, 2);
                return Ok(true);
            }
            Nop => {
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
            EncodeCompare { f1, f2, encoding } => {
                debug!(%f1, %f2, %encoding, "encode_compare (debug helper)");
                self.pc += 1;
            }
            EncodePrint { poly, encoding } => {
                self.validate_poly(*poly, line, text, "poly")?;
                let q = self.core()?.q;
                let enc = Encoding::parse(encoding, line, text)?;
                let bytes = encode_to_bytearray(q, self.poly(*poly), enc);
                debug!(?bytes, "encode_print");
                self.pc += 1;
            }
            RandomReg { reg } => {
                let mut bytes = [0u8; 32];
                self.rng.fill(&mut bytes);
                match reg {
                    RegPair::R0 => self.r0 = bytes,
                    RegPair::R1 => self.r1 = bytes,
                }
                if !self.free_rw {
                    self.charge(IddKey::Ctrl, 16);
                }
                self.pc += 1;
            }
            RandomPoly { poly, encoding, path } => {
                self.validate_poly(*poly, line, text, "poly")?;
                let n = self.core()?.n;
                let q = self.core()?.q;
                let enc = Encoding::parse(encoding, line, text)?;
                let fresh = random_poly_encode(n, q, enc, &mut self.rng, line, text)?;
                self.poly_mut(*poly).copy_from_slice(&fresh);
                warn_missing_npy(path);
                if !self.free_rw {
                    self.charge(IddKey::PolyReadWrite, 2 * n as u64);
                }
                self.pc += 1;
            }
            Load { target, path } => {
                warn_missing_npy(path);
                match target {
                    LoadSaveTarget::R(_) => {
                        if !self.free_rw {
                            self.charge(IddKey::Ctrl, 16);
                        }
                    }
                    LoadSaveTarget::Poly(poly) => {
                        self.validate_poly(*poly, line, text, "poly")?;
                        let n = self.core()?.n;
                        if !self.free_rw {
                            self.charge(IddKey::PolyReadWrite, 2 * n as u64);
                        }
                    }
                }
                self.pc += 1;
            }
            Save { target, path } => {
                warn_missing_npy(path);
                match target {
                    LoadSaveTarget::R(_) => {
                        if !self.free_rw {
                            self.charge(IddKey::Ctrl, 16);
                        }
                    }
                    LoadSaveTarget::Poly(poly) => {
                        self.validate_poly(*poly, line, text, "poly")?;
                        let n = self.core()?.n;
                        if !self.free_rw {
                            self.charge(IddKey::PolyReadWrite, 2 * n as u64);
                        }
                    }
                }
                self.pc += 1;
            }
            Print(target) => {
                match target {
                    PrintTarget::R(which) => debug!(reg = ?which, value = ?self.r(*which), "print"),
                    PrintTarget::Reg => debug!(reg = self.reg, "print"),
                    PrintTarget::Tmp => debug!(tmp = self.tmp, "print"),
                    PrintTarget::Flag => debug!(flag = self.flag, "print"),
                    PrintTarget::Counter(idx) => debug!(counter = *idx, value = self.counter(*idx), "print"),
                    PrintTarget::Poly(poly) => {
                        self.validate_poly(*poly, line, text, "poly")?;
                        debug!(poly = *poly, coeffs = ?self.poly(*poly), "print");
                    }
                }
                self.charge(IddKey::Ctrl, 2);
                self.pc += 1;
            }
        }
        Ok(false)
    }

    /// Charges the extra setup cycles the long sampler form pays for
    /// loading `c0`/`c1` (and, for `uni_sample`/`tri_sample_2`, `reg`) from
    /// immediates before the sampler itself runs.
    fn apply_shake_form(&mut self, form: ShakeForm, extra_reg_write: bool) {
        if let ShakeForm::Long { c0, c1 } = form {
            self.c0 = c0;
            self.c1 = c1;
            self.charge(IddKey::Ctrl, if extra_reg_write { 6 } else { 4 });
        }
    }

    fn validate_poly(&self, index: usize, line: usize, instr: &str, label: &str) -> SimResult<()> {
        self.core()?.bank.validate_index(index, line, instr, label)
    }
}

fn compare_sign(actual: u32, val: u32) -> i8 {
    use std::cmp::Ordering::*;
    match actual.cmp(&val) {
        Less => -1,
        Greater => 1,
        Equal => 0,
    }
}

fn branch_holds(flag: i8, op: CmpOp, sign: Option<char>, val: u8) -> bool {
    let target = if val == 0 { 0 } else if sign == Some('-') { -1 } else { 1 };
    let equal = flag == target;
    match op {
        CmpOp::Eq => equal,
        CmpOp::Ne => !equal,
    }
}

fn warn_missing_npy(path: &str) {
    if !path.ends_with(".npy") {
        warn!(%path, "missing .npy extension, appended automatically");
    }
}

/// Precompiles a program's instruction text into typed instructions once,
/// so the run loop dispatches over data instead of re-parsing strings.
pub fn compile(program: &Program) -> SimResult<Vec<Instruction>> {
    program
        .instructions
        .iter()
        .enumerate()
        .map(|(i, text)| Instruction::parse(text, program.line_of(i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_source(src: &str) -> Machine {
        let (program, _warnings) = Program::parse(src).unwrap();
        let instructions = compile(&program).unwrap();
        let mut machine = Machine::new(None, false, 7);
        machine.run(&program, &instructions).unwrap();
        machine
    }

    #[test]
    fn init_then_sum_is_zero() {
        let machine = run_source("config(n=256,q=7681)\ninit(poly=0)\nreg=sum(poly=0)\nend\n");
        assert_eq!(machine.reg(), 0);
        assert_eq!(machine.instr_count(), 4);
    }

    #[test]
    fn const_add_on_zero_slot_breaks_equality() {
        let machine = run_source(
            "config(n=256,q=7681)\nreg=1\npoly_op(op=CONST_ADD,poly_dst=16,poly_src=0)\nflag=eq_check(poly0=0,poly1=16)\nend\n",
        );
        assert_eq!(machine.flag(), 0);
    }

    #[test]
    fn register_poly_roundtrip() {
        let machine = run_source(
            "config(n=256,q=7681)\nc0=0\nc1=0\nreg=123\n(poly=0)[5]=reg\nreg=(poly=0)[5]\nend\n",
        );
        assert_eq!(machine.reg(), 123);
    }

    #[test]
    fn compare_reg_sets_ternary_flag() {
        let machine = run_source("config(n=256,q=7681)\nreg=5\nflag=compare(reg,10)\nend\n");
        assert_eq!(machine.flag(), -1);
    }

    #[test]
    fn branch_jumps_on_matching_flag() {
        let machine = run_source(
            "config(n=256,q=7681)\nc0=0\nLOOP: c0=c0+1\nflag=compare(c0,3)\nif(flag!=0) goto LOOP\nend\n",
        );
        assert_eq!(machine.counter(0), 3);
    }

    #[test]
    fn sha3_digest_of_zero_seed_is_deterministic() {
        let mut m1 = run_source("config(n=256,q=7681)\nsha3_init\nsha3_256_absorb(r0)\nr1=sha3_256_digest\nend\n");
        let mut m2 = run_source("config(n=256,q=7681)\nsha3_init\nsha3_256_absorb(r0)\nr1=sha3_256_digest\nend\n");
        assert_eq!(m1.r(RegPair::R1), m2.r(RegPair::R1));
        let _ = (&mut m1, &mut m2);
    }

    #[test]
    fn missing_cdt_is_program_structure_error() {
        let (program, _) = Program::parse(
            "config(n=256,q=7681)\ncdt_sample(prng=SHAKE-128,seed=r0,r=10,poly=0)\nend\n",
        )
        .unwrap();
        let instructions = compile(&program).unwrap();
        let mut machine = Machine::new(None, false, 1);
        let err = machine.run(&program, &instructions).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ProgramStructure(_)));
    }

    #[test]
    fn partition_violation_is_fatal() {
        let (program, _) = Program::parse(
            "config(n=256,q=7681)\npoly_op(op=ADD,poly_dst=0,poly_src=1)\nend\n",
        )
        .unwrap();
        let instructions = compile(&program).unwrap();
        let mut machine = Machine::new(None, false, 1);
        let err = machine.run(&program, &instructions).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Partition(_)));
    }
}
