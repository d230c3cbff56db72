//! Instruction grammar: turns one preprocessed line into a typed
//! [`Instruction`], replacing the teacher's opcode-dispatch match with a
//! parse step up front so `machine.rs` executes typed data instead of
//! re-parsing strings on every fetch.

use itertools::Itertools;
use strum::EnumString;

use crate::error::{ErrorKind, SimError, SimResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shr,
    Shl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    DifNtt,
    DitNtt,
    DifIntt,
    DitIntt,
}

/// `poly_op`'s opcode; derives `EnumString` so the parser matches the
/// wire spelling (`CONST_ADD`, ...) without a hand-written match arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum PolyOp {
    #[strum(serialize = "ADD")]
    Add,
    #[strum(serialize = "SUB")]
    Sub,
    #[strum(serialize = "MUL")]
    Mul,
    #[strum(serialize = "BITREV")]
    BitRev,
    #[strum(serialize = "CONST_ADD")]
    ConstAdd,
    #[strum(serialize = "CONST_SUB")]
    ConstSub,
    #[strum(serialize = "CONST_MUL")]
    ConstMul,
    #[strum(serialize = "CONST_AND")]
    ConstAnd,
    #[strum(serialize = "CONST_OR")]
    ConstOr,
    #[strum(serialize = "CONST_XOR")]
    ConstXor,
    #[strum(serialize = "CONST_RSHIFT")]
    ConstRshift,
    #[strum(serialize = "CONST_LSHIFT")]
    ConstLshift,
}

/// `j` or `ck` in `(poly=i)[j|ck]` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperand {
    Literal(usize),
    Counter(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShakeForm {
    /// Long form: loads c0/c1 from immediates before sampling.
    Long { c0: u16, c1: u16 },
    /// Short form: uses whatever c0/c1 already hold.
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegPair {
    R0,
    R1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintTarget {
    R(RegPair),
    Reg,
    Tmp,
    Flag,
    Counter(u8),
    Poly(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSaveTarget {
    R(RegPair),
    Poly(usize),
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Config { n: usize, q: u32 },
    CounterSet { index: u8, val: u32 },
    CounterAdjust { index: u8, positive: bool, val: u32 },
    RegSet(u32),
    TmpSet(u32),
    RegFromTmp,
    TmpAlu(AluOp),
    RegPolyRead { poly: usize, index: IndexOperand },
    RegPolyWrite { poly: usize, index: IndexOperand },
    RegMax { poly: usize },
    RegSum { poly: usize },
    Transform { mode: TransformMode, dst: usize, src: usize },
    MultPsi { poly: usize },
    MultPsiInv { poly: usize },
    RejSample { mode: u32, reg: RegPair, form: ShakeForm, poly: usize },
    BinSample { mode: u32, reg: RegPair, form: ShakeForm, k: u32, poly: usize },
    CdtSample { mode: u32, reg: RegPair, form: ShakeForm, r: u32, poly: usize },
    UniSample { mode: u32, reg: RegPair, form: ShakeForm, eta: u32, poly: usize },
    TriSample1 { mode: u32, reg: RegPair, form: ShakeForm, m: usize, poly: usize },
    TriSample2 { mode: u32, reg: RegPair, form: ShakeForm, m0: usize, m1: usize, poly: usize },
    TriSample3 { mode: u32, reg: RegPair, form: ShakeForm, rho: u32, poly: usize },
    Init { poly: usize },
    PolyCopy { dst: usize, src: usize },
    PolyAlu { op: PolyOp, dst: usize, src: usize },
    ShiftPoly { ring: char, dst: usize, src: usize },
    EqCheck { poly0: usize, poly1: usize },
    InfNormCheck { poly: usize, bound: u32 },
    CompareCounter { index: u8, val: u32 },
    CompareReg { val: u32 },
    CompareTmp { val: u32 },
    Branch { op: CmpOp, sign: Option<char>, val: u8, label: String },
    Sha3Init,
    Sha3AbsorbPoly { mode: u32, poly: usize },
    Sha3AbsorbReg { mode: u32, reg: RegPair },
    Sha3Digest256 { reg: RegPair },
    Sha3Digest512,
    End,
    Nop,
    EncodeCompare { f1: String, f2: String, encoding: String },
    EncodePrint { poly: usize, encoding: String },
    RandomReg { reg: RegPair },
    RandomPoly { poly: usize, encoding: String, path: String },
    Load { target: LoadSaveTarget, path: String },
    Save { target: LoadSaveTarget, path: String },
    Print(PrintTarget),
}

fn args(instr: &str, prefix: &str) -> Option<String> {
    let body = instr.strip_prefix(prefix)?;
    let body = body.strip_prefix('(')?;
    let body = body.strip_suffix(')')?;
    Some(body.to_string())
}

fn kv_pairs(body: &str) -> Vec<(String, String)> {
    // a naive split on ',' is safe here: the only commas inside quoted
    // path arguments are never present since filenames are plain tokens.
    body.split(',')
        .filter_map(|part| {
            part.splitn(2, '=')
                .map(|s| s.trim().to_string())
                .collect_tuple()
        })
        .collect()
}

fn get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn parse_usize(v: &str, line: usize, instr: &str, label: &str) -> SimResult<usize> {
    v.parse().map_err(|_| {
        SimError::new(line, instr, ErrorKind::Operand(format!("\"{label} = {v}\" is not a valid number")))
    })
}

fn parse_u32(v: &str, line: usize, instr: &str, label: &str) -> SimResult<u32> {
    v.parse().map_err(|_| {
        SimError::new(line, instr, ErrorKind::Operand(format!("\"{label} = {v}\" is not a valid number")))
    })
}

fn reg_pair(v: &str, line: usize, instr: &str) -> SimResult<RegPair> {
    match v {
        "0" => Ok(RegPair::R0),
        "1" => Ok(RegPair::R1),
        _ => Err(SimError::new(
            line,
            instr,
            ErrorKind::Operand(format!("no such register \"r{v}\", allowed registers are r0 and r1")),
        )),
    }
}

fn index_operand(raw: &str, line: usize, instr: &str) -> SimResult<IndexOperand> {
    if let Some(c) = raw.strip_prefix('c') {
        let idx: u8 = c.parse().map_err(|_| {
            SimError::new(line, instr, ErrorKind::Operand(format!("no such register \"c{c}\"")))
        })?;
        Ok(IndexOperand::Counter(idx))
    } else {
        Ok(IndexOperand::Literal(parse_usize(raw, line, instr, "index")?))
    }
}

impl Instruction {
    pub fn parse(instr: &str, line: usize) -> SimResult<Instruction> {
        let compact: String = instr.chars().filter(|c| !c.is_whitespace()).collect();
        let s = compact.as_str();

        if let Some(body) = args(s, "config") {
            let pairs = kv_pairs(&body);
            let n = get(&pairs, "n").ok_or_else(|| missing(line, instr, "n"))?;
            let q = get(&pairs, "q").ok_or_else(|| missing(line, instr, "q"))?;
            return Ok(Instruction::Config {
                n: parse_usize(n, line, instr, "n")?,
                q: parse_u32(q, line, instr, "q")?,
            });
        }

        if let Some(rest) = s.strip_prefix("reg=tmp") {
            if rest.is_empty() {
                return Ok(Instruction::RegFromTmp);
            }
        }
        if let Some(rest) = s.strip_prefix("reg=") {
            if let Ok(v) = rest.parse() {
                return Ok(Instruction::RegSet(v));
            }
        }
        if let Some(rest) = s.strip_prefix("tmp=tmp") {
            for (token, op) in [
                ("+reg", AluOp::Add),
                ("-reg", AluOp::Sub),
                ("*reg", AluOp::Mul),
                ("&reg", AluOp::And),
                ("|reg", AluOp::Or),
                ("^reg", AluOp::Xor),
                (">>reg", AluOp::Shr),
                ("<<reg", AluOp::Shl),
            ] {
                if rest == token {
                    return Ok(Instruction::TmpAlu(op));
                }
            }
        }
        if let Some(rest) = s.strip_prefix("tmp=") {
            if let Ok(v) = rest.parse() {
                return Ok(Instruction::TmpSet(v));
            }
        }

        if let Some(rest) = s.strip_prefix('c') {
            // c{0,1}=N or c{0,1}=c{0,1}{+,-}N
            if let Some(eq) = rest.find('=') {
                let (idx_str, after_eq) = rest.split_at(eq);
                let after_eq = &after_eq[1..];
                if let Ok(idx) = idx_str.parse::<u8>() {
                    if let Ok(val) = after_eq.parse::<u32>() {
                        return Ok(Instruction::CounterSet { index: idx, val });
                    }
                    if let Some(src) = after_eq.strip_prefix('c') {
                        if let Some(plus) = src.strip_prefix(&format!("{idx}+")) {
                            return Ok(Instruction::CounterAdjust {
                                index: idx,
                                positive: true,
                                val: parse_u32(plus, line, instr, "val")?,
                            });
                        }
                        if let Some(minus) = src.strip_prefix(&format!("{idx}-")) {
                            return Ok(Instruction::CounterAdjust {
                                index: idx,
                                positive: false,
                                val: parse_u32(minus, line, instr, "val")?,
                            });
                        }
                    }
                }
            }
        }

        if let Some(body) = s.strip_prefix("reg=(poly=") {
            if let Some(close) = body.find(')') {
                let poly = parse_usize(&body[..close], line, instr, "poly")?;
                let idx_part = &body[close + 1..];
                if let Some(idx_raw) = idx_part.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                    return Ok(Instruction::RegPolyRead {
                        poly,
                        index: index_operand(idx_raw, line, instr)?,
                    });
                }
            }
        }
        if let Some(body) = s.strip_prefix("(poly=") {
            if let Some(close) = body.find(')') {
                let poly = parse_usize(&body[..close], line, instr, "poly")?;
                let rest = &body[close + 1..];
                if let Some(idx_raw) = rest.strip_prefix('[') {
                    if let Some(bracket) = idx_raw.find(']') {
                        let idx_str = &idx_raw[..bracket];
                        if &idx_raw[bracket + 1..] == "=reg" {
                            return Ok(Instruction::RegPolyWrite {
                                poly,
                                index: index_operand(idx_str, line, instr)?,
                            });
                        }
                    }
                }
            }
        }

        if let Some(body) = args(s, "reg=max") {
            let poly = body.strip_prefix("poly=").map(|p| parse_usize(p, line, instr, "poly")).transpose()?;
            if let Some(poly) = poly {
                return Ok(Instruction::RegMax { poly });
            }
        }
        if let Some(body) = args(s, "reg=sum") {
            let poly = body.strip_prefix("poly=").map(|p| parse_usize(p, line, instr, "poly")).transpose()?;
            if let Some(poly) = poly {
                return Ok(Instruction::RegSum { poly });
            }
        }

        if let Some(body) = args(s, "transform") {
            let pairs = kv_pairs(&body);
            let mode = match get(&pairs, "mode") {
                Some("DIF_NTT") => TransformMode::DifNtt,
                Some("DIT_NTT") => TransformMode::DitNtt,
                Some("DIF_INTT") => TransformMode::DifIntt,
                Some("DIT_INTT") => TransformMode::DitIntt,
                Some(other) => {
                    return Err(SimError::new(
                        line,
                        instr,
                        ErrorKind::Operand(format!("unsupported transform mode \"{other}\"")),
                    ))
                }
                None => return Err(missing(line, instr, "mode")),
            };
            let dst = parse_usize(get(&pairs, "poly_dst").ok_or_else(|| missing(line, instr, "poly_dst"))?, line, instr, "poly_dst")?;
            let src = parse_usize(get(&pairs, "poly_src").ok_or_else(|| missing(line, instr, "poly_src"))?, line, instr, "poly_src")?;
            return Ok(Instruction::Transform { mode, dst, src });
        }

        if let Some(body) = args(s, "mult_psi") {
            let poly = body.strip_prefix("poly=").map(|p| parse_usize(p, line, instr, "poly")).transpose()?;
            if let Some(poly) = poly {
                return Ok(Instruction::MultPsi { poly });
            }
        }
        if let Some(body) = args(s, "mult_psi_inv") {
            let poly = body.strip_prefix("poly=").map(|p| parse_usize(p, line, instr, "poly")).transpose()?;
            if let Some(poly) = poly {
                return Ok(Instruction::MultPsiInv { poly });
            }
        }

        if let Some(i) = parse_sampler(s, line, instr)? {
            return Ok(i);
        }

        if let Some(body) = args(s, "init") {
            let poly = body.strip_prefix("poly=").map(|p| parse_usize(p, line, instr, "poly")).transpose()?;
            if let Some(poly) = poly {
                return Ok(Instruction::Init { poly });
            }
        }
        if let Some(body) = args(s, "poly_copy") {
            let pairs = kv_pairs(&body);
            let dst = parse_usize(get(&pairs, "poly_dst").ok_or_else(|| missing(line, instr, "poly_dst"))?, line, instr, "poly_dst")?;
            let src = parse_usize(get(&pairs, "poly_src").ok_or_else(|| missing(line, instr, "poly_src"))?, line, instr, "poly_src")?;
            return Ok(Instruction::PolyCopy { dst, src });
        }
        if let Some(body) = args(s, "poly_op") {
            let pairs = kv_pairs(&body);
            let op_name = get(&pairs, "op").ok_or_else(|| missing(line, instr, "op"))?;
            let op = match op_name.parse::<PolyOp>() {
                Ok(op) => op,
                Err(_) => {
                    let other = op_name;
                    return Err(SimError::new(
                        line,
                        instr,
                        ErrorKind::Operand(format!(
                            "unsupported operation \"{other}\", allowed operations are ADD, SUB, MUL, BITREV, CONST_ADD, CONST_SUB, CONST_MUL, CONST_AND, CONST_OR, CONST_XOR, CONST_RSHIFT, CONST_LSHIFT"
                        )),
                    ))
                }
            };
            let dst = parse_usize(get(&pairs, "poly_dst").ok_or_else(|| missing(line, instr, "poly_dst"))?, line, instr, "poly_dst")?;
            let src = parse_usize(get(&pairs, "poly_src").ok_or_else(|| missing(line, instr, "poly_src"))?, line, instr, "poly_src")?;
            return Ok(Instruction::PolyAlu { op, dst, src });
        }
        if let Some(body) = args(s, "shift_poly") {
            let pairs = kv_pairs(&body);
            let ring_spec = get(&pairs, "ring").ok_or_else(|| missing(line, instr, "ring"))?;
            let ring = if ring_spec.ends_with('+') {
                '+'
            } else if ring_spec.ends_with('-') {
                '-'
            } else {
                return Err(SimError::new(line, instr, ErrorKind::Operand(format!("unsupported ring \"{ring_spec}\""))));
            };
            let dst = parse_usize(get(&pairs, "poly_dst").ok_or_else(|| missing(line, instr, "poly_dst"))?, line, instr, "poly_dst")?;
            let src = parse_usize(get(&pairs, "poly_src").ok_or_else(|| missing(line, instr, "poly_src"))?, line, instr, "poly_src")?;
            return Ok(Instruction::ShiftPoly { ring, dst, src });
        }

        if let Some(body) = args(s, "flag=eq_check") {
            let pairs = kv_pairs(&body);
            let poly0 = parse_usize(get(&pairs, "poly0").ok_or_else(|| missing(line, instr, "poly0"))?, line, instr, "poly0")?;
            let poly1 = parse_usize(get(&pairs, "poly1").ok_or_else(|| missing(line, instr, "poly1"))?, line, instr, "poly1")?;
            return Ok(Instruction::EqCheck { poly0, poly1 });
        }
        if let Some(body) = args(s, "flag=inf_norm_check") {
            let pairs = kv_pairs(&body);
            let poly = parse_usize(get(&pairs, "poly").ok_or_else(|| missing(line, instr, "poly"))?, line, instr, "poly")?;
            let bound = parse_u32(get(&pairs, "bound").ok_or_else(|| missing(line, instr, "bound"))?, line, instr, "bound")?;
            return Ok(Instruction::InfNormCheck { poly, bound });
        }
        if let Some(body) = args(s, "flag=compare") {
            if let Some(c) = body.strip_prefix('c') {
                if let Some(comma) = c.find(',') {
                    let idx: u8 = c[..comma].parse().map_err(|_| {
                        SimError::new(line, instr, ErrorKind::Operand(format!("no such register \"c{}\"", &c[..comma])))
                    })?;
                    let val = parse_u32(&c[comma + 1..], line, instr, "val")?;
                    return Ok(Instruction::CompareCounter { index: idx, val });
                }
            }
            if let Some(rest) = body.strip_prefix("reg,") {
                return Ok(Instruction::CompareReg { val: parse_u32(rest, line, instr, "val")? });
            }
            if let Some(rest) = body.strip_prefix("tmp,") {
                return Ok(Instruction::CompareTmp { val: parse_u32(rest, line, instr, "val")? });
            }
        }

        if let Some(body) = s.strip_prefix("if(flag") {
            // op in {==, !=}, optional sign, value 0/1, "goto" label
            let (op, rest) = if let Some(r) = body.strip_prefix("==") {
                (CmpOp::Eq, r)
            } else if let Some(r) = body.strip_prefix("!=") {
                (CmpOp::Ne, r)
            } else {
                return Err(SimError::new(line, instr, ErrorKind::ProgramStructure("unknown mnemonic".into())));
            };
            let (sign, rest) = if let Some(r) = rest.strip_prefix('+') {
                (Some('+'), r)
            } else if let Some(r) = rest.strip_prefix('-') {
                (Some('-'), r)
            } else {
                (None, rest)
            };
            if let Some(rest) = rest.strip_prefix('0') {
                if let Some(rest) = rest.strip_prefix(")goto") {
                    return Ok(Instruction::Branch { op, sign, val: 0, label: rest.to_string() });
                }
            }
            if let Some(rest) = rest.strip_prefix('1') {
                if let Some(rest) = rest.strip_prefix(")goto") {
                    return Ok(Instruction::Branch { op, sign, val: 1, label: rest.to_string() });
                }
            }
        }

        if s == "sha3_init" {
            return Ok(Instruction::Sha3Init);
        }
        if let Some(rest) = s.strip_prefix("sha3_") {
            if let Some(body) = rest.strip_prefix("256_absorb(poly=").and_then(|b| b.strip_suffix(')')) {
                return Ok(Instruction::Sha3AbsorbPoly { mode: 256, poly: parse_usize(body, line, instr, "poly")? });
            }
            if let Some(body) = rest.strip_prefix("512_absorb(poly=").and_then(|b| b.strip_suffix(')')) {
                return Ok(Instruction::Sha3AbsorbPoly { mode: 512, poly: parse_usize(body, line, instr, "poly")? });
            }
            if let Some(body) = rest.strip_prefix("256_absorb(r").and_then(|b| b.strip_suffix(')')) {
                return Ok(Instruction::Sha3AbsorbReg { mode: 256, reg: reg_pair(body, line, instr)? });
            }
            if let Some(body) = rest.strip_prefix("512_absorb(r").and_then(|b| b.strip_suffix(')')) {
                return Ok(Instruction::Sha3AbsorbReg { mode: 512, reg: reg_pair(body, line, instr)? });
            }
        }
        if let Some(rest) = s.strip_prefix('r') {
            if let Some(digit) = rest.chars().next() {
                if rest[1..] == *"=sha3_256_digest" {
                    return Ok(Instruction::Sha3Digest256 { reg: reg_pair(&digit.to_string(), line, instr)? });
                }
            }
        }
        if s == "r0||r1=sha3_512_digest" {
            return Ok(Instruction::Sha3Digest512);
        }

        if s == "end" {
            return Ok(Instruction::End);
        }
        if s == "nop" {
            return Ok(Instruction::Nop);
        }

        if let Some(i) = parse_debug(s, line, instr)? {
            return Ok(i);
        }

        Err(SimError::new(
            line,
            instr,
            ErrorKind::ProgramStructure(format!("unknown mnemonic in \"{instr}\"")),
        ))
    }
}

fn missing(line: usize, instr: &str, field: &str) -> SimError {
    SimError::new(line, instr, ErrorKind::Operand(format!("missing parameter \"{field}\"")))
}

fn parse_sampler(s: &str, line: usize, instr: &str) -> SimResult<Option<Instruction>> {
    for name in ["rej_sample", "bin_sample", "cdt_sample", "uni_sample", "tri_sample_1", "tri_sample_2", "tri_sample_3"] {
        let Some(body) = args(s, name) else { continue };
        let pairs = kv_pairs(&body);
        let mode = parse_u32(get(&pairs, "prng").and_then(|v| v.strip_prefix("SHAKE-")).ok_or_else(|| missing(line, instr, "prng"))?, line, instr, "prng")?;
        let reg = reg_pair(get(&pairs, "seed").and_then(|v| v.strip_prefix('r')).ok_or_else(|| missing(line, instr, "seed"))?, line, instr)?;
        let form = match (get(&pairs, "c0"), get(&pairs, "c1")) {
            (Some(c0), Some(c1)) => ShakeForm::Long {
                c0: c0.parse().map_err(|_| missing(line, instr, "c0"))?,
                c1: c1.parse().map_err(|_| missing(line, instr, "c1"))?,
            },
            _ => ShakeForm::Short,
        };
        let poly = parse_usize(get(&pairs, "poly").ok_or_else(|| missing(line, instr, "poly"))?, line, instr, "poly")?;
        let instruction = match name {
            "rej_sample" => Instruction::RejSample { mode, reg, form, poly },
            "bin_sample" => Instruction::BinSample {
                mode,
                reg,
                form,
                k: parse_u32(get(&pairs, "k").ok_or_else(|| missing(line, instr, "k"))?, line, instr, "k")?,
                poly,
            },
            "cdt_sample" => Instruction::CdtSample {
                mode,
                reg,
                form,
                r: parse_u32(get(&pairs, "r").ok_or_else(|| missing(line, instr, "r"))?, line, instr, "r")?,
                poly,
            },
            "uni_sample" => Instruction::UniSample {
                mode,
                reg,
                form,
                eta: parse_u32(get(&pairs, "eta").ok_or_else(|| missing(line, instr, "eta"))?, line, instr, "eta")?,
                poly,
            },
            "tri_sample_1" => Instruction::TriSample1 {
                mode,
                reg,
                form,
                m: parse_usize(get(&pairs, "m").ok_or_else(|| missing(line, instr, "m"))?, line, instr, "m")?,
                poly,
            },
            "tri_sample_2" => Instruction::TriSample2 {
                mode,
                reg,
                form,
                m0: parse_usize(get(&pairs, "m0").ok_or_else(|| missing(line, instr, "m0"))?, line, instr, "m0")?,
                m1: parse_usize(get(&pairs, "m1").ok_or_else(|| missing(line, instr, "m1"))?, line, instr, "m1")?,
                poly,
            },
            "tri_sample_3" => Instruction::TriSample3 {
                mode,
                reg,
                form,
                rho: parse_u32(
                    get(&pairs, "rho").and_then(|v| v.strip_prefix("1/")).ok_or_else(|| missing(line, instr, "rho"))?,
                    line,
                    instr,
                    "rho",
                )?,
                poly,
            },
            _ => unreachable!(),
        };
        return Ok(Some(instruction));
    }
    Ok(None)
}

fn strip_quotes(v: &str) -> String {
    v.trim_matches('"').to_string()
}

fn parse_debug(s: &str, line: usize, instr: &str) -> SimResult<Option<Instruction>> {
    if let Some(body) = args(s, "encode_compare") {
        let parts: Vec<&str> = body.splitn(3, ',').collect();
        if parts.len() == 3 {
            let f1 = strip_quotes(parts[0]);
            let f2 = strip_quotes(parts[1]);
            let encoding = parts[2].strip_prefix("encoding=").unwrap_or(parts[2]).to_string();
            return Ok(Some(Instruction::EncodeCompare { f1, f2, encoding }));
        }
    }
    if let Some(body) = args(s, "encode_print") {
        let pairs = kv_pairs(&body);
        let poly = parse_usize(get(&pairs, "poly").ok_or_else(|| missing(line, instr, "poly"))?, line, instr, "poly")?;
        let encoding = get(&pairs, "encoding").ok_or_else(|| missing(line, instr, "encoding"))?.to_string();
        return Ok(Some(Instruction::EncodePrint { poly, encoding }));
    }
    if let Some(body) = args(s, "random") {
        if let Some(r) = body.strip_prefix('r') {
            if r.len() == 1 {
                return Ok(Some(Instruction::RandomReg { reg: reg_pair(r, line, instr)? }));
            }
        }
        if body.starts_with("poly=") {
            let pairs_body: Vec<&str> = body.splitn(3, ',').collect();
            if pairs_body.len() == 3 {
                let poly = parse_usize(pairs_body[0].trim_start_matches("poly="), line, instr, "poly")?;
                let encoding = pairs_body[1].trim_start_matches("encoding=").to_string();
                let path = strip_quotes(pairs_body[2]);
                return Ok(Some(Instruction::RandomPoly { poly, encoding, path }));
            }
        }
    }
    if let Some(body) = args(s, "load") {
        if let Some((target_str, path_str)) = body.split_once(',') {
            let path = strip_quotes(path_str);
            let target = parse_load_save_target(target_str, line, instr)?;
            return Ok(Some(Instruction::Load { target, path }));
        }
    }
    if let Some(body) = args(s, "save") {
        if let Some((target_str, path_str)) = body.split_once(',') {
            let path = strip_quotes(path_str);
            let target = parse_load_save_target(target_str, line, instr)?;
            return Ok(Some(Instruction::Save { target, path }));
        }
    }
    if let Some(body) = args(s, "print") {
        let target = match body.as_str() {
            "r0" => PrintTarget::R(RegPair::R0),
            "r1" => PrintTarget::R(RegPair::R1),
            "reg" => PrintTarget::Reg,
            "tmp" => PrintTarget::Tmp,
            "flag" => PrintTarget::Flag,
            "c0" => PrintTarget::Counter(0),
            "c1" => PrintTarget::Counter(1),
            other if other.starts_with("poly=") => {
                PrintTarget::Poly(parse_usize(&other[5..], line, instr, "poly")?)
            }
            other => {
                return Err(SimError::new(line, instr, ErrorKind::Operand(format!("unsupported print target \"{other}\""))))
            }
        };
        return Ok(Some(Instruction::Print(target)));
    }
    Ok(None)
}

fn parse_load_save_target(raw: &str, line: usize, instr: &str) -> SimResult<LoadSaveTarget> {
    if let Some(r) = raw.strip_prefix('r') {
        return Ok(LoadSaveTarget::R(reg_pair(r, line, instr)?));
    }
    if let Some(p) = raw.strip_prefix("poly=") {
        return Ok(LoadSaveTarget::Poly(parse_usize(p, line, instr, "poly")?));
    }
    Err(SimError::new(line, instr, ErrorKind::Operand(format!("unsupported load/save target \"{raw}\""))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config() {
        let i = Instruction::parse("config(n=256, q=7681)", 1).unwrap();
        assert!(matches!(i, Instruction::Config { n: 256, q: 7681 }));
    }

    #[test]
    fn parses_counter_adjust() {
        let i = Instruction::parse("c0=c0+5", 2).unwrap();
        assert!(matches!(i, Instruction::CounterAdjust { index: 0, positive: true, val: 5 }));
    }

    #[test]
    fn parses_transform() {
        let i = Instruction::parse("transform(mode=DIF_NTT,poly_dst=16,poly_src=0)", 3).unwrap();
        assert!(matches!(
            i,
            Instruction::Transform { mode: TransformMode::DifNtt, dst: 16, src: 0 }
        ));
    }

    #[test]
    fn parses_short_and_long_sampler_forms() {
        let long = Instruction::parse("rej_sample(prng=SHAKE-128,seed=r0,c0=1,c1=2,poly=0)", 4).unwrap();
        assert!(matches!(long, Instruction::RejSample { form: ShakeForm::Long { c0: 1, c1: 2 }, .. }));
        let short = Instruction::parse("rej_sample(prng=SHAKE-128,seed=r0,poly=0)", 5).unwrap();
        assert!(matches!(short, Instruction::RejSample { form: ShakeForm::Short, .. }));
    }

    #[test]
    fn parses_branch_with_sign() {
        let i = Instruction::parse("if(flag==-1)goto LOOP", 6).unwrap();
        assert!(matches!(i, Instruction::Branch { op: CmpOp::Eq, sign: Some('-'), val: 1, .. }));
    }

    #[test]
    fn unknown_mnemonic_is_program_structure_error() {
        let err = Instruction::parse("frobnicate(poly=0)", 7).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ProgramStructure(_)));
    }
}
