//! Named constants for the architectural state, mirroring the teacher's
//! `consts.rs` style of giving every magic number in the register file a
//! name instead of leaving it as a literal scattered through the decoder.

/// Total coefficient storage across the whole polynomial bank.
pub const POLY_BANK_COEFFS: usize = 8192;

/// Bit width of `reg` and `tmp`.
pub const SCRATCH_BITS: u32 = 24;

/// `2^24`, the modulus scratch registers wrap at.
pub const SCRATCH_MODULUS: u32 = 1 << SCRATCH_BITS;

/// Bit width of `c0` and `c1`.
pub const COUNTER_BITS: u32 = 16;

/// `2^16`, the modulus `c0`/`c1` wrap at.
pub const COUNTER_MODULUS: u32 = 1 << COUNTER_BITS;

/// Byte length of a seed register (r0, r1).
pub const SEED_BYTES: usize = 32;

/// Supported n values (spec §3).
pub const VALID_N: [usize; 6] = [64, 128, 256, 512, 1024, 2048];

/// Supported q values (spec §3).
pub const VALID_Q: [u32; 13] = [
    3329, 7681, 12289, 40961, 65537, 120833, 133121, 184321, 4205569, 4206593, 8058881, 8380417,
    8404993,
];

/// Read cycles charged by host-side `save`/debug readback helpers.
pub const READ_CYCLES: u64 = 2;
/// Write cycles charged by host-side `load`/`random`/debug store helpers.
pub const WRITE_CYCLES: u64 = 2;

/// Valid trinary sample #3 denominators (rho = 1/RHO).
pub const VALID_RHO: [u32; 7] = [2, 4, 8, 16, 32, 64, 128];
