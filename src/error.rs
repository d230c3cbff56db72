//! Diagnostic error types for the simulator.
//!
//! Every fatal condition in the machine surfaces as a [`SimError`] carrying
//! the offending source line and the verbatim instruction text, per the
//! diagnostic policy in spec §7. There is no recoverable/halt split here the
//! way the teacher's `InterpreterError`/`RuntimeError` distinguish panics
//! from halts: this simulator has no call stack to unwind, so every error is
//! simply fatal to the run.

use thiserror::Error;

/// Fatal error raised while preprocessing or executing a program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("[Line {line}] {instruction}\nERROR: {kind}")]
pub struct SimError {
    /// 1-based source line number the offending instruction came from.
    pub line: usize,
    /// Verbatim instruction text (post-whitespace-stripping).
    pub instruction: String,
    /// What rule was violated.
    pub kind: ErrorKind,
}

impl SimError {
    pub fn new(line: usize, instruction: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            line,
            instruction: instruction.into(),
            kind,
        }
    }
}

/// The five error kinds from spec §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported n/q, missing 2n-th root, frequency above Vdd-derived fmax.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Out-of-range index/immediate, bad register name, out-of-set parameter.
    #[error("operand error: {0}")]
    Operand(String),
    /// Two-operand polynomial instruction with same-side operands.
    #[error("partition error: {0}")]
    Partition(String),
    /// Missing `config` as first instruction, unknown mnemonic/label, missing CDT.
    #[error("program structure error: {0}")]
    ProgramStructure(String),
    /// Referenced file missing.
    #[error("environment error: {0}")]
    Environment(String),
}

/// Non-fatal warnings, per spec §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The program was missing a trailing `end`; one was appended.
    MissingEnd,
    /// A filename was missing its expected extension; it was appended.
    MissingExtension { path: String, appended: String },
    /// An output file already exists and will be overwritten.
    OutputExists { path: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::MissingEnd => write!(f, "missing `end`, appended automatically"),
            Warning::MissingExtension { path, appended } => {
                write!(f, "adding extension to filename \"{path}\" -> \"{appended}\"")
            }
            Warning::OutputExists { path } => write!(f, "output file {path} already exists"),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
