//! Core results and error types

use crate::Opcode;
use thiserror::Error;

/// Core error type encompassing all core module errors.
///
/// Format errors abort the pipeline before any rewrite runs. The internal consistency
/// variants (`DanglingTarget`, `MissingAddressMapping`, `InvalidBlockStructure`) point at a
/// bug in a rewrite rather than at the input.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte at `pc` is not a NeoVM opcode.
    #[error("unknown opcode 0x{byte:02x} at {pc}")]
    UnknownOpcode {
        /// Address of the offending byte.
        pc: usize,
        /// The byte value.
        byte: u8,
    },

    /// The script ends before the operand of the instruction at `pc` is complete.
    #[error("{op} at {pc} needs {needed} operand bytes but only {remaining} remain")]
    TruncatedOperand {
        pc: usize,
        op: Opcode,
        needed: usize,
        remaining: usize,
    },

    /// An operand does not fit the layout its opcode requires.
    #[error("invalid operand for {op} at {pc}: {reason}")]
    InvalidOperand {
        pc: usize,
        op: Opcode,
        reason: String,
    },

    /// A jump, call, pointer or try handler resolves outside the script or into the middle
    /// of an instruction.
    #[error("{op} at {pc} targets {target}, which is not an instruction boundary")]
    InvalidJumpTarget {
        pc: usize,
        op: Opcode,
        target: i64,
    },

    /// A method entry point does not start an instruction.
    #[error("entry point {0} is not an instruction boundary")]
    InvalidEntryPoint(usize),

    /// The NEF container is malformed.
    #[error("invalid NEF file: {0}")]
    InvalidNef(String),

    /// The embedded NEF checksum does not match the recomputed one.
    #[error("NEF checksum mismatch: embedded 0x{embedded:08x}, computed 0x{computed:08x}")]
    ChecksumMismatch { embedded: u32, computed: u32 },

    /// A debug-info range or sequence point string is malformed.
    #[error("invalid debug info: {0}")]
    InvalidDebugInfo(String),

    /// Manifest or debug-info JSON could not be parsed or produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The `.nefdbgnfo` archive could not be read or written.
    #[error("debug info archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Failed to decode hex string.
    #[error("hex decode failed: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Failed to read or write an artifact.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A rewrite references an instruction that is no longer part of the program.
    #[error("instruction #{0} is referenced but was removed from the program")]
    DanglingTarget(usize),

    /// An old address has no surviving instruction to map onto.
    #[error("no relocated address for old address {0}")]
    MissingAddressMapping(usize),

    /// Block structure is malformed or inconsistent.
    #[error("invalid block structure: {0}")]
    InvalidBlockStructure(String),
}

impl Error {
    /// True for errors caused by malformed input rather than by a faulty rewrite.
    pub fn is_format_error(&self) -> bool {
        !matches!(
            self,
            Error::DanglingTarget(_)
                | Error::MissingAddressMapping(_)
                | Error::InvalidBlockStructure(_)
                | Error::Io(_)
        )
    }
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
