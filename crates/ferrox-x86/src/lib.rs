//! Structural x86/x86-64 instruction decoding.
//!
//! This crate owns the *shape* of instructions (prefix scanning, the
//! instruction-byte cursor, ModRM/SIB/displacement parsing) without
//! touching CPU state. The execution core layers operand resolution and
//! semantics on top of these types.

#![forbid(unsafe_code)]

pub mod cursor;
pub mod modrm;
pub mod prefix;

pub use cursor::Cursor;
pub use modrm::{addr_size, operand_width, parse_modrm, AddrSize, MemForm, ModRm};
pub use prefix::{scan_prefixes, Prefixes, RepPrefix, Rex};

/// Maximum x86 instruction length (architectural limit).
pub const MAX_INST_LEN: usize = 15;

/// Processor decode mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Bits16,
    Bits32,
    Bits64,
}

impl DecodeMode {
    #[must_use]
    pub const fn bitness(self) -> u32 {
        match self {
            DecodeMode::Bits16 => 16,
            DecodeMode::Bits32 => 32,
            DecodeMode::Bits64 => 64,
        }
    }
}

/// Decoder error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte stream ended before the instruction could be fully decoded.
    UnexpectedEof,
    /// The decoded instruction exceeds the architectural 15-byte length limit.
    TooLong,
    /// The instruction is invalid/undefined for the requested mode.
    Invalid,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of instruction bytes"),
            Self::TooLong => write!(f, "instruction exceeds 15-byte length limit"),
            Self::Invalid => write!(f, "invalid instruction"),
        }
    }
}

impl std::error::Error for DecodeError {}
