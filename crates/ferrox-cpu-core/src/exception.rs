use thiserror::Error;

/// Architectural faults the core can raise.
///
/// These are outcomes delivered to the guest's own fault handling, not
/// internal software errors. Delivery mechanics (vector dispatch, stack
/// switching) belong to the embedding runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Exception {
    #[error("divide error (#DE)")]
    DivideError,
    #[error("invalid opcode (#UD)")]
    InvalidOpcode,
    #[error("device not available (#NM)")]
    DeviceNotAvailable,
    #[error("general protection fault (#GP({0:#x}))")]
    GeneralProtection(u32),
    #[error("page fault (#PF) at {addr:#x} (code {code:#x})")]
    PageFault { addr: u64, code: u32 },
    #[error("x87 floating-point exception (#MF)")]
    X87FloatingPoint,
    #[error("alignment check (#AC)")]
    AlignmentCheck,
    #[error("SIMD floating-point exception (#XM)")]
    SimdFloatingPoint,
}

impl Exception {
    /// `#GP(0)`, the overwhelmingly common error-code case.
    #[must_use]
    pub const fn gp0() -> Self {
        Exception::GeneralProtection(0)
    }

    #[must_use]
    pub const fn vector(&self) -> u8 {
        match self {
            Exception::DivideError => 0,
            Exception::InvalidOpcode => 6,
            Exception::DeviceNotAvailable => 7,
            Exception::GeneralProtection(_) => 13,
            Exception::PageFault { .. } => 14,
            Exception::X87FloatingPoint => 16,
            Exception::AlignmentCheck => 17,
            Exception::SimdFloatingPoint => 19,
        }
    }

    #[must_use]
    pub const fn error_code(&self) -> Option<u32> {
        match self {
            Exception::GeneralProtection(code) => Some(*code),
            Exception::PageFault { code, .. } => Some(*code),
            Exception::AlignmentCheck => Some(0),
            _ => None,
        }
    }
}

/// Interpreter-level error: an architectural fault, or an encoding the full
/// system defines but this core does not build. The latter is reported
/// explicitly so it can never be mistaken for a documented NOP or for #UD.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmuError {
    #[error(transparent)]
    Fault(#[from] Exception),
    #[error("instruction recognized but not implemented: {0}")]
    Unimplemented(&'static str),
}

impl EmuError {
    /// The architectural fault, if this error is one.
    #[must_use]
    pub fn fault(&self) -> Option<&Exception> {
        match self {
            EmuError::Fault(e) => Some(e),
            EmuError::Unimplemented(_) => None,
        }
    }
}

impl From<ferrox_x86::DecodeError> for EmuError {
    fn from(err: ferrox_x86::DecodeError) -> Self {
        match err {
            // Instructions over the architectural length limit raise #GP(0).
            ferrox_x86::DecodeError::TooLong => EmuError::Fault(Exception::gp0()),
            ferrox_x86::DecodeError::UnexpectedEof | ferrox_x86::DecodeError::Invalid => {
                EmuError::Fault(Exception::InvalidOpcode)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_match_the_architecture() {
        assert_eq!(Exception::DivideError.vector(), 0);
        assert_eq!(Exception::InvalidOpcode.vector(), 6);
        assert_eq!(Exception::DeviceNotAvailable.vector(), 7);
        assert_eq!(Exception::gp0().vector(), 13);
        assert_eq!(Exception::SimdFloatingPoint.vector(), 19);
    }

    #[test]
    fn error_codes_only_where_defined() {
        assert_eq!(Exception::gp0().error_code(), Some(0));
        assert_eq!(Exception::InvalidOpcode.error_code(), None);
    }
}
