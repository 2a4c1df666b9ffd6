use bitflags::bitflags;

bitflags! {
    /// RFLAGS register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RFlags: u64 {
        const CF = 1 << 0;
        const PF = 1 << 2;
        const AF = 1 << 4;
        const ZF = 1 << 6;
        const SF = 1 << 7;
        const TF = 1 << 8;
        const IF = 1 << 9;
        const DF = 1 << 10;
        const OF = 1 << 11;
        const IOPL = 3 << 12;
        const NT = 1 << 14;
        const RF = 1 << 16;
        const VM = 1 << 17;
        const AC = 1 << 18;
        const ID = 1 << 21;
    }
}

/// Bit 1 reads as 1 in every mode.
pub const RFLAGS_FIXED_SET: u64 = 1 << 1;

/// The six arithmetic status flags.
pub const RFLAGS_ARITH_MASK: u64 = RFlags::CF.bits()
    | RFlags::PF.bits()
    | RFlags::AF.bits()
    | RFlags::ZF.bits()
    | RFlags::SF.bits()
    | RFlags::OF.bits();

impl RFlags {
    /// Raw value with the fixed bit applied, as the guest observes it.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.bits() | RFLAGS_FIXED_SET
    }

    #[must_use]
    pub fn get(self, flag: RFlags) -> bool {
        self.contains(flag)
    }
}

// MXCSR exception flag bits (sticky status).
pub const MXCSR_IE: u32 = 1 << 0;
pub const MXCSR_DE: u32 = 1 << 1;
pub const MXCSR_ZE: u32 = 1 << 2;
pub const MXCSR_OE: u32 = 1 << 3;
pub const MXCSR_UE: u32 = 1 << 4;
pub const MXCSR_PE: u32 = 1 << 5;
pub const MXCSR_DAZ: u32 = 1 << 6;
// Mask bits: a set mask bit suppresses the corresponding exception.
pub const MXCSR_IM: u32 = 1 << 7;
pub const MXCSR_DM: u32 = 1 << 8;
pub const MXCSR_ZM: u32 = 1 << 9;
pub const MXCSR_OM: u32 = 1 << 10;
pub const MXCSR_UM: u32 = 1 << 11;
pub const MXCSR_PM: u32 = 1 << 12;
pub const MXCSR_RC_MASK: u32 = 3 << 13;
pub const MXCSR_FZ: u32 = 1 << 15;

/// Writable MXCSR bits; writing anything outside this mask is #GP.
pub const MXCSR_WRITE_MASK: u32 = 0xFFFF;

/// Power-on MXCSR value (all exceptions masked).
pub const MXCSR_DEFAULT: u32 = 0x1F80;

/// Exception *status* bits reported by SSE arithmetic.
pub const MXCSR_XCPT_FLAGS: u32 = MXCSR_IE | MXCSR_DE | MXCSR_ZE | MXCSR_OE | MXCSR_UE | MXCSR_PE;

/// True if `mxcsr` has any reported exception whose mask bit is clear.
#[must_use]
pub fn mxcsr_has_unmasked_xcpt(mxcsr: u32) -> bool {
    let flags = mxcsr & MXCSR_XCPT_FLAGS;
    let masks = (mxcsr >> 7) & MXCSR_XCPT_FLAGS;
    flags & !masks != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmasked_exception_detection() {
        // Default: everything masked.
        assert!(!mxcsr_has_unmasked_xcpt(MXCSR_DEFAULT | MXCSR_IE));
        // Unmask invalid-operation, then report it.
        let mxcsr = (MXCSR_DEFAULT & !MXCSR_IM) | MXCSR_IE;
        assert!(mxcsr_has_unmasked_xcpt(mxcsr));
        // A different masked flag does not trip it.
        let mxcsr = (MXCSR_DEFAULT & !MXCSR_IM) | MXCSR_PE;
        assert!(!mxcsr_has_unmasked_xcpt(mxcsr));
    }
}
