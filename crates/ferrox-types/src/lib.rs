//! Shared register/width/condition vocabulary for the CPU core.

#![forbid(unsafe_code)]

use core::fmt;

/// Operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
    W128,
}

impl Width {
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
            Width::W128 => 128,
        }
    }

    #[must_use]
    pub const fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Mask covering the low `bits()` bits of a `u64` lane.
    ///
    /// `W128` operands travel as `u128` and never go through this mask.
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Width::W8 => 0xFF,
            Width::W16 => 0xFFFF,
            Width::W32 => 0xFFFF_FFFF,
            Width::W64 | Width::W128 => u64::MAX,
        }
    }

    #[must_use]
    pub const fn truncate(self, value: u64) -> u64 {
        value & self.mask()
    }

    /// Sign-extend the low `bits()` bits of `value` to 64 bits.
    #[must_use]
    pub const fn sign_extend(self, value: u64) -> u64 {
        match self {
            Width::W8 => value as u8 as i8 as i64 as u64,
            Width::W16 => value as u16 as i16 as i64 as u64,
            Width::W32 => value as u32 as i32 as i64 as u64,
            Width::W64 | Width::W128 => value,
        }
    }

    #[must_use]
    pub const fn sign_bit(self) -> u64 {
        1u64 << (self.bits() - 1)
    }

    #[must_use]
    pub const fn from_bytes(bytes: usize) -> Option<Width> {
        match bytes {
            1 => Some(Width::W8),
            2 => Some(Width::W16),
            4 => Some(Width::W32),
            8 => Some(Width::W64),
            16 => Some(Width::W128),
            _ => None,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// General-purpose register, numbered as the hardware encodes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Gpr {
    /// Decode a 4-bit register number (3-bit + REX extension bit).
    #[must_use]
    pub const fn from_u4(code: u8) -> Option<Gpr> {
        match code {
            0 => Some(Gpr::Rax),
            1 => Some(Gpr::Rcx),
            2 => Some(Gpr::Rdx),
            3 => Some(Gpr::Rbx),
            4 => Some(Gpr::Rsp),
            5 => Some(Gpr::Rbp),
            6 => Some(Gpr::Rsi),
            7 => Some(Gpr::Rdi),
            8 => Some(Gpr::R8),
            9 => Some(Gpr::R9),
            10 => Some(Gpr::R10),
            11 => Some(Gpr::R11),
            12 => Some(Gpr::R12),
            13 => Some(Gpr::R13),
            14 => Some(Gpr::R14),
            15 => Some(Gpr::R15),
            _ => None,
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gpr::Rax => "rax",
            Gpr::Rcx => "rcx",
            Gpr::Rdx => "rdx",
            Gpr::Rbx => "rbx",
            Gpr::Rsp => "rsp",
            Gpr::Rbp => "rbp",
            Gpr::Rsi => "rsi",
            Gpr::Rdi => "rdi",
            Gpr::R8 => "r8",
            Gpr::R9 => "r9",
            Gpr::R10 => "r10",
            Gpr::R11 => "r11",
            Gpr::R12 => "r12",
            Gpr::R13 => "r13",
            Gpr::R14 => "r14",
            Gpr::R15 => "r15",
        };
        f.write_str(s)
    }
}

/// Segment register, in the order the hardware encodes them (sreg field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

impl SegReg {
    #[must_use]
    pub const fn from_encoding(code: u8) -> Option<SegReg> {
        match code {
            0 => Some(SegReg::Es),
            1 => Some(SegReg::Cs),
            2 => Some(SegReg::Ss),
            3 => Some(SegReg::Ds),
            4 => Some(SegReg::Fs),
            5 => Some(SegReg::Gs),
            _ => None,
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SegReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SegReg::Es => "es",
            SegReg::Cs => "cs",
            SegReg::Ss => "ss",
            SegReg::Ds => "ds",
            SegReg::Fs => "fs",
            SegReg::Gs => "gs",
        };
        f.write_str(s)
    }
}

/// The 16 x86 condition codes, as encoded in the low nibble of
/// `Jcc`/`SETcc`/`CMOVcc` opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    /// OF set.
    O = 0x0,
    /// OF clear.
    No = 0x1,
    /// CF set (B/NAE).
    B = 0x2,
    /// CF clear (NB/AE).
    Nb = 0x3,
    /// ZF set (E).
    Z = 0x4,
    /// ZF clear (NE).
    Nz = 0x5,
    /// CF or ZF set (NA).
    Be = 0x6,
    /// CF and ZF clear (A).
    Nbe = 0x7,
    /// SF set.
    S = 0x8,
    /// SF clear.
    Ns = 0x9,
    /// PF set.
    P = 0xA,
    /// PF clear.
    Np = 0xB,
    /// SF != OF (NGE).
    L = 0xC,
    /// SF == OF (GE).
    Nl = 0xD,
    /// ZF set or SF != OF (NG).
    Le = 0xE,
    /// ZF clear and SF == OF (G).
    Nle = 0xF,
}

impl Cond {
    #[must_use]
    pub const fn from_cc(cc: u8) -> Option<Cond> {
        match cc {
            0x0 => Some(Cond::O),
            0x1 => Some(Cond::No),
            0x2 => Some(Cond::B),
            0x3 => Some(Cond::Nb),
            0x4 => Some(Cond::Z),
            0x5 => Some(Cond::Nz),
            0x6 => Some(Cond::Be),
            0x7 => Some(Cond::Nbe),
            0x8 => Some(Cond::S),
            0x9 => Some(Cond::Ns),
            0xA => Some(Cond::P),
            0xB => Some(Cond::Np),
            0xC => Some(Cond::L),
            0xD => Some(Cond::Nl),
            0xE => Some(Cond::Le),
            0xF => Some(Cond::Nle),
            _ => None,
        }
    }

    /// Evaluate against raw RFLAGS bits.
    #[must_use]
    pub const fn eval(self, rflags: u64) -> bool {
        const CF: u64 = 1 << 0;
        const PF: u64 = 1 << 2;
        const ZF: u64 = 1 << 6;
        const SF: u64 = 1 << 7;
        const OF: u64 = 1 << 11;

        let cf = rflags & CF != 0;
        let pf = rflags & PF != 0;
        let zf = rflags & ZF != 0;
        let sf = rflags & SF != 0;
        let of = rflags & OF != 0;

        match self {
            Cond::O => of,
            Cond::No => !of,
            Cond::B => cf,
            Cond::Nb => !cf,
            Cond::Z => zf,
            Cond::Nz => !zf,
            Cond::Be => cf || zf,
            Cond::Nbe => !cf && !zf,
            Cond::S => sf,
            Cond::Ns => !sf,
            Cond::P => pf,
            Cond::Np => !pf,
            Cond::L => sf != of,
            Cond::Nl => sf == of,
            Cond::Le => zf || (sf != of),
            Cond::Nle => !zf && (sf == of),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_truncate_and_sign_extend() {
        assert_eq!(Width::W8.truncate(0x1FF), 0xFF);
        assert_eq!(Width::W16.sign_extend(0x8000), 0xFFFF_FFFF_FFFF_8000);
        assert_eq!(Width::W32.sign_extend(0x7FFF_FFFF), 0x7FFF_FFFF);
        assert_eq!(Width::W64.truncate(u64::MAX), u64::MAX);
    }

    #[test]
    fn gpr_round_trips_through_encoding() {
        for code in 0..16u8 {
            let gpr = Gpr::from_u4(code).unwrap();
            assert_eq!(gpr.index(), code as usize);
        }
        assert!(Gpr::from_u4(16).is_none());
    }

    #[test]
    fn cond_eval_matches_documented_predicates() {
        const ZF: u64 = 1 << 6;
        const SF: u64 = 1 << 7;
        const OF: u64 = 1 << 11;

        assert!(Cond::Z.eval(ZF));
        assert!(!Cond::Nz.eval(ZF));
        // L is SF != OF.
        assert!(Cond::L.eval(SF));
        assert!(Cond::L.eval(OF));
        assert!(!Cond::L.eval(SF | OF));
        // NLE is !ZF && SF == OF.
        assert!(Cond::Nle.eval(0));
        assert!(!Cond::Nle.eval(ZF));
        assert!(Cond::Nle.eval(SF | OF));
    }
}
