use crate::cursor::Cursor;
use crate::prefix::Prefixes;
use crate::{DecodeError, DecodeMode};
use ferrox_types::{SegReg, Width};

/// Decoded ModRM byte. `reg`/`rm` are already REX-extended to 4 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    pub mod_bits: u8,
    pub reg: u8,
    pub rm: u8,
}

impl ModRm {
    /// Register-direct form (`mod == 3`): `rm` names a register.
    #[must_use]
    pub const fn is_reg_form(self) -> bool {
        self.mod_bits == 0b11
    }

    /// The 3-bit reg field without the REX extension, as group dispatch
    /// tables key on it.
    #[must_use]
    pub const fn reg3(self) -> u8 {
        self.reg & 0b111
    }

    #[must_use]
    pub const fn rm3(self) -> u8 {
        self.rm & 0b111
    }
}

/// Effective address size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrSize {
    A16,
    A32,
    A64,
}

impl AddrSize {
    /// Truncate a computed offset to the effective address width.
    #[must_use]
    pub const fn truncate(self, addr: u64) -> u64 {
        match self {
            AddrSize::A16 => addr & 0xFFFF,
            AddrSize::A32 => addr & 0xFFFF_FFFF,
            AddrSize::A64 => addr,
        }
    }
}

/// Parsed memory-operand form: which registers participate and how, before
/// any register value is read. Resolution against live register state is
/// the execution side's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemForm {
    pub addr_size: AddrSize,
    /// 4-bit base register number, if any.
    pub base: Option<u8>,
    /// 4-bit index register number, if any (never the none-encoding).
    pub index: Option<u8>,
    pub scale: u8,
    pub disp: i64,
    /// 64-bit mode `mod=00 rm=101`: displacement is relative to the next
    /// instruction's RIP.
    pub rip_relative: bool,
    /// DS, or SS when the base register is rBP/rSP-like.
    pub default_seg: SegReg,
}

/// Effective address size for this instruction.
#[must_use]
pub fn addr_size(mode: DecodeMode, prefixes: &Prefixes) -> AddrSize {
    match mode {
        DecodeMode::Bits16 => {
            if prefixes.address_size_override {
                AddrSize::A32
            } else {
                AddrSize::A16
            }
        }
        DecodeMode::Bits32 => {
            if prefixes.address_size_override {
                AddrSize::A16
            } else {
                AddrSize::A32
            }
        }
        DecodeMode::Bits64 => {
            if prefixes.address_size_override {
                AddrSize::A32
            } else {
                AddrSize::A64
            }
        }
    }
}

/// Effective operand size for the standard `v`-width operand forms.
#[must_use]
pub fn operand_width(mode: DecodeMode, prefixes: &Prefixes) -> Width {
    match mode {
        DecodeMode::Bits16 => {
            if prefixes.operand_size_override {
                Width::W32
            } else {
                Width::W16
            }
        }
        DecodeMode::Bits32 => {
            if prefixes.operand_size_override {
                Width::W16
            } else {
                Width::W32
            }
        }
        DecodeMode::Bits64 => {
            if prefixes.rex.w {
                Width::W64
            } else if prefixes.operand_size_override {
                Width::W16
            } else {
                Width::W32
            }
        }
    }
}

/// Parse a ModRM byte and, for memory forms, the trailing SIB byte and
/// displacement. Returns the memory form only when `mod != 3`.
pub fn parse_modrm(
    cursor: &mut Cursor<'_>,
    mode: DecodeMode,
    prefixes: &Prefixes,
) -> Result<(ModRm, Option<MemForm>), DecodeError> {
    let byte = cursor.next_u8()?;
    let mod_bits = (byte >> 6) & 0b11;
    let reg = ((byte >> 3) & 0b111) | if prefixes.rex.r { 0b1000 } else { 0 };
    let rm = (byte & 0b111) | if prefixes.rex.b { 0b1000 } else { 0 };
    let modrm = ModRm { mod_bits, reg, rm };

    if modrm.is_reg_form() {
        return Ok((modrm, None));
    }

    let asize = addr_size(mode, prefixes);
    let mem = match asize {
        AddrSize::A16 => parse_mem16(cursor, modrm)?,
        AddrSize::A32 | AddrSize::A64 => parse_mem_sib(cursor, mode, prefixes, modrm, asize)?,
    };
    Ok((modrm, Some(mem)))
}

fn parse_mem_sib(
    cursor: &mut Cursor<'_>,
    mode: DecodeMode,
    prefixes: &Prefixes,
    modrm: ModRm,
    asize: AddrSize,
) -> Result<MemForm, DecodeError> {
    let mut base: Option<u8> = None;
    let mut index: Option<u8> = None;
    let mut scale = 1u8;
    let mut disp = 0i64;
    let mut rip_relative = false;

    if modrm.rm3() == 0b100 {
        let sib = cursor.next_u8()?;
        let scale_bits = (sib >> 6) & 0b11;
        let index_code = ((sib >> 3) & 0b111) | if prefixes.rex.x { 0b1000 } else { 0 };
        let base_code = (sib & 0b111) | if prefixes.rex.b { 0b1000 } else { 0 };

        scale = 1u8 << scale_bits;
        // Index encoding 4 means "no index"; REX.X makes 12 (r12) usable.
        if index_code != 0b100 {
            index = Some(index_code);
        }
        if (base_code & 0b111) == 0b101 && modrm.mod_bits == 0b00 {
            // No base register, disp32 follows.
            disp = cursor.next_i32()? as i64;
        } else {
            base = Some(base_code);
        }
    } else if modrm.rm3() == 0b101 && modrm.mod_bits == 0b00 {
        disp = cursor.next_i32()? as i64;
        if mode == DecodeMode::Bits64 {
            rip_relative = true;
        }
        // In 32-bit addressing this is absolute disp32.
    } else {
        base = Some(modrm.rm);
    }

    match modrm.mod_bits {
        0b00 => {}
        0b01 => disp = disp.wrapping_add(cursor.next_i8()? as i64),
        0b10 => disp = disp.wrapping_add(cursor.next_i32()? as i64),
        _ => unreachable!(),
    }

    // rBP/rSP-based forms default to the stack segment.
    let default_seg = match base.map(|b| b & 0b111) {
        Some(0b100) | Some(0b101) => SegReg::Ss,
        _ => SegReg::Ds,
    };

    Ok(MemForm {
        addr_size: asize,
        base,
        index,
        scale,
        disp,
        rip_relative,
        default_seg,
    })
}

fn parse_mem16(cursor: &mut Cursor<'_>, modrm: ModRm) -> Result<MemForm, DecodeError> {
    // Classic 16-bit addressing table: bx+si, bx+di, bp+si, bp+di, si, di,
    // bp (or disp16 when mod=0), bx.
    const BX: u8 = 3;
    const BP: u8 = 5;
    const SI: u8 = 6;
    const DI: u8 = 7;

    let (mut base, index) = match modrm.rm3() {
        0 => (Some(BX), Some(SI)),
        1 => (Some(BX), Some(DI)),
        2 => (Some(BP), Some(SI)),
        3 => (Some(BP), Some(DI)),
        4 => (Some(SI), None),
        5 => (Some(DI), None),
        6 => (Some(BP), None),
        _ => (Some(BX), None),
    };

    let disp = match modrm.mod_bits {
        0b00 => {
            if modrm.rm3() == 6 {
                base = None;
                cursor.next_u16()? as i64
            } else {
                0
            }
        }
        0b01 => cursor.next_i8()? as i64,
        _ => cursor.next_u16()? as i16 as i64,
    };

    let default_seg = if base == Some(BP) { SegReg::Ss } else { SegReg::Ds };

    Ok(MemForm {
        addr_size: AddrSize::A16,
        base,
        index,
        scale: 1,
        disp,
        rip_relative: false,
        default_seg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::Rex;

    fn parse64(bytes: &[u8], rex: Rex) -> (ModRm, Option<MemForm>, usize) {
        let mut cursor = Cursor::new(bytes);
        let prefixes = Prefixes {
            rex,
            ..Prefixes::default()
        };
        let (modrm, mem) = parse_modrm(&mut cursor, DecodeMode::Bits64, &prefixes).unwrap();
        (modrm, mem, cursor.len())
    }

    #[test]
    fn register_form_consumes_only_the_modrm_byte() {
        let (modrm, mem, used) = parse64(&[0xC1], Rex::none());
        assert!(modrm.is_reg_form());
        assert_eq!(modrm.reg, 0);
        assert_eq!(modrm.rm, 1);
        assert!(mem.is_none());
        assert_eq!(used, 1);
    }

    #[test]
    fn rip_relative_form_in_64bit_mode() {
        // modrm 05 disp32
        let (_, mem, used) = parse64(&[0x05, 0x78, 0x56, 0x34, 0x12], Rex::none());
        let mem = mem.unwrap();
        assert!(mem.rip_relative);
        assert_eq!(mem.base, None);
        assert_eq!(mem.disp, 0x12345678);
        assert_eq!(used, 5);
    }

    #[test]
    fn sib_with_scaled_index_and_disp32() {
        // modrm 84, sib 8B (scale=4, index=rcx, base=rbx), disp32
        let (_, mem, used) = parse64(&[0x84, 0x8B, 0x78, 0x56, 0x34, 0x12], Rex::none());
        let mem = mem.unwrap();
        assert_eq!(mem.base, Some(3));
        assert_eq!(mem.index, Some(1));
        assert_eq!(mem.scale, 4);
        assert_eq!(mem.disp, 0x12345678);
        assert_eq!(used, 6);
    }

    #[test]
    fn rex_x_makes_r12_usable_as_index() {
        // Without REX.X, index encoding 4 means "no index".
        let (_, mem, _) = parse64(&[0x04, 0xA3], Rex::none());
        assert_eq!(mem.unwrap().index, None);

        let rex = Rex {
            present: true,
            x: true,
            ..Rex::none()
        };
        let (_, mem, _) = parse64(&[0x04, 0xA3], rex);
        assert_eq!(mem.unwrap().index, Some(12));
    }

    #[test]
    fn rbp_base_defaults_to_stack_segment() {
        // mod=01 rm=101 disp8 => [rbp+disp8]
        let (_, mem, _) = parse64(&[0x45, 0x10], Rex::none());
        let mem = mem.unwrap();
        assert_eq!(mem.base, Some(5));
        assert_eq!(mem.default_seg, SegReg::Ss);
        assert_eq!(mem.disp, 0x10);
    }

    #[test]
    fn sixteen_bit_bp_disp_form() {
        let mut cursor = Cursor::new(&[0x46, 0x20]);
        let prefixes = Prefixes::default();
        let (modrm, mem) = parse_modrm(&mut cursor, DecodeMode::Bits16, &prefixes).unwrap();
        assert_eq!(modrm.mod_bits, 0b01);
        let mem = mem.unwrap();
        assert_eq!(mem.base, Some(5));
        assert_eq!(mem.index, None);
        assert_eq!(mem.disp, 0x20);
        assert_eq!(mem.default_seg, SegReg::Ss);
    }

    #[test]
    fn sixteen_bit_direct_address_form() {
        let mut cursor = Cursor::new(&[0x06, 0x34, 0x12]);
        let prefixes = Prefixes::default();
        let (_, mem) = parse_modrm(&mut cursor, DecodeMode::Bits16, &prefixes).unwrap();
        let mem = mem.unwrap();
        assert_eq!(mem.base, None);
        assert_eq!(mem.disp, 0x1234);
    }
}
