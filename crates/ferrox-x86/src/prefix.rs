use crate::cursor::Cursor;
use crate::{DecodeError, DecodeMode};
use ferrox_types::SegReg;

/// REX prefix fields (64-bit mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rex {
    pub present: bool,
    pub w: bool,
    pub r: bool,
    pub x: bool,
    pub b: bool,
}

impl Rex {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            present: false,
            w: false,
            r: false,
            x: false,
            b: false,
        }
    }

    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        debug_assert!((0x40..=0x4F).contains(&byte));
        Self {
            present: true,
            w: byte & 0x08 != 0,
            r: byte & 0x04 != 0,
            x: byte & 0x02 != 0,
            b: byte & 0x01 != 0,
        }
    }
}

/// Repeat-prefix state; doubles as the mandatory-prefix selector for the
/// SSE opcode space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepPrefix {
    #[default]
    None,
    /// 0xF3.
    Rep,
    /// 0xF2.
    Repne,
}

/// Legacy + REX prefix state for one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prefixes {
    pub segment: Option<SegReg>,
    pub operand_size_override: bool,
    pub address_size_override: bool,
    pub lock: bool,
    pub rep: RepPrefix,
    pub rex: Rex,
}

impl Prefixes {
    /// Column selector for the 4-wide dispatch tables:
    /// 0 = no prefix, 1 = 0x66, 2 = 0xF3, 3 = 0xF2.
    ///
    /// 0xF3/0xF2 take precedence over 0x66 when both are present, matching
    /// how the hardware picks among overloaded SSE encodings.
    #[must_use]
    pub fn index(&self) -> usize {
        match self.rep {
            RepPrefix::Rep => 2,
            RepPrefix::Repne => 3,
            RepPrefix::None => {
                if self.operand_size_override {
                    1
                } else {
                    0
                }
            }
        }
    }
}

/// Consume all legacy and REX prefixes from `cursor`.
///
/// Stops at the first non-prefix byte. A REX byte is only recognized in
/// 64-bit mode and only counts when it immediately precedes the opcode: a
/// legacy prefix after REX cancels it, as on hardware.
pub fn scan_prefixes(cursor: &mut Cursor<'_>, mode: DecodeMode) -> Result<Prefixes, DecodeError> {
    let mut prefixes = Prefixes::default();

    loop {
        let byte = cursor.peek_u8()?;
        match byte {
            0x26 => prefixes.segment = Some(SegReg::Es),
            0x2E => prefixes.segment = Some(SegReg::Cs),
            0x36 => prefixes.segment = Some(SegReg::Ss),
            0x3E => prefixes.segment = Some(SegReg::Ds),
            0x64 => prefixes.segment = Some(SegReg::Fs),
            0x65 => prefixes.segment = Some(SegReg::Gs),
            0x66 => prefixes.operand_size_override = true,
            0x67 => prefixes.address_size_override = true,
            0xF0 => prefixes.lock = true,
            0xF2 => prefixes.rep = RepPrefix::Repne,
            0xF3 => prefixes.rep = RepPrefix::Rep,
            0x40..=0x4F if mode == DecodeMode::Bits64 => {
                cursor.next_u8()?;
                prefixes.rex = Rex::from_byte(byte);
                // REX must be the last prefix; keep scanning so a trailing
                // legacy prefix cancels it.
                continue;
            }
            _ => return Ok(prefixes),
        }
        cursor.next_u8()?;
        // Any legacy prefix after REX invalidates the REX prefix.
        prefixes.rex = Rex::none();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(bytes: &[u8], mode: DecodeMode) -> (Prefixes, usize) {
        let mut cursor = Cursor::new(bytes);
        let p = scan_prefixes(&mut cursor, mode).unwrap();
        (p, cursor.len())
    }

    #[test]
    fn last_segment_override_wins() {
        let (p, used) = scan(&[0x2E, 0x65, 0x8B], DecodeMode::Bits32);
        assert_eq!(p.segment, Some(SegReg::Gs));
        assert_eq!(used, 2);
    }

    #[test]
    fn rep_takes_the_prefix_column_over_operand_size() {
        let (p, _) = scan(&[0x66, 0xF3, 0x0F], DecodeMode::Bits32);
        assert!(p.operand_size_override);
        assert_eq!(p.rep, RepPrefix::Rep);
        assert_eq!(p.index(), 2);
    }

    #[test]
    fn legacy_prefix_after_rex_cancels_it() {
        // 48 66 8B : the 0x66 after REX.W drops the REX prefix entirely.
        let (p, used) = scan(&[0x48, 0x66, 0x8B], DecodeMode::Bits64);
        assert!(!p.rex.present);
        assert!(p.operand_size_override);
        assert_eq!(used, 2);
    }

    #[test]
    fn rex_is_not_a_prefix_outside_64bit_mode() {
        let (p, used) = scan(&[0x48, 0x8B], DecodeMode::Bits32);
        assert!(!p.rex.present);
        assert_eq!(used, 0);
    }
}
