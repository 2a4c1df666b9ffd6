//! The three-byte (0x0F 0x38 / 0x0F 0x3A) escape maps.
//!
//! Dispatch is chained exactly like the two-byte map: one more opcode
//! byte, then a dense 256×4 lookup. The instruction content of these maps
//! lives in sibling table modules in the full system; here every cell is
//! a reserved encoding, consuming the ModRM suffix (plus the imm8 the
//! 0x3A map always carries) before raising the invalid-opcode fault.

use super::decode::Ctx;
use super::two_byte::{op_invalid_need_rm, op_invalid_need_rm_imm8};
use super::{OpHandler, OpResult};

static THREE_BYTE_38_MAP: [OpHandler; 1024] = [op_invalid_need_rm; 1024];
static THREE_BYTE_3A_MAP: [OpHandler; 1024] = [op_invalid_need_rm_imm8; 1024];

pub(crate) fn dispatch_38(ctx: &mut Ctx<'_>) -> OpResult {
    let opcode = ctx.next_u8()?;
    THREE_BYTE_38_MAP[(opcode as usize) * 4 + ctx.prefixes.index()](ctx)
}

pub(crate) fn dispatch_3a(ctx: &mut Ctx<'_>) -> OpResult {
    let opcode = ctx.next_u8()?;
    THREE_BYTE_3A_MAP[(opcode as usize) * 4 + ctx.prefixes.index()](ctx)
}
