//! One-byte ALU rows, the immediate groups, and the unary group.

use super::decode::Ctx;
use super::{Exec, OpResult};
use crate::alu;
use crate::alu::ShiftOp;
use crate::exception::{EmuError, Exception};
use crate::flags::RFlags;
use ferrox_types::{Gpr, Width};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    fn from_group1(reg: u8) -> AluOp {
        match reg & 0x7 {
            0 => AluOp::Add,
            1 => AluOp::Or,
            2 => AluOp::Adc,
            3 => AluOp::Sbb,
            4 => AluOp::And,
            5 => AluOp::Sub,
            6 => AluOp::Xor,
            _ => AluOp::Cmp,
        }
    }

    fn writes_back(self) -> bool {
        self != AluOp::Cmp
    }
}

/// Value-only variant for the locked read-modify-write closure; flags are
/// recomputed afterwards from the observed old value.
fn alu_value(op: AluOp, dst: u64, src: u64, cf_in: bool, width: Width) -> u64 {
    let mask = width.mask();
    match op {
        AluOp::Add => dst.wrapping_add(src) & mask,
        AluOp::Adc => dst.wrapping_add(src).wrapping_add(cf_in as u64) & mask,
        AluOp::Sub | AluOp::Cmp => dst.wrapping_sub(src) & mask,
        AluOp::Sbb => dst.wrapping_sub(src).wrapping_sub(cf_in as u64) & mask,
        AluOp::And => dst & src & mask,
        AluOp::Or => (dst | src) & mask,
        AluOp::Xor => (dst ^ src) & mask,
    }
}

fn alu_apply(rflags: &mut RFlags, op: AluOp, dst: u64, src: u64, width: Width) -> u64 {
    let cf = rflags.get(RFlags::CF);
    match op {
        AluOp::Add => alu::add_with_flags(rflags, dst, src, false, width),
        AluOp::Adc => alu::add_with_flags(rflags, dst, src, cf, width),
        AluOp::Sub | AluOp::Cmp => alu::sub_with_flags(rflags, dst, src, false, width),
        AluOp::Sbb => alu::sub_with_flags(rflags, dst, src, cf, width),
        AluOp::And => alu::logic_with_flags(rflags, dst & src, width),
        AluOp::Or => alu::logic_with_flags(rflags, dst | src, width),
        AluOp::Xor => alu::logic_with_flags(rflags, dst ^ src, width),
    }
}

/// Shared skeleton for the `op r/m, src` direction, locked or plain.
fn alu_with_decoded(
    ctx: &mut Ctx<'_>,
    op: AluOp,
    width: Width,
    modrm: ferrox_x86::ModRm,
    mem: &Option<ferrox_x86::MemForm>,
    src: u64,
) -> OpResult {
    if op == AluOp::Cmp {
        ctx.reject_lock()?;
    } else {
        ctx.lock_needs_mem(mem)?;
    }

    match mem {
        None => {
            let dst = ctx.gpr(modrm.rm, width);
            let res = alu_apply(&mut ctx.state.rflags, op, dst, src, width);
            if op.writes_back() {
                ctx.set_gpr(modrm.rm, width, res);
            }
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            if ctx.prefixes.lock && op.writes_back() {
                let cf = ctx.state.rflags.get(RFlags::CF);
                let old = ctx
                    .bus
                    .atomic_rmw(addr, width, &mut |old| alu_value(op, old, src, cf, width))?;
                let _ = alu_apply(&mut ctx.state.rflags, op, old, src, width);
            } else {
                let dst = ctx.read_mem(addr, width)?;
                let mut fl = ctx.state.rflags;
                let res = alu_apply(&mut fl, op, dst, src, width);
                if op.writes_back() {
                    ctx.write_mem(addr, width, res)?;
                }
                ctx.state.rflags = fl;
            }
        }
    }
    Ok(Exec::Continue)
}

/// `op r/m8, r8` and `op r/m, r` forms.
fn alu_rm_reg(ctx: &mut Ctx<'_>, op: AluOp, width: Width) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.gpr(modrm.reg, width);
    alu_with_decoded(ctx, op, width, modrm, &mem, src)
}

/// `op r8, r/m8` and `op r, r/m` forms (register destination).
fn alu_reg_rm(ctx: &mut Ctx<'_>, op: AluOp, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    let dst = ctx.gpr(modrm.reg, width);
    let res = alu_apply(&mut ctx.state.rflags, op, dst, src, width);
    if op.writes_back() {
        ctx.set_gpr(modrm.reg, width, res);
    }
    Ok(Exec::Continue)
}

/// `op AL, imm8` / `op rAX, immz` forms.
fn alu_acc_imm(ctx: &mut Ctx<'_>, op: AluOp, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let src = if width == Width::W8 {
        ctx.next_u8()? as u64
    } else {
        ctx.imm_z(width)?
    };
    let dst = ctx.state.gpr(0, width, ctx.prefixes.rex.present);
    let res = alu_apply(&mut ctx.state.rflags, op, dst, src, width);
    if op.writes_back() {
        ctx.set_gpr(0, width, res);
    }
    Ok(Exec::Continue)
}

macro_rules! alu_row {
    ($op:expr, $eb_gb:ident, $ev_gv:ident, $gb_eb:ident, $gv_ev:ident, $al_ib:ident, $rax_iz:ident) => {
        pub(crate) fn $eb_gb(ctx: &mut Ctx<'_>) -> OpResult {
            alu_rm_reg(ctx, $op, Width::W8)
        }
        pub(crate) fn $ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
            let width = ctx.op_width();
            alu_rm_reg(ctx, $op, width)
        }
        pub(crate) fn $gb_eb(ctx: &mut Ctx<'_>) -> OpResult {
            alu_reg_rm(ctx, $op, Width::W8)
        }
        pub(crate) fn $gv_ev(ctx: &mut Ctx<'_>) -> OpResult {
            let width = ctx.op_width();
            alu_reg_rm(ctx, $op, width)
        }
        pub(crate) fn $al_ib(ctx: &mut Ctx<'_>) -> OpResult {
            alu_acc_imm(ctx, $op, Width::W8)
        }
        pub(crate) fn $rax_iz(ctx: &mut Ctx<'_>) -> OpResult {
            let width = ctx.op_width();
            alu_acc_imm(ctx, $op, width)
        }
    };
}

alu_row!(AluOp::Add, op_add_eb_gb, op_add_ev_gv, op_add_gb_eb, op_add_gv_ev, op_add_al_ib, op_add_rax_iz);
alu_row!(AluOp::Or, op_or_eb_gb, op_or_ev_gv, op_or_gb_eb, op_or_gv_ev, op_or_al_ib, op_or_rax_iz);
alu_row!(AluOp::Adc, op_adc_eb_gb, op_adc_ev_gv, op_adc_gb_eb, op_adc_gv_ev, op_adc_al_ib, op_adc_rax_iz);
alu_row!(AluOp::Sbb, op_sbb_eb_gb, op_sbb_ev_gv, op_sbb_gb_eb, op_sbb_gv_ev, op_sbb_al_ib, op_sbb_rax_iz);
alu_row!(AluOp::And, op_and_eb_gb, op_and_ev_gv, op_and_gb_eb, op_and_gv_ev, op_and_al_ib, op_and_rax_iz);
alu_row!(AluOp::Sub, op_sub_eb_gb, op_sub_ev_gv, op_sub_gb_eb, op_sub_gv_ev, op_sub_al_ib, op_sub_rax_iz);
alu_row!(AluOp::Xor, op_xor_eb_gb, op_xor_ev_gv, op_xor_gb_eb, op_xor_gv_ev, op_xor_al_ib, op_xor_rax_iz);
alu_row!(AluOp::Cmp, op_cmp_eb_gb, op_cmp_ev_gv, op_cmp_gb_eb, op_cmp_gv_ev, op_cmp_al_ib, op_cmp_rax_iz);

// ---- Group 1: 0x80/0x81/0x82/0x83 -----------------------------------

fn grp1(ctx: &mut Ctx<'_>, width: Width, imm_is_sign_ext_byte: bool) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    let op = AluOp::from_group1(modrm.reg3());
    let src = if width == Width::W8 {
        ctx.next_u8()? as u64
    } else if imm_is_sign_ext_byte {
        width.truncate(ctx.next_i8()? as i64 as u64)
    } else {
        ctx.imm_z(width)?
    };
    alu_with_decoded(ctx, op, width, modrm, &mem, src)
}

pub(crate) fn op_grp1_eb_ib(ctx: &mut Ctx<'_>) -> OpResult {
    grp1(ctx, Width::W8, false)
}

/// 0x82 is a legacy alias of 0x80; it does not exist in 64-bit mode.
pub(crate) fn op_grp1_eb_ib_alias(ctx: &mut Ctx<'_>) -> OpResult {
    if ctx.mode == ferrox_x86::DecodeMode::Bits64 {
        return Err(Exception::InvalidOpcode.into());
    }
    grp1(ctx, Width::W8, false)
}

pub(crate) fn op_grp1_ev_iz(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    grp1(ctx, width, false)
}

pub(crate) fn op_grp1_ev_ib(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    grp1(ctx, width, true)
}

// ---- TEST ------------------------------------------------------------

fn test_rm_reg(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.gpr(modrm.reg, width);
    let dst = ctx.fetch_rm(modrm, &mem, width)?;
    let _ = alu::logic_with_flags(&mut ctx.state.rflags, dst & src, width);
    Ok(Exec::Continue)
}

pub(crate) fn op_test_eb_gb(ctx: &mut Ctx<'_>) -> OpResult {
    test_rm_reg(ctx, Width::W8)
}

pub(crate) fn op_test_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    test_rm_reg(ctx, width)
}

pub(crate) fn op_test_al_ib(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let imm = ctx.next_u8()? as u64;
    let dst = ctx.gpr(0, Width::W8);
    let _ = alu::logic_with_flags(&mut ctx.state.rflags, dst & imm, Width::W8);
    Ok(Exec::Continue)
}

pub(crate) fn op_test_rax_iz(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let imm = ctx.imm_z(width)?;
    let dst = ctx.gpr(0, width);
    let _ = alu::logic_with_flags(&mut ctx.state.rflags, dst & imm, width);
    Ok(Exec::Continue)
}

// ---- Group 2: shifts and rotates ------------------------------------

fn grp2(ctx: &mut Ctx<'_>, width: Width, count: Grp2Count) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let op = match modrm.reg3() {
        0 => ShiftOp::Rol,
        1 => ShiftOp::Ror,
        2 => ShiftOp::Rcl,
        3 => ShiftOp::Rcr,
        // /6 is the undocumented SHL alias.
        4 | 6 => ShiftOp::Shl,
        5 => ShiftOp::Shr,
        _ => ShiftOp::Sar,
    };
    let count = match count {
        Grp2Count::One => 1,
        Grp2Count::Cl => ctx.gpr(1, Width::W8) as u8,
        Grp2Count::Imm8 => ctx.next_u8()?,
    };

    let dst = ctx.fetch_rm(modrm, &mem, width)?;
    let mut fl = ctx.state.rflags;
    let res = alu::shift_with_flags(&mut fl, op, dst, count, width);
    ctx.store_rm(modrm, &mem, width, res)?;
    ctx.state.rflags = fl;
    Ok(Exec::Continue)
}

enum Grp2Count {
    One,
    Cl,
    Imm8,
}

pub(crate) fn op_grp2_eb_ib(ctx: &mut Ctx<'_>) -> OpResult {
    grp2(ctx, Width::W8, Grp2Count::Imm8)
}

pub(crate) fn op_grp2_ev_ib(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    grp2(ctx, width, Grp2Count::Imm8)
}

pub(crate) fn op_grp2_eb_1(ctx: &mut Ctx<'_>) -> OpResult {
    grp2(ctx, Width::W8, Grp2Count::One)
}

pub(crate) fn op_grp2_ev_1(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    grp2(ctx, width, Grp2Count::One)
}

pub(crate) fn op_grp2_eb_cl(ctx: &mut Ctx<'_>) -> OpResult {
    grp2(ctx, Width::W8, Grp2Count::Cl)
}

pub(crate) fn op_grp2_ev_cl(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    grp2(ctx, width, Grp2Count::Cl)
}

// ---- Group 3: 0xF6/0xF7 ---------------------------------------------

fn grp3(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    match modrm.reg3() {
        0 | 1 => {
            // TEST r/m, imm
            ctx.reject_lock()?;
            let imm = if width == Width::W8 {
                ctx.next_u8()? as u64
            } else {
                ctx.imm_z(width)?
            };
            let dst = ctx.fetch_rm(modrm, &mem, width)?;
            let _ = alu::logic_with_flags(&mut ctx.state.rflags, dst & imm, width);
            Ok(Exec::Continue)
        }
        2 => {
            // NOT: no flags.
            ctx.lock_needs_mem(&mem)?;
            match &mem {
                None => {
                    let v = ctx.gpr(modrm.rm, width);
                    ctx.set_gpr(modrm.rm, width, !v);
                }
                Some(m) => {
                    let addr = ctx.effective_addr(m, 0);
                    if ctx.prefixes.lock {
                        ctx.bus.atomic_rmw(addr, width, &mut |old| !old)?;
                    } else {
                        let v = ctx.read_mem(addr, width)?;
                        ctx.write_mem(addr, width, width.truncate(!v))?;
                    }
                }
            }
            Ok(Exec::Continue)
        }
        3 => {
            // NEG = SUB 0, r/m.
            ctx.lock_needs_mem(&mem)?;
            match &mem {
                None => {
                    let v = ctx.gpr(modrm.rm, width);
                    let res = alu::sub_with_flags(&mut ctx.state.rflags, 0, v, false, width);
                    ctx.set_gpr(modrm.rm, width, res);
                }
                Some(m) => {
                    let addr = ctx.effective_addr(m, 0);
                    if ctx.prefixes.lock {
                        let old =
                            ctx.bus
                                .atomic_rmw(addr, width, &mut |old| 0u64.wrapping_sub(old))?;
                        let _ = alu::sub_with_flags(&mut ctx.state.rflags, 0, old, false, width);
                    } else {
                        let v = ctx.read_mem(addr, width)?;
                        let mut fl = ctx.state.rflags;
                        let res = alu::sub_with_flags(&mut fl, 0, v, false, width);
                        ctx.write_mem(addr, width, res)?;
                        ctx.state.rflags = fl;
                    }
                }
            }
            Ok(Exec::Continue)
        }
        4 | 5 => {
            // MUL / IMUL one-operand.
            ctx.reject_lock()?;
            let src = ctx.fetch_rm(modrm, &mem, width)?;
            let acc = ctx.gpr(0, width);
            let (lo, hi) = if modrm.reg3() == 4 {
                alu::mul_wide_with_flags(&mut ctx.state.rflags, acc, src, width)
            } else {
                alu::imul_wide_with_flags(&mut ctx.state.rflags, acc, src, width)
            };
            if width == Width::W8 {
                // AX = AL * src.
                ctx.state.set_gpr16(Gpr::Rax, (hi << 8 | lo) as u16);
            } else {
                ctx.set_gpr(0, width, lo);
                ctx.set_gpr(2, width, hi);
            }
            Ok(Exec::Continue)
        }
        _ => {
            // DIV / IDIV.
            ctx.reject_lock()?;
            let src = ctx.fetch_rm(modrm, &mem, width)?;
            let signed = modrm.reg3() == 7;
            let (lo, hi) = if width == Width::W8 {
                let ax = ctx.state.gpr16(Gpr::Rax) as u64;
                (ax & 0xFF, ax >> 8)
            } else {
                (ctx.gpr(0, width), ctx.gpr(2, width))
            };
            let result = if signed {
                alu::idiv_wide(lo, hi, src, width)
            } else {
                alu::div_wide(lo, hi, src, width)
            };
            let (quot, rem) = result.ok_or(EmuError::Fault(Exception::DivideError))?;
            if width == Width::W8 {
                ctx.state
                    .set_gpr16(Gpr::Rax, ((rem as u16) << 8) | quot as u16 & 0xFF);
            } else {
                ctx.set_gpr(0, width, quot);
                ctx.set_gpr(2, width, rem);
            }
            Ok(Exec::Continue)
        }
    }
}

pub(crate) fn op_grp3_eb(ctx: &mut Ctx<'_>) -> OpResult {
    grp3(ctx, Width::W8)
}

pub(crate) fn op_grp3_ev(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    grp3(ctx, width)
}

// ---- Group 4/5: 0xFE/0xFF -------------------------------------------

fn inc_dec(ctx: &mut Ctx<'_>, modrm: ferrox_x86::ModRm, mem: &Option<ferrox_x86::MemForm>, width: Width, dec: bool) -> OpResult {
    ctx.lock_needs_mem(mem)?;
    // INC/DEC leave CF alone.
    let cf = ctx.state.rflags.get(RFlags::CF);
    match mem {
        None => {
            let v = ctx.gpr(modrm.rm, width);
            let res = if dec {
                alu::sub_with_flags(&mut ctx.state.rflags, v, 1, false, width)
            } else {
                alu::add_with_flags(&mut ctx.state.rflags, v, 1, false, width)
            };
            ctx.state.rflags.set(RFlags::CF, cf);
            ctx.set_gpr(modrm.rm, width, res);
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            if ctx.prefixes.lock {
                let old = ctx.bus.atomic_rmw(addr, width, &mut |old| {
                    if dec {
                        old.wrapping_sub(1)
                    } else {
                        old.wrapping_add(1)
                    }
                })?;
                if dec {
                    alu::sub_with_flags(&mut ctx.state.rflags, old, 1, false, width);
                } else {
                    alu::add_with_flags(&mut ctx.state.rflags, old, 1, false, width);
                }
                ctx.state.rflags.set(RFlags::CF, cf);
            } else {
                let v = ctx.read_mem(addr, width)?;
                let mut fl = ctx.state.rflags;
                let res = if dec {
                    alu::sub_with_flags(&mut fl, v, 1, false, width)
                } else {
                    alu::add_with_flags(&mut fl, v, 1, false, width)
                };
                fl.set(RFlags::CF, cf);
                ctx.write_mem(addr, width, res)?;
                ctx.state.rflags = fl;
            }
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_grp4(ctx: &mut Ctx<'_>) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    match modrm.reg3() {
        0 => inc_dec(ctx, modrm, &mem, Width::W8, false),
        1 => inc_dec(ctx, modrm, &mem, Width::W8, true),
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

pub(crate) fn op_grp5(ctx: &mut Ctx<'_>) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    let width = ctx.op_width();
    match modrm.reg3() {
        0 => inc_dec(ctx, modrm, &mem, width, false),
        1 => inc_dec(ctx, modrm, &mem, width, true),
        2 => {
            // CALL r/m: near indirect. 64-bit mode forces a 64-bit target.
            ctx.reject_lock()?;
            let width = if ctx.mode == ferrox_x86::DecodeMode::Bits64 {
                Width::W64
            } else {
                width
            };
            let target = ctx.fetch_rm(modrm, &mem, width)?;
            let next = ctx.start_rip.wrapping_add(ctx.cursor.len() as u64);
            ctx.push(ctx.stack_width(), next)?;
            Ok(ctx.branch_abs(target, width))
        }
        4 => {
            // JMP r/m.
            ctx.reject_lock()?;
            let width = if ctx.mode == ferrox_x86::DecodeMode::Bits64 {
                Width::W64
            } else {
                width
            };
            let target = ctx.fetch_rm(modrm, &mem, width)?;
            Ok(ctx.branch_abs(target, width))
        }
        6 => {
            // PUSH r/m.
            ctx.reject_lock()?;
            let width = ctx.stack_width();
            let value = ctx.fetch_rm(modrm, &mem, width)?;
            ctx.push(width, value)?;
            Ok(Exec::Continue)
        }
        3 | 5 => Err(EmuError::Unimplemented("far call/jmp through memory")),
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

// ---- legacy short-form INC/DEC (0x40-0x4F outside 64-bit mode) -------

macro_rules! inc_dec_reg {
    ($name:ident, $reg:expr, $dec:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            ctx.reject_lock()?;
            let width = ctx.op_width();
            let cf = ctx.state.rflags.get(RFlags::CF);
            let v = ctx.gpr($reg, width);
            let res = if $dec {
                alu::sub_with_flags(&mut ctx.state.rflags, v, 1, false, width)
            } else {
                alu::add_with_flags(&mut ctx.state.rflags, v, 1, false, width)
            };
            ctx.state.rflags.set(RFlags::CF, cf);
            ctx.set_gpr($reg, width, res);
            Ok(Exec::Continue)
        }
    };
}

inc_dec_reg!(op_inc_eax, 0, false);
inc_dec_reg!(op_inc_ecx, 1, false);
inc_dec_reg!(op_inc_edx, 2, false);
inc_dec_reg!(op_inc_ebx, 3, false);
inc_dec_reg!(op_inc_esp, 4, false);
inc_dec_reg!(op_inc_ebp, 5, false);
inc_dec_reg!(op_inc_esi, 6, false);
inc_dec_reg!(op_inc_edi, 7, false);
inc_dec_reg!(op_dec_eax, 0, true);
inc_dec_reg!(op_dec_ecx, 1, true);
inc_dec_reg!(op_dec_edx, 2, true);
inc_dec_reg!(op_dec_ebx, 3, true);
inc_dec_reg!(op_dec_esp, 4, true);
inc_dec_reg!(op_dec_ebp, 5, true);
inc_dec_reg!(op_dec_esi, 6, true);
inc_dec_reg!(op_dec_edi, 7, true);

// ---- two/three-operand IMUL (0x69/0x6B, 0x0F 0xAF) -------------------

pub(crate) fn op_imul_gv_ev_iz(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let imm_bytes = if width == Width::W16 { 2 } else { 4 };
    let src = match &mem {
        None => ctx.gpr(modrm.rm, width),
        Some(m) => {
            let addr = ctx.effective_addr(m, imm_bytes);
            ctx.read_mem(addr, width)?
        }
    };
    let imm = ctx.imm_z(width)?;
    let res = alu::imul_two_with_flags(&mut ctx.state.rflags, src, imm, width);
    ctx.set_gpr(modrm.reg, width, res);
    Ok(Exec::Continue)
}

pub(crate) fn op_imul_gv_ev_ib(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.gpr(modrm.rm, width),
        Some(m) => {
            let addr = ctx.effective_addr(m, 1);
            ctx.read_mem(addr, width)?
        }
    };
    let imm = width.truncate(ctx.next_i8()? as i64 as u64);
    let res = alu::imul_two_with_flags(&mut ctx.state.rflags, src, imm, width);
    ctx.set_gpr(modrm.reg, width, res);
    Ok(Exec::Continue)
}

// ---- BCD adjust (legacy modes only) ---------------------------------

fn require_legacy(ctx: &Ctx<'_>) -> Result<(), EmuError> {
    if ctx.mode == ferrox_x86::DecodeMode::Bits64 {
        return Err(Exception::InvalidOpcode.into());
    }
    Ok(())
}

pub(crate) fn op_daa(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let mut al = ctx.gpr(0, Width::W8) as u8;
    let old_al = al;
    let old_cf = ctx.state.rflags.get(RFlags::CF);
    let mut cf = false;
    if al & 0x0F > 9 || ctx.state.rflags.get(RFlags::AF) {
        al = al.wrapping_add(6);
        cf = old_cf || old_al > 0xF9;
        ctx.state.rflags.set(RFlags::AF, true);
    } else {
        ctx.state.rflags.set(RFlags::AF, false);
    }
    if old_al > 0x99 || old_cf {
        al = al.wrapping_add(0x60);
        cf = true;
    }
    ctx.state.rflags.set(RFlags::CF, cf);
    let res = al as u64;
    ctx.state.rflags.set(RFlags::ZF, res == 0);
    ctx.state.rflags.set(RFlags::SF, res & 0x80 != 0);
    ctx.state
        .rflags
        .set(RFlags::PF, (res as u8).count_ones() % 2 == 0);
    ctx.set_gpr(0, Width::W8, res);
    Ok(Exec::Continue)
}

pub(crate) fn op_das(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let mut al = ctx.gpr(0, Width::W8) as u8;
    let old_al = al;
    let old_cf = ctx.state.rflags.get(RFlags::CF);
    let mut cf = false;
    if al & 0x0F > 9 || ctx.state.rflags.get(RFlags::AF) {
        al = al.wrapping_sub(6);
        cf = old_cf || old_al < 6;
        ctx.state.rflags.set(RFlags::AF, true);
    } else {
        ctx.state.rflags.set(RFlags::AF, false);
    }
    if old_al > 0x99 || old_cf {
        al = al.wrapping_sub(0x60);
        cf = true;
    }
    ctx.state.rflags.set(RFlags::CF, cf);
    let res = al as u64;
    ctx.state.rflags.set(RFlags::ZF, res == 0);
    ctx.state.rflags.set(RFlags::SF, res & 0x80 != 0);
    ctx.state
        .rflags
        .set(RFlags::PF, (res as u8).count_ones() % 2 == 0);
    ctx.set_gpr(0, Width::W8, res);
    Ok(Exec::Continue)
}

pub(crate) fn op_aaa(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let mut ax = ctx.state.gpr16(Gpr::Rax);
    if ax & 0x0F > 9 || ctx.state.rflags.get(RFlags::AF) {
        ax = ax.wrapping_add(0x106);
        ctx.state.rflags.set(RFlags::AF, true);
        ctx.state.rflags.set(RFlags::CF, true);
    } else {
        ctx.state.rflags.set(RFlags::AF, false);
        ctx.state.rflags.set(RFlags::CF, false);
    }
    ctx.state.set_gpr16(Gpr::Rax, ax & 0xFF0F);
    Ok(Exec::Continue)
}

pub(crate) fn op_aas(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let mut ax = ctx.state.gpr16(Gpr::Rax);
    if ax & 0x0F > 9 || ctx.state.rflags.get(RFlags::AF) {
        ax = ax.wrapping_sub(6);
        ax = ax.wrapping_sub(0x100);
        ctx.state.rflags.set(RFlags::AF, true);
        ctx.state.rflags.set(RFlags::CF, true);
    } else {
        ctx.state.rflags.set(RFlags::AF, false);
        ctx.state.rflags.set(RFlags::CF, false);
    }
    ctx.state.set_gpr16(Gpr::Rax, ax & 0xFF0F);
    Ok(Exec::Continue)
}

pub(crate) fn op_aam(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let base = ctx.next_u8()?;
    if base == 0 {
        return Err(Exception::DivideError.into());
    }
    let al = ctx.gpr(0, Width::W8) as u8;
    let ah = al / base;
    let al = al % base;
    ctx.state.set_gpr16(Gpr::Rax, ((ah as u16) << 8) | al as u16);
    let _ = alu::logic_with_flags(&mut ctx.state.rflags, al as u64, Width::W8);
    Ok(Exec::Continue)
}

pub(crate) fn op_aad(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let base = ctx.next_u8()?;
    let ax = ctx.state.gpr16(Gpr::Rax);
    let al = (ax as u8).wrapping_add(((ax >> 8) as u8).wrapping_mul(base));
    ctx.state.set_gpr16(Gpr::Rax, al as u16);
    let _ = alu::logic_with_flags(&mut ctx.state.rflags, al as u64, Width::W8);
    Ok(Exec::Continue)
}
