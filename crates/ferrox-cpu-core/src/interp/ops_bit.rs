//! Two-byte bit-test row, double-shifts, CMPXCHG/XADD, and the
//! zero/sign-extending moves.

use super::decode::Ctx;
use super::{Exec, OpResult};
use crate::alu;
use crate::exception::Exception;
use crate::flags::RFlags;
use ferrox_types::Width;
use ferrox_x86::{MemForm, ModRm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitOp {
    Bt,
    Bts,
    Btr,
    Btc,
}

impl BitOp {
    fn from_group8(reg: u8) -> Option<BitOp> {
        match reg & 0x7 {
            4 => Some(BitOp::Bt),
            5 => Some(BitOp::Bts),
            6 => Some(BitOp::Btr),
            7 => Some(BitOp::Btc),
            _ => None,
        }
    }

    fn writes_back(self) -> bool {
        self != BitOp::Bt
    }

    fn apply(self, value: u64, bit: u32) -> u64 {
        match self {
            BitOp::Bt => value,
            BitOp::Bts => value | 1u64 << bit,
            BitOp::Btr => value & !(1u64 << bit),
            BitOp::Btc => value ^ 1u64 << bit,
        }
    }
}

/// Register-sourced bit offsets address memory as a signed bit string;
/// immediate offsets wrap inside the addressed element.
fn bit_common(
    ctx: &mut Ctx<'_>,
    op: BitOp,
    modrm: ModRm,
    mem: &Option<MemForm>,
    offset: i64,
    element_addressing: bool,
) -> OpResult {
    if op.writes_back() {
        ctx.lock_needs_mem(mem)?;
    } else {
        ctx.reject_lock()?;
    }
    let width = ctx.op_width();
    let bits = width.bits() as i64;

    match mem {
        None => {
            let bit = (offset.rem_euclid(bits)) as u32;
            let value = ctx.gpr(modrm.rm, width);
            ctx.state.rflags.set(RFlags::CF, value >> bit & 1 != 0);
            if op.writes_back() {
                ctx.set_gpr(modrm.rm, width, op.apply(value, bit));
            }
        }
        Some(m) => {
            let base = ctx.effective_addr(m, 0);
            let (addr, bit) = if element_addressing {
                let elem = offset.div_euclid(bits);
                let bit = offset.rem_euclid(bits) as u32;
                (
                    base.wrapping_add((elem * width.bytes() as i64) as u64),
                    bit,
                )
            } else {
                (base, (offset.rem_euclid(bits)) as u32)
            };

            if ctx.prefixes.lock {
                let old = ctx
                    .bus
                    .atomic_rmw(addr, width, &mut |old| op.apply(old, bit))?;
                ctx.state.rflags.set(RFlags::CF, old >> bit & 1 != 0);
            } else {
                let old = ctx.read_mem(addr, width)?;
                if op.writes_back() {
                    ctx.write_mem(addr, width, width.truncate(op.apply(old, bit)))?;
                }
                ctx.state.rflags.set(RFlags::CF, old >> bit & 1 != 0);
            }
        }
    }
    Ok(Exec::Continue)
}

fn bit_ev_gv(ctx: &mut Ctx<'_>, op: BitOp) -> OpResult {
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let offset = width.sign_extend(ctx.gpr(modrm.reg, width)) as i64;
    bit_common(ctx, op, modrm, &mem, offset, true)
}

pub(crate) fn op_bt_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    bit_ev_gv(ctx, BitOp::Bt)
}

pub(crate) fn op_bts_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    bit_ev_gv(ctx, BitOp::Bts)
}

pub(crate) fn op_btr_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    bit_ev_gv(ctx, BitOp::Btr)
}

pub(crate) fn op_btc_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    bit_ev_gv(ctx, BitOp::Btc)
}

/// Group 8: BT/BTS/BTR/BTC r/m, imm8.
pub(crate) fn op_grp8_ev_ib(ctx: &mut Ctx<'_>) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    let op = BitOp::from_group8(modrm.reg3()).ok_or(Exception::InvalidOpcode)?;
    // Consume the immediate before resolving the EA so RIP-relative forms
    // see the full instruction length.
    let imm = ctx.next_u8()?;
    bit_common(ctx, op, modrm, &mem, imm as i64, false)
}

// ---- double shifts ---------------------------------------------------

fn shld_shrd(ctx: &mut Ctx<'_>, left: bool, count_from_cl: bool) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let imm_bytes = usize::from(!count_from_cl);
    let count = if count_from_cl {
        ctx.gpr(1, Width::W8) as u8
    } else {
        // Consumed after ModRM, before the EA is used.
        0
    };

    match &mem {
        None => {
            let count = if count_from_cl { count } else { ctx.next_u8()? };
            let dst = ctx.gpr(modrm.rm, width);
            let src = ctx.gpr(modrm.reg, width);
            let res = if left {
                alu::shld_with_flags(&mut ctx.state.rflags, dst, src, count, width)
            } else {
                alu::shrd_with_flags(&mut ctx.state.rflags, dst, src, count, width)
            };
            ctx.set_gpr(modrm.rm, width, res);
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, imm_bytes);
            let count = if count_from_cl { count } else { ctx.next_u8()? };
            let dst = ctx.read_mem(addr, width)?;
            let src = ctx.gpr(modrm.reg, width);
            let mut fl = ctx.state.rflags;
            let res = if left {
                alu::shld_with_flags(&mut fl, dst, src, count, width)
            } else {
                alu::shrd_with_flags(&mut fl, dst, src, count, width)
            };
            ctx.write_mem(addr, width, res)?;
            ctx.state.rflags = fl;
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_shld_ib(ctx: &mut Ctx<'_>) -> OpResult {
    shld_shrd(ctx, true, false)
}

pub(crate) fn op_shld_cl(ctx: &mut Ctx<'_>) -> OpResult {
    shld_shrd(ctx, true, true)
}

pub(crate) fn op_shrd_ib(ctx: &mut Ctx<'_>) -> OpResult {
    shld_shrd(ctx, false, false)
}

pub(crate) fn op_shrd_cl(ctx: &mut Ctx<'_>) -> OpResult {
    shld_shrd(ctx, false, true)
}

// ---- IMUL Gv,Ev ------------------------------------------------------

pub(crate) fn op_imul_gv_ev(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    let dst = ctx.gpr(modrm.reg, width);
    let res = alu::imul_two_with_flags(&mut ctx.state.rflags, dst, src, width);
    ctx.set_gpr(modrm.reg, width, res);
    Ok(Exec::Continue)
}

// ---- CMPXCHG ---------------------------------------------------------

fn cmpxchg(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    ctx.lock_needs_mem(&mem)?;
    let expected = ctx.gpr(0, width);
    let src = ctx.gpr(modrm.reg, width);

    match &mem {
        None => {
            let dst = ctx.gpr(modrm.rm, width);
            alu::update_sub_flags(&mut ctx.state.rflags, expected, dst, width);
            if dst == expected {
                ctx.set_gpr(modrm.rm, width, src);
            } else {
                ctx.set_gpr(0, width, dst);
            }
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            if ctx.prefixes.lock {
                let old = ctx.bus.atomic_rmw(addr, width, &mut |old| {
                    if old == expected {
                        src
                    } else {
                        old
                    }
                })?;
                alu::update_sub_flags(&mut ctx.state.rflags, expected, old, width);
                if old != expected {
                    ctx.set_gpr(0, width, old);
                }
            } else {
                let old = ctx.read_mem(addr, width)?;
                let mut fl = ctx.state.rflags;
                alu::update_sub_flags(&mut fl, expected, old, width);
                if old == expected {
                    ctx.write_mem(addr, width, src)?;
                } else {
                    ctx.set_gpr(0, width, old);
                }
                ctx.state.rflags = fl;
            }
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_cmpxchg_eb_gb(ctx: &mut Ctx<'_>) -> OpResult {
    cmpxchg(ctx, Width::W8)
}

pub(crate) fn op_cmpxchg_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    cmpxchg(ctx, width)
}

// ---- XADD ------------------------------------------------------------

fn xadd(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    ctx.lock_needs_mem(&mem)?;
    let src = ctx.gpr(modrm.reg, width);

    match &mem {
        None => {
            let dst = ctx.gpr(modrm.rm, width);
            let res = alu::add_with_flags(&mut ctx.state.rflags, dst, src, false, width);
            ctx.set_gpr(modrm.rm, width, res);
            ctx.set_gpr(modrm.reg, width, dst);
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            if ctx.prefixes.lock {
                // The atomic-combined primitive, not the plain pair.
                let old = ctx
                    .bus
                    .atomic_rmw(addr, width, &mut |old| old.wrapping_add(src))?;
                let _ = alu::add_with_flags(&mut ctx.state.rflags, old, src, false, width);
                ctx.set_gpr(modrm.reg, width, old);
            } else {
                let old = ctx.read_mem(addr, width)?;
                let mut fl = ctx.state.rflags;
                let res = alu::add_with_flags(&mut fl, old, src, false, width);
                ctx.write_mem(addr, width, res)?;
                ctx.state.rflags = fl;
                ctx.set_gpr(modrm.reg, width, old);
            }
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_xadd_eb_gb(ctx: &mut Ctx<'_>) -> OpResult {
    xadd(ctx, Width::W8)
}

pub(crate) fn op_xadd_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    xadd(ctx, width)
}

// ---- MOVZX / MOVSX ---------------------------------------------------

fn extend_move(ctx: &mut Ctx<'_>, src_width: Width, sign: bool) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, src_width)?;
    let v = if sign {
        width.truncate(src_width.sign_extend(src))
    } else {
        src
    };
    ctx.set_gpr(modrm.reg, width, v);
    Ok(Exec::Continue)
}

pub(crate) fn op_movzx_gv_eb(ctx: &mut Ctx<'_>) -> OpResult {
    extend_move(ctx, Width::W8, false)
}

pub(crate) fn op_movzx_gv_ew(ctx: &mut Ctx<'_>) -> OpResult {
    extend_move(ctx, Width::W16, false)
}

pub(crate) fn op_movsx_gv_eb(ctx: &mut Ctx<'_>) -> OpResult {
    extend_move(ctx, Width::W8, true)
}

pub(crate) fn op_movsx_gv_ew(ctx: &mut Ctx<'_>) -> OpResult {
    extend_move(ctx, Width::W16, true)
}

// ---- scans and counts ------------------------------------------------

pub(crate) fn op_bsf(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    if let Some(index) = alu::bit_scan(&mut ctx.state.rflags, src, width, true) {
        ctx.set_gpr(modrm.reg, width, index);
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_bsr(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    if let Some(index) = alu::bit_scan(&mut ctx.state.rflags, src, width, false) {
        ctx.set_gpr(modrm.reg, width, index);
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_tzcnt(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.bmi1 {
        // Without BMI1 the F3 prefix is ignored and this is plain BSF.
        return op_bsf(ctx);
    }
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    let res = alu::count_zeros_with_flags(&mut ctx.state.rflags, src, width, true);
    ctx.set_gpr(modrm.reg, width, res);
    Ok(Exec::Continue)
}

pub(crate) fn op_lzcnt(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.lzcnt {
        return op_bsr(ctx);
    }
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    let res = alu::count_zeros_with_flags(&mut ctx.state.rflags, src, width, false);
    ctx.set_gpr(modrm.reg, width, res);
    Ok(Exec::Continue)
}

pub(crate) fn op_popcnt(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.popcnt {
        return Err(Exception::InvalidOpcode.into());
    }
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    let res = alu::popcnt_with_flags(&mut ctx.state.rflags, src, width);
    ctx.set_gpr(modrm.reg, width, res);
    Ok(Exec::Continue)
}
