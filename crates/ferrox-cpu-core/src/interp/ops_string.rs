//! String instructions with REP/REPE/REPNE handling.
//!
//! Each iteration goes through the bus individually; a faulting iteration
//! leaves the registers pointing at the faulting element, which is the
//! architectural restart state.

use super::decode::Ctx;
use super::{Exec, OpResult};
use crate::alu;
use crate::exception::EmuError;
use crate::flags::RFlags;
use ferrox_types::{SegReg, Width};
use ferrox_x86::{AddrSize, RepPrefix};

fn addr_mask(asize: AddrSize) -> u64 {
    match asize {
        AddrSize::A16 => 0xFFFF,
        AddrSize::A32 => 0xFFFF_FFFF,
        AddrSize::A64 => u64::MAX,
    }
}

struct StringCtx {
    width: Width,
    mask: u64,
    step: u64,
}

fn string_ctx(ctx: &Ctx<'_>, width: Width) -> StringCtx {
    let mask = addr_mask(ctx.addr_size());
    let step = if ctx.state.rflags.get(RFlags::DF) {
        (width.bytes() as u64).wrapping_neg()
    } else {
        width.bytes() as u64
    };
    StringCtx { width, mask, step }
}

fn read_reg_masked(ctx: &Ctx<'_>, reg: u8, mask: u64) -> u64 {
    ctx.state.gpr(reg, Width::W64, true) & mask
}

fn advance_reg(ctx: &mut Ctx<'_>, reg: u8, mask: u64, step: u64) {
    let old = ctx.state.gpr(reg, Width::W64, true);
    let new = (old.wrapping_add(step) & mask) | (old & !mask);
    ctx.state.set_gpr(reg, Width::W64, true, new);
}

fn src_addr(ctx: &Ctx<'_>, offset: u64) -> u64 {
    let seg = ctx.prefixes.segment.unwrap_or(SegReg::Ds);
    ctx.seg_base(seg).wrapping_add(offset)
}

fn dst_addr(ctx: &Ctx<'_>, offset: u64) -> u64 {
    // The ES destination cannot be overridden.
    ctx.seg_base(SegReg::Es).wrapping_add(offset)
}

/// REP iteration driver. `body` returns `Some(zf)` for compare-style ops
/// so REPE/REPNE can terminate early.
fn rep_loop(
    ctx: &mut Ctx<'_>,
    s: &StringCtx,
    compare_style: bool,
    mut body: impl FnMut(&mut Ctx<'_>, &StringCtx) -> Result<Option<bool>, EmuError>,
) -> OpResult {
    let rep = ctx.prefixes.rep;
    if rep == RepPrefix::None {
        body(ctx, s)?;
        return Ok(Exec::Continue);
    }

    loop {
        let count = read_reg_masked(ctx, 1, s.mask);
        if count == 0 {
            break;
        }
        let zf = body(ctx, s)?;
        advance_reg(ctx, 1, s.mask, 1u64.wrapping_neg());
        if compare_style {
            match (rep, zf) {
                (RepPrefix::Rep, Some(false)) => break,
                (RepPrefix::Repne, Some(true)) => break,
                _ => {}
            }
        }
    }
    Ok(Exec::Continue)
}

fn movs(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let s = string_ctx(ctx, width);
    rep_loop(ctx, &s, false, |ctx, s| {
        let si = read_reg_masked(ctx, 6, s.mask);
        let di = read_reg_masked(ctx, 7, s.mask);
        let v = ctx.read_mem(src_addr(ctx, si), s.width)?;
        ctx.write_mem(dst_addr(ctx, di), s.width, v)?;
        advance_reg(ctx, 6, s.mask, s.step);
        advance_reg(ctx, 7, s.mask, s.step);
        Ok(None)
    })
}

fn stos(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let s = string_ctx(ctx, width);
    rep_loop(ctx, &s, false, |ctx, s| {
        let di = read_reg_masked(ctx, 7, s.mask);
        let v = ctx.gpr(0, s.width);
        ctx.write_mem(dst_addr(ctx, di), s.width, v)?;
        advance_reg(ctx, 7, s.mask, s.step);
        Ok(None)
    })
}

fn lods(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let s = string_ctx(ctx, width);
    rep_loop(ctx, &s, false, |ctx, s| {
        let si = read_reg_masked(ctx, 6, s.mask);
        let v = ctx.read_mem(src_addr(ctx, si), s.width)?;
        ctx.set_gpr(0, s.width, v);
        advance_reg(ctx, 6, s.mask, s.step);
        Ok(None)
    })
}

fn cmps(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let s = string_ctx(ctx, width);
    rep_loop(ctx, &s, true, |ctx, s| {
        let si = read_reg_masked(ctx, 6, s.mask);
        let di = read_reg_masked(ctx, 7, s.mask);
        let lhs = ctx.read_mem(src_addr(ctx, si), s.width)?;
        let rhs = ctx.read_mem(dst_addr(ctx, di), s.width)?;
        alu::update_sub_flags(&mut ctx.state.rflags, lhs, rhs, s.width);
        advance_reg(ctx, 6, s.mask, s.step);
        advance_reg(ctx, 7, s.mask, s.step);
        Ok(Some(ctx.state.rflags.get(RFlags::ZF)))
    })
}

fn scas(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    ctx.reject_lock()?;
    let s = string_ctx(ctx, width);
    rep_loop(ctx, &s, true, |ctx, s| {
        let di = read_reg_masked(ctx, 7, s.mask);
        let acc = ctx.gpr(0, s.width);
        let rhs = ctx.read_mem(dst_addr(ctx, di), s.width)?;
        alu::update_sub_flags(&mut ctx.state.rflags, acc, rhs, s.width);
        advance_reg(ctx, 7, s.mask, s.step);
        Ok(Some(ctx.state.rflags.get(RFlags::ZF)))
    })
}

pub(crate) fn op_movsb(ctx: &mut Ctx<'_>) -> OpResult {
    movs(ctx, Width::W8)
}

pub(crate) fn op_movsv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    movs(ctx, width)
}

pub(crate) fn op_cmpsb(ctx: &mut Ctx<'_>) -> OpResult {
    cmps(ctx, Width::W8)
}

pub(crate) fn op_cmpsv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    cmps(ctx, width)
}

pub(crate) fn op_stosb(ctx: &mut Ctx<'_>) -> OpResult {
    stos(ctx, Width::W8)
}

pub(crate) fn op_stosv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    stos(ctx, width)
}

pub(crate) fn op_lodsb(ctx: &mut Ctx<'_>) -> OpResult {
    lods(ctx, Width::W8)
}

pub(crate) fn op_lodsv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    lods(ctx, width)
}

pub(crate) fn op_scasb(ctx: &mut Ctx<'_>) -> OpResult {
    scas(ctx, Width::W8)
}

pub(crate) fn op_scasv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    scas(ctx, width)
}
