//! SSE/SSE2/SSE3 data-movement rows.
//!
//! The aligned forms (MOVAPS/MOVAPD/MOVDQA/MOVNT*) raise #GP on a
//! misaligned address before the bus sees the access; the register-vs-
//! memory split of 0x12/0x16 (MOVHLPS vs MOVLPS, MOVLHPS vs MOVHPS) is an
//! ISA quirk, not an accident, and each side gets its own semantics.

use super::decode::{Ctx, FpUnit};
use super::{Exec, OpResult};
use crate::exception::Exception;
use crate::simd;
use ferrox_types::{Gpr, SegReg, Width};

const LO64: u128 = u64::MAX as u128;

// ---- MOVUPS/MOVUPD/MOVSS/MOVSD (0x10/0x11) --------------------------

fn movu_load(ctx: &mut Ctx<'_>, unit: FpUnit) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128(addr)?
        }
    };
    ctx.state.set_xmm(modrm.reg, src);
    Ok(Exec::Continue)
}

fn movu_store(ctx: &mut Ctx<'_>, unit: FpUnit) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.state.xmm(modrm.reg);
    match &mem {
        None => ctx.state.set_xmm(modrm.rm, src),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.write_mem_u128(addr, src)?;
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_movups_vps_wps(ctx: &mut Ctx<'_>) -> OpResult {
    movu_load(ctx, FpUnit::Sse)
}

pub(crate) fn op_movups_wps_vps(ctx: &mut Ctx<'_>) -> OpResult {
    movu_store(ctx, FpUnit::Sse)
}

pub(crate) fn op_movupd_vpd_wpd(ctx: &mut Ctx<'_>) -> OpResult {
    movu_load(ctx, FpUnit::Sse2)
}

pub(crate) fn op_movupd_wpd_vpd(ctx: &mut Ctx<'_>) -> OpResult {
    movu_store(ctx, FpUnit::Sse2)
}

/// MOVSS load: register form merges the low dword, memory form zeroes the
/// upper 96 bits.
pub(crate) fn op_movss_vss_wss(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let value = match &mem {
        None => {
            let dst = ctx.state.xmm(modrm.reg);
            let src = ctx.state.xmm(modrm.rm);
            (dst & !0xFFFF_FFFFu128) | (src & 0xFFFF_FFFF)
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W32)? as u128
        }
    };
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_movss_wss_vss(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.state.xmm(modrm.reg);
    match &mem {
        None => {
            let dst = ctx.state.xmm(modrm.rm);
            ctx.state
                .set_xmm(modrm.rm, (dst & !0xFFFF_FFFFu128) | (src & 0xFFFF_FFFF));
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.write_mem(addr, Width::W32, src as u64)?;
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_movsd_vsd_wsd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let value = match &mem {
        None => {
            let dst = ctx.state.xmm(modrm.reg);
            let src = ctx.state.xmm(modrm.rm);
            (dst & !LO64) | (src & LO64)
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)? as u128
        }
    };
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_movsd_wsd_vsd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.state.xmm(modrm.reg);
    match &mem {
        None => {
            let dst = ctx.state.xmm(modrm.rm);
            ctx.state.set_xmm(modrm.rm, (dst & !LO64) | (src & LO64));
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.write_mem(addr, Width::W64, src as u64)?;
        }
    }
    Ok(Exec::Continue)
}

// ---- 0x12/0x13/0x16/0x17: low/high quadword traffic -----------------

/// 0x12, no prefix: MOVLPS Vq,Mq in memory form, MOVHLPS Vq,Uq in
/// register form. Exactly 8 bytes of memory are touched either way.
pub(crate) fn op_movlps_movhlps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let dst = ctx.state.xmm(modrm.reg);
    let value = match &mem {
        // MOVHLPS: low qword of dst = high qword of src.
        None => (dst & !LO64) | (ctx.state.xmm(modrm.rm) >> 64),
        // MOVLPS: low qword from memory.
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            (dst & !LO64) | ctx.read_mem(addr, Width::W64)? as u128
        }
    };
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

/// 0x12, 0x66 prefix: MOVLPD Vq,Mq. No register form exists.
pub(crate) fn op_movlpd_vq_mq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&m, 0);
    let lo = ctx.read_mem(addr, Width::W64)? as u128;
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, (dst & !LO64) | lo);
    Ok(Exec::Continue)
}

/// 0x13: MOVLPS/MOVLPD Mq,Vq. Memory form only.
fn movlp_store(ctx: &mut Ctx<'_>, unit: FpUnit) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&m, 0);
    let src = ctx.state.xmm(modrm.reg) as u64;
    ctx.write_mem(addr, Width::W64, src)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_movlps_mq_vq(ctx: &mut Ctx<'_>) -> OpResult {
    movlp_store(ctx, FpUnit::Sse)
}

pub(crate) fn op_movlpd_mq_vq(ctx: &mut Ctx<'_>) -> OpResult {
    movlp_store(ctx, FpUnit::Sse2)
}

/// 0x16, no prefix: MOVHPS Vq,Mq in memory form, MOVLHPS in register
/// form (high qword of dst = low qword of src).
pub(crate) fn op_movhps_movlhps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let dst = ctx.state.xmm(modrm.reg);
    let value = match &mem {
        None => (dst & LO64) | ((ctx.state.xmm(modrm.rm) & LO64) << 64),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            (dst & LO64) | ((ctx.read_mem(addr, Width::W64)? as u128) << 64)
        }
    };
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_movhpd_vq_mq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&m, 0);
    let hi = ctx.read_mem(addr, Width::W64)? as u128;
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, (dst & LO64) | (hi << 64));
    Ok(Exec::Continue)
}

/// 0x17: MOVHPS/MOVHPD Mq,Vq store the *high* qword. Memory form only.
fn movhp_store(ctx: &mut Ctx<'_>, unit: FpUnit) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&m, 0);
    let src = (ctx.state.xmm(modrm.reg) >> 64) as u64;
    ctx.write_mem(addr, Width::W64, src)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_movhps_mq_vq(ctx: &mut Ctx<'_>) -> OpResult {
    movhp_store(ctx, FpUnit::Sse)
}

pub(crate) fn op_movhpd_mq_vq(ctx: &mut Ctx<'_>) -> OpResult {
    movhp_store(ctx, FpUnit::Sse2)
}

// ---- SSE3 duplicating loads -----------------------------------------

pub(crate) fn op_movsldup(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse3)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)?
        }
    };
    let l0 = src & 0xFFFF_FFFF;
    let l2 = (src >> 64) & 0xFFFF_FFFF;
    let value = l0 | (l0 << 32) | (l2 << 64) | (l2 << 96);
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_movshdup(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse3)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)?
        }
    };
    let l1 = (src >> 32) & 0xFFFF_FFFF;
    let l3 = (src >> 96) & 0xFFFF_FFFF;
    let value = l1 | (l1 << 32) | (l3 << 64) | (l3 << 96);
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

/// MOVDDUP reads only 8 bytes from memory, then doubles them.
pub(crate) fn op_movddup(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse3)?;
    let (modrm, mem) = ctx.modrm()?;
    let lo = match &mem {
        None => ctx.state.xmm(modrm.rm) as u64,
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)?
        }
    };
    ctx.state
        .set_xmm(modrm.reg, lo as u128 | ((lo as u128) << 64));
    Ok(Exec::Continue)
}

// ---- UNPCK*PS/PD -----------------------------------------------------

fn unpck(ctx: &mut Ctx<'_>, unit: FpUnit, f: fn(u128, u128) -> u128) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)?
        }
    };
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, f(dst, src));
    Ok(Exec::Continue)
}

fn unpcklps(a: u128, b: u128) -> u128 {
    let a0 = a & 0xFFFF_FFFF;
    let a1 = (a >> 32) & 0xFFFF_FFFF;
    let b0 = b & 0xFFFF_FFFF;
    let b1 = (b >> 32) & 0xFFFF_FFFF;
    a0 | (b0 << 32) | (a1 << 64) | (b1 << 96)
}

fn unpckhps(a: u128, b: u128) -> u128 {
    let a2 = (a >> 64) & 0xFFFF_FFFF;
    let a3 = (a >> 96) & 0xFFFF_FFFF;
    let b2 = (b >> 64) & 0xFFFF_FFFF;
    let b3 = (b >> 96) & 0xFFFF_FFFF;
    a2 | (b2 << 32) | (a3 << 64) | (b3 << 96)
}

pub(crate) fn op_unpcklps(ctx: &mut Ctx<'_>) -> OpResult {
    unpck(ctx, FpUnit::Sse, unpcklps)
}

pub(crate) fn op_unpckhps(ctx: &mut Ctx<'_>) -> OpResult {
    unpck(ctx, FpUnit::Sse, unpckhps)
}

pub(crate) fn op_unpcklpd(ctx: &mut Ctx<'_>) -> OpResult {
    unpck(ctx, FpUnit::Sse2, simd::punpcklqdq)
}

pub(crate) fn op_unpckhpd(ctx: &mut Ctx<'_>) -> OpResult {
    unpck(ctx, FpUnit::Sse2, simd::punpckhqdq)
}

// ---- MOVAPS/MOVAPD (aligned) ----------------------------------------

fn mova_load(ctx: &mut Ctx<'_>, unit: FpUnit) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)?
        }
    };
    ctx.state.set_xmm(modrm.reg, src);
    Ok(Exec::Continue)
}

fn mova_store(ctx: &mut Ctx<'_>, unit: FpUnit) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.state.xmm(modrm.reg);
    match &mem {
        None => ctx.state.set_xmm(modrm.rm, src),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.write_mem_u128_aligned(addr, src)?;
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_movaps_vps_wps(ctx: &mut Ctx<'_>) -> OpResult {
    mova_load(ctx, FpUnit::Sse)
}

pub(crate) fn op_movaps_wps_vps(ctx: &mut Ctx<'_>) -> OpResult {
    mova_store(ctx, FpUnit::Sse)
}

pub(crate) fn op_movapd_vpd_wpd(ctx: &mut Ctx<'_>) -> OpResult {
    mova_load(ctx, FpUnit::Sse2)
}

pub(crate) fn op_movapd_wpd_vpd(ctx: &mut Ctx<'_>) -> OpResult {
    mova_store(ctx, FpUnit::Sse2)
}

/// MOVNTPS/MOVNTPD: aligned streaming store, memory form only.
fn movnt_store(ctx: &mut Ctx<'_>, unit: FpUnit) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&m, 0);
    let src = ctx.state.xmm(modrm.reg);
    ctx.write_mem_u128_aligned(addr, src)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_movntps(ctx: &mut Ctx<'_>) -> OpResult {
    movnt_store(ctx, FpUnit::Sse)
}

pub(crate) fn op_movntpd(ctx: &mut Ctx<'_>) -> OpResult {
    movnt_store(ctx, FpUnit::Sse2)
}

/// MOVNTI: plain GPR streaming store.
pub(crate) fn op_movnti(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.sse2 {
        return Err(Exception::InvalidOpcode.into());
    }
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let width = if ctx.prefixes.rex.w {
        Width::W64
    } else {
        Width::W32
    };
    let addr = ctx.effective_addr(&m, 0);
    let src = ctx.gpr(modrm.reg, width);
    ctx.write_mem(addr, width, src)?;
    Ok(Exec::Continue)
}

// ---- MOVMSKPS/MOVMSKPD ----------------------------------------------

fn movmsk(ctx: &mut Ctx<'_>, unit: FpUnit, f: fn(u128) -> u32) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(unit)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    let mask = f(ctx.state.xmm(modrm.rm));
    ctx.set_gpr(modrm.reg, Width::W32, mask as u64);
    Ok(Exec::Continue)
}

pub(crate) fn op_movmskps(ctx: &mut Ctx<'_>) -> OpResult {
    movmsk(ctx, FpUnit::Sse, simd::movmskps)
}

pub(crate) fn op_movmskpd(ctx: &mut Ctx<'_>) -> OpResult {
    movmsk(ctx, FpUnit::Sse2, simd::movmskpd)
}

// ---- MOVD/MOVQ GPR traffic (0x6E / 0x7E) ----------------------------

pub(crate) fn op_movd_pq_ey(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    let width = if ctx.prefixes.rex.w {
        Width::W64
    } else {
        Width::W32
    };
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    ctx.prepare_mmx();
    ctx.state.set_mmx(modrm.reg, width.truncate(src));
    Ok(Exec::Continue)
}

pub(crate) fn op_movd_vy_ey(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let width = if ctx.prefixes.rex.w {
        Width::W64
    } else {
        Width::W32
    };
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    ctx.state.set_xmm(modrm.reg, width.truncate(src) as u128);
    Ok(Exec::Continue)
}

pub(crate) fn op_movd_ey_pq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    let width = if ctx.prefixes.rex.w {
        Width::W64
    } else {
        Width::W32
    };
    ctx.prepare_mmx();
    let src = width.truncate(ctx.state.mmx(modrm.reg));
    ctx.store_rm(modrm, &mem, width, src)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_movd_ey_vy(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let width = if ctx.prefixes.rex.w {
        Width::W64
    } else {
        Width::W32
    };
    let src = width.truncate(ctx.state.xmm(modrm.reg) as u64);
    ctx.store_rm(modrm, &mem, width, src)?;
    Ok(Exec::Continue)
}

/// 0xF3 0x7E: MOVQ Vq,Wq zero-extends a 64-bit load into the register.
pub(crate) fn op_movq_vq_wq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let lo = match &mem {
        None => ctx.state.xmm(modrm.rm) as u64,
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)?
        }
    };
    ctx.state.set_xmm(modrm.reg, lo as u128);
    Ok(Exec::Continue)
}

/// 0x66 0xD6: MOVQ Wq,Vq. Register destination zero-extends.
pub(crate) fn op_movq_wq_vq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let lo = ctx.state.xmm(modrm.reg) as u64;
    match &mem {
        None => ctx.state.set_xmm(modrm.rm, lo as u128),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.write_mem(addr, Width::W64, lo)?;
        }
    }
    Ok(Exec::Continue)
}

/// 0xF3 0xD6: MOVQ2DQ Vdq,Nq (register only).
pub(crate) fn op_movq2dq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.prepare_mmx();
    let v = ctx.state.mmx(modrm.rm);
    ctx.state.set_xmm(modrm.reg, v as u128);
    Ok(Exec::Continue)
}

/// 0xF2 0xD6: MOVDQ2Q Pq,Uq (register only).
pub(crate) fn op_movdq2q(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    let v = ctx.state.xmm(modrm.rm) as u64;
    ctx.prepare_mmx();
    ctx.state.set_mmx(modrm.reg, v);
    Ok(Exec::Continue)
}

// ---- MOVQ/MOVDQA/MOVDQU (0x6F / 0x7F) -------------------------------

pub(crate) fn op_movq_pq_qq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    ctx.prepare_mmx();
    let src = match &mem {
        None => ctx.state.mmx(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)?
        }
    };
    ctx.state.set_mmx(modrm.reg, src);
    Ok(Exec::Continue)
}

pub(crate) fn op_movq_qq_pq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    ctx.prepare_mmx();
    let src = ctx.state.mmx(modrm.reg);
    match &mem {
        None => ctx.state.set_mmx(modrm.rm, src),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.write_mem(addr, Width::W64, src)?;
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_movdqa_vx_wx(ctx: &mut Ctx<'_>) -> OpResult {
    mova_load(ctx, FpUnit::Sse2)
}

pub(crate) fn op_movdqa_wx_vx(ctx: &mut Ctx<'_>) -> OpResult {
    mova_store(ctx, FpUnit::Sse2)
}

pub(crate) fn op_movdqu_vx_wx(ctx: &mut Ctx<'_>) -> OpResult {
    movu_load(ctx, FpUnit::Sse2)
}

pub(crate) fn op_movdqu_wx_vx(ctx: &mut Ctx<'_>) -> OpResult {
    movu_store(ctx, FpUnit::Sse2)
}

// ---- PINSRW / PEXTRW -------------------------------------------------

pub(crate) fn op_pinsrw_pq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.sse {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    let addr = mem.as_ref().map(|m| ctx.effective_addr(m, 1));
    let imm = ctx.next_u8()? & 0x3;
    let src = match addr {
        // Register source reads the low word of a GPR.
        None => ctx.gpr(modrm.rm, Width::W16),
        Some(addr) => ctx.read_mem(addr, Width::W16)?,
    };
    ctx.prepare_mmx();
    let dst = ctx.state.mmx(modrm.reg);
    let shift = imm as u64 * 16;
    let merged = (dst & !(0xFFFFu64 << shift)) | (src << shift);
    ctx.state.set_mmx(modrm.reg, merged);
    Ok(Exec::Continue)
}

pub(crate) fn op_pinsrw_vx(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let addr = mem.as_ref().map(|m| ctx.effective_addr(m, 1));
    let imm = ctx.next_u8()? & 0x7;
    let src = match addr {
        None => ctx.gpr(modrm.rm, Width::W16),
        Some(addr) => ctx.read_mem(addr, Width::W16)?,
    };
    let dst = ctx.state.xmm(modrm.reg);
    let shift = imm as u32 * 16;
    let merged = (dst & !(0xFFFFu128 << shift)) | ((src as u128) << shift);
    ctx.state.set_xmm(modrm.reg, merged);
    Ok(Exec::Continue)
}

pub(crate) fn op_pextrw_gd_nq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.sse {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    let imm = ctx.next_u8()? & 0x3;
    ctx.prepare_mmx();
    let lane = (ctx.state.mmx(modrm.rm) >> (imm as u64 * 16)) & 0xFFFF;
    ctx.set_gpr(modrm.reg, Width::W32, lane);
    Ok(Exec::Continue)
}

pub(crate) fn op_pextrw_gd_ux(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    let imm = ctx.next_u8()? & 0x7;
    let lane = ((ctx.state.xmm(modrm.rm) >> (imm as u32 * 16)) & 0xFFFF) as u64;
    ctx.set_gpr(modrm.reg, Width::W32, lane);
    Ok(Exec::Continue)
}

// ---- streaming integer stores / unaligned SSE3 load -----------------

pub(crate) fn op_movntq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.sse {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&m, 0);
    ctx.prepare_mmx();
    let src = ctx.state.mmx(modrm.reg);
    ctx.write_mem(addr, Width::W64, src)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_movntdq(ctx: &mut Ctx<'_>) -> OpResult {
    movnt_store(ctx, FpUnit::Sse2)
}

pub(crate) fn op_lddqu(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse3)?;
    let (modrm, mem) = ctx.modrm()?;
    let m = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&m, 0);
    // Defined as an unaligned load.
    let v = ctx.read_mem_u128(addr)?;
    ctx.state.set_xmm(modrm.reg, v);
    Ok(Exec::Continue)
}

// ---- MASKMOVQ / MASKMOVDQU ------------------------------------------

/// Byte-masked store to [rDI]; only bytes whose mask sign bit is set are
/// written.
pub(crate) fn op_maskmovq(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.sse {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.prepare_mmx();
    let data = ctx.state.mmx(modrm.reg);
    let mask = ctx.state.mmx(modrm.rm);
    let seg = ctx.prefixes.segment.unwrap_or(SegReg::Ds);
    let base = ctx.seg_base(seg).wrapping_add(ctx.state.gpr64(Gpr::Rdi));
    for i in 0..8 {
        if mask >> (i * 8 + 7) & 1 != 0 {
            ctx.bus
                .write_u8(base.wrapping_add(i), (data >> (i * 8)) as u8)?;
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_maskmovdqu(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    let data = ctx.state.xmm(modrm.reg);
    let mask = ctx.state.xmm(modrm.rm);
    let seg = ctx.prefixes.segment.unwrap_or(SegReg::Ds);
    let base = ctx.seg_base(seg).wrapping_add(ctx.state.gpr64(Gpr::Rdi));
    for i in 0..16 {
        if mask >> (i * 8 + 7) & 1 != 0 {
            ctx.bus
                .write_u8(base.wrapping_add(i as u64), (data >> (i * 8)) as u8)?;
        }
    }
    Ok(Exec::Continue)
}
