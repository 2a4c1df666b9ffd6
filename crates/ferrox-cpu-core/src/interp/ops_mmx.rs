//! MMX / SSE2 packed-integer rows.
//!
//! These are the "plain" SIMD family: computation can never fault, only
//! operand access can, so the handlers are a shared fetch/store skeleton
//! around a [`MediaOps`]/[`ShiftOps`] table entry. The MMX forms run the
//! FPU-state transition before touching an MMX register.

use super::decode::{Ctx, FpUnit};
use super::{Exec, OpResult};
use crate::exception::Exception;
use crate::simd;
use crate::simd::{MediaOps, ShiftOps};
use ferrox_types::Width;

// ---- common workers --------------------------------------------------

/// `op Pq, Qq`: MMX register destination, MMX register or 8-byte memory
/// source.
fn mmx_pq_qq(ctx: &mut Ctx<'_>, ops: &MediaOps) -> OpResult {
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
    let dst = ctx.state.mmx(modrm.reg);
    ctx.state.set_mmx(modrm.reg, (ops.op_u64)(dst, src));
    Ok(Exec::Continue)
}

/// `op Vx, Wx`: XMM destination, XMM register or aligned 16-byte memory
/// source.
fn sse_vx_wx(ctx: &mut Ctx<'_>, ops: &MediaOps) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)?
        }
    };
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, (ops.op_u128)(dst, src));
    Ok(Exec::Continue)
}

/// Generates the MMX-column and 0x66-column handlers for one packed
/// integer instruction. `$mmx_gate` is an extra CPUID predicate for MMX
/// forms that arrived after base MMX (the SSE2-era quadword ops).
macro_rules! mmx_sse_pair {
    ($mmx:ident, $sse:ident, $table:expr) => {
        mmx_sse_pair!($mmx, $sse, $table, |_ctx: &Ctx<'_>| true);
    };
    ($mmx:ident, $sse:ident, $table:expr, $mmx_gate:expr) => {
        pub(crate) fn $mmx(ctx: &mut Ctx<'_>) -> OpResult {
            if !($mmx_gate)(&*ctx) {
                return Err(Exception::InvalidOpcode.into());
            }
            mmx_pq_qq(ctx, &$table)
        }
        pub(crate) fn $sse(ctx: &mut Ctx<'_>) -> OpResult {
            sse_vx_wx(ctx, &$table)
        }
    };
}

fn is_sse2(ctx: &Ctx<'_>) -> bool {
    ctx.features.sse2
}

fn is_sse(ctx: &Ctx<'_>) -> bool {
    ctx.features.sse
}

mmx_sse_pair!(op_punpcklbw_pq, op_punpcklbw_vx, simd::PUNPCKLBW);
mmx_sse_pair!(op_punpcklwd_pq, op_punpcklwd_vx, simd::PUNPCKLWD);
mmx_sse_pair!(op_punpckldq_pq, op_punpckldq_vx, simd::PUNPCKLDQ);
mmx_sse_pair!(op_packsswb_pq, op_packsswb_vx, simd::PACKSSWB);
mmx_sse_pair!(op_pcmpgtb_pq, op_pcmpgtb_vx, simd::PCMPGTB);
mmx_sse_pair!(op_pcmpgtw_pq, op_pcmpgtw_vx, simd::PCMPGTW);
mmx_sse_pair!(op_pcmpgtd_pq, op_pcmpgtd_vx, simd::PCMPGTD);
mmx_sse_pair!(op_packuswb_pq, op_packuswb_vx, simd::PACKUSWB);
mmx_sse_pair!(op_punpckhbw_pq, op_punpckhbw_vx, simd::PUNPCKHBW);
mmx_sse_pair!(op_punpckhwd_pq, op_punpckhwd_vx, simd::PUNPCKHWD);
mmx_sse_pair!(op_punpckhdq_pq, op_punpckhdq_vx, simd::PUNPCKHDQ);
mmx_sse_pair!(op_packssdw_pq, op_packssdw_vx, simd::PACKSSDW);
mmx_sse_pair!(op_pcmpeqb_pq, op_pcmpeqb_vx, simd::PCMPEQB);
mmx_sse_pair!(op_pcmpeqw_pq, op_pcmpeqw_vx, simd::PCMPEQW);
mmx_sse_pair!(op_pcmpeqd_pq, op_pcmpeqd_vx, simd::PCMPEQD);
mmx_sse_pair!(op_pmullw_pq, op_pmullw_vx, simd::PMULLW);
mmx_sse_pair!(op_pmulhw_pq, op_pmulhw_vx, simd::PMULHW);
mmx_sse_pair!(op_pmulhuw_pq, op_pmulhuw_vx, simd::PMULHUW, is_sse);
mmx_sse_pair!(op_pmuludq_pq, op_pmuludq_vx, simd::PMULUDQ, is_sse2);
mmx_sse_pair!(op_pmaddwd_pq, op_pmaddwd_vx, simd::PMADDWD);
mmx_sse_pair!(op_psadbw_pq, op_psadbw_vx, simd::PSADBW, is_sse);
mmx_sse_pair!(op_psubusb_pq, op_psubusb_vx, simd::PSUBUSB);
mmx_sse_pair!(op_psubusw_pq, op_psubusw_vx, simd::PSUBUSW);
mmx_sse_pair!(op_pminub_pq, op_pminub_vx, simd::PMINUB, is_sse);
mmx_sse_pair!(op_pmaxub_pq, op_pmaxub_vx, simd::PMAXUB, is_sse);
mmx_sse_pair!(op_pminsw_pq, op_pminsw_vx, simd::PMINSW, is_sse);
mmx_sse_pair!(op_pmaxsw_pq, op_pmaxsw_vx, simd::PMAXSW, is_sse);
mmx_sse_pair!(op_pand_pq, op_pand_vx, simd::PAND);
mmx_sse_pair!(op_pandn_pq, op_pandn_vx, simd::PANDN);
mmx_sse_pair!(op_por_pq, op_por_vx, simd::POR);
mmx_sse_pair!(op_pxor_pq, op_pxor_vx, simd::PXOR);
mmx_sse_pair!(op_pavgb_pq, op_pavgb_vx, simd::PAVGB, is_sse);
mmx_sse_pair!(op_pavgw_pq, op_pavgw_vx, simd::PAVGW, is_sse);
mmx_sse_pair!(op_psubsb_pq, op_psubsb_vx, simd::PSUBSB);
mmx_sse_pair!(op_psubsw_pq, op_psubsw_vx, simd::PSUBSW);
mmx_sse_pair!(op_paddsb_pq, op_paddsb_vx, simd::PADDSB);
mmx_sse_pair!(op_paddsw_pq, op_paddsw_vx, simd::PADDSW);
mmx_sse_pair!(op_paddusb_pq, op_paddusb_vx, simd::PADDUSB);
mmx_sse_pair!(op_paddusw_pq, op_paddusw_vx, simd::PADDUSW);
mmx_sse_pair!(op_psubb_pq, op_psubb_vx, simd::PSUBB);
mmx_sse_pair!(op_psubw_pq, op_psubw_vx, simd::PSUBW);
mmx_sse_pair!(op_psubd_pq, op_psubd_vx, simd::PSUBD);
mmx_sse_pair!(op_psubq_pq, op_psubq_vx, simd::PSUBQ, is_sse2);
mmx_sse_pair!(op_paddb_pq, op_paddb_vx, simd::PADDB);
mmx_sse_pair!(op_paddw_pq, op_paddw_vx, simd::PADDW);
mmx_sse_pair!(op_paddd_pq, op_paddd_vx, simd::PADDD);
mmx_sse_pair!(op_paddq_pq, op_paddq_vx, simd::PADDQ, is_sse2);

/// PUNPCKLQDQ/PUNPCKHQDQ exist only in the 0x66 column.
pub(crate) fn op_punpcklqdq_vx(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)?
        }
    };
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, simd::punpcklqdq(dst, src));
    Ok(Exec::Continue)
}

pub(crate) fn op_punpckhqdq_vx(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)?
        }
    };
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, simd::punpckhqdq(dst, src));
    Ok(Exec::Continue)
}

// ---- shifts by register/memory count --------------------------------

fn mmx_shift(ctx: &mut Ctx<'_>, ops: &ShiftOps) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    ctx.prepare_mmx();
    let count = match &mem {
        None => ctx.state.mmx(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)?
        }
    };
    let dst = ctx.state.mmx(modrm.reg);
    ctx.state.set_mmx(modrm.reg, (ops.op_u64)(dst, count));
    Ok(Exec::Continue)
}

fn sse_shift(ctx: &mut Ctx<'_>, ops: &ShiftOps) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let count = match &mem {
        None => ctx.state.xmm(modrm.rm) as u64,
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem_u128_aligned(addr)? as u64
        }
    };
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, (ops.op_u128)(dst, count));
    Ok(Exec::Continue)
}

macro_rules! shift_pair {
    ($mmx:ident, $sse:ident, $table:expr) => {
        pub(crate) fn $mmx(ctx: &mut Ctx<'_>) -> OpResult {
            mmx_shift(ctx, &$table)
        }
        pub(crate) fn $sse(ctx: &mut Ctx<'_>) -> OpResult {
            sse_shift(ctx, &$table)
        }
    };
}

shift_pair!(op_psrlw_pq, op_psrlw_vx, simd::PSRLW);
shift_pair!(op_psrld_pq, op_psrld_vx, simd::PSRLD);
shift_pair!(op_psrlq_pq, op_psrlq_vx, simd::PSRLQ);
shift_pair!(op_psraw_pq, op_psraw_vx, simd::PSRAW);
shift_pair!(op_psrad_pq, op_psrad_vx, simd::PSRAD);
shift_pair!(op_psllw_pq, op_psllw_vx, simd::PSLLW);
shift_pair!(op_pslld_pq, op_pslld_vx, simd::PSLLD);
shift_pair!(op_psllq_pq, op_psllq_vx, simd::PSLLQ);

// ---- Groups 12/13/14: shift by immediate ----------------------------

/// Shared skeleton for 0x0F 0x71/0x72/0x73. Only register forms exist;
/// the count is an imm8. `byte_ops` carries the 0x66-column whole-register
/// byte shifts of Group 14.
fn shift_group(
    ctx: &mut Ctx<'_>,
    is_xmm: bool,
    table_for: fn(u8) -> Option<&'static ShiftOps>,
    byte_shift_for: fn(u8) -> Option<fn(u128, u64) -> u128>,
) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    let count = ctx.next_u8()? as u64;

    if is_xmm {
        ctx.check_fp_unit(FpUnit::Sse2)?;
        if let Some(ops) = table_for(modrm.reg3()) {
            let dst = ctx.state.xmm(modrm.rm);
            ctx.state.set_xmm(modrm.rm, (ops.op_u128)(dst, count));
            return Ok(Exec::Continue);
        }
        if let Some(f) = byte_shift_for(modrm.reg3()) {
            let dst = ctx.state.xmm(modrm.rm);
            ctx.state.set_xmm(modrm.rm, f(dst, count));
            return Ok(Exec::Continue);
        }
        return Err(Exception::InvalidOpcode.into());
    }

    ctx.check_fp_unit(FpUnit::Mmx)?;
    let ops = table_for(modrm.reg3()).ok_or(Exception::InvalidOpcode)?;
    ctx.prepare_mmx();
    let dst = ctx.state.mmx(modrm.rm);
    ctx.state.set_mmx(modrm.rm, (ops.op_u64)(dst, count));
    Ok(Exec::Continue)
}

fn grp12_table(reg: u8) -> Option<&'static ShiftOps> {
    match reg {
        2 => Some(&simd::PSRLW),
        4 => Some(&simd::PSRAW),
        6 => Some(&simd::PSLLW),
        _ => None,
    }
}

fn grp13_table(reg: u8) -> Option<&'static ShiftOps> {
    match reg {
        2 => Some(&simd::PSRLD),
        4 => Some(&simd::PSRAD),
        6 => Some(&simd::PSLLD),
        _ => None,
    }
}

fn grp14_table(reg: u8) -> Option<&'static ShiftOps> {
    match reg {
        2 => Some(&simd::PSRLQ),
        6 => Some(&simd::PSLLQ),
        _ => None,
    }
}

fn no_byte_shift(_reg: u8) -> Option<fn(u128, u64) -> u128> {
    None
}

fn grp14_byte_shift(reg: u8) -> Option<fn(u128, u64) -> u128> {
    match reg {
        3 => Some(simd::psrldq),
        7 => Some(simd::pslldq),
        _ => None,
    }
}

pub(crate) fn op_grp12_pq(ctx: &mut Ctx<'_>) -> OpResult {
    shift_group(ctx, false, grp12_table, no_byte_shift)
}

pub(crate) fn op_grp12_vx(ctx: &mut Ctx<'_>) -> OpResult {
    shift_group(ctx, true, grp12_table, no_byte_shift)
}

pub(crate) fn op_grp13_pq(ctx: &mut Ctx<'_>) -> OpResult {
    shift_group(ctx, false, grp13_table, no_byte_shift)
}

pub(crate) fn op_grp13_vx(ctx: &mut Ctx<'_>) -> OpResult {
    shift_group(ctx, true, grp13_table, no_byte_shift)
}

pub(crate) fn op_grp14_pq(ctx: &mut Ctx<'_>) -> OpResult {
    shift_group(ctx, false, grp14_table, no_byte_shift)
}

pub(crate) fn op_grp14_vx(ctx: &mut Ctx<'_>) -> OpResult {
    shift_group(ctx, true, grp14_table, grp14_byte_shift)
}

// ---- shuffles --------------------------------------------------------

/// PSHUFW Pq, Qq, imm8.
pub(crate) fn op_pshufw(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.sse {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    ctx.prepare_mmx();
    // Decode completes (EA spec + immediate) before any memory access.
    let addr = mem.as_ref().map(|m| ctx.effective_addr(m, 1));
    let order = ctx.next_u8()?;
    let src = match addr {
        None => ctx.state.mmx(modrm.rm),
        Some(addr) => ctx.read_mem(addr, Width::W64)?,
    };
    ctx.state.set_mmx(modrm.reg, simd::pshufw(src, order));
    Ok(Exec::Continue)
}

fn pshuf128(ctx: &mut Ctx<'_>, f: fn(u128, u8) -> u128) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let addr = mem.as_ref().map(|m| ctx.effective_addr(m, 1));
    let order = ctx.next_u8()?;
    let src = match addr {
        None => ctx.state.xmm(modrm.rm),
        Some(addr) => ctx.read_mem_u128_aligned(addr)?,
    };
    ctx.state.set_xmm(modrm.reg, f(src, order));
    Ok(Exec::Continue)
}

pub(crate) fn op_pshufd(ctx: &mut Ctx<'_>) -> OpResult {
    pshuf128(ctx, simd::pshufd)
}

pub(crate) fn op_pshufhw(ctx: &mut Ctx<'_>) -> OpResult {
    pshuf128(ctx, simd::pshufhw)
}

pub(crate) fn op_pshuflw(ctx: &mut Ctx<'_>) -> OpResult {
    pshuf128(ctx, simd::pshuflw)
}

// ---- PMOVMSKB --------------------------------------------------------

pub(crate) fn op_pmovmskb_gd_nq(ctx: &mut Ctx<'_>) -> OpResult {
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
    let mask = simd::pmovmskb_u64(ctx.state.mmx(modrm.rm));
    // The destination write is a 32-bit GPR write and zero-extends.
    ctx.set_gpr(modrm.reg, Width::W32, mask as u64);
    Ok(Exec::Continue)
}

pub(crate) fn op_pmovmskb_gd_ux(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    if mem.is_some() {
        return Err(Exception::InvalidOpcode.into());
    }
    let mask = simd::pmovmskb_u128(ctx.state.xmm(modrm.rm));
    ctx.set_gpr(modrm.reg, Width::W32, mask as u64);
    Ok(Exec::Continue)
}

// ---- EMMS ------------------------------------------------------------

pub(crate) fn op_emms(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    ctx.state.fpu.emms();
    Ok(Exec::Continue)
}
