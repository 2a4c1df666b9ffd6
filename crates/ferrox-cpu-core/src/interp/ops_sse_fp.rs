//! SSE floating-point rows: arithmetic, compares, conversions, shuffles.
//!
//! This is the SIMD-exception-aware handler family: every computation
//! funnels its reported MXCSR status through [`Ctx::report_mxcsr`], which
//! commits the sticky bits and decides between continuing, #XM, and the
//! no-OSXMMEXCPT #UD fallback, before any destination is written.

use super::decode::{Ctx, FpUnit};
use super::{Exec, OpResult};
use crate::exception::Exception;
use crate::flags::RFlags;
use crate::simd;
use crate::simd::{FpBinOp, FpCmpPredicate, FpResult};
use ferrox_types::Width;

const LO64: u128 = u64::MAX as u128;

/// Operand shape of an SSE FP instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FpForm {
    Ps,
    Pd,
    Ss,
    Sd,
}

impl FpForm {
    fn unit(self) -> FpUnit {
        match self {
            FpForm::Ps | FpForm::Ss => FpUnit::Sse,
            FpForm::Pd | FpForm::Sd => FpUnit::Sse2,
        }
    }
}

/// Fetch the W operand: packed forms demand alignment, scalar forms read
/// only their lane's width.
fn fetch_w(ctx: &mut Ctx<'_>, form: FpForm, modrm: ferrox_x86::ModRm, mem: &Option<ferrox_x86::MemForm>, imm_bytes: usize) -> Result<u128, crate::exception::EmuError> {
    match mem {
        None => Ok(ctx.state.xmm(modrm.rm)),
        Some(m) => {
            let addr = ctx.effective_addr(m, imm_bytes);
            match form {
                FpForm::Ps | FpForm::Pd => ctx.read_mem_u128_aligned(addr),
                FpForm::Ss => Ok(ctx.read_mem(addr, Width::W32)? as u128),
                FpForm::Sd => Ok(ctx.read_mem(addr, Width::W64)? as u128),
            }
        }
    }
}

fn fp_bin(ctx: &mut Ctx<'_>, form: FpForm, op: FpBinOp) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(form.unit())?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, form, modrm, &mem, 0)?;
    let dst = ctx.state.xmm(modrm.reg);
    let result = match form {
        FpForm::Ps => simd::fp_bin_ps(op, dst, src),
        FpForm::Pd => simd::fp_bin_pd(op, dst, src),
        FpForm::Ss => simd::fp_bin_ss(op, dst, src),
        FpForm::Sd => simd::fp_bin_sd(op, dst, src),
    };
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

macro_rules! fp_bin_row {
    ($op:expr, $ps:ident, $pd:ident, $ss:ident, $sd:ident) => {
        pub(crate) fn $ps(ctx: &mut Ctx<'_>) -> OpResult {
            fp_bin(ctx, FpForm::Ps, $op)
        }
        pub(crate) fn $pd(ctx: &mut Ctx<'_>) -> OpResult {
            fp_bin(ctx, FpForm::Pd, $op)
        }
        pub(crate) fn $ss(ctx: &mut Ctx<'_>) -> OpResult {
            fp_bin(ctx, FpForm::Ss, $op)
        }
        pub(crate) fn $sd(ctx: &mut Ctx<'_>) -> OpResult {
            fp_bin(ctx, FpForm::Sd, $op)
        }
    };
}

fp_bin_row!(FpBinOp::Add, op_addps, op_addpd, op_addss, op_addsd);
fp_bin_row!(FpBinOp::Mul, op_mulps, op_mulpd, op_mulss, op_mulsd);
fp_bin_row!(FpBinOp::Sub, op_subps, op_subpd, op_subss, op_subsd);
fp_bin_row!(FpBinOp::Min, op_minps, op_minpd, op_minss, op_minsd);
fp_bin_row!(FpBinOp::Div, op_divps, op_divpd, op_divss, op_divsd);
fp_bin_row!(FpBinOp::Max, op_maxps, op_maxpd, op_maxss, op_maxsd);

// ---- SQRT / RSQRT / RCP ---------------------------------------------

pub(crate) fn op_sqrtps(ctx: &mut Ctx<'_>) -> OpResult {
    fp_unary(ctx, FpForm::Ps, simd::sqrtps)
}

pub(crate) fn op_sqrtpd(ctx: &mut Ctx<'_>) -> OpResult {
    fp_unary(ctx, FpForm::Pd, simd::sqrtpd)
}

fn fp_unary(ctx: &mut Ctx<'_>, form: FpForm, f: fn(u128) -> FpResult) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(form.unit())?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, form, modrm, &mem, 0)?;
    let result = f(src);
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

pub(crate) fn op_sqrtss(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ss, modrm, &mem, 0)?;
    let dst = ctx.state.xmm(modrm.reg);
    let result = simd::sqrtss(dst, src);
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

pub(crate) fn op_sqrtsd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Sd, modrm, &mem, 0)?;
    let dst = ctx.state.xmm(modrm.reg);
    let result = simd::sqrtsd(dst, src);
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

/// RSQRTPS/RCPPS are approximation forms and never fault on computation.
pub(crate) fn op_rsqrtps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ps, modrm, &mem, 0)?;
    ctx.state.set_xmm(modrm.reg, simd::rsqrtps(src));
    Ok(Exec::Continue)
}

pub(crate) fn op_rsqrtss(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ss, modrm, &mem, 0)?;
    let dst = ctx.state.xmm(modrm.reg);
    let lane = simd::rsqrtps(src) & 0xFFFF_FFFF;
    ctx.state.set_xmm(modrm.reg, (dst & !0xFFFF_FFFFu128) | lane);
    Ok(Exec::Continue)
}

pub(crate) fn op_rcpps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ps, modrm, &mem, 0)?;
    ctx.state.set_xmm(modrm.reg, simd::rcpps(src));
    Ok(Exec::Continue)
}

pub(crate) fn op_rcpss(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ss, modrm, &mem, 0)?;
    let dst = ctx.state.xmm(modrm.reg);
    let lane = simd::rcpps(src) & 0xFFFF_FFFF;
    ctx.state.set_xmm(modrm.reg, (dst & !0xFFFF_FFFFu128) | lane);
    Ok(Exec::Continue)
}

// ---- packed logic (0x54-0x57) ---------------------------------------

fn fp_logic(ctx: &mut Ctx<'_>, unit: FpUnit, f: fn(u128, u128) -> u128) -> OpResult {
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

fn and128(a: u128, b: u128) -> u128 {
    a & b
}

fn andn128(a: u128, b: u128) -> u128 {
    !a & b
}

fn or128(a: u128, b: u128) -> u128 {
    a | b
}

fn xor128(a: u128, b: u128) -> u128 {
    a ^ b
}

pub(crate) fn op_andps(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse, and128)
}

pub(crate) fn op_andpd(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse2, and128)
}

pub(crate) fn op_andnps(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse, andn128)
}

pub(crate) fn op_andnpd(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse2, andn128)
}

pub(crate) fn op_orps(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse, or128)
}

pub(crate) fn op_orpd(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse2, or128)
}

pub(crate) fn op_xorps(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse, xor128)
}

pub(crate) fn op_xorpd(ctx: &mut Ctx<'_>) -> OpResult {
    fp_logic(ctx, FpUnit::Sse2, xor128)
}

// ---- SSE3 horizontal / asymmetric forms -----------------------------

fn sse3_bin(ctx: &mut Ctx<'_>, f: fn(u128, u128) -> FpResult) -> OpResult {
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
    let dst = ctx.state.xmm(modrm.reg);
    let result = f(dst, src);
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

pub(crate) fn op_haddps(ctx: &mut Ctx<'_>) -> OpResult {
    sse3_bin(ctx, simd::haddps)
}

pub(crate) fn op_haddpd(ctx: &mut Ctx<'_>) -> OpResult {
    sse3_bin(ctx, simd::haddpd)
}

pub(crate) fn op_hsubps(ctx: &mut Ctx<'_>) -> OpResult {
    sse3_bin(ctx, simd::hsubps)
}

pub(crate) fn op_hsubpd(ctx: &mut Ctx<'_>) -> OpResult {
    sse3_bin(ctx, simd::hsubpd)
}

pub(crate) fn op_addsubps(ctx: &mut Ctx<'_>) -> OpResult {
    sse3_bin(ctx, simd::addsubps)
}

pub(crate) fn op_addsubpd(ctx: &mut Ctx<'_>) -> OpResult {
    sse3_bin(ctx, simd::addsubpd)
}

// ---- compares --------------------------------------------------------

fn cmp_with_predicate(ctx: &mut Ctx<'_>, form: FpForm) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(form.unit())?;
    let (modrm, mem) = ctx.modrm()?;
    let addr = mem.as_ref().map(|m| ctx.effective_addr(m, 1));
    let imm = ctx.next_u8()?;
    // Only the SSE predicate range is defined without AVX.
    if imm > 7 {
        return Err(Exception::InvalidOpcode.into());
    }
    let pred = FpCmpPredicate::from_imm(imm).ok_or(Exception::InvalidOpcode)?;

    let src = match addr {
        None => ctx.state.xmm(modrm.rm),
        Some(addr) => match form {
            FpForm::Ps | FpForm::Pd => ctx.read_mem_u128_aligned(addr)?,
            FpForm::Ss => ctx.read_mem(addr, Width::W32)? as u128,
            FpForm::Sd => ctx.read_mem(addr, Width::W64)? as u128,
        },
    };
    let dst = ctx.state.xmm(modrm.reg);

    let result = match form {
        FpForm::Ps => simd::cmpps(pred, dst, src),
        FpForm::Pd => simd::cmppd(pred, dst, src),
        FpForm::Ss => {
            let full = simd::cmpps(pred, dst, src);
            FpResult {
                value: (dst & !0xFFFF_FFFFu128) | (full.value & 0xFFFF_FFFF),
                flags: full.flags,
            }
        }
        FpForm::Sd => {
            let full = simd::cmppd(pred, dst, src);
            FpResult {
                value: (dst & !LO64) | (full.value & LO64),
                flags: full.flags,
            }
        }
    };
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

pub(crate) fn op_cmpps(ctx: &mut Ctx<'_>) -> OpResult {
    cmp_with_predicate(ctx, FpForm::Ps)
}

pub(crate) fn op_cmppd(ctx: &mut Ctx<'_>) -> OpResult {
    cmp_with_predicate(ctx, FpForm::Pd)
}

pub(crate) fn op_cmpss(ctx: &mut Ctx<'_>) -> OpResult {
    cmp_with_predicate(ctx, FpForm::Ss)
}

pub(crate) fn op_cmpsd(ctx: &mut Ctx<'_>) -> OpResult {
    cmp_with_predicate(ctx, FpForm::Sd)
}

fn comis(ctx: &mut Ctx<'_>, double: bool, signaling: bool) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(if double { FpUnit::Sse2 } else { FpUnit::Sse })?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            if double {
                ctx.read_mem(addr, Width::W64)? as u128
            } else {
                ctx.read_mem(addr, Width::W32)? as u128
            }
        }
    };
    let dst = ctx.state.xmm(modrm.reg);
    let cmp = if double {
        simd::comisd(dst, src, signaling)
    } else {
        simd::comiss(dst, src, signaling)
    };
    // An unmasked invalid raises before EFLAGS update.
    ctx.report_mxcsr(cmp.flags)?;
    ctx.state.rflags.set(RFlags::ZF, cmp.zf);
    ctx.state.rflags.set(RFlags::PF, cmp.pf);
    ctx.state.rflags.set(RFlags::CF, cmp.cf);
    ctx.state.rflags.set(RFlags::OF, false);
    ctx.state.rflags.set(RFlags::SF, false);
    ctx.state.rflags.set(RFlags::AF, false);
    Ok(Exec::Continue)
}

pub(crate) fn op_ucomiss(ctx: &mut Ctx<'_>) -> OpResult {
    comis(ctx, false, false)
}

pub(crate) fn op_ucomisd(ctx: &mut Ctx<'_>) -> OpResult {
    comis(ctx, true, false)
}

pub(crate) fn op_comiss(ctx: &mut Ctx<'_>) -> OpResult {
    comis(ctx, false, true)
}

pub(crate) fn op_comisd(ctx: &mut Ctx<'_>) -> OpResult {
    comis(ctx, true, true)
}

// ---- shuffles --------------------------------------------------------

pub(crate) fn op_shufps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    let (modrm, mem) = ctx.modrm()?;
    let addr = mem.as_ref().map(|m| ctx.effective_addr(m, 1));
    let order = ctx.next_u8()?;
    let src = match addr {
        None => ctx.state.xmm(modrm.rm),
        Some(addr) => ctx.read_mem_u128_aligned(addr)?,
    };
    let dst = ctx.state.xmm(modrm.reg);

    let pick = |v: u128, sel: u8| (v >> (sel as u32 * 32)) & 0xFFFF_FFFF;
    let value = pick(dst, order & 3)
        | (pick(dst, (order >> 2) & 3) << 32)
        | (pick(src, (order >> 4) & 3) << 64)
        | (pick(src, (order >> 6) & 3) << 96);
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_shufpd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let addr = mem.as_ref().map(|m| ctx.effective_addr(m, 1));
    let order = ctx.next_u8()?;
    let src = match addr {
        None => ctx.state.xmm(modrm.rm),
        Some(addr) => ctx.read_mem_u128_aligned(addr)?,
    };
    let dst = ctx.state.xmm(modrm.reg);

    let lo = if order & 1 == 0 { dst & LO64 } else { dst >> 64 };
    let hi = if order & 2 == 0 { src & LO64 } else { src >> 64 };
    ctx.state.set_xmm(modrm.reg, lo | (hi << 64));
    Ok(Exec::Continue)
}

// ---- conversions -----------------------------------------------------

/// 0x2A, no prefix / 0x66: CVTPI2PS / CVTPI2PD take an MMX source.
pub(crate) fn op_cvtpi2ps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse)?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => {
            ctx.prepare_mmx();
            ctx.state.mmx(modrm.rm)
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)?
        }
    };
    let packed = simd::cvtdq2ps(src as u128);
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state
        .set_xmm(modrm.reg, (dst & !LO64) | (packed & LO64));
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtpi2pd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => {
            ctx.prepare_mmx();
            ctx.state.mmx(modrm.rm)
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)?
        }
    };
    ctx.state.set_xmm(modrm.reg, simd::cvtdq2pd(src as u128));
    Ok(Exec::Continue)
}

fn cvtsi2_scalar(ctx: &mut Ctx<'_>, double: bool) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(if double { FpUnit::Sse2 } else { FpUnit::Sse })?;
    let (modrm, mem) = ctx.modrm()?;
    let width = if ctx.prefixes.rex.w {
        Width::W64
    } else {
        Width::W32
    };
    let raw = ctx.fetch_rm(modrm, &mem, width)?;
    let src = width.sign_extend(raw) as i64;
    let dst = ctx.state.xmm(modrm.reg);
    let value = if double {
        simd::cvtsi2sd(dst, src)
    } else {
        simd::cvtsi2ss(dst, src)
    };
    ctx.state.set_xmm(modrm.reg, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtsi2ss(ctx: &mut Ctx<'_>) -> OpResult {
    cvtsi2_scalar(ctx, false)
}

pub(crate) fn op_cvtsi2sd(ctx: &mut Ctx<'_>) -> OpResult {
    cvtsi2_scalar(ctx, true)
}

/// 0x2C/0x2D with no prefix / 0x66: packed conversions to MMX.
fn cvtps2pi(ctx: &mut Ctx<'_>, double: bool, truncate: bool) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(if double { FpUnit::Sse2 } else { FpUnit::Sse })?;
    ctx.check_fp_unit(FpUnit::Mmx)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            if double {
                ctx.read_mem_u128_aligned(addr)?
            } else {
                ctx.read_mem(addr, Width::W64)? as u128
            }
        }
    };
    let rc = ctx.mxcsr_rc();
    let result = if double {
        simd::cvtpd2dq(src, rc, truncate)
    } else {
        simd::cvtps2dq(src, rc, truncate)
    };
    ctx.report_mxcsr(result.flags)?;
    ctx.prepare_mmx();
    ctx.state.set_mmx(modrm.reg, result.value as u64);
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtps2pi(ctx: &mut Ctx<'_>) -> OpResult {
    cvtps2pi(ctx, false, false)
}

pub(crate) fn op_cvttps2pi(ctx: &mut Ctx<'_>) -> OpResult {
    cvtps2pi(ctx, false, true)
}

pub(crate) fn op_cvtpd2pi(ctx: &mut Ctx<'_>) -> OpResult {
    cvtps2pi(ctx, true, false)
}

pub(crate) fn op_cvttpd2pi(ctx: &mut Ctx<'_>) -> OpResult {
    cvtps2pi(ctx, true, true)
}

/// Scalar-to-integer conversions (0xF3/0xF2 0x2C/0x2D).
fn cvts2si(ctx: &mut Ctx<'_>, double: bool, truncate: bool) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(if double { FpUnit::Sse2 } else { FpUnit::Sse })?;
    let (modrm, mem) = ctx.modrm()?;
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            if double {
                ctx.read_mem(addr, Width::W64)? as u128
            } else {
                ctx.read_mem(addr, Width::W32)? as u128
            }
        }
    };
    let wide = ctx.prefixes.rex.w;
    let rc = ctx.mxcsr_rc();
    let (value, flags) = if double {
        simd::cvtsd2si(src, rc, truncate, wide)
    } else {
        simd::cvtss2si(src, rc, truncate, wide)
    };
    ctx.report_mxcsr(flags)?;
    let width = if wide { Width::W64 } else { Width::W32 };
    ctx.set_gpr(modrm.reg, width, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtss2si(ctx: &mut Ctx<'_>) -> OpResult {
    cvts2si(ctx, false, false)
}

pub(crate) fn op_cvttss2si(ctx: &mut Ctx<'_>) -> OpResult {
    cvts2si(ctx, false, true)
}

pub(crate) fn op_cvtsd2si(ctx: &mut Ctx<'_>) -> OpResult {
    cvts2si(ctx, true, false)
}

pub(crate) fn op_cvttsd2si(ctx: &mut Ctx<'_>) -> OpResult {
    cvts2si(ctx, true, true)
}

/// 0x5A row: precision conversions.
pub(crate) fn op_cvtps2pd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    // Only the low two singles are read: 8 bytes from memory.
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)? as u128
        }
    };
    ctx.state.set_xmm(modrm.reg, simd::cvtps2pd(src));
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtpd2ps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Pd, modrm, &mem, 0)?;
    ctx.state.set_xmm(modrm.reg, simd::cvtpd2ps(src));
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtss2sd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ss, modrm, &mem, 0)?;
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, simd::cvtss2sd(dst, src));
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtsd2ss(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Sd, modrm, &mem, 0)?;
    let dst = ctx.state.xmm(modrm.reg);
    ctx.state.set_xmm(modrm.reg, simd::cvtsd2ss(dst, src));
    Ok(Exec::Continue)
}

/// 0x5B row.
pub(crate) fn op_cvtdq2ps(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ps, modrm, &mem, 0)?;
    ctx.state.set_xmm(modrm.reg, simd::cvtdq2ps(src));
    Ok(Exec::Continue)
}

fn cvtps2dq_common(ctx: &mut Ctx<'_>, truncate: bool) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Ps, modrm, &mem, 0)?;
    let rc = ctx.mxcsr_rc();
    let result = simd::cvtps2dq(src, rc, truncate);
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtps2dq(ctx: &mut Ctx<'_>) -> OpResult {
    cvtps2dq_common(ctx, false)
}

pub(crate) fn op_cvttps2dq(ctx: &mut Ctx<'_>) -> OpResult {
    cvtps2dq_common(ctx, true)
}

/// 0xE6 row.
fn cvtpd2dq_common(ctx: &mut Ctx<'_>, truncate: bool) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    let src = fetch_w(ctx, FpForm::Pd, modrm, &mem, 0)?;
    let rc = ctx.mxcsr_rc();
    let result = simd::cvtpd2dq(src, rc, truncate);
    ctx.report_mxcsr(result.flags)?;
    ctx.state.set_xmm(modrm.reg, result.value);
    Ok(Exec::Continue)
}

pub(crate) fn op_cvtpd2dq(ctx: &mut Ctx<'_>) -> OpResult {
    cvtpd2dq_common(ctx, false)
}

pub(crate) fn op_cvttpd2dq(ctx: &mut Ctx<'_>) -> OpResult {
    cvtpd2dq_common(ctx, true)
}

pub(crate) fn op_cvtdq2pd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.check_fp_unit(FpUnit::Sse2)?;
    let (modrm, mem) = ctx.modrm()?;
    // Two source dwords: 8 bytes from memory.
    let src = match &mem {
        None => ctx.state.xmm(modrm.rm),
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.read_mem(addr, Width::W64)? as u128
        }
    };
    ctx.state.set_xmm(modrm.reg, simd::cvtdq2pd(src));
    Ok(Exec::Continue)
}
