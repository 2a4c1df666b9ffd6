//! Data movement: MOV forms, LEA, XCHG, stack traffic, flag register
//! shuffles, and the width-conversion one-byte opcodes.

use super::decode::Ctx;
use super::{Exec, OpResult};
use crate::exception::{EmuError, Exception};
use crate::flags::{RFlags, RFLAGS_ARITH_MASK, RFLAGS_FIXED_SET};
use ferrox_types::{Gpr, SegReg, Width};
use ferrox_x86::DecodeMode;

fn require_legacy(ctx: &Ctx<'_>) -> Result<(), EmuError> {
    if ctx.mode == DecodeMode::Bits64 {
        return Err(Exception::InvalidOpcode.into());
    }
    Ok(())
}

// ---- MOV r/m <-> r ---------------------------------------------------

pub(crate) fn op_mov_eb_gb(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.gpr(modrm.reg, Width::W8);
    ctx.store_rm(modrm, &mem, Width::W8, src)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.gpr(modrm.reg, width);
    ctx.store_rm(modrm, &mem, width, src)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_gb_eb(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, Width::W8)?;
    ctx.set_gpr(modrm.reg, Width::W8, src);
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_gv_ev(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    ctx.set_gpr(modrm.reg, width, src);
    Ok(Exec::Continue)
}

// ---- MOV segment forms ----------------------------------------------

pub(crate) fn op_mov_ev_sw(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let seg = SegReg::from_encoding(modrm.reg3()).ok_or(Exception::InvalidOpcode)?;
    let selector = ctx.state.seg(seg).selector as u64;
    match &mem {
        // Register destination zero-extends to the operand width.
        None => ctx.set_gpr(modrm.rm, ctx.op_width(), selector),
        // Memory destination is always a 16-bit store.
        Some(m) => {
            let addr = ctx.effective_addr(m, 0);
            ctx.write_mem(addr, Width::W16, selector)?;
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_sw_ev(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let seg = SegReg::from_encoding(modrm.reg3()).ok_or(Exception::InvalidOpcode)?;
    if seg == SegReg::Cs {
        return Err(Exception::InvalidOpcode.into());
    }
    let selector = ctx.fetch_rm(modrm, &mem, Width::W16)? as u16;
    if ctx.state.is_real_mode() {
        ctx.state.set_seg_real_mode(seg, selector);
    } else {
        // Descriptor-cache loading is the segmentation collaborator's
        // job; the decoder commits the selector.
        let mut s = ctx.state.seg(seg);
        s.selector = selector;
        ctx.state.set_seg(seg, s);
    }
    Ok(Exec::Continue)
}

// ---- LEA -------------------------------------------------------------

pub(crate) fn op_lea(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let mem = mem.ok_or(Exception::InvalidOpcode)?;
    let offset = ctx.ea_offset(&mem, 0);
    ctx.set_gpr(modrm.reg, width, offset);
    Ok(Exec::Continue)
}

// ---- Group 1A: POP r/m ----------------------------------------------

pub(crate) fn op_grp1a_pop(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    if modrm.reg3() != 0 {
        return Err(Exception::InvalidOpcode.into());
    }
    let width = ctx.stack_width();
    let value = ctx.pop(width)?;
    ctx.store_rm(modrm, &mem, width, value)?;
    Ok(Exec::Continue)
}

// ---- XCHG ------------------------------------------------------------

fn xchg_rm_reg(ctx: &mut Ctx<'_>, width: Width) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;
    let src = ctx.gpr(modrm.reg, width);
    match &mem {
        None => {
            if ctx.prefixes.lock {
                return Err(Exception::InvalidOpcode.into());
            }
            let dst = ctx.gpr(modrm.rm, width);
            ctx.set_gpr(modrm.rm, width, src);
            ctx.set_gpr(modrm.reg, width, dst);
        }
        Some(m) => {
            // XCHG with memory is locked whether or not the prefix is
            // present.
            let addr = ctx.effective_addr(m, 0);
            let old = ctx.bus.atomic_rmw(addr, width, &mut |_| src)?;
            ctx.set_gpr(modrm.reg, width, old);
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_xchg_eb_gb(ctx: &mut Ctx<'_>) -> OpResult {
    xchg_rm_reg(ctx, Width::W8)
}

pub(crate) fn op_xchg_ev_gv(ctx: &mut Ctx<'_>) -> OpResult {
    let width = ctx.op_width();
    xchg_rm_reg(ctx, width)
}

/// 0x90: NOP, unless REX.B turns it into XCHG rAX,R8. The F3 form (PAUSE)
/// retires as a NOP in this core.
pub(crate) fn op_nop(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if ctx.prefixes.rex.b {
        let width = ctx.op_width();
        let a = ctx.gpr(0, width);
        let b = ctx.gpr(8, width);
        ctx.set_gpr(0, width, b);
        ctx.set_gpr(8, width, a);
    }
    Ok(Exec::Continue)
}

macro_rules! xchg_rax_reg {
    ($name:ident, $reg:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            ctx.reject_lock()?;
            let width = ctx.op_width();
            let reg = $reg | ((ctx.prefixes.rex.b as u8) << 3);
            let a = ctx.gpr(0, width);
            let b = ctx.gpr(reg, width);
            ctx.set_gpr(0, width, b);
            ctx.set_gpr(reg, width, a);
            Ok(Exec::Continue)
        }
    };
}

xchg_rax_reg!(op_xchg_rcx_rax, 1);
xchg_rax_reg!(op_xchg_rdx_rax, 2);
xchg_rax_reg!(op_xchg_rbx_rax, 3);
xchg_rax_reg!(op_xchg_rsp_rax, 4);
xchg_rax_reg!(op_xchg_rbp_rax, 5);
xchg_rax_reg!(op_xchg_rsi_rax, 6);
xchg_rax_reg!(op_xchg_rdi_rax, 7);

// ---- MOV immediate ---------------------------------------------------

macro_rules! mov_r8_ib {
    ($name:ident, $reg:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            ctx.reject_lock()?;
            let reg = $reg | ((ctx.prefixes.rex.b as u8) << 3);
            let imm = ctx.next_u8()? as u64;
            ctx.set_gpr(reg, Width::W8, imm);
            Ok(Exec::Continue)
        }
    };
}

mov_r8_ib!(op_mov_al_ib, 0);
mov_r8_ib!(op_mov_cl_ib, 1);
mov_r8_ib!(op_mov_dl_ib, 2);
mov_r8_ib!(op_mov_bl_ib, 3);
mov_r8_ib!(op_mov_ah_ib, 4);
mov_r8_ib!(op_mov_ch_ib, 5);
mov_r8_ib!(op_mov_dh_ib, 6);
mov_r8_ib!(op_mov_bh_ib, 7);

macro_rules! mov_r_iv {
    ($name:ident, $reg:expr) => {
        /// MOV r, imm: the only form with a true 64-bit immediate.
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            ctx.reject_lock()?;
            let width = ctx.op_width();
            let reg = $reg | ((ctx.prefixes.rex.b as u8) << 3);
            let imm = match width {
                Width::W16 => ctx.next_u16()? as u64,
                Width::W64 => ctx.next_u64()?,
                _ => ctx.next_u32()? as u64,
            };
            ctx.set_gpr(reg, width, imm);
            Ok(Exec::Continue)
        }
    };
}

mov_r_iv!(op_mov_rax_iv, 0);
mov_r_iv!(op_mov_rcx_iv, 1);
mov_r_iv!(op_mov_rdx_iv, 2);
mov_r_iv!(op_mov_rbx_iv, 3);
mov_r_iv!(op_mov_rsp_iv, 4);
mov_r_iv!(op_mov_rbp_iv, 5);
mov_r_iv!(op_mov_rsi_iv, 6);
mov_r_iv!(op_mov_rdi_iv, 7);

// ---- Group 11: MOV r/m, imm -----------------------------------------

pub(crate) fn op_grp11_eb_ib(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    if modrm.reg3() != 0 {
        // /7 with ModRM F8 is XABORT; transactional memory is not
        // advertised, so everything except /0 is undefined here.
        return Err(Exception::InvalidOpcode.into());
    }
    let imm = ctx.next_u8()? as u64;
    ctx.store_rm(modrm, &mem, Width::W8, imm)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_grp11_ev_iz(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    if modrm.reg3() != 0 {
        return Err(Exception::InvalidOpcode.into());
    }
    let imm_bytes = if width == Width::W16 { 2 } else { 4 };
    match &mem {
        None => {
            let imm = ctx.imm_z(width)?;
            ctx.set_gpr(modrm.rm, width, imm);
        }
        Some(m) => {
            let addr = ctx.effective_addr(m, imm_bytes);
            let imm = ctx.imm_z(width)?;
            ctx.write_mem(addr, width, imm)?;
        }
    }
    Ok(Exec::Continue)
}

// ---- MOV moffs -------------------------------------------------------

fn moffs_addr(ctx: &mut Ctx<'_>) -> Result<u64, EmuError> {
    let offset = match ctx.addr_size() {
        ferrox_x86::AddrSize::A16 => ctx.next_u16()? as u64,
        ferrox_x86::AddrSize::A32 => ctx.next_u32()? as u64,
        ferrox_x86::AddrSize::A64 => ctx.next_u64()?,
    };
    let seg = ctx.prefixes.segment.unwrap_or(SegReg::Ds);
    Ok(ctx.seg_base(seg).wrapping_add(offset))
}

pub(crate) fn op_mov_al_ob(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let addr = moffs_addr(ctx)?;
    let v = ctx.read_mem(addr, Width::W8)?;
    ctx.set_gpr(0, Width::W8, v);
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_rax_ov(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let addr = moffs_addr(ctx)?;
    let v = ctx.read_mem(addr, width)?;
    ctx.set_gpr(0, width, v);
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_ob_al(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let addr = moffs_addr(ctx)?;
    let v = ctx.gpr(0, Width::W8);
    ctx.write_mem(addr, Width::W8, v)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_ov_rax(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let addr = moffs_addr(ctx)?;
    let v = ctx.gpr(0, width);
    ctx.write_mem(addr, width, v)?;
    Ok(Exec::Continue)
}

// ---- PUSH/POP --------------------------------------------------------

macro_rules! push_reg {
    ($name:ident, $reg:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            ctx.reject_lock()?;
            let width = ctx.stack_width();
            let reg = $reg | ((ctx.prefixes.rex.b as u8) << 3);
            let v = ctx.gpr(reg, width);
            ctx.push(width, v)?;
            Ok(Exec::Continue)
        }
    };
}

macro_rules! pop_reg {
    ($name:ident, $reg:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            ctx.reject_lock()?;
            let width = ctx.stack_width();
            let reg = $reg | ((ctx.prefixes.rex.b as u8) << 3);
            let v = ctx.pop(width)?;
            ctx.set_gpr(reg, width, v);
            Ok(Exec::Continue)
        }
    };
}

push_reg!(op_push_rax, 0);
push_reg!(op_push_rcx, 1);
push_reg!(op_push_rdx, 2);
push_reg!(op_push_rbx, 3);
push_reg!(op_push_rsp, 4);
push_reg!(op_push_rbp, 5);
push_reg!(op_push_rsi, 6);
push_reg!(op_push_rdi, 7);
pop_reg!(op_pop_rax, 0);
pop_reg!(op_pop_rcx, 1);
pop_reg!(op_pop_rdx, 2);
pop_reg!(op_pop_rbx, 3);
pop_reg!(op_pop_rsp, 4);
pop_reg!(op_pop_rbp, 5);
pop_reg!(op_pop_rsi, 6);
pop_reg!(op_pop_rdi, 7);

pub(crate) fn op_push_iz(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let imm = match ctx.op_width() {
        Width::W16 => ctx.next_u16()? as i16 as i64 as u64,
        _ => ctx.next_u32()? as i32 as i64 as u64,
    };
    ctx.push(width, width.truncate(imm))?;
    Ok(Exec::Continue)
}

pub(crate) fn op_push_ib(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let imm = ctx.next_i8()? as i64 as u64;
    ctx.push(width, width.truncate(imm))?;
    Ok(Exec::Continue)
}

fn push_seg(ctx: &mut Ctx<'_>, seg: SegReg) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let v = ctx.state.seg(seg).selector as u64;
    ctx.push(width, v)?;
    Ok(Exec::Continue)
}

fn pop_seg(ctx: &mut Ctx<'_>, seg: SegReg) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let v = ctx.pop(width)? as u16;
    if ctx.state.is_real_mode() {
        ctx.state.set_seg_real_mode(seg, v);
    } else {
        let mut s = ctx.state.seg(seg);
        s.selector = v;
        ctx.state.set_seg(seg, s);
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_push_es(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    push_seg(ctx, SegReg::Es)
}

pub(crate) fn op_pop_es(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    pop_seg(ctx, SegReg::Es)
}

pub(crate) fn op_push_cs(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    push_seg(ctx, SegReg::Cs)
}

pub(crate) fn op_push_ss(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    push_seg(ctx, SegReg::Ss)
}

pub(crate) fn op_pop_ss(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    pop_seg(ctx, SegReg::Ss)
}

pub(crate) fn op_push_ds(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    push_seg(ctx, SegReg::Ds)
}

pub(crate) fn op_pop_ds(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    pop_seg(ctx, SegReg::Ds)
}

/// 0x0F 0xA0/0xA8, 0x0F 0xA1/0xA9: FS/GS stack ops exist in every mode.
pub(crate) fn op_push_fs(ctx: &mut Ctx<'_>) -> OpResult {
    push_seg(ctx, SegReg::Fs)
}

pub(crate) fn op_pop_fs(ctx: &mut Ctx<'_>) -> OpResult {
    pop_seg(ctx, SegReg::Fs)
}

pub(crate) fn op_push_gs(ctx: &mut Ctx<'_>) -> OpResult {
    push_seg(ctx, SegReg::Gs)
}

pub(crate) fn op_pop_gs(ctx: &mut Ctx<'_>) -> OpResult {
    pop_seg(ctx, SegReg::Gs)
}

pub(crate) fn op_pusha(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let sp = ctx.state.gpr64(Gpr::Rsp);
    for reg in [0u8, 1, 2, 3, 4, 5, 6, 7] {
        let v = if reg == 4 { sp } else { ctx.gpr(reg, width) };
        ctx.push(width, width.truncate(v))?;
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_popa(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    for reg in [7u8, 6, 5, 4, 3, 2, 1, 0] {
        let v = ctx.pop(width)?;
        if reg != 4 {
            ctx.set_gpr(reg, width, v);
        }
    }
    Ok(Exec::Continue)
}

// ---- ENTER / LEAVE ---------------------------------------------------

pub(crate) fn op_enter(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let alloc = ctx.next_u16()? as u64;
    let level = (ctx.next_u8()? & 0x1F) as u64;

    let rbp = ctx.gpr(5, Width::W64);
    ctx.push(width, width.truncate(rbp))?;
    let frame = ctx.state.gpr64(Gpr::Rsp);

    if level > 0 {
        for i in 1..level {
            let disp = (i * width.bytes() as u64) as u64;
            let src = ctx
                .seg_base(SegReg::Ss)
                .wrapping_add(rbp.wrapping_sub(disp));
            let v = ctx.read_mem(src, width)?;
            ctx.push(width, v)?;
        }
        ctx.push(width, width.truncate(frame))?;
    }

    ctx.set_gpr(5, width, frame);
    let rsp = ctx.state.gpr64(Gpr::Rsp);
    ctx.state.set_gpr64(Gpr::Rsp, rsp.wrapping_sub(alloc));
    Ok(Exec::Continue)
}

pub(crate) fn op_leave(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let rbp = ctx.gpr(5, Width::W64);
    ctx.state.set_gpr64(Gpr::Rsp, rbp);
    let v = ctx.pop(width)?;
    ctx.set_gpr(5, width, v);
    Ok(Exec::Continue)
}

// ---- LES / LDS far-pointer loads ------------------------------------

fn load_far_pointer(ctx: &mut Ctx<'_>, seg: SegReg) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let mem = mem.ok_or(Exception::InvalidOpcode)?;
    let addr = ctx.effective_addr(&mem, 0);
    let offset = ctx.read_mem(addr, width)?;
    let selector = ctx.read_mem(addr.wrapping_add(width.bytes() as u64), Width::W16)? as u16;
    if ctx.state.is_real_mode() {
        ctx.state.set_seg_real_mode(seg, selector);
    } else {
        let mut s = ctx.state.seg(seg);
        s.selector = selector;
        ctx.state.set_seg(seg, s);
    }
    ctx.set_gpr(modrm.reg, width, offset);
    Ok(Exec::Continue)
}

pub(crate) fn op_les(ctx: &mut Ctx<'_>) -> OpResult {
    // 0xC4 is the VEX escape in 64-bit mode; without AVX every VEX form
    // is undefined, and legacy LES is undefined there too.
    require_legacy(ctx)?;
    load_far_pointer(ctx, SegReg::Es)
}

pub(crate) fn op_lds(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    load_far_pointer(ctx, SegReg::Ds)
}

/// 0x0F 0xB2/0xB4/0xB5: LSS/LFS/LGS exist in every mode.
pub(crate) fn op_lss(ctx: &mut Ctx<'_>) -> OpResult {
    load_far_pointer(ctx, SegReg::Ss)
}

pub(crate) fn op_lfs(ctx: &mut Ctx<'_>) -> OpResult {
    load_far_pointer(ctx, SegReg::Fs)
}

pub(crate) fn op_lgs(ctx: &mut Ctx<'_>) -> OpResult {
    load_far_pointer(ctx, SegReg::Gs)
}

// ---- width conversions ----------------------------------------------

/// 0x98: CBW/CWDE/CDQE.
pub(crate) fn op_cbw(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let half = match width {
        Width::W16 => Width::W8,
        Width::W32 => Width::W16,
        _ => Width::W32,
    };
    let v = ctx.gpr(0, half);
    ctx.set_gpr(0, width, width.truncate(half.sign_extend(v)));
    Ok(Exec::Continue)
}

/// 0x99: CWD/CDQ/CQO.
pub(crate) fn op_cwd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let v = ctx.gpr(0, width);
    let sign = if v & width.sign_bit() != 0 {
        width.mask()
    } else {
        0
    };
    ctx.set_gpr(2, width, sign);
    Ok(Exec::Continue)
}

/// 0x63: MOVSXD in 64-bit mode, ARPL in legacy protected mode.
pub(crate) fn op_movsxd_or_arpl(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if ctx.mode == DecodeMode::Bits64 {
        let width = ctx.op_width();
        let (modrm, mem) = ctx.modrm()?;
        let src = ctx.fetch_rm(modrm, &mem, Width::W32)?;
        let v = if width == Width::W64 {
            Width::W32.sign_extend(src)
        } else {
            width.truncate(src)
        };
        ctx.set_gpr(modrm.reg, width, v);
        return Ok(Exec::Continue);
    }

    // ARPL Ew,Gw.
    ctx.require_protected()?;
    let (modrm, mem) = ctx.modrm()?;
    let dst = ctx.fetch_rm(modrm, &mem, Width::W16)?;
    let src = ctx.gpr(modrm.reg, Width::W16);
    if (dst & 0x3) < (src & 0x3) {
        let adjusted = (dst & !0x3) | (src & 0x3);
        ctx.store_rm(modrm, &mem, Width::W16, adjusted)?;
        ctx.state.rflags.set(RFlags::ZF, true);
    } else {
        ctx.state.rflags.set(RFlags::ZF, false);
    }
    Ok(Exec::Continue)
}

// ---- flag-register traffic ------------------------------------------

pub(crate) fn op_pushf(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    // RF/VM read as zero on the stack image.
    let flags = ctx.state.rflags_raw() & !(RFlags::RF.bits() | RFlags::VM.bits());
    ctx.push(width, width.truncate(flags))?;
    Ok(Exec::Continue)
}

pub(crate) fn op_popf(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let popped = ctx.pop(width)?;
    let old = ctx.state.rflags_raw();
    let mut new = match width {
        Width::W16 => (old & !0xFFFF) | (popped & 0xFFFF),
        _ => popped,
    };
    // IF only changes with sufficient privilege; IOPL only at CPL 0.
    let iopl = ((old >> 12) & 0x3) as u8;
    if ctx.state.cpl() > 0 {
        new = (new & !RFlags::IOPL.bits()) | (old & RFlags::IOPL.bits());
        if ctx.state.cpl() > iopl {
            new = (new & !RFlags::IF.bits()) | (old & RFlags::IF.bits());
        }
    }
    new &= !(RFlags::RF.bits() | RFlags::VM.bits());
    ctx.state.set_rflags_raw(new | RFLAGS_FIXED_SET);
    Ok(Exec::Continue)
}

pub(crate) fn op_sahf(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let ah = (ctx.state.gpr16(Gpr::Rax) >> 8) as u64;
    let keep = ctx.state.rflags.bits() & !0xFF;
    ctx.state
        .set_rflags_raw(keep | (ah & (RFLAGS_ARITH_MASK & 0xFF)) | RFLAGS_FIXED_SET);
    Ok(Exec::Continue)
}

pub(crate) fn op_lahf(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let flags = (ctx.state.rflags_raw() & 0xFF) as u16;
    let ax = ctx.state.gpr16(Gpr::Rax);
    ctx.state.set_gpr16(Gpr::Rax, (ax & 0x00FF) | (flags << 8));
    Ok(Exec::Continue)
}

pub(crate) fn op_cmc(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let cf = ctx.state.rflags.get(RFlags::CF);
    ctx.state.rflags.set(RFlags::CF, !cf);
    Ok(Exec::Continue)
}

pub(crate) fn op_clc(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.state.rflags.set(RFlags::CF, false);
    Ok(Exec::Continue)
}

pub(crate) fn op_stc(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.state.rflags.set(RFlags::CF, true);
    Ok(Exec::Continue)
}

pub(crate) fn op_cld(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.state.rflags.set(RFlags::DF, false);
    Ok(Exec::Continue)
}

pub(crate) fn op_std(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.state.rflags.set(RFlags::DF, true);
    Ok(Exec::Continue)
}

// ---- misc ------------------------------------------------------------

/// Undocumented SALC: AL = CF ? 0xFF : 0. Not valid in 64-bit mode.
pub(crate) fn op_salc(ctx: &mut Ctx<'_>) -> OpResult {
    require_legacy(ctx)?;
    ctx.reject_lock()?;
    let v = if ctx.state.rflags.get(RFlags::CF) {
        0xFF
    } else {
        0
    };
    ctx.set_gpr(0, Width::W8, v);
    Ok(Exec::Continue)
}

pub(crate) fn op_xlat(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let base = ctx.gpr(3, Width::W64);
    let al = ctx.gpr(0, Width::W8);
    let offset = match ctx.addr_size() {
        ferrox_x86::AddrSize::A16 => (base.wrapping_add(al)) & 0xFFFF,
        ferrox_x86::AddrSize::A32 => (base.wrapping_add(al)) & 0xFFFF_FFFF,
        ferrox_x86::AddrSize::A64 => base.wrapping_add(al),
    };
    let seg = ctx.prefixes.segment.unwrap_or(SegReg::Ds);
    let addr = ctx.seg_base(seg).wrapping_add(offset);
    let v = ctx.read_mem(addr, Width::W8)?;
    ctx.set_gpr(0, Width::W8, v);
    Ok(Exec::Continue)
}
