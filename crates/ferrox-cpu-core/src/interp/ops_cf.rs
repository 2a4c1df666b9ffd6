//! Control flow: conditional branches, near calls/returns, loops, and the
//! two-byte Jcc/SETcc/CMOVcc rows plus BSWAP.

use super::decode::Ctx;
use super::{Exec, OpResult};
use crate::exception::Exception;
use ferrox_types::{Cond, Gpr, Width};
use ferrox_x86::AddrSize;

fn eval_cc(ctx: &Ctx<'_>, cc: u8) -> bool {
    // The table index is always a valid condition code.
    Cond::from_cc(cc & 0xF).map_or(false, |c| c.eval(ctx.state.rflags_raw()))
}

// ---- Jcc rel8 --------------------------------------------------------

fn jcc_rel8(ctx: &mut Ctx<'_>, cc: u8) -> OpResult {
    ctx.reject_lock()?;
    let rel = ctx.next_i8()? as i64;
    let width = ctx.op_width();
    if eval_cc(ctx, cc) {
        Ok(ctx.branch_rel(rel, width))
    } else {
        Ok(Exec::Continue)
    }
}

macro_rules! jcc8 {
    ($name:ident, $cc:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            jcc_rel8(ctx, $cc)
        }
    };
}

jcc8!(op_jo_rel8, 0x0);
jcc8!(op_jno_rel8, 0x1);
jcc8!(op_jb_rel8, 0x2);
jcc8!(op_jnb_rel8, 0x3);
jcc8!(op_jz_rel8, 0x4);
jcc8!(op_jnz_rel8, 0x5);
jcc8!(op_jbe_rel8, 0x6);
jcc8!(op_jnbe_rel8, 0x7);
jcc8!(op_js_rel8, 0x8);
jcc8!(op_jns_rel8, 0x9);
jcc8!(op_jp_rel8, 0xA);
jcc8!(op_jnp_rel8, 0xB);
jcc8!(op_jl_rel8, 0xC);
jcc8!(op_jnl_rel8, 0xD);
jcc8!(op_jle_rel8, 0xE);
jcc8!(op_jnle_rel8, 0xF);

// ---- Jcc rel16/32 (0x0F 0x80..0x8F) ---------------------------------

fn jcc_rel_z(ctx: &mut Ctx<'_>, cc: u8) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let rel = match width {
        Width::W16 => ctx.next_u16()? as i16 as i64,
        _ => ctx.next_u32()? as i32 as i64,
    };
    if eval_cc(ctx, cc) {
        Ok(ctx.branch_rel(rel, width))
    } else {
        Ok(Exec::Continue)
    }
}

macro_rules! jccz {
    ($name:ident, $cc:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            jcc_rel_z(ctx, $cc)
        }
    };
}

jccz!(op_jo_rel, 0x0);
jccz!(op_jno_rel, 0x1);
jccz!(op_jb_rel, 0x2);
jccz!(op_jnb_rel, 0x3);
jccz!(op_jz_rel, 0x4);
jccz!(op_jnz_rel, 0x5);
jccz!(op_jbe_rel, 0x6);
jccz!(op_jnbe_rel, 0x7);
jccz!(op_js_rel, 0x8);
jccz!(op_jns_rel, 0x9);
jccz!(op_jp_rel, 0xA);
jccz!(op_jnp_rel, 0xB);
jccz!(op_jl_rel, 0xC);
jccz!(op_jnl_rel, 0xD);
jccz!(op_jle_rel, 0xE);
jccz!(op_jnle_rel, 0xF);

// ---- SETcc -----------------------------------------------------------

fn setcc(ctx: &mut Ctx<'_>, cc: u8) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    let v = eval_cc(ctx, cc) as u64;
    ctx.store_rm(modrm, &mem, Width::W8, v)?;
    Ok(Exec::Continue)
}

macro_rules! setcc_op {
    ($name:ident, $cc:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            setcc(ctx, $cc)
        }
    };
}

setcc_op!(op_seto, 0x0);
setcc_op!(op_setno, 0x1);
setcc_op!(op_setb, 0x2);
setcc_op!(op_setnb, 0x3);
setcc_op!(op_setz, 0x4);
setcc_op!(op_setnz, 0x5);
setcc_op!(op_setbe, 0x6);
setcc_op!(op_setnbe, 0x7);
setcc_op!(op_sets, 0x8);
setcc_op!(op_setns, 0x9);
setcc_op!(op_setp, 0xA);
setcc_op!(op_setnp, 0xB);
setcc_op!(op_setl, 0xC);
setcc_op!(op_setnl, 0xD);
setcc_op!(op_setle, 0xE);
setcc_op!(op_setnle, 0xF);

// ---- CMOVcc ----------------------------------------------------------

fn cmovcc(ctx: &mut Ctx<'_>, cc: u8) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.cmov {
        return Err(Exception::InvalidOpcode.into());
    }
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    // The source is fetched (and may fault) even when the move does not
    // happen, and the destination is rewritten unconditionally so 32-bit
    // forms zero-extend either way.
    let src = ctx.fetch_rm(modrm, &mem, width)?;
    let value = if eval_cc(ctx, cc) {
        src
    } else {
        ctx.gpr(modrm.reg, width)
    };
    ctx.set_gpr(modrm.reg, width, value);
    Ok(Exec::Continue)
}

macro_rules! cmov_op {
    ($name:ident, $cc:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            cmovcc(ctx, $cc)
        }
    };
}

cmov_op!(op_cmovo, 0x0);
cmov_op!(op_cmovno, 0x1);
cmov_op!(op_cmovb, 0x2);
cmov_op!(op_cmovnb, 0x3);
cmov_op!(op_cmovz, 0x4);
cmov_op!(op_cmovnz, 0x5);
cmov_op!(op_cmovbe, 0x6);
cmov_op!(op_cmovnbe, 0x7);
cmov_op!(op_cmovs, 0x8);
cmov_op!(op_cmovns, 0x9);
cmov_op!(op_cmovp, 0xA);
cmov_op!(op_cmovnp, 0xB);
cmov_op!(op_cmovl, 0xC);
cmov_op!(op_cmovnl, 0xD);
cmov_op!(op_cmovle, 0xE);
cmov_op!(op_cmovnle, 0xF);

// ---- unconditional near transfers -----------------------------------

pub(crate) fn op_jmp_rel8(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let rel = ctx.next_i8()? as i64;
    let width = ctx.op_width();
    Ok(ctx.branch_rel(rel, width))
}

pub(crate) fn op_jmp_rel_z(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let rel = match width {
        Width::W16 => ctx.next_u16()? as i16 as i64,
        _ => ctx.next_u32()? as i32 as i64,
    };
    Ok(ctx.branch_rel(rel, width))
}

pub(crate) fn op_call_rel_z(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.op_width();
    let rel = match width {
        Width::W16 => ctx.next_u16()? as i16 as i64,
        _ => ctx.next_u32()? as i32 as i64,
    };
    let next = ctx.start_rip.wrapping_add(ctx.cursor.len() as u64);
    ctx.push(ctx.stack_width(), next)?;
    Ok(ctx.branch_rel(rel, width))
}

pub(crate) fn op_ret(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let width = ctx.stack_width();
    let target = ctx.pop(width)?;
    Ok(ctx.branch_abs(target, width))
}

pub(crate) fn op_ret_iw(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let imm = ctx.next_u16()? as u64;
    let width = ctx.stack_width();
    let target = ctx.pop(width)?;
    let rsp = ctx.state.gpr64(Gpr::Rsp);
    ctx.state.set_gpr64(Gpr::Rsp, rsp.wrapping_add(imm));
    Ok(ctx.branch_abs(target, width))
}

// ---- LOOP family -----------------------------------------------------

fn count_mask(ctx: &Ctx<'_>) -> u64 {
    match ctx.addr_size() {
        AddrSize::A16 => 0xFFFF,
        AddrSize::A32 => 0xFFFF_FFFF,
        AddrSize::A64 => u64::MAX,
    }
}

fn loop_common(ctx: &mut Ctx<'_>, zf_requirement: Option<bool>) -> OpResult {
    ctx.reject_lock()?;
    let rel = ctx.next_i8()? as i64;
    let mask = count_mask(ctx);
    let rcx = ctx.state.gpr64(Gpr::Rcx);
    let count = rcx.wrapping_sub(1) & mask;
    ctx.state
        .set_gpr64(Gpr::Rcx, (rcx & !mask) | count);

    let zf_ok = zf_requirement.map_or(true, |want| {
        ctx.state.rflags.get(crate::flags::RFlags::ZF) == want
    });
    if count != 0 && zf_ok {
        let width = ctx.op_width();
        Ok(ctx.branch_rel(rel, width))
    } else {
        Ok(Exec::Continue)
    }
}

pub(crate) fn op_loopne(ctx: &mut Ctx<'_>) -> OpResult {
    loop_common(ctx, Some(false))
}

pub(crate) fn op_loope(ctx: &mut Ctx<'_>) -> OpResult {
    loop_common(ctx, Some(true))
}

pub(crate) fn op_loop(ctx: &mut Ctx<'_>) -> OpResult {
    loop_common(ctx, None)
}

/// JCXZ/JECXZ/JRCXZ: taken when the address-sized count register is zero.
pub(crate) fn op_jcxz(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let rel = ctx.next_i8()? as i64;
    let mask = count_mask(ctx);
    if ctx.state.gpr64(Gpr::Rcx) & mask == 0 {
        let width = ctx.op_width();
        Ok(ctx.branch_rel(rel, width))
    } else {
        Ok(Exec::Continue)
    }
}

// ---- BSWAP -----------------------------------------------------------

fn bswap(ctx: &mut Ctx<'_>, reg: u8) -> OpResult {
    ctx.reject_lock()?;
    let reg = reg | ((ctx.prefixes.rex.b as u8) << 3);
    let width = ctx.op_width();
    let v = ctx.gpr(reg, width);
    let swapped = match width {
        // 16-bit BSWAP is documented as undefined; real parts zero the
        // register, which is the behavior modeled here.
        Width::W16 => 0,
        Width::W64 => v.swap_bytes(),
        _ => (v as u32).swap_bytes() as u64,
    };
    ctx.set_gpr(reg, width, swapped);
    Ok(Exec::Continue)
}

macro_rules! bswap_op {
    ($name:ident, $reg:expr) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>) -> OpResult {
            bswap(ctx, $reg)
        }
    };
}

bswap_op!(op_bswap_rax, 0);
bswap_op!(op_bswap_rcx, 1);
bswap_op!(op_bswap_rdx, 2);
bswap_op!(op_bswap_rbx, 3);
bswap_op!(op_bswap_rsp, 4);
bswap_op!(op_bswap_rbp, 5);
bswap_op!(op_bswap_rsi, 6);
bswap_op!(op_bswap_rdi, 7);

#[cfg(test)]
mod tests {
    use ferrox_types::Cond;

    #[test]
    fn condition_nibbles_cover_the_row() {
        for cc in 0..16u8 {
            assert!(Cond::from_cc(cc).is_some());
        }
    }
}
