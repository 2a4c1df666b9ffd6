//! System instructions: the descriptor-table groups, control/debug
//! register moves, MSR and timestamp access, CPUID, the cache/SIMD state
//! group, and the privileged one-byte odds and ends.

use super::decode::{Ctx, FpUnit};
use super::{Exec, OpResult};
use crate::cpuid::cpuid_leaf;
use crate::exception::{EmuError, Exception};
use crate::flags::RFlags;
use crate::state::{
    CpuMode, DescriptorTable, SystemSegment, CR0_EM, CR0_MP, CR0_TS, CR4_DE, CR4_OSXSAVE, CR4_PCE,
    CR4_TSD, XCR0_SSE, XCR0_X87,
};
use ferrox_types::{Gpr, Width};
use ferrox_x86::DecodeMode;

// ---- one-byte privileged / external-collaborator opcodes -------------

pub(crate) fn op_hlt(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    Ok(Exec::Halt)
}

pub(crate) fn op_cli(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.state.is_real_mode() && ctx.state.cpl() != 0 {
        return Err(Exception::gp0().into());
    }
    ctx.state.rflags.set(RFlags::IF, false);
    Ok(Exec::Continue)
}

pub(crate) fn op_sti(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.state.is_real_mode() && ctx.state.cpl() != 0 {
        return Err(Exception::gp0().into());
    }
    ctx.state.rflags.set(RFlags::IF, true);
    Ok(Exec::Continue)
}

/// WAIT/FWAIT: x87 availability gates apply even though the wait itself
/// is a no-op here.
pub(crate) fn op_wait(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let cr0 = ctx.state.control.cr0;
    if cr0 & CR0_EM != 0 {
        return Err(Exception::InvalidOpcode.into());
    }
    if cr0 & CR0_MP != 0 && cr0 & CR0_TS != 0 {
        return Err(Exception::DeviceNotAvailable.into());
    }
    if ctx.state.fpu.has_unmasked_exception() {
        return Err(Exception::X87FloatingPoint.into());
    }
    Ok(Exec::Continue)
}

/// The x87 escape rows: availability gating still applies before the
/// not-implemented report, mirroring how real lazy-FPU kernels depend on
/// #NM arriving first.
pub(crate) fn op_x87_escape(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let cr0 = ctx.state.control.cr0;
    if cr0 & CR0_EM != 0 {
        return Err(Exception::InvalidOpcode.into());
    }
    if cr0 & CR0_TS != 0 {
        return Err(Exception::DeviceNotAvailable.into());
    }
    Err(EmuError::Unimplemented("x87 floating-point execution"))
}

macro_rules! unimplemented_op {
    ($name:ident, $what:expr) => {
        pub(crate) fn $name(_ctx: &mut Ctx<'_>) -> OpResult {
            Err(EmuError::Unimplemented($what))
        }
    };
}

unimplemented_op!(op_int3, "software interrupt delivery (INT3)");
unimplemented_op!(op_int_ib, "software interrupt delivery (INT n)");
unimplemented_op!(op_into, "software interrupt delivery (INTO)");
unimplemented_op!(op_int1, "software interrupt delivery (INT1)");
unimplemented_op!(op_iret, "interrupt return");
unimplemented_op!(op_call_far, "far call");
unimplemented_op!(op_jmp_far, "far jump");
unimplemented_op!(op_ret_far, "far return");
unimplemented_op!(op_ret_far_iw, "far return");
unimplemented_op!(op_in_al_ib, "port I/O");
unimplemented_op!(op_in_eax_ib, "port I/O");
unimplemented_op!(op_out_ib_al, "port I/O");
unimplemented_op!(op_out_ib_eax, "port I/O");
unimplemented_op!(op_in_al_dx, "port I/O");
unimplemented_op!(op_in_eax_dx, "port I/O");
unimplemented_op!(op_out_dx_al, "port I/O");
unimplemented_op!(op_out_dx_eax, "port I/O");
unimplemented_op!(op_insb, "port I/O string");
unimplemented_op!(op_insv, "port I/O string");
unimplemented_op!(op_outsb, "port I/O string");
unimplemented_op!(op_outsv, "port I/O string");
unimplemented_op!(op_rsm, "system-management mode");

pub(crate) fn op_bound(ctx: &mut Ctx<'_>) -> OpResult {
    if ctx.mode == DecodeMode::Bits64 {
        return Err(Exception::InvalidOpcode.into());
    }
    Err(EmuError::Unimplemented("BOUND range fault delivery"))
}

// ---- Group 6 (0x0F 0x00) --------------------------------------------

pub(crate) fn op_grp6(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;
    match modrm.reg3() {
        0 | 1 => {
            // SLDT / STR store a selector.
            ctx.require_protected()?;
            let selector = if modrm.reg3() == 0 {
                ctx.state.ldtr.selector
            } else {
                ctx.state.tr.selector
            };
            match &mem {
                None => ctx.set_gpr(modrm.rm, ctx.op_width(), selector as u64),
                Some(m) => {
                    let addr = ctx.effective_addr(m, 0);
                    ctx.write_mem(addr, Width::W16, selector as u64)?;
                }
            }
            Ok(Exec::Continue)
        }
        2 => {
            // LLDT.
            ctx.require_protected()?;
            ctx.require_cpl0()?;
            let selector = ctx.fetch_rm(modrm, &mem, Width::W16)? as u16;
            if selector & !0x7 == 0 {
                ctx.state.ldtr = SystemSegment::null();
                return Ok(Exec::Continue);
            }
            if selector & 0x4 != 0 {
                return Err(Exception::GeneralProtection(selector as u32).into());
            }
            let desc = ctx
                .fetch_descriptor(selector)?
                .ok_or(Exception::GeneralProtection(selector as u32))?;
            let parsed = parse_system_descriptor(&desc);
            if parsed.system_type != 0x2 {
                return Err(Exception::GeneralProtection(selector as u32).into());
            }
            if !parsed.present {
                return Err(Exception::GeneralProtection(selector as u32).into());
            }
            ctx.state.ldtr = SystemSegment {
                selector,
                base: parsed.base,
                limit: parsed.limit,
                access: parsed.access,
            };
            Ok(Exec::Continue)
        }
        3 => {
            // LTR.
            ctx.require_protected()?;
            ctx.require_cpl0()?;
            let selector = ctx.fetch_rm(modrm, &mem, Width::W16)? as u16;
            if selector & !0x7 == 0 || selector & 0x4 != 0 {
                return Err(Exception::GeneralProtection(selector as u32).into());
            }
            let desc = ctx
                .fetch_descriptor(selector)?
                .ok_or(Exception::GeneralProtection(selector as u32))?;
            let parsed = parse_system_descriptor(&desc);
            // Available 32/64-bit TSS.
            if parsed.system_type != 0x9 && parsed.system_type != 0xB {
                return Err(Exception::GeneralProtection(selector as u32).into());
            }
            if !parsed.present {
                return Err(Exception::GeneralProtection(selector as u32).into());
            }
            ctx.state.tr = SystemSegment {
                selector,
                base: parsed.base,
                limit: parsed.limit,
                access: parsed.access,
            };
            Ok(Exec::Continue)
        }
        4 | 5 => {
            // VERR / VERW probe a selector and answer in ZF.
            ctx.require_protected()?;
            let selector = ctx.fetch_rm(modrm, &mem, Width::W16)? as u16;
            let want_write = modrm.reg3() == 5;
            let ok = match ctx.fetch_descriptor(selector)? {
                None => false,
                Some(desc) => {
                    let access = desc[5];
                    let is_system = access & 0x10 == 0;
                    let is_code = access & 0x08 != 0;
                    let visible = ctx.descriptor_visible(selector, access);
                    if is_system || !visible || access & 0x80 == 0 {
                        false
                    } else if want_write {
                        // Writable data segment.
                        !is_code && access & 0x02 != 0
                    } else {
                        // Readable code or any data segment.
                        !is_code || access & 0x02 != 0
                    }
                }
            };
            ctx.state.rflags.set(RFlags::ZF, ok);
            Ok(Exec::Continue)
        }
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

struct SystemDescriptor {
    base: u64,
    limit: u32,
    access: u8,
    system_type: u8,
    present: bool,
}

fn parse_system_descriptor(bytes: &[u8; 8]) -> SystemDescriptor {
    let raw = u64::from_le_bytes(*bytes);
    let limit_low = (raw & 0xFFFF) as u32;
    let base_low = ((raw >> 16) & 0xFF_FFFF) as u64;
    let access = ((raw >> 40) & 0xFF) as u8;
    let limit_high = ((raw >> 48) & 0xF) as u32;
    let flags = ((raw >> 52) & 0xF) as u8;
    let base_high = ((raw >> 56) & 0xFF) as u64;

    let mut limit = limit_low | (limit_high << 16);
    if flags & 0x8 != 0 {
        limit = (limit << 12) | 0xFFF;
    }
    SystemDescriptor {
        base: base_low | (base_high << 24),
        limit,
        access,
        system_type: access & 0xF,
        present: access & 0x80 != 0,
    }
}

// ---- Group 7 (0x0F 0x01) --------------------------------------------

pub(crate) fn op_grp7(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;

    if let Some(m) = &mem {
        return match modrm.reg3() {
            0 | 1 => {
                // SGDT / SIDT.
                let table = if modrm.reg3() == 0 {
                    ctx.state.gdtr
                } else {
                    ctx.state.idtr
                };
                let addr = ctx.effective_addr(m, 0);
                ctx.write_mem(addr, Width::W16, table.limit as u64)?;
                if ctx.mode == DecodeMode::Bits64 {
                    ctx.write_mem(addr.wrapping_add(2), Width::W64, table.base)?;
                } else {
                    let base = if ctx.op_width() == Width::W16 {
                        table.base & 0x00FF_FFFF
                    } else {
                        table.base & 0xFFFF_FFFF
                    };
                    ctx.write_mem(addr.wrapping_add(2), Width::W32, base)?;
                }
                Ok(Exec::Continue)
            }
            2 | 3 => {
                // LGDT / LIDT.
                ctx.require_cpl0()?;
                let addr = ctx.effective_addr(m, 0);
                let limit = ctx.read_mem(addr, Width::W16)? as u16;
                let base = if ctx.mode == DecodeMode::Bits64 {
                    ctx.read_mem(addr.wrapping_add(2), Width::W64)?
                } else {
                    let raw = ctx.read_mem(addr.wrapping_add(2), Width::W32)?;
                    if ctx.op_width() == Width::W16 {
                        raw & 0x00FF_FFFF
                    } else {
                        raw
                    }
                };
                let table = DescriptorTable { base, limit };
                if modrm.reg3() == 2 {
                    ctx.state.gdtr = table;
                } else {
                    ctx.state.idtr = table;
                }
                Ok(Exec::Continue)
            }
            4 => {
                // SMSW to memory is always 16-bit.
                let addr = ctx.effective_addr(m, 0);
                ctx.write_mem(addr, Width::W16, ctx.state.control.cr0)?;
                Ok(Exec::Continue)
            }
            6 => {
                let addr = ctx.effective_addr(m, 0);
                let value = ctx.read_mem(addr, Width::W16)? as u16;
                lmsw(ctx, value)
            }
            7 => {
                // INVLPG: TLB maintenance belongs to the memory
                // collaborator; decoding and privilege stay here.
                ctx.require_cpl0()?;
                let _ = ctx.effective_addr(m, 0);
                Ok(Exec::Continue)
            }
            _ => Err(Exception::InvalidOpcode.into()),
        };
    }

    // Register forms overload reg/rm pairs.
    match (modrm.reg3(), modrm.rm3()) {
        (0, 1..=4) => {
            // VMCALL/VMLAUNCH/VMRESUME/VMXOFF: VMX is not advertised.
            Err(Exception::InvalidOpcode.into())
        }
        (1, 0) => {
            // MONITOR.
            if !ctx.features.monitor {
                return Err(Exception::InvalidOpcode.into());
            }
            ctx.require_cpl0()?;
            Ok(Exec::Continue)
        }
        (1, 1) => {
            // MWAIT: with no event machinery this retires as a NOP.
            if !ctx.features.monitor {
                return Err(Exception::InvalidOpcode.into());
            }
            ctx.require_cpl0()?;
            Ok(Exec::Continue)
        }
        (2, 0) => {
            // XGETBV.
            if !ctx.features.xsave || ctx.state.control.cr4 & CR4_OSXSAVE == 0 {
                return Err(Exception::InvalidOpcode.into());
            }
            let ecx = ctx.state.gpr32(Gpr::Rcx);
            if ecx != 0 {
                return Err(Exception::gp0().into());
            }
            let xcr0 = ctx.state.xcr0;
            ctx.state.set_gpr32(Gpr::Rax, xcr0 as u32);
            ctx.state.set_gpr32(Gpr::Rdx, (xcr0 >> 32) as u32);
            Ok(Exec::Continue)
        }
        (2, 1) => {
            // XSETBV: the feature gate outranks the privilege check, so a
            // disabled XSAVE reports #UD even at CPL 3.
            if !ctx.features.xsave || ctx.state.control.cr4 & CR4_OSXSAVE == 0 {
                return Err(Exception::InvalidOpcode.into());
            }
            ctx.require_cpl0()?;
            let ecx = ctx.state.gpr32(Gpr::Rcx);
            if ecx != 0 {
                return Err(Exception::gp0().into());
            }
            let value =
                (ctx.state.gpr32(Gpr::Rdx) as u64) << 32 | ctx.state.gpr32(Gpr::Rax) as u64;
            // x87 must stay enabled and SSE may not be enabled without it.
            if value & XCR0_X87 == 0 || value & !(XCR0_X87 | XCR0_SSE) != 0 {
                return Err(Exception::gp0().into());
            }
            ctx.state.xcr0 = value;
            Ok(Exec::Continue)
        }
        (4, _) => {
            // SMSW r: full operand width from CR0.
            let width = ctx.op_width();
            ctx.set_gpr(modrm.rm, width, ctx.state.control.cr0);
            Ok(Exec::Continue)
        }
        (6, _) => {
            let value = ctx.gpr(modrm.rm, Width::W16) as u16;
            lmsw(ctx, value)
        }
        (7, 0) => {
            // SWAPGS.
            if ctx.mode != DecodeMode::Bits64 {
                return Err(Exception::InvalidOpcode.into());
            }
            ctx.state.swapgs()?;
            Ok(Exec::Continue)
        }
        (7, 1) => {
            // RDTSCP = RDTSC + TSC_AUX.
            rdtsc_common(ctx)?;
            ctx.state.set_gpr32(Gpr::Rcx, 0);
            Ok(Exec::Continue)
        }
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

fn lmsw(ctx: &mut Ctx<'_>, value: u16) -> OpResult {
    ctx.require_cpl0()?;
    let cr0 = ctx.state.control.cr0;
    // LMSW updates PE/MP/EM/TS only, and cannot clear PE.
    let mut new = (cr0 & !0xE) | (value as u64 & 0xE);
    if value & 0x1 != 0 {
        new |= 0x1;
    }
    ctx.state.control.cr0 = new;
    if new & 0x1 != 0 && ctx.state.mode == CpuMode::Real {
        ctx.state.mode = CpuMode::Protected;
    }
    Ok(Exec::Continue)
}

// ---- LAR / LSL -------------------------------------------------------

fn lar_lsl(ctx: &mut Ctx<'_>, want_limit: bool) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_protected()?;
    let width = ctx.op_width();
    let (modrm, mem) = ctx.modrm()?;
    let selector = ctx.fetch_rm(modrm, &mem, Width::W16)? as u16;

    let result = match ctx.fetch_descriptor(selector)? {
        None => None,
        Some(desc) => {
            let parsed = parse_system_descriptor(&desc);
            let access = desc[5];
            let is_system = access & 0x10 == 0;
            let valid_type = if is_system {
                // The system types with meaningful access/limit values.
                matches!(parsed.system_type, 0x1 | 0x2 | 0x3 | 0x9 | 0xB)
            } else {
                true
            };
            if !valid_type || !parsed.present || !ctx.descriptor_visible(selector, access) {
                None
            } else if want_limit {
                Some(parsed.limit as u64)
            } else {
                // LAR returns access rights in bits 8..23.
                let flags = ((u64::from_le_bytes(desc) >> 32) & 0x00F0_FF00) as u64;
                Some(flags)
            }
        }
    };

    match result {
        None => {
            ctx.state.rflags.set(RFlags::ZF, false);
        }
        Some(v) => {
            ctx.state.rflags.set(RFlags::ZF, true);
            ctx.set_gpr(modrm.reg, width, v);
        }
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_lar(ctx: &mut Ctx<'_>) -> OpResult {
    lar_lsl(ctx, false)
}

pub(crate) fn op_lsl(ctx: &mut Ctx<'_>) -> OpResult {
    lar_lsl(ctx, true)
}

// ---- fast system calls ----------------------------------------------

pub(crate) fn op_syscall(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.syscall {
        return Err(Exception::InvalidOpcode.into());
    }
    let next = ctx.start_rip.wrapping_add(ctx.cursor.len() as u64);
    ctx.state.syscall(next)?;
    Ok(Exec::Branch)
}

pub(crate) fn op_sysret(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.syscall {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.state.sysret()?;
    Ok(Exec::Branch)
}

pub(crate) fn op_sysenter(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.state.sysenter()?;
    Ok(Exec::Branch)
}

pub(crate) fn op_sysexit(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.state.sysexit()?;
    Ok(Exec::Branch)
}

// ---- simple privileged ops ------------------------------------------

pub(crate) fn op_clts(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    ctx.state.control.cr0 &= !CR0_TS;
    Ok(Exec::Continue)
}

pub(crate) fn op_invd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    // No cache model; privileged no-op.
    Ok(Exec::Continue)
}

pub(crate) fn op_wbinvd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    Ok(Exec::Continue)
}

pub(crate) fn op_ud2(_ctx: &mut Ctx<'_>) -> OpResult {
    Err(Exception::InvalidOpcode.into())
}

/// UD1 consumes a ModRM byte before faulting, and the instruction length
/// reported on the fault must include it.
pub(crate) fn op_ud1(ctx: &mut Ctx<'_>) -> OpResult {
    let _ = ctx.modrm()?;
    Err(Exception::InvalidOpcode.into())
}

pub(crate) fn op_ud0(_ctx: &mut Ctx<'_>) -> OpResult {
    Err(Exception::InvalidOpcode.into())
}

/// 0x0F 0x0D and 0x0F 0x18..0x1F: prefetch hints and the documented
/// multi-byte NOP space. The ModRM suffix decodes; nothing retires.
pub(crate) fn op_nop_modrm(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let _ = ctx.modrm()?;
    Ok(Exec::Continue)
}

/// FEMMS / 3DNow!: the extension is not advertised.
pub(crate) fn op_3dnow(_ctx: &mut Ctx<'_>) -> OpResult {
    Err(Exception::InvalidOpcode.into())
}

/// VMREAD/VMWRITE: VMX is not advertised.
pub(crate) fn op_vmx_unavailable(_ctx: &mut Ctx<'_>) -> OpResult {
    Err(Exception::InvalidOpcode.into())
}

pub(crate) fn op_getsec(_ctx: &mut Ctx<'_>) -> OpResult {
    Err(Exception::InvalidOpcode.into())
}

// ---- control / debug register moves ---------------------------------

fn cr_index(ctx: &Ctx<'_>, reg3: u8) -> Result<usize, EmuError> {
    let n = reg3 | ((ctx.prefixes.rex.r as u8) << 3);
    match n {
        0 | 2 | 3 | 4 | 8 => Ok(n as usize),
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

fn dr_index(ctx: &Ctx<'_>, reg3: u8) -> Result<usize, EmuError> {
    let n = reg3 | ((ctx.prefixes.rex.r as u8) << 3);
    match n {
        0..=3 | 6 | 7 => Ok(n as usize),
        4 | 5 => {
            if ctx.state.control.cr4 & CR4_DE != 0 {
                Err(Exception::InvalidOpcode.into())
            } else {
                Ok((n + 2) as usize)
            }
        }
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

/// MOV to/from CR/DR always takes the register form; the mod field is
/// ignored by hardware.
pub(crate) fn op_mov_rd_cr(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    let (modrm, _) = ctx.modrm()?;
    let idx = cr_index(ctx, modrm.reg3())?;
    let value = match idx {
        0 => ctx.state.control.cr0,
        2 => ctx.state.control.cr2,
        3 => ctx.state.control.cr3,
        4 => ctx.state.control.cr4,
        _ => ctx.state.control.cr8,
    };
    let width = if ctx.mode == DecodeMode::Bits64 {
        Width::W64
    } else {
        Width::W32
    };
    ctx.set_gpr(modrm.rm, width, value);
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_cr_rd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    let (modrm, _) = ctx.modrm()?;
    let idx = cr_index(ctx, modrm.reg3())?;
    let width = if ctx.mode == DecodeMode::Bits64 {
        Width::W64
    } else {
        Width::W32
    };
    let value = ctx.gpr(modrm.rm, width);
    match idx {
        0 => {
            ctx.state.control.cr0 = value;
            let pe = value & 0x1 != 0;
            match (pe, ctx.state.mode) {
                (true, CpuMode::Real) => ctx.state.mode = CpuMode::Protected,
                (false, CpuMode::Protected) => ctx.state.mode = CpuMode::Real,
                _ => {}
            }
        }
        2 => ctx.state.control.cr2 = value,
        3 => ctx.state.control.cr3 = value,
        4 => ctx.state.control.cr4 = value,
        _ => ctx.state.control.cr8 = value,
    }
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_rd_dr(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    let (modrm, _) = ctx.modrm()?;
    let idx = dr_index(ctx, modrm.reg3())?;
    let width = if ctx.mode == DecodeMode::Bits64 {
        Width::W64
    } else {
        Width::W32
    };
    ctx.set_gpr(modrm.rm, width, ctx.state.dr[idx]);
    Ok(Exec::Continue)
}

pub(crate) fn op_mov_dr_rd(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    ctx.require_cpl0()?;
    let (modrm, _) = ctx.modrm()?;
    let idx = dr_index(ctx, modrm.reg3())?;
    let width = if ctx.mode == DecodeMode::Bits64 {
        Width::W64
    } else {
        Width::W32
    };
    ctx.state.dr[idx] = ctx.gpr(modrm.rm, width);
    Ok(Exec::Continue)
}

// ---- MSR / timestamp / performance access ---------------------------

pub(crate) fn op_rdmsr(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.msr {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.require_cpl0()?;
    let msr = ctx.state.gpr32(Gpr::Rcx);
    let value = ctx.state.msr.read(msr)?;
    ctx.state.set_gpr32(Gpr::Rax, value as u32);
    ctx.state.set_gpr32(Gpr::Rdx, (value >> 32) as u32);
    Ok(Exec::Continue)
}

pub(crate) fn op_wrmsr(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if !ctx.features.msr {
        return Err(Exception::InvalidOpcode.into());
    }
    ctx.require_cpl0()?;
    let msr = ctx.state.gpr32(Gpr::Rcx);
    let value = (ctx.state.gpr32(Gpr::Rdx) as u64) << 32 | ctx.state.gpr32(Gpr::Rax) as u64;
    ctx.state.msr.write(msr, value)?;
    Ok(Exec::Continue)
}

fn rdtsc_common(ctx: &mut Ctx<'_>) -> Result<(), EmuError> {
    if !ctx.features.tsc {
        return Err(Exception::InvalidOpcode.into());
    }
    if ctx.state.control.cr4 & CR4_TSD != 0 && ctx.state.cpl() != 0 {
        return Err(Exception::gp0().into());
    }
    let tsc = ctx.state.msr.tsc;
    ctx.state.set_gpr32(Gpr::Rax, tsc as u32);
    ctx.state.set_gpr32(Gpr::Rdx, (tsc >> 32) as u32);
    Ok(())
}

pub(crate) fn op_rdtsc(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    rdtsc_common(ctx)?;
    Ok(Exec::Continue)
}

pub(crate) fn op_rdpmc(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    if ctx.state.control.cr4 & CR4_PCE == 0 && ctx.state.cpl() != 0 {
        return Err(Exception::gp0().into());
    }
    // No performance counters are modeled.
    ctx.state.set_gpr32(Gpr::Rax, 0);
    ctx.state.set_gpr32(Gpr::Rdx, 0);
    Ok(Exec::Continue)
}

pub(crate) fn op_cpuid(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let leaf = ctx.state.gpr32(Gpr::Rax);
    let subleaf = ctx.state.gpr32(Gpr::Rcx);
    let osxsave = ctx.state.control.cr4 & CR4_OSXSAVE != 0;
    let out = cpuid_leaf(ctx.features, leaf, subleaf, osxsave);
    ctx.state.set_gpr32(Gpr::Rax, out.eax);
    ctx.state.set_gpr32(Gpr::Rbx, out.ebx);
    ctx.state.set_gpr32(Gpr::Rcx, out.ecx);
    ctx.state.set_gpr32(Gpr::Rdx, out.edx);
    Ok(Exec::Continue)
}

// ---- Group 15 (0x0F 0xAE) -------------------------------------------

pub(crate) fn op_grp15(ctx: &mut Ctx<'_>) -> OpResult {
    ctx.reject_lock()?;
    let (modrm, mem) = ctx.modrm()?;

    if let Some(m) = &mem {
        return match modrm.reg3() {
            0 | 1 => {
                // FXSAVE / FXRSTOR.
                if !ctx.features.fxsr {
                    return Err(Exception::InvalidOpcode.into());
                }
                let cr0 = ctx.state.control.cr0;
                if cr0 & CR0_EM != 0 {
                    return Err(Exception::InvalidOpcode.into());
                }
                if cr0 & CR0_TS != 0 {
                    return Err(Exception::DeviceNotAvailable.into());
                }
                let addr = ctx.effective_addr(m, 0);
                if addr & 0xF != 0 {
                    return Err(Exception::gp0().into());
                }
                if modrm.reg3() == 0 {
                    fxsave(ctx, addr)
                } else {
                    fxrstor(ctx, addr)
                }
            }
            2 => {
                // LDMXCSR.
                ctx.check_fp_unit(FpUnit::Sse)?;
                let addr = ctx.effective_addr(m, 0);
                let value = ctx.read_mem(addr, Width::W32)? as u32;
                ctx.state.set_mxcsr(value)?;
                Ok(Exec::Continue)
            }
            3 => {
                // STMXCSR.
                ctx.check_fp_unit(FpUnit::Sse)?;
                let addr = ctx.effective_addr(m, 0);
                let mxcsr = ctx.state.mxcsr;
                ctx.write_mem(addr, Width::W32, mxcsr as u64)?;
                Ok(Exec::Continue)
            }
            4 | 5 => {
                // XSAVE / XRSTOR.
                if !ctx.features.xsave || ctx.state.control.cr4 & CR4_OSXSAVE == 0 {
                    return Err(Exception::InvalidOpcode.into());
                }
                Err(EmuError::Unimplemented("XSAVE-family state images"))
            }
            7 => {
                // CLFLUSH: decode the address, no cache to flush.
                if !ctx.features.clfsh {
                    return Err(Exception::InvalidOpcode.into());
                }
                let _ = ctx.effective_addr(m, 0);
                Ok(Exec::Continue)
            }
            _ => Err(Exception::InvalidOpcode.into()),
        };
    }

    match modrm.reg3() {
        // LFENCE / MFENCE / SFENCE: ordering is trivially satisfied in a
        // serialized interpreter.
        5 | 6 | 7 => Ok(Exec::Continue),
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

fn fxsave(ctx: &mut Ctx<'_>, addr: u64) -> OpResult {
    let mut image = [0u8; 512];
    let fpu = &ctx.state.fpu;
    image[0..2].copy_from_slice(&fpu.fcw.to_le_bytes());
    image[2..4].copy_from_slice(&fpu.fsw.to_le_bytes());
    image[4] = fpu.abridged_tag();
    image[6..8].copy_from_slice(&fpu.fop.to_le_bytes());
    image[24..28].copy_from_slice(&ctx.state.mxcsr.to_le_bytes());
    image[28..32].copy_from_slice(&crate::flags::MXCSR_WRITE_MASK.to_le_bytes());
    for i in 0..8 {
        let off = 32 + i * 16;
        image[off..off + 8].copy_from_slice(&fpu.st[i].to_le_bytes());
    }
    let xmm_count = if ctx.mode == DecodeMode::Bits64 { 16 } else { 8 };
    for i in 0..xmm_count {
        let off = 160 + i * 16;
        image[off..off + 16].copy_from_slice(&ctx.state.xmm[i].to_le_bytes());
    }
    for (i, byte) in image.iter().enumerate() {
        ctx.bus.write_u8(addr.wrapping_add(i as u64), *byte)?;
    }
    Ok(Exec::Continue)
}

fn fxrstor(ctx: &mut Ctx<'_>, addr: u64) -> OpResult {
    let mut image = [0u8; 512];
    for (i, slot) in image.iter_mut().enumerate() {
        *slot = ctx.bus.read_u8(addr.wrapping_add(i as u64))?;
    }

    let mxcsr = u32::from_le_bytes(image[24..28].try_into().unwrap());
    ctx.state.set_mxcsr(mxcsr)?;

    ctx.state.fpu.fcw = u16::from_le_bytes(image[0..2].try_into().unwrap());
    ctx.state.fpu.fsw = u16::from_le_bytes(image[2..4].try_into().unwrap());
    // Expand the abridged tag byte: valid registers get tag 00, empty 11.
    let tag8 = image[4];
    let mut ftw = 0u16;
    for i in 0..8 {
        if tag8 & (1 << i) == 0 {
            ftw |= 0b11 << (i * 2);
        }
    }
    ctx.state.fpu.ftw = ftw;
    ctx.state.fpu.fop = u16::from_le_bytes(image[6..8].try_into().unwrap());
    for i in 0..8 {
        let off = 32 + i * 16;
        ctx.state.fpu.st[i] = u64::from_le_bytes(image[off..off + 8].try_into().unwrap());
    }
    let xmm_count = if ctx.mode == DecodeMode::Bits64 { 16 } else { 8 };
    for i in 0..xmm_count {
        let off = 160 + i * 16;
        ctx.state.xmm[i] = u128::from_le_bytes(image[off..off + 16].try_into().unwrap());
    }
    Ok(Exec::Continue)
}

// ---- Group 9 (0x0F 0xC7) --------------------------------------------

pub(crate) fn op_grp9(ctx: &mut Ctx<'_>) -> OpResult {
    let (modrm, mem) = ctx.modrm()?;

    if let Some(m) = &mem {
        if modrm.reg3() != 1 {
            return Err(Exception::InvalidOpcode.into());
        }
        return if ctx.prefixes.rex.w {
            cmpxchg16b(ctx, m)
        } else {
            cmpxchg8b(ctx, m)
        };
    }

    // Register forms.
    ctx.reject_lock()?;
    match modrm.reg3() {
        6 | 7 => {
            let seeded = modrm.reg3() == 7;
            if (seeded && !ctx.features.rdseed) || (!seeded && !ctx.features.rdrand) {
                return Err(Exception::InvalidOpcode.into());
            }
            let width = ctx.op_width();
            // Deterministic generator: xorshift over the timestamp state.
            let mut x = ctx.state.msr.tsc | 1;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            ctx.set_gpr(modrm.rm, width, width.truncate(x));
            // Entropy exhaustion is not modeled.
            ctx.state.rflags.set(RFlags::CF, true);
            ctx.state.rflags.set(RFlags::ZF, false);
            ctx.state.rflags.set(RFlags::OF, false);
            ctx.state.rflags.set(RFlags::SF, false);
            ctx.state.rflags.set(RFlags::AF, false);
            ctx.state.rflags.set(RFlags::PF, false);
            Ok(Exec::Continue)
        }
        _ => Err(Exception::InvalidOpcode.into()),
    }
}

fn cmpxchg8b(ctx: &mut Ctx<'_>, m: &ferrox_x86::MemForm) -> OpResult {
    if !ctx.features.cmpxchg8b {
        return Err(Exception::InvalidOpcode.into());
    }
    let addr = ctx.effective_addr(m, 0);
    let expected =
        (ctx.state.gpr32(Gpr::Rdx) as u64) << 32 | ctx.state.gpr32(Gpr::Rax) as u64;
    let replacement =
        (ctx.state.gpr32(Gpr::Rcx) as u64) << 32 | ctx.state.gpr32(Gpr::Rbx) as u64;

    let (old, swapped) = if ctx.prefixes.lock {
        let old = ctx.bus.atomic_rmw(addr, Width::W64, &mut |old| {
            if old == expected {
                replacement
            } else {
                old
            }
        })?;
        (old, old == expected)
    } else {
        let old = ctx.read_mem(addr, Width::W64)?;
        if old == expected {
            ctx.write_mem(addr, Width::W64, replacement)?;
            (old, true)
        } else {
            (old, false)
        }
    };

    ctx.state.rflags.set(RFlags::ZF, swapped);
    if !swapped {
        ctx.state.set_gpr32(Gpr::Rax, old as u32);
        ctx.state.set_gpr32(Gpr::Rdx, (old >> 32) as u32);
    }
    Ok(Exec::Continue)
}

fn cmpxchg16b(ctx: &mut Ctx<'_>, m: &ferrox_x86::MemForm) -> OpResult {
    if !ctx.features.cmpxchg16b {
        return Err(Exception::InvalidOpcode.into());
    }
    let addr = ctx.effective_addr(m, 0);
    if addr & 0xF != 0 {
        return Err(Exception::gp0().into());
    }
    let expected =
        (ctx.state.gpr64(Gpr::Rdx) as u128) << 64 | ctx.state.gpr64(Gpr::Rax) as u128;
    let replacement =
        (ctx.state.gpr64(Gpr::Rcx) as u128) << 64 | ctx.state.gpr64(Gpr::Rbx) as u128;

    let (old, swapped) = if ctx.prefixes.lock {
        ctx.bus.atomic_cmpxchg16b(addr, expected, replacement)?
    } else {
        let old = ctx.read_mem_u128(addr)?;
        if old == expected {
            ctx.write_mem_u128(addr, replacement)?;
            (old, true)
        } else {
            (old, false)
        }
    };

    ctx.state.rflags.set(RFlags::ZF, swapped);
    if !swapped {
        ctx.state.set_gpr64(Gpr::Rax, old as u64);
        ctx.state.set_gpr64(Gpr::Rdx, (old >> 64) as u64);
    }
    Ok(Exec::Continue)
}
