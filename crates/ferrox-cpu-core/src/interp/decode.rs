//! Per-instruction decode context and operand fetch/store helpers.

use crate::cpuid::CpuFeatureSet;
use crate::exception::{EmuError, Exception};
use crate::flags::MXCSR_XCPT_FLAGS;
use crate::mem::{read_sized, write_sized, CpuBus};
use crate::state::{CpuState, CR0_EM, CR0_TS, CR4_OSFXSR, CR4_OSXMMEXCPT};
use crate::interp::Exec;
use ferrox_types::{SegReg, Width};
use ferrox_x86::{
    addr_size, operand_width, parse_modrm, AddrSize, Cursor, DecodeMode, MemForm, ModRm,
};

/// Which SIMD/FP unit an instruction belongs to, for availability gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FpUnit {
    Mmx,
    Sse,
    Sse2,
    Sse3,
}

/// Transient per-instruction state: byte cursor, resolved prefixes, and
/// borrows of the CPU collaborators. Handlers finish decoding through this
/// and perform their effects through it.
pub(crate) struct Ctx<'a> {
    pub state: &'a mut CpuState,
    pub bus: &'a mut dyn CpuBus,
    pub features: &'a CpuFeatureSet,
    pub cursor: Cursor<'a>,
    pub prefixes: ferrox_x86::Prefixes,
    pub mode: DecodeMode,
    pub start_rip: u64,
}

impl<'a> Ctx<'a> {
    // ---- byte stream ------------------------------------------------

    pub fn next_u8(&mut self) -> Result<u8, EmuError> {
        Ok(self.cursor.next_u8()?)
    }

    pub fn next_i8(&mut self) -> Result<i8, EmuError> {
        Ok(self.cursor.next_i8()?)
    }

    pub fn next_u16(&mut self) -> Result<u16, EmuError> {
        Ok(self.cursor.next_u16()?)
    }

    pub fn next_u32(&mut self) -> Result<u32, EmuError> {
        Ok(self.cursor.next_u32()?)
    }

    pub fn next_u64(&mut self) -> Result<u64, EmuError> {
        Ok(self.cursor.next_u64()?)
    }

    /// `Iz` immediate: 16 bits for 16-bit operands, else 32 bits,
    /// sign-extended to the 64-bit operand width.
    pub fn imm_z(&mut self, width: Width) -> Result<u64, EmuError> {
        Ok(match width {
            Width::W16 => self.next_u16()? as u64,
            Width::W64 => self.next_u32()? as i32 as i64 as u64,
            _ => self.next_u32()? as u64,
        })
    }

    pub fn modrm(&mut self) -> Result<(ModRm, Option<MemForm>), EmuError> {
        Ok(parse_modrm(&mut self.cursor, self.mode, &self.prefixes)?)
    }

    // ---- widths -----------------------------------------------------

    pub fn op_width(&self) -> Width {
        operand_width(self.mode, &self.prefixes)
    }

    pub fn addr_size(&self) -> AddrSize {
        addr_size(self.mode, &self.prefixes)
    }

    // ---- prefix rules -----------------------------------------------

    /// Decode-complete check for instructions that do not permit LOCK.
    pub fn reject_lock(&self) -> Result<(), EmuError> {
        if self.prefixes.lock {
            return Err(Exception::InvalidOpcode.into());
        }
        Ok(())
    }

    /// Lockable forms: LOCK is only legal with a memory destination.
    pub fn lock_needs_mem(&self, mem: &Option<MemForm>) -> Result<(), EmuError> {
        if self.prefixes.lock && mem.is_none() {
            return Err(Exception::InvalidOpcode.into());
        }
        Ok(())
    }

    // ---- registers --------------------------------------------------

    pub fn gpr(&self, reg: u8, width: Width) -> u64 {
        self.state.gpr(reg, width, self.prefixes.rex.present)
    }

    pub fn set_gpr(&mut self, reg: u8, width: Width, value: u64) {
        self.state.set_gpr(reg, width, self.prefixes.rex.present, value);
    }

    // ---- effective addresses ----------------------------------------

    /// The segment-relative offset of a parsed memory form (what LEA
    /// loads).
    ///
    /// `imm_bytes` is the number of immediate bytes still to be consumed
    /// after the ModRM suffix; RIP-relative forms need it because their
    /// displacement is relative to the end of the whole instruction.
    pub fn ea_offset(&self, mem: &MemForm, imm_bytes: usize) -> u64 {
        let mut offset = mem.disp as u64;
        if let Some(base) = mem.base {
            offset = offset.wrapping_add(self.state.gpr(base, Width::W64, true));
        }
        if let Some(index) = mem.index {
            let idx = self.state.gpr(index, Width::W64, true);
            offset = offset.wrapping_add(idx.wrapping_mul(mem.scale as u64));
        }
        if mem.rip_relative {
            let next_rip = self
                .start_rip
                .wrapping_add(self.cursor.len() as u64 + imm_bytes as u64);
            offset = offset.wrapping_add(next_rip);
        }
        mem.addr_size.truncate(offset)
    }

    /// Resolve a parsed memory form to a linear address.
    pub fn effective_addr(&self, mem: &MemForm, imm_bytes: usize) -> u64 {
        let offset = self.ea_offset(mem, imm_bytes);
        let seg = self.prefixes.segment.unwrap_or(mem.default_seg);
        self.seg_base(seg).wrapping_add(offset)
    }

    /// Segment base for data access; long mode ignores all but FS/GS.
    pub fn seg_base(&self, seg: SegReg) -> u64 {
        if self.mode == DecodeMode::Bits64 && !matches!(seg, SegReg::Fs | SegReg::Gs) {
            0
        } else {
            self.state.seg_base(seg)
        }
    }

    // ---- memory -----------------------------------------------------

    pub fn read_mem(&mut self, addr: u64, width: Width) -> Result<u64, EmuError> {
        Ok(read_sized(self.bus, addr, width)?)
    }

    pub fn write_mem(&mut self, addr: u64, width: Width, value: u64) -> Result<(), EmuError> {
        Ok(write_sized(self.bus, addr, width, value)?)
    }

    pub fn read_mem_u128(&mut self, addr: u64) -> Result<u128, EmuError> {
        Ok(self.bus.read_u128(addr)?)
    }

    pub fn write_mem_u128(&mut self, addr: u64, value: u128) -> Result<(), EmuError> {
        Ok(self.bus.write_u128(addr, value)?)
    }

    /// Aligned 16-byte load: the alignment fault is raised before the bus
    /// sees the access.
    pub fn read_mem_u128_aligned(&mut self, addr: u64) -> Result<u128, EmuError> {
        if addr & 0xF != 0 {
            return Err(Exception::gp0().into());
        }
        self.read_mem_u128(addr)
    }

    pub fn write_mem_u128_aligned(&mut self, addr: u64, value: u128) -> Result<(), EmuError> {
        if addr & 0xF != 0 {
            return Err(Exception::gp0().into());
        }
        self.write_mem_u128(addr, value)
    }

    // ---- operand combos ---------------------------------------------

    /// Fetch the r/m operand (register or memory).
    pub fn fetch_rm(
        &mut self,
        modrm: ModRm,
        mem: &Option<MemForm>,
        width: Width,
    ) -> Result<u64, EmuError> {
        match mem {
            None => Ok(self.gpr(modrm.rm, width)),
            Some(m) => {
                let addr = self.effective_addr(m, 0);
                self.read_mem(addr, width)
            }
        }
    }

    /// Store to the r/m operand (register or memory).
    pub fn store_rm(
        &mut self,
        modrm: ModRm,
        mem: &Option<MemForm>,
        width: Width,
        value: u64,
    ) -> Result<(), EmuError> {
        match mem {
            None => {
                self.set_gpr(modrm.rm, width, value);
                Ok(())
            }
            Some(m) => {
                let addr = self.effective_addr(m, 0);
                self.write_mem(addr, width, value)
            }
        }
    }

    // ---- feature / availability gates -------------------------------

    /// Gate order is architectural: missing CPUID feature and CR0.EM are
    /// #UD (and for SSE, CR4.OSFXSR), then CR0.TS is #NM.
    pub fn check_fp_unit(&self, unit: FpUnit) -> Result<(), EmuError> {
        let supported = match unit {
            FpUnit::Mmx => self.features.mmx,
            FpUnit::Sse => self.features.sse,
            FpUnit::Sse2 => self.features.sse2,
            FpUnit::Sse3 => self.features.sse3,
        };
        if !supported {
            return Err(Exception::InvalidOpcode.into());
        }

        let cr0 = self.state.control.cr0;
        if cr0 & CR0_EM != 0 {
            return Err(Exception::InvalidOpcode.into());
        }
        if unit != FpUnit::Mmx && self.state.control.cr4 & CR4_OSFXSR == 0 {
            return Err(Exception::InvalidOpcode.into());
        }
        if cr0 & CR0_TS != 0 {
            return Err(Exception::DeviceNotAvailable.into());
        }
        Ok(())
    }

    /// MMX-register access side effect; must run after the gates and
    /// before the first operand touch.
    pub fn prepare_mmx(&mut self) {
        self.state.fpu.enter_mmx_state();
    }

    /// Commit SSE exception status bits, then decide whether to fault.
    /// With CR4.OSXMMEXCPT clear an unmasked condition is #UD, not #XM.
    pub fn report_mxcsr(&mut self, flags: u32) -> Result<(), EmuError> {
        let flags = flags & MXCSR_XCPT_FLAGS;
        self.state.mxcsr |= flags;
        let masks = (self.state.mxcsr >> 7) & MXCSR_XCPT_FLAGS;
        if flags & !masks != 0 {
            if self.state.control.cr4 & CR4_OSXMMEXCPT != 0 {
                return Err(Exception::SimdFloatingPoint.into());
            }
            return Err(Exception::InvalidOpcode.into());
        }
        Ok(())
    }

    /// MXCSR rounding-control field.
    pub fn mxcsr_rc(&self) -> u32 {
        (self.state.mxcsr >> 13) & 0b11
    }

    // ---- privilege --------------------------------------------------

    pub fn require_cpl0(&self) -> Result<(), EmuError> {
        if self.state.cpl() != 0 {
            return Err(Exception::gp0().into());
        }
        Ok(())
    }

    pub fn require_protected(&self) -> Result<(), EmuError> {
        if self.state.is_real_mode() {
            return Err(Exception::InvalidOpcode.into());
        }
        Ok(())
    }

    // ---- stack ------------------------------------------------------

    /// Default stack operand width (pushes promote to 64-bit in long mode).
    pub fn stack_width(&self) -> Width {
        match self.mode {
            DecodeMode::Bits64 => {
                if self.prefixes.operand_size_override {
                    Width::W16
                } else {
                    Width::W64
                }
            }
            DecodeMode::Bits32 => {
                if self.prefixes.operand_size_override {
                    Width::W16
                } else {
                    Width::W32
                }
            }
            DecodeMode::Bits16 => {
                if self.prefixes.operand_size_override {
                    Width::W32
                } else {
                    Width::W16
                }
            }
        }
    }

    fn stack_ptr_mask(&self) -> u64 {
        match self.mode {
            DecodeMode::Bits16 => 0xFFFF,
            DecodeMode::Bits32 => 0xFFFF_FFFF,
            DecodeMode::Bits64 => u64::MAX,
        }
    }

    pub fn push(&mut self, width: Width, value: u64) -> Result<(), EmuError> {
        let mask = self.stack_ptr_mask();
        let rsp = self.state.gpr64(ferrox_types::Gpr::Rsp);
        let new_sp = rsp.wrapping_sub(width.bytes() as u64) & mask | (rsp & !mask);
        let addr = self.seg_base(SegReg::Ss).wrapping_add(new_sp & mask);
        // Write first: a faulting push must not move RSP.
        self.write_mem(addr, width, value)?;
        self.state.set_gpr64(ferrox_types::Gpr::Rsp, new_sp);
        Ok(())
    }

    pub fn pop(&mut self, width: Width) -> Result<u64, EmuError> {
        let mask = self.stack_ptr_mask();
        let rsp = self.state.gpr64(ferrox_types::Gpr::Rsp);
        let addr = self.seg_base(SegReg::Ss).wrapping_add(rsp & mask);
        let value = self.read_mem(addr, width)?;
        let new_sp = rsp.wrapping_add(width.bytes() as u64) & mask | (rsp & !mask);
        self.state.set_gpr64(ferrox_types::Gpr::Rsp, new_sp);
        Ok(value)
    }

    // ---- control flow -----------------------------------------------

    /// Relative branch from the end of this instruction. A 16-bit operand
    /// size truncates the target in legacy modes; 64-bit mode forces
    /// 64-bit branch targets regardless of the operand-size prefix.
    pub fn branch_rel(&mut self, rel: i64, width: Width) -> Exec {
        let next = self.start_rip.wrapping_add(self.cursor.len() as u64);
        let mut target = next.wrapping_add(rel as u64);
        if width == Width::W16 && self.mode != DecodeMode::Bits64 {
            target &= 0xFFFF;
        }
        self.state.set_rip(target);
        Exec::Branch
    }

    pub fn branch_abs(&mut self, target: u64, width: Width) -> Exec {
        let target = match width {
            Width::W16 => target & 0xFFFF,
            Width::W32 => target & 0xFFFF_FFFF,
            _ => target,
        };
        self.state.set_rip(target);
        Exec::Branch
    }

    // ---- descriptor tables ------------------------------------------

    /// Fetch an 8-byte descriptor for `selector` from the GDT/LDT.
    /// `None` means the selector is outside the table limit.
    pub fn fetch_descriptor(&mut self, selector: u16) -> Result<Option<[u8; 8]>, EmuError> {
        let index_offset = (selector as u64 & !0x7) as u64;
        let (base, limit) = if selector & 0x4 == 0 {
            (self.state.gdtr.base, self.state.gdtr.limit as u64)
        } else {
            (self.state.ldtr.base, self.state.ldtr.limit as u64)
        };
        if selector & !0x7 == 0 {
            return Ok(None);
        }
        if index_offset + 7 > limit {
            return Ok(None);
        }
        let mut bytes = [0u8; 8];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = self.bus.read_u8(base.wrapping_add(index_offset + i as u64))?;
        }
        Ok(Some(bytes))
    }

    /// True when CPL and the selector RPL may observe a descriptor with
    /// the given DPL (conforming code segments are exempt).
    pub fn descriptor_visible(&self, selector: u16, access: u8) -> bool {
        let is_code = access & 0x08 != 0;
        let conforming = is_code && access & 0x04 != 0;
        if conforming {
            return true;
        }
        let dpl = (access >> 5) & 0x3;
        let rpl = (selector & 0x3) as u8;
        dpl >= self.state.cpl().max(rpl)
    }
}
