use crate::exception::Exception;
use crate::flags::{RFlags, MXCSR_DEFAULT, MXCSR_WRITE_MASK};
use ferrox_types::{Gpr, SegReg, Width};
use ferrox_x86::DecodeMode;

pub const CR0_PE: u64 = 1 << 0;
pub const CR0_MP: u64 = 1 << 1;
pub const CR0_EM: u64 = 1 << 2;
pub const CR0_TS: u64 = 1 << 3;
pub const CR0_NE: u64 = 1 << 5;
pub const CR0_PG: u64 = 1 << 31;

pub const CR4_TSD: u64 = 1 << 2;
pub const CR4_DE: u64 = 1 << 3;
pub const CR4_PAE: u64 = 1 << 5;
pub const CR4_PCE: u64 = 1 << 8;
pub const CR4_OSFXSR: u64 = 1 << 9;
pub const CR4_OSXMMEXCPT: u64 = 1 << 10;
pub const CR4_OSXSAVE: u64 = 1 << 18;

pub const XCR0_X87: u64 = 1 << 0;
pub const XCR0_SSE: u64 = 1 << 1;

pub const EFER_SCE: u64 = 1 << 0;
pub const EFER_LME: u64 = 1 << 8;
pub const EFER_LMA: u64 = 1 << 10;
pub const EFER_NXE: u64 = 1 << 11;

/// Processor operating mode. Far control transfers and mode switching
/// mechanics live outside this core, so the mode is explicit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    /// 16-bit real mode.
    Real,
    /// 32-bit protected mode (flat or segmented).
    Protected,
    /// 64-bit long mode.
    Long,
}

impl CpuMode {
    #[must_use]
    pub const fn decode_mode(self) -> DecodeMode {
        match self {
            CpuMode::Real => DecodeMode::Bits16,
            CpuMode::Protected => DecodeMode::Bits32,
            CpuMode::Long => DecodeMode::Bits64,
        }
    }

    #[must_use]
    pub const fn ip_mask(self) -> u64 {
        match self {
            CpuMode::Real => 0xFFFF,
            CpuMode::Protected => 0xFFFF_FFFF,
            CpuMode::Long => u64::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub selector: u16,
    pub base: u64,
    pub limit: u32,
}

impl Segment {
    #[must_use]
    pub const fn new(selector: u16, base: u64, limit: u32) -> Self {
        Self {
            selector,
            base,
            limit,
        }
    }

    #[must_use]
    pub const fn flat() -> Self {
        Self::new(0, 0, u32::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTable {
    pub base: u64,
    pub limit: u16,
}

impl DescriptorTable {
    #[must_use]
    pub const fn empty() -> Self {
        Self { base: 0, limit: 0 }
    }

    #[must_use]
    pub fn contains(&self, offset: u64, len: u64) -> bool {
        offset
            .checked_add(len)
            .map_or(false, |end| end <= self.limit as u64 + 1)
    }
}

/// LDTR/TR: selector plus cached descriptor fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemSegment {
    pub selector: u16,
    pub base: u64,
    pub limit: u32,
    pub access: u8,
}

impl SystemSegment {
    #[must_use]
    pub const fn null() -> Self {
        Self {
            selector: 0,
            base: 0,
            limit: 0,
            access: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlRegs {
    pub cr0: u64,
    pub cr2: u64,
    pub cr3: u64,
    pub cr4: u64,
    pub cr8: u64,
}

pub const IA32_TSC: u32 = 0x10;
pub const IA32_SYSENTER_CS: u32 = 0x174;
pub const IA32_SYSENTER_ESP: u32 = 0x175;
pub const IA32_SYSENTER_EIP: u32 = 0x176;
pub const IA32_PAT: u32 = 0x277;
pub const IA32_EFER: u32 = 0xC000_0080;
pub const IA32_STAR: u32 = 0xC000_0081;
pub const IA32_LSTAR: u32 = 0xC000_0082;
pub const IA32_FMASK: u32 = 0xC000_0084;
pub const IA32_FS_BASE: u32 = 0xC000_0100;
pub const IA32_GS_BASE: u32 = 0xC000_0101;
pub const IA32_KERNEL_GS_BASE: u32 = 0xC000_0102;

/// The model-specific registers the implemented instructions touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Msrs {
    pub tsc: u64,
    pub efer: u64,
    pub star: u64,
    pub lstar: u64,
    pub sfmask: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub kernel_gs_base: u64,
    pub sysenter_cs: u64,
    pub sysenter_esp: u64,
    pub sysenter_eip: u64,
    pub pat: u64,
}

impl Msrs {
    /// RDMSR. Unknown registers raise #GP(0).
    pub fn read(&self, msr: u32) -> Result<u64, Exception> {
        match msr {
            IA32_TSC => Ok(self.tsc),
            IA32_EFER => Ok(self.efer),
            IA32_STAR => Ok(self.star),
            IA32_LSTAR => Ok(self.lstar),
            IA32_FMASK => Ok(self.sfmask),
            IA32_FS_BASE => Ok(self.fs_base),
            IA32_GS_BASE => Ok(self.gs_base),
            IA32_KERNEL_GS_BASE => Ok(self.kernel_gs_base),
            IA32_SYSENTER_CS => Ok(self.sysenter_cs),
            IA32_SYSENTER_ESP => Ok(self.sysenter_esp),
            IA32_SYSENTER_EIP => Ok(self.sysenter_eip),
            IA32_PAT => Ok(self.pat),
            _ => Err(Exception::gp0()),
        }
    }

    /// WRMSR. Unknown registers raise #GP(0).
    pub fn write(&mut self, msr: u32, val: u64) -> Result<(), Exception> {
        match msr {
            IA32_TSC => self.tsc = val,
            IA32_EFER => self.efer = val,
            IA32_STAR => self.star = val,
            IA32_LSTAR => self.lstar = val,
            IA32_FMASK => self.sfmask = val,
            IA32_FS_BASE => self.fs_base = val,
            IA32_GS_BASE => self.gs_base = val,
            IA32_KERNEL_GS_BASE => self.kernel_gs_base = val,
            IA32_SYSENTER_CS => self.sysenter_cs = val,
            IA32_SYSENTER_ESP => self.sysenter_esp = val,
            IA32_SYSENTER_EIP => self.sysenter_eip = val,
            IA32_PAT => self.pat = val,
            _ => return Err(Exception::gp0()),
        }
        Ok(())
    }
}

/// x87/MMX state. The MMX registers alias the low 64 bits of the x87 stack
/// registers, which is why MMX instructions drag tag-word state around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpuState {
    pub fcw: u16,
    pub fsw: u16,
    /// Full-format tag word, two bits per register; 0b11 = empty.
    pub ftw: u16,
    pub fop: u16,
    /// 64-bit mantissas of ST0-ST7 / MM0-MM7.
    pub st: [u64; 8],
    in_mmx_state: bool,
}

impl Default for FpuState {
    fn default() -> Self {
        Self {
            fcw: 0x037F,
            fsw: 0,
            ftw: 0xFFFF,
            fop: 0,
            st: [0; 8],
            in_mmx_state: false,
        }
    }
}

impl FpuState {
    /// The architectural side effect of touching an MMX register: the whole
    /// register file becomes valid and TOP resets. Runs at most once per
    /// MMX session; [`FpuState::emms`] ends the session.
    pub fn enter_mmx_state(&mut self) {
        if !self.in_mmx_state {
            self.ftw = 0x0000;
            self.fsw &= !0x3800; // TOP = 0
            self.in_mmx_state = true;
        }
    }

    pub fn emms(&mut self) {
        self.ftw = 0xFFFF;
        self.in_mmx_state = false;
    }

    /// Abridged tag byte as FXSAVE stores it: one bit per register,
    /// 1 = valid.
    #[must_use]
    pub fn abridged_tag(&self) -> u8 {
        let mut tag = 0u8;
        for i in 0..8 {
            if (self.ftw >> (i * 2)) & 0b11 != 0b11 {
                tag |= 1 << i;
            }
        }
        tag
    }

    #[must_use]
    pub fn has_unmasked_exception(&self) -> bool {
        let pending = (self.fsw & 0x3F) as u16;
        let masks = self.fcw & 0x3F;
        pending & !masks != 0
    }
}

/// Architectural state of one virtual CPU.
///
/// One instance per virtual CPU; instances share nothing. All access from
/// the interpreter goes through the typed accessors below.
#[derive(Debug, Clone)]
pub struct CpuState {
    gpr: [u64; 16],
    pub rip: u64,
    pub rflags: RFlags,
    pub mode: CpuMode,
    pub halted: bool,

    pub segments: [Segment; 6],
    pub gdtr: DescriptorTable,
    pub idtr: DescriptorTable,
    pub ldtr: SystemSegment,
    pub tr: SystemSegment,

    pub control: ControlRegs,
    pub dr: [u64; 8],
    pub xcr0: u64,
    pub msr: Msrs,

    pub xmm: [u128; 16],
    pub mxcsr: u32,
    pub fpu: FpuState,
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new(CpuMode::Real)
    }
}

impl CpuState {
    #[must_use]
    pub fn new(mode: CpuMode) -> Self {
        let mut state = Self {
            gpr: [0; 16],
            rip: 0,
            rflags: RFlags::empty(),
            mode,
            halted: false,
            segments: [Segment::new(0, 0, 0xFFFF); 6],
            gdtr: DescriptorTable::empty(),
            idtr: DescriptorTable { base: 0, limit: 0x3FF },
            ldtr: SystemSegment::null(),
            tr: SystemSegment::null(),
            control: ControlRegs::default(),
            dr: [0; 8],
            xcr0: XCR0_X87,
            msr: Msrs::default(),
            xmm: [0; 16],
            mxcsr: MXCSR_DEFAULT,
            fpu: FpuState::default(),
        };
        match mode {
            CpuMode::Real => {}
            CpuMode::Protected | CpuMode::Long => {
                state.control.cr0 |= CR0_PE;
                for seg in &mut state.segments {
                    *seg = Segment::flat();
                }
                if mode == CpuMode::Long {
                    state.control.cr0 |= CR0_PG;
                    state.control.cr4 |= CR4_PAE;
                    state.msr.efer |= EFER_LME | EFER_LMA;
                }
            }
        }
        state
    }

    // ---- general-purpose registers ----------------------------------

    /// Read a GPR by its 4-bit hardware number.
    ///
    /// For 8-bit operands without a REX prefix, numbers 4-7 select the
    /// legacy high-byte registers AH/CH/DH/BH; with REX present they
    /// select SPL/BPL/SIL/DIL instead.
    #[must_use]
    pub fn gpr(&self, reg: u8, width: Width, rex_present: bool) -> u64 {
        let reg = (reg & 0xF) as usize;
        if width == Width::W8 && !rex_present && (4..8).contains(&reg) {
            return (self.gpr[reg - 4] >> 8) & 0xFF;
        }
        width.truncate(self.gpr[reg])
    }

    pub fn set_gpr(&mut self, reg: u8, width: Width, rex_present: bool, value: u64) {
        let reg = (reg & 0xF) as usize;
        if width == Width::W8 && !rex_present && (4..8).contains(&reg) {
            let slot = &mut self.gpr[reg - 4];
            *slot = (*slot & !0xFF00) | ((value & 0xFF) << 8);
            return;
        }
        match width {
            Width::W8 => self.gpr[reg] = (self.gpr[reg] & !0xFF) | (value & 0xFF),
            Width::W16 => self.gpr[reg] = (self.gpr[reg] & !0xFFFF) | (value & 0xFFFF),
            // 32-bit writes zero-extend into the full 64-bit register; this
            // is an architectural rule, not an optimization.
            Width::W32 => self.gpr[reg] = value & 0xFFFF_FFFF,
            Width::W64 | Width::W128 => self.gpr[reg] = value,
        }
    }

    #[must_use]
    pub fn gpr64(&self, reg: Gpr) -> u64 {
        self.gpr[reg.index()]
    }

    pub fn set_gpr64(&mut self, reg: Gpr, value: u64) {
        self.gpr[reg.index()] = value;
    }

    #[must_use]
    pub fn gpr32(&self, reg: Gpr) -> u32 {
        self.gpr[reg.index()] as u32
    }

    pub fn set_gpr32(&mut self, reg: Gpr, value: u32) {
        // x86-64 semantics: 32-bit writes zero-extend.
        self.gpr[reg.index()] = value as u64;
    }

    #[must_use]
    pub fn gpr16(&self, reg: Gpr) -> u16 {
        self.gpr[reg.index()] as u16
    }

    pub fn set_gpr16(&mut self, reg: Gpr, value: u16) {
        let slot = &mut self.gpr[reg.index()];
        *slot = (*slot & !0xFFFF) | value as u64;
    }

    // ---- flags / IP -------------------------------------------------

    /// RFLAGS as the guest observes it (fixed bit set).
    #[must_use]
    pub fn rflags_raw(&self) -> u64 {
        self.rflags.raw()
    }

    pub fn set_rflags_raw(&mut self, value: u64) {
        self.rflags = RFlags::from_bits_truncate(value);
    }

    pub fn set_rip(&mut self, rip: u64) {
        self.rip = rip & self.mode.ip_mask();
    }

    // ---- segments ---------------------------------------------------

    #[must_use]
    pub fn seg(&self, reg: SegReg) -> Segment {
        self.segments[reg.index()]
    }

    #[must_use]
    pub fn seg_base(&self, reg: SegReg) -> u64 {
        self.segments[reg.index()].base
    }

    pub fn set_seg(&mut self, reg: SegReg, seg: Segment) {
        self.segments[reg.index()] = seg;
    }

    /// Real-mode selector load: base = selector << 4.
    pub fn set_seg_real_mode(&mut self, reg: SegReg, selector: u16) {
        self.segments[reg.index()] = Segment::new(selector, (selector as u64) << 4, 0xFFFF);
    }

    // ---- privilege / mode -------------------------------------------

    #[must_use]
    pub fn cpl(&self) -> u8 {
        match self.mode {
            CpuMode::Real => 0,
            _ => (self.segments[SegReg::Cs.index()].selector & 0x3) as u8,
        }
    }

    #[must_use]
    pub fn is_real_mode(&self) -> bool {
        self.mode == CpuMode::Real
    }

    #[must_use]
    pub fn is_64bit_mode(&self) -> bool {
        self.mode == CpuMode::Long
    }

    #[must_use]
    pub fn is_canonical(addr: u64) -> bool {
        let upper = addr >> 47;
        upper == 0 || upper == 0x1_FFFF
    }

    // ---- SIMD / FPU registers ---------------------------------------

    #[must_use]
    pub fn xmm(&self, reg: u8) -> u128 {
        self.xmm[(reg & 0xF) as usize]
    }

    pub fn set_xmm(&mut self, reg: u8, value: u128) {
        self.xmm[(reg & 0xF) as usize] = value;
    }

    /// MMX registers are numbered mod 8; REX bits do not extend them.
    #[must_use]
    pub fn mmx(&self, reg: u8) -> u64 {
        self.fpu.st[(reg & 0x7) as usize]
    }

    pub fn set_mmx(&mut self, reg: u8, value: u64) {
        self.fpu.st[(reg & 0x7) as usize] = value;
    }

    /// LDMXCSR/FXRSTOR write path: reserved bits raise #GP(0).
    pub fn set_mxcsr(&mut self, value: u32) -> Result<(), Exception> {
        if value & !MXCSR_WRITE_MASK != 0 {
            return Err(Exception::gp0());
        }
        self.mxcsr = value;
        Ok(())
    }

    // ---- system instructions backed purely by register state --------

    pub fn swapgs(&mut self) -> Result<(), Exception> {
        if !self.is_64bit_mode() {
            return Err(Exception::InvalidOpcode);
        }
        if self.cpl() != 0 {
            return Err(Exception::gp0());
        }
        core::mem::swap(&mut self.msr.gs_base, &mut self.msr.kernel_gs_base);
        self.segments[SegReg::Gs.index()].base = self.msr.gs_base;
        Ok(())
    }

    /// SYSCALL with `next_rip` as the return address. All precondition
    /// checks run before any state is touched.
    pub fn syscall(&mut self, next_rip: u64) -> Result<(), Exception> {
        if !self.is_64bit_mode() {
            return Err(Exception::InvalidOpcode);
        }
        if self.msr.efer & EFER_SCE == 0 {
            return Err(Exception::InvalidOpcode);
        }
        let target = self.msr.lstar;
        if !Self::is_canonical(target) {
            return Err(Exception::gp0());
        }

        self.set_gpr64(Gpr::Rcx, next_rip);
        self.set_gpr64(Gpr::R11, self.rflags_raw());

        let kernel_cs = ((self.msr.star >> 32) & 0xFFFF) as u16;
        self.segments[SegReg::Cs.index()] =
            Segment::new(kernel_cs & !0x3, 0, u32::MAX);
        self.segments[SegReg::Ss.index()] =
            Segment::new((kernel_cs & !0x3).wrapping_add(8), 0, u32::MAX);

        let masked = self.rflags_raw() & !self.msr.sfmask;
        self.set_rflags_raw(masked);
        self.rip = target;
        Ok(())
    }

    pub fn sysret(&mut self) -> Result<(), Exception> {
        if !self.is_64bit_mode() {
            return Err(Exception::InvalidOpcode);
        }
        if self.msr.efer & EFER_SCE == 0 {
            return Err(Exception::InvalidOpcode);
        }
        if self.cpl() != 0 {
            return Err(Exception::gp0());
        }

        let target = self.gpr64(Gpr::Rcx);
        if !Self::is_canonical(target) {
            return Err(Exception::gp0());
        }

        let base = ((self.msr.star >> 48) & 0xFFFF) as u16;
        self.segments[SegReg::Ss.index()] =
            Segment::new(base.wrapping_add(8) | 3, 0, u32::MAX);
        self.segments[SegReg::Cs.index()] =
            Segment::new(base.wrapping_add(16) | 3, 0, u32::MAX);

        self.set_rflags_raw(self.gpr64(Gpr::R11));
        self.rip = target;
        Ok(())
    }

    pub fn sysenter(&mut self) -> Result<(), Exception> {
        if self.is_real_mode() {
            return Err(Exception::gp0());
        }
        let cs = self.msr.sysenter_cs as u16;
        if cs & !0x3 == 0 {
            return Err(Exception::gp0());
        }
        if self.is_64bit_mode()
            && (!Self::is_canonical(self.msr.sysenter_eip)
                || !Self::is_canonical(self.msr.sysenter_esp))
        {
            return Err(Exception::gp0());
        }

        self.segments[SegReg::Cs.index()] = Segment::new(cs & !0x3, 0, u32::MAX);
        self.segments[SegReg::Ss.index()] =
            Segment::new((cs & !0x3).wrapping_add(8), 0, u32::MAX);
        self.rflags.set(RFlags::IF, false);

        if self.is_64bit_mode() {
            self.rip = self.msr.sysenter_eip;
            self.set_gpr64(Gpr::Rsp, self.msr.sysenter_esp);
        } else {
            self.rip = self.msr.sysenter_eip & 0xFFFF_FFFF;
            self.set_gpr32(Gpr::Rsp, self.msr.sysenter_esp as u32);
        }
        Ok(())
    }

    pub fn sysexit(&mut self) -> Result<(), Exception> {
        if self.is_real_mode() {
            return Err(Exception::gp0());
        }
        if self.cpl() != 0 {
            return Err(Exception::gp0());
        }
        let cs = self.msr.sysenter_cs as u16;
        if cs & !0x3 == 0 {
            return Err(Exception::gp0());
        }

        self.segments[SegReg::Cs.index()] =
            Segment::new((cs & !0x3).wrapping_add(16) | 3, 0, u32::MAX);
        self.segments[SegReg::Ss.index()] =
            Segment::new((cs & !0x3).wrapping_add(24) | 3, 0, u32::MAX);

        if self.is_64bit_mode() {
            self.rip = self.gpr64(Gpr::Rcx);
            self.set_gpr64(Gpr::Rsp, self.gpr64(Gpr::Rdx));
        } else {
            self.rip = self.gpr32(Gpr::Rcx) as u64;
            self.set_gpr32(Gpr::Rsp, self.gpr32(Gpr::Rdx));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_byte_registers_select_without_rex() {
        let mut cpu = CpuState::new(CpuMode::Long);
        cpu.set_gpr64(Gpr::Rcx, 0x1122_3344_5566_7788);
        // Encoding 5 is CH without REX, BPL with REX.
        assert_eq!(cpu.gpr(5, Width::W8, false), 0x66);
        assert_eq!(cpu.gpr(5, Width::W8, true), 0);

        cpu.set_gpr(5, Width::W8, false, 0xAB);
        assert_eq!(cpu.gpr64(Gpr::Rcx), 0x1122_3344_5566_AB88);
    }

    #[test]
    fn thirty_two_bit_writes_zero_extend() {
        let mut cpu = CpuState::new(CpuMode::Long);
        cpu.set_gpr64(Gpr::Rax, u64::MAX);
        cpu.set_gpr(0, Width::W32, false, 0x1234_5678);
        assert_eq!(cpu.gpr64(Gpr::Rax), 0x1234_5678);
    }

    #[test]
    fn sixteen_bit_writes_merge() {
        let mut cpu = CpuState::new(CpuMode::Long);
        cpu.set_gpr64(Gpr::Rax, 0xFFFF_FFFF_FFFF_FFFF);
        cpu.set_gpr(0, Width::W16, false, 0x1234);
        assert_eq!(cpu.gpr64(Gpr::Rax), 0xFFFF_FFFF_FFFF_1234);
    }

    #[test]
    fn mmx_session_transitions_once_until_emms() {
        let mut fpu = FpuState::default();
        assert_eq!(fpu.ftw, 0xFFFF);
        fpu.enter_mmx_state();
        assert_eq!(fpu.ftw, 0x0000);

        // A second access must not reset manually poked tag state.
        fpu.ftw = 0x5555;
        fpu.enter_mmx_state();
        assert_eq!(fpu.ftw, 0x5555);

        fpu.emms();
        assert_eq!(fpu.ftw, 0xFFFF);
        fpu.enter_mmx_state();
        assert_eq!(fpu.ftw, 0x0000);
    }

    #[test]
    fn syscall_and_sysret_round_trip() {
        let mut cpu = CpuState::new(CpuMode::Long);
        cpu.msr.efer |= EFER_SCE;
        cpu.msr.star = (0x08u64 << 32) | (0x10u64 << 48);
        cpu.msr.lstar = 0xFFFF_8000_0000_0000;
        cpu.msr.sfmask = RFlags::IF.bits();
        cpu.rflags.set(RFlags::IF, true);
        cpu.segments[SegReg::Cs.index()].selector = 0x33;

        cpu.syscall(0x1002).unwrap();
        assert_eq!(cpu.cpl(), 0);
        assert_eq!(cpu.rip, 0xFFFF_8000_0000_0000);
        assert_eq!(cpu.gpr64(Gpr::Rcx), 0x1002);
        assert!(!cpu.rflags.get(RFlags::IF));

        cpu.sysret().unwrap();
        assert_eq!(cpu.cpl(), 3);
        assert_eq!(cpu.rip, 0x1002);
        assert!(cpu.rflags.get(RFlags::IF));
    }

    #[test]
    fn mxcsr_reserved_bits_fault() {
        let mut cpu = CpuState::new(CpuMode::Protected);
        assert!(cpu.set_mxcsr(0x1F80).is_ok());
        assert_eq!(cpu.set_mxcsr(0x0001_0000), Err(Exception::gp0()));
    }
}
