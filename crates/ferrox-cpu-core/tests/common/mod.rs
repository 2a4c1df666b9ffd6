//! Shared fixtures for the interpreter integration tests.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use ferrox_cpu_core::exception::Exception;
use ferrox_cpu_core::flags::RFlags;
use ferrox_cpu_core::mem::CpuBus;
use ferrox_cpu_core::state::CR4_OSFXSR;
use ferrox_cpu_core::{
    CoreConfig, CpuFeatureSet, CpuMode, CpuState, EmuError, FlatBus, StepExit,
};
use ferrox_types::Width;

pub const CODE: u64 = 0x1000;
pub const DATA: u64 = 0x4000;
pub const STACK: u64 = 0x8000;

pub struct TestCpu {
    pub cfg: CoreConfig,
    pub state: CpuState,
    pub bus: FlatBus,
}

impl TestCpu {
    pub fn long_mode() -> Self {
        Self::with_features(CpuFeatureSet::modern())
    }

    pub fn with_features(features: CpuFeatureSet) -> Self {
        let mut state = CpuState::new(CpuMode::Long);
        state.rip = CODE;
        state.control.cr4 |= CR4_OSFXSR;
        state.set_gpr64(ferrox_types::Gpr::Rsp, STACK);
        Self {
            cfg: CoreConfig::from_features(features),
            state,
            bus: FlatBus::new(0x1_0000),
        }
    }

    pub fn load_code(&mut self, bytes: &[u8]) {
        self.bus.load(CODE, bytes);
    }

    pub fn step(&mut self) -> Result<StepExit, EmuError> {
        ferrox_cpu_core::step(&self.cfg, &mut self.state, &mut self.bus)
    }

    /// Load `bytes` at CODE and execute one instruction.
    pub fn run(&mut self, bytes: &[u8]) -> Result<StepExit, EmuError> {
        self.load_code(bytes);
        self.state.rip = CODE;
        self.step()
    }

    /// Instruction length as observed through the RIP advance.
    pub fn executed_len(&self) -> u64 {
        self.state.rip - CODE
    }
}

/// Seed distinct values into the arithmetic flags so tests can assert
/// they were (or were not) preserved.
pub fn seed_flags(state: &mut CpuState) -> RFlags {
    let seeded = RFlags::CF | RFlags::AF | RFlags::SF;
    state.rflags = seeded;
    seeded
}

/// Bus wrapper recording which access primitives the decoder selected.
pub struct RecordingBus {
    pub inner: FlatBus,
    pub atomic_rmw_calls: usize,
    pub plain_reads: usize,
    pub plain_writes: usize,
    pub wide_reads: usize,
    pub wide_writes: usize,
}

impl RecordingBus {
    pub fn new(size: usize) -> Self {
        Self {
            inner: FlatBus::new(size),
            atomic_rmw_calls: 0,
            plain_reads: 0,
            plain_writes: 0,
            wide_reads: 0,
            wide_writes: 0,
        }
    }
}

impl CpuBus for RecordingBus {
    fn read_u8(&mut self, addr: u64) -> Result<u8, Exception> {
        // Code fetch traffic; not counted.
        self.inner.read_u8(addr)
    }

    fn read_u16(&mut self, addr: u64) -> Result<u16, Exception> {
        self.plain_reads += 1;
        self.inner.read_u16(addr)
    }

    fn read_u32(&mut self, addr: u64) -> Result<u32, Exception> {
        self.plain_reads += 1;
        self.inner.read_u32(addr)
    }

    fn read_u64(&mut self, addr: u64) -> Result<u64, Exception> {
        self.plain_reads += 1;
        self.inner.read_u64(addr)
    }

    fn read_u128(&mut self, addr: u64) -> Result<u128, Exception> {
        self.wide_reads += 1;
        self.inner.read_u128(addr)
    }

    fn write_u8(&mut self, addr: u64, val: u8) -> Result<(), Exception> {
        self.plain_writes += 1;
        self.inner.write_u8(addr, val)
    }

    fn write_u16(&mut self, addr: u64, val: u16) -> Result<(), Exception> {
        self.plain_writes += 1;
        self.inner.write_u16(addr, val)
    }

    fn write_u32(&mut self, addr: u64, val: u32) -> Result<(), Exception> {
        self.plain_writes += 1;
        self.inner.write_u32(addr, val)
    }

    fn write_u64(&mut self, addr: u64, val: u64) -> Result<(), Exception> {
        self.plain_writes += 1;
        self.inner.write_u64(addr, val)
    }

    fn write_u128(&mut self, addr: u64, val: u128) -> Result<(), Exception> {
        self.wide_writes += 1;
        self.inner.write_u128(addr, val)
    }

    fn atomic_rmw(
        &mut self,
        addr: u64,
        width: Width,
        f: &mut dyn FnMut(u64) -> u64,
    ) -> Result<u64, Exception> {
        self.atomic_rmw_calls += 1;
        self.inner.atomic_rmw(addr, width, f)
    }

    fn atomic_cmpxchg16b(
        &mut self,
        addr: u64,
        expected: u128,
        new: u128,
    ) -> Result<(u128, bool), Exception> {
        self.atomic_rmw_calls += 1;
        self.inner.atomic_cmpxchg16b(addr, expected, new)
    }
}
