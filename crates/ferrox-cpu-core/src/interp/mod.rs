//! The decode-and-dispatch interpreter.
//!
//! One [`step`] decodes and executes a single instruction: prefix scan,
//! one-byte table dispatch, chained escape-table dispatch for 0x0F /
//! 0x0F38 / 0x0F3A, and the semantic handler that finishes decoding its
//! own ModRM/immediate suffix and performs the operation. Handlers never
//! partially commit: any fault leaves RIP and all destinations untouched.

pub(crate) mod decode;

mod one_byte;
mod ops_alu;
mod ops_bit;
mod ops_cf;
mod ops_data;
mod ops_mmx;
mod ops_sse_fp;
mod ops_sse_mov;
mod ops_string;
mod ops_sys;
mod three_byte;
mod two_byte;

use crate::cpuid::CpuFeatureSet;
use crate::exception::EmuError;
use crate::mem::CpuBus;
use crate::state::CpuState;
use decode::Ctx;
use ferrox_x86::{scan_prefixes, Cursor, MAX_INST_LEN};

/// Configuration inputs for the interpreter.
///
/// Instruction gating must match what `CPUID` advertises to the guest, so
/// the feature policy is plumbed in rather than read from mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    pub features: CpuFeatureSet,
}

impl CoreConfig {
    #[must_use]
    pub fn from_features(features: CpuFeatureSet) -> Self {
        Self { features }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            features: CpuFeatureSet::baseline(),
        }
    }
}

/// Handler outcome. `Branch` means the handler already wrote RIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exec {
    Continue,
    Branch,
    Halt,
}

pub(crate) type OpResult = Result<Exec, EmuError>;
pub(crate) type OpHandler = fn(&mut Ctx<'_>) -> OpResult;

/// Outcome of one successfully executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExit {
    Continue,
    /// Control transferred; RIP holds the branch target.
    Branch,
    Halted,
}

/// Decode and execute one instruction.
///
/// On `Err` no architectural state has changed except where the fault
/// itself defines side effects (e.g. sticky MXCSR status bits); RIP still
/// points at the faulting instruction.
pub fn step(
    cfg: &CoreConfig,
    state: &mut CpuState,
    bus: &mut dyn CpuBus,
) -> Result<StepExit, EmuError> {
    let start_rip = state.rip;
    let mode = state.mode.decode_mode();
    let fetch_base = state.seg_base(ferrox_types::SegReg::Cs).wrapping_add(start_rip);

    // Pull up to the architectural maximum into a local window. A fault on
    // the very first byte is a real fetch fault; a shorter window only
    // matters if decode actually runs off its end.
    let mut window = [0u8; MAX_INST_LEN];
    let mut avail = 0usize;
    for (i, slot) in window.iter_mut().enumerate() {
        match bus.read_u8(fetch_base.wrapping_add(i as u64)) {
            Ok(byte) => {
                *slot = byte;
                avail = i + 1;
            }
            Err(e) if i == 0 => return Err(e.into()),
            Err(_) => break,
        }
    }

    let mut cursor = Cursor::new(&window[..avail]);
    let prefixes = scan_prefixes(&mut cursor, mode)?;
    let opcode = cursor.next_u8().map_err(EmuError::from)?;

    let mut ctx = Ctx {
        state: &mut *state,
        bus: &mut *bus,
        features: &cfg.features,
        cursor,
        prefixes,
        mode,
        start_rip,
    };

    let exec = one_byte::dispatch(&mut ctx, opcode)?;
    let inst_len = ctx.cursor.len() as u64;
    drop(ctx);

    state.msr.tsc = state.msr.tsc.wrapping_add(1);
    match exec {
        Exec::Continue => {
            state.set_rip(start_rip.wrapping_add(inst_len));
            Ok(StepExit::Continue)
        }
        Exec::Branch => Ok(StepExit::Branch),
        Exec::Halt => {
            state.set_rip(start_rip.wrapping_add(inst_len));
            state.halted = true;
            Ok(StepExit::Halted)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchExit {
    Completed,
    Halted,
    Error(EmuError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub executed: u64,
    pub exit: BatchExit,
}

/// Run up to `max_insts` instructions, stopping at HLT or the first fault.
pub fn run_batch(
    cfg: &CoreConfig,
    state: &mut CpuState,
    bus: &mut dyn CpuBus,
    max_insts: u64,
) -> BatchResult {
    if state.halted {
        return BatchResult {
            executed: 0,
            exit: BatchExit::Halted,
        };
    }

    let mut executed = 0u64;
    while executed < max_insts {
        match step(cfg, state, bus) {
            Ok(StepExit::Continue) | Ok(StepExit::Branch) => executed += 1,
            Ok(StepExit::Halted) => {
                executed += 1;
                return BatchResult {
                    executed,
                    exit: BatchExit::Halted,
                };
            }
            Err(e) => {
                return BatchResult {
                    executed,
                    exit: BatchExit::Error(e),
                };
            }
        }
    }

    BatchResult {
        executed,
        exit: BatchExit::Completed,
    }
}
