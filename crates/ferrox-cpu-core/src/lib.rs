//! x86/x86-64 CPU emulation core: architectural state, the fault model,
//! computation primitives, and the decode-and-dispatch interpreter.
//!
//! The interpreter is synchronous and single-threaded; one instance per
//! virtual CPU with nothing shared. Memory access goes through the
//! [`mem::CpuBus`] collaborator, which owns paging/segmentation
//! enforcement and cross-CPU exclusivity for locked operations.

#![forbid(unsafe_code)]

pub mod alu;
pub mod cpuid;
pub mod exception;
pub mod flags;
pub mod interp;
pub mod mem;
pub mod simd;
pub mod state;

pub use cpuid::CpuFeatureSet;
pub use exception::{EmuError, Exception};
pub use interp::{run_batch, step, BatchExit, BatchResult, CoreConfig, StepExit};
pub use mem::{CpuBus, FlatBus};
pub use state::{CpuMode, CpuState};
