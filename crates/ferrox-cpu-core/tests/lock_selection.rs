//! LOCK prefix handling: locked forms route through the bus's atomic
//! combined primitive, unlocked forms through the plain read/write pair,
//! and illegal LOCK placements are #UD.

mod common;

use common::{RecordingBus, CODE, DATA};
use ferrox_cpu_core::state::CR4_OSFXSR;
use ferrox_cpu_core::{CoreConfig, CpuBus, CpuFeatureSet, CpuMode, CpuState, EmuError, Exception};
use ferrox_types::Gpr;

fn fixture(code: &[u8]) -> (CoreConfig, CpuState, RecordingBus) {
    let mut state = CpuState::new(CpuMode::Long);
    state.rip = CODE;
    state.control.cr4 |= CR4_OSFXSR;
    state.set_gpr64(Gpr::Rbx, DATA);
    let mut bus = RecordingBus::new(0x1_0000);
    bus.inner.load(CODE, code);
    (CoreConfig::from_features(CpuFeatureSet::modern()), state, bus)
}

#[test]
fn xadd_lock_selects_the_atomic_primitive() {
    // F0 0F C1 03 : lock xadd [rbx], eax
    let (cfg, mut state, mut bus) = fixture(&[0xF0, 0x0F, 0xC1, 0x03]);
    bus.inner.write_u32(DATA, 30).unwrap();
    state.set_gpr64(Gpr::Rax, 12);

    ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap();
    assert_eq!(bus.atomic_rmw_calls, 1);
    assert_eq!(bus.plain_reads, 0);
    assert_eq!(bus.plain_writes, 0);
    assert_eq!(bus.inner.read_u32(DATA).unwrap(), 42);
    assert_eq!(state.gpr32(Gpr::Rax), 30, "XADD loads the old value");
}

#[test]
fn xadd_without_lock_uses_the_plain_pair() {
    // 0F C1 03 : xadd [rbx], eax
    let (cfg, mut state, mut bus) = fixture(&[0x0F, 0xC1, 0x03]);
    bus.inner.write_u32(DATA, 30).unwrap();
    state.set_gpr64(Gpr::Rax, 12);

    ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap();
    assert_eq!(bus.atomic_rmw_calls, 0);
    assert_eq!(bus.plain_reads, 1);
    assert_eq!(bus.plain_writes, 1);
    // Same arithmetic result either way.
    assert_eq!(bus.inner.read_u32(DATA).unwrap(), 42);
    assert_eq!(state.gpr32(Gpr::Rax), 30);
}

#[test]
fn lock_with_register_destination_is_undefined() {
    // F0 0F C1 C1 : lock xadd ecx, eax
    let (cfg, mut state, mut bus) = fixture(&[0xF0, 0x0F, 0xC1, 0xC1]);
    let err = ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::InvalidOpcode));
}

#[test]
fn lock_on_a_non_lockable_opcode_is_undefined() {
    // F0 0F B6 C1 : lock movzx eax, cl
    let (cfg, mut state, mut bus) = fixture(&[0xF0, 0x0F, 0xB6, 0xC1]);
    let err = ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::InvalidOpcode));

    // F0 89 C8 : lock mov eax, ecx
    let (cfg, mut state, mut bus) = fixture(&[0xF0, 0x89, 0xC8]);
    let err = ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::InvalidOpcode));
}

/// XCHG with memory is locked with or without the prefix.
#[test]
fn xchg_memory_is_always_atomic() {
    // 87 03 : xchg [rbx], eax
    let (cfg, mut state, mut bus) = fixture(&[0x87, 0x03]);
    bus.inner.write_u32(DATA, 0x55).unwrap();
    state.set_gpr64(Gpr::Rax, 0xAA);

    ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap();
    assert_eq!(bus.atomic_rmw_calls, 1);
    assert_eq!(state.gpr32(Gpr::Rax), 0x55);
    assert_eq!(bus.inner.read_u32(DATA).unwrap(), 0xAA);
}

#[test]
fn locked_cmpxchg8b_uses_the_atomic_primitive() {
    // F0 0F C7 0E : lock cmpxchg8b [rsi] (RBX carries replacement data,
    // so the address goes through RSI).
    let (cfg, mut state, mut bus) = fixture(&[0xF0, 0x0F, 0xC7, 0x0E]);
    bus.inner.write_u64(DATA, 0x1111_2222_3333_4444).unwrap();
    state.set_gpr64(Gpr::Rsi, DATA);
    state.set_gpr32(Gpr::Rax, 0x3333_4444);
    state.set_gpr32(Gpr::Rdx, 0x1111_2222);
    state.set_gpr32(Gpr::Rbx, 0x7777_8888);
    state.set_gpr32(Gpr::Rcx, 0x5555_6666);

    ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap();
    assert_eq!(bus.atomic_rmw_calls, 1);
    assert_eq!(
        bus.inner.read_u64(DATA).unwrap(),
        0x5555_6666_7777_8888,
        "exchange happened"
    );
    assert!(state.rflags.get(ferrox_cpu_core::flags::RFlags::ZF));
}
