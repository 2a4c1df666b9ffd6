//! No partial commit: failed gates leave destinations and flags alone,
//! and alignment faults fire before the bus sees the access.

mod common;

use common::{seed_flags, RecordingBus, TestCpu, CODE, DATA};
use ferrox_cpu_core::state::CR4_OSFXSR;
use ferrox_cpu_core::{CoreConfig, CpuFeatureSet, CpuMode, CpuState, EmuError, Exception};
use ferrox_types::Gpr;

#[test]
fn failed_feature_gate_leaves_destination_untouched() {
    let mut features = CpuFeatureSet::modern();
    features.sse3 = false;
    let mut cpu = TestCpu::with_features(features);
    cpu.state.set_xmm(0, 0x1234_5678_9ABC_DEF0);
    cpu.state.set_xmm(1, 0x1111_2222_3333_4444);
    let flags = seed_flags(&mut cpu.state);

    // F2 0F 7C C1 : haddps xmm0, xmm1 (gated off)
    let err = cpu.run(&[0xF2, 0x0F, 0x7C, 0xC1]).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::InvalidOpcode));
    assert_eq!(cpu.state.xmm(0), 0x1234_5678_9ABC_DEF0);
    assert_eq!(cpu.state.rflags, flags);
    assert_eq!(cpu.state.rip, CODE, "RIP must not advance on a fault");
}

#[test]
fn divide_error_leaves_accumulator_untouched() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0x1234);
    cpu.state.set_gpr64(Gpr::Rdx, 0x5678);
    cpu.state.set_gpr64(Gpr::Rcx, 0);

    // F7 F1 : div ecx (divide by zero)
    let err = cpu.run(&[0xF7, 0xF1]).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::DivideError));
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0x1234);
    assert_eq!(cpu.state.gpr64(Gpr::Rdx), 0x5678);
}

#[test]
fn misaligned_movaps_faults_before_any_bus_read() {
    let mut state = CpuState::new(CpuMode::Long);
    state.rip = CODE;
    state.control.cr4 |= CR4_OSFXSR;
    state.set_gpr64(Gpr::Rbx, DATA + 1); // 1-byte misalignment
    let cfg = CoreConfig::from_features(CpuFeatureSet::modern());

    let mut bus = RecordingBus::new(0x1_0000);
    // 0F 28 03 : movaps xmm0, [rbx]
    bus.inner.load(CODE, &[0x0F, 0x28, 0x03]);

    let err = ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::gp0()));
    assert_eq!(bus.wide_reads, 0, "no data read may precede the #GP");
    assert_eq!(state.xmm(0), 0);
}

#[test]
fn misaligned_movaps_store_writes_nothing() {
    let mut state = CpuState::new(CpuMode::Long);
    state.rip = CODE;
    state.control.cr4 |= CR4_OSFXSR;
    state.set_gpr64(Gpr::Rbx, DATA + 4);
    state.set_xmm(0, u128::MAX);
    let cfg = CoreConfig::from_features(CpuFeatureSet::modern());

    let mut bus = RecordingBus::new(0x1_0000);
    // 0F 29 03 : movaps [rbx], xmm0
    bus.inner.load(CODE, &[0x0F, 0x29, 0x03]);

    let err = ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::gp0()));
    assert_eq!(bus.wide_writes, 0);
    assert!(bus.inner.bytes()[DATA as usize..DATA as usize + 0x20]
        .iter()
        .all(|&b| b == 0));
}

#[test]
fn aligned_movaps_round_trips() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rbx, DATA);
    cpu.bus.load(DATA, &0xDEAD_BEEF_0BAD_F00D_1122_3344_5566_7788u128.to_le_bytes());

    cpu.run(&[0x0F, 0x28, 0x03]).unwrap();
    assert_eq!(
        cpu.state.xmm(0),
        0xDEAD_BEEF_0BAD_F00D_1122_3344_5566_7788u128
    );
}

#[test]
fn faulting_push_does_not_move_rsp() {
    let mut cpu = TestCpu::long_mode();
    // Stack pointer aimed past the end of the flat bus.
    cpu.state.set_gpr64(Gpr::Rsp, 0x2_0000);

    // 50 : push rax
    let err = cpu.run(&[0x50]).unwrap_err();
    assert!(matches!(
        err,
        EmuError::Fault(Exception::PageFault { .. })
    ));
    assert_eq!(cpu.state.gpr64(Gpr::Rsp), 0x2_0000);
    assert_eq!(cpu.state.rip, CODE);
}

#[test]
fn failed_memory_write_preserves_flags() {
    let mut cpu = TestCpu::long_mode();
    // ADD [mem], eax where the destination access faults: flags stay.
    cpu.state.set_gpr64(Gpr::Rbx, 0x2_0000);
    let flags = seed_flags(&mut cpu.state);

    // 01 03 : add [rbx], eax
    let err = cpu.run(&[0x01, 0x03]).unwrap_err();
    assert!(matches!(err, EmuError::Fault(Exception::PageFault { .. })));
    assert_eq!(cpu.state.rflags, flags);
}
