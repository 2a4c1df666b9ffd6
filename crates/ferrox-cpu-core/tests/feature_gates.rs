//! CPUID/mode gate checks and their architectural precedence.

mod common;

use common::TestCpu;
use ferrox_cpu_core::state::{CR0_EM, CR0_TS, CR4_OSXSAVE};
use ferrox_cpu_core::{CpuFeatureSet, EmuError, Exception};
use ferrox_types::{Gpr, SegReg};

fn set_cpl3(cpu: &mut TestCpu) {
    let mut cs = cpu.state.seg(SegReg::Cs);
    cs.selector = 0x33;
    cpu.state.set_seg(SegReg::Cs, cs);
    assert_eq!(cpu.state.cpl(), 3);
}

/// XSETBV: a missing feature outranks the privilege violation, so the
/// fault kind flips from #UD to #GP once the feature appears.
#[test]
fn xsetbv_gate_precedence() {
    // Feature absent, CPL 3: #UD wins.
    let mut features = CpuFeatureSet::modern();
    features.xsave = false;
    let mut cpu = TestCpu::with_features(features);
    cpu.state.control.cr4 |= CR4_OSXSAVE;
    set_cpl3(&mut cpu);
    assert_eq!(
        cpu.run(&[0x0F, 0x01, 0xD1]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );

    // Feature present, CPL 3: now the privilege check fires.
    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr4 |= CR4_OSXSAVE;
    set_cpl3(&mut cpu);
    assert_eq!(
        cpu.run(&[0x0F, 0x01, 0xD1]),
        Err(EmuError::Fault(Exception::gp0()))
    );

    // Feature present but CR4.OSXSAVE clear: #UD again, even at CPL 0.
    let mut cpu = TestCpu::long_mode();
    assert_eq!(
        cpu.run(&[0x0F, 0x01, 0xD1]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );
}

/// SSE availability: feature/#UD gates take precedence over the lazy-FPU
/// #NM trap.
#[test]
fn sse_gate_ordering() {
    // SSE2 absent: #UD even though CR0.TS is set.
    let mut features = CpuFeatureSet::modern();
    features.sse2 = false;
    let mut cpu = TestCpu::with_features(features);
    cpu.state.control.cr0 |= CR0_TS;
    // 66 0F FC C1 : paddb xmm0, xmm1
    assert_eq!(
        cpu.run(&[0x66, 0x0F, 0xFC, 0xC1]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );

    // Feature present, CR0.EM set: still #UD.
    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr0 |= CR0_EM | CR0_TS;
    assert_eq!(
        cpu.run(&[0x66, 0x0F, 0xFC, 0xC1]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );

    // Feature present, only TS set: #NM.
    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr0 |= CR0_TS;
    assert_eq!(
        cpu.run(&[0x66, 0x0F, 0xFC, 0xC1]),
        Err(EmuError::Fault(Exception::DeviceNotAvailable))
    );

    // All gates clear: executes.
    let mut cpu = TestCpu::long_mode();
    cpu.run(&[0x66, 0x0F, 0xFC, 0xC1]).unwrap();
}

#[test]
fn sse3_instructions_gate_on_sse3() {
    let mut features = CpuFeatureSet::modern();
    features.sse3 = false;
    let mut cpu = TestCpu::with_features(features);
    // F2 0F 7C C1 : haddps xmm0, xmm1
    assert_eq!(
        cpu.run(&[0xF2, 0x0F, 0x7C, 0xC1]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );

    let mut cpu = TestCpu::long_mode();
    cpu.run(&[0xF2, 0x0F, 0x7C, 0xC1]).unwrap();
}

#[test]
fn rdrand_gates_on_cpuid() {
    let mut features = CpuFeatureSet::modern();
    features.rdrand = false;
    let mut cpu = TestCpu::with_features(features);
    // 0F C7 F0 : rdrand eax
    assert_eq!(
        cpu.run(&[0x0F, 0xC7, 0xF0]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );

    let mut cpu = TestCpu::long_mode();
    cpu.run(&[0x0F, 0xC7, 0xF0]).unwrap();
    assert!(cpu.state.rflags.get(ferrox_cpu_core::flags::RFlags::CF));
}

#[test]
fn cmov_gates_on_cpuid() {
    let mut features = CpuFeatureSet::modern();
    features.cmov = false;
    let mut cpu = TestCpu::with_features(features);
    // 0F 44 C1 : cmovz eax, ecx
    assert_eq!(
        cpu.run(&[0x0F, 0x44, 0xC1]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );
}

#[test]
fn popcnt_gates_on_cpuid() {
    let mut features = CpuFeatureSet::modern();
    features.popcnt = false;
    let mut cpu = TestCpu::with_features(features);
    assert_eq!(
        cpu.run(&[0xF3, 0x0F, 0xB8, 0xC1]),
        Err(EmuError::Fault(Exception::InvalidOpcode))
    );

    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rcx, 0xFF00_FF00);
    cpu.run(&[0xF3, 0x0F, 0xB8, 0xC1]).unwrap();
    assert_eq!(cpu.state.gpr32(Gpr::Rax), 16);
}

/// Without BMI1 the 0xF3 prefix on 0x0F 0xBC silently decays to BSF.
#[test]
fn tzcnt_decays_to_bsf_without_bmi1() {
    let mut features = CpuFeatureSet::modern();
    features.bmi1 = false;
    let mut cpu = TestCpu::with_features(features);
    cpu.state.set_gpr64(Gpr::Rcx, 0);
    cpu.state.set_gpr64(Gpr::Rax, 0x1234_5678_9ABC_DEF0);
    cpu.run(&[0xF3, 0x0F, 0xBC, 0xC1]).unwrap();
    // BSF with a zero source: ZF set, destination untouched.
    assert!(cpu.state.rflags.get(ferrox_cpu_core::flags::RFlags::ZF));
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0x1234_5678_9ABC_DEF0);

    // With BMI1 the same bytes are TZCNT: a zero source yields the
    // operand width and CF.
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rcx, 0);
    cpu.run(&[0xF3, 0x0F, 0xBC, 0xC1]).unwrap();
    assert_eq!(cpu.state.gpr32(Gpr::Rax), 32);
    assert!(cpu.state.rflags.get(ferrox_cpu_core::flags::RFlags::CF));
}

#[test]
fn rdtsc_respects_cr4_tsd() {
    use ferrox_cpu_core::state::CR4_TSD;

    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr4 |= CR4_TSD;
    set_cpl3(&mut cpu);
    assert_eq!(
        cpu.run(&[0x0F, 0x31]),
        Err(EmuError::Fault(Exception::gp0()))
    );

    let mut cpu = TestCpu::long_mode();
    cpu.state.msr.tsc = 0x0011_2233_4455_6677;
    cpu.run(&[0x0F, 0x31]).unwrap();
    assert_eq!(cpu.state.gpr32(Gpr::Rax), 0x4455_6677);
    assert_eq!(cpu.state.gpr32(Gpr::Rdx), 0x0011_2233);
}
