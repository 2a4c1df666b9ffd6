//! Whole-instruction scenarios through the real dispatch path.

mod common;

use common::{TestCpu, CODE, DATA, STACK};
use ferrox_cpu_core::flags::RFlags;
use ferrox_cpu_core::mem::CpuBus;
use ferrox_cpu_core::{BatchExit, EmuError, StepExit};
use ferrox_types::Gpr;

#[test]
fn imul_gv_ev_small_product() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 3);
    cpu.state.set_gpr64(Gpr::Rcx, 4);

    // 0F AF C1 : imul eax, ecx
    cpu.run(&[0x0F, 0xAF, 0xC1]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 12);
    assert!(!cpu.state.rflags.get(RFlags::CF));
    assert!(!cpu.state.rflags.get(RFlags::OF));
    // The architecturally-undefined flags get the documented fallback:
    // derived from the truncated result, AF cleared.
    assert!(!cpu.state.rflags.get(RFlags::ZF));
    assert!(!cpu.state.rflags.get(RFlags::SF));
    assert!(!cpu.state.rflags.get(RFlags::AF));
}

#[test]
fn imul_overflow_sets_cf_of() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0x4000_0000);
    cpu.state.set_gpr64(Gpr::Rcx, 4);

    cpu.run(&[0x0F, 0xAF, 0xC1]).unwrap();
    assert_eq!(cpu.state.gpr32(Gpr::Rax), 0);
    assert!(cpu.state.rflags.get(RFlags::CF));
    assert!(cpu.state.rflags.get(RFlags::OF));
}

#[test]
fn movzx_from_memory_with_sib() {
    let mut cpu = TestCpu::long_mode();
    cpu.bus.load(DATA + 4 * 3, &[0xAB]);
    cpu.state.set_gpr64(Gpr::Rbx, DATA);
    cpu.state.set_gpr64(Gpr::Rcx, 3);

    // 0F B6 04 8B : movzx eax, byte [rbx+rcx*4]
    cpu.run(&[0x0F, 0xB6, 0x04, 0x8B]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0xAB);
    assert_eq!(cpu.executed_len(), 4);
}

#[test]
fn rip_relative_load() {
    let mut cpu = TestCpu::long_mode();
    // 8B 05 00 01 00 00 : mov eax, [rip+0x100]; the displacement is
    // relative to the end of the 6-byte instruction.
    cpu.bus
        .load(CODE + 6 + 0x100, &0x5544_3322u32.to_le_bytes());
    cpu.run(&[0x8B, 0x05, 0x00, 0x01, 0x00, 0x00]).unwrap();
    assert_eq!(cpu.executed_len(), 6);
    assert_eq!(cpu.state.gpr32(Gpr::Rax), 0x5544_3322);
}

#[test]
fn conditional_branch_taken_and_not_taken() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.rflags.set(RFlags::ZF, true);
    // 74 10 : jz +0x10
    let exit = cpu.run(&[0x74, 0x10]).unwrap();
    assert_eq!(exit, StepExit::Branch);
    assert_eq!(cpu.state.rip, CODE + 2 + 0x10);

    let mut cpu = TestCpu::long_mode();
    cpu.state.rflags.set(RFlags::ZF, false);
    let exit = cpu.run(&[0x74, 0x10]).unwrap();
    assert_eq!(exit, StepExit::Continue);
    assert_eq!(cpu.state.rip, CODE + 2);
}

#[test]
fn call_and_ret_round_trip() {
    let mut cpu = TestCpu::long_mode();
    // E8 0B 00 00 00 : call +0x0B ; landing pad holds C3 : ret
    cpu.load_code(&[0xE8, 0x0B, 0x00, 0x00, 0x00]);
    cpu.bus.load(CODE + 5 + 0x0B, &[0xC3]);

    let exit = cpu.step().unwrap();
    assert_eq!(exit, StepExit::Branch);
    assert_eq!(cpu.state.rip, CODE + 5 + 0x0B);
    assert_eq!(cpu.state.gpr64(Gpr::Rsp), STACK - 8);
    assert_eq!(cpu.bus.read_u64(STACK - 8).unwrap(), CODE + 5);

    let exit = cpu.step().unwrap();
    assert_eq!(exit, StepExit::Branch);
    assert_eq!(cpu.state.rip, CODE + 5);
    assert_eq!(cpu.state.gpr64(Gpr::Rsp), STACK);
}

#[test]
fn run_batch_executes_a_small_program() {
    let mut cpu = TestCpu::long_mode();
    // mov eax, 5 ; add eax, 7 ; hlt
    cpu.load_code(&[0xB8, 0x05, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x07, 0xF4]);

    let result = ferrox_cpu_core::run_batch(&cpu.cfg, &mut cpu.state, &mut cpu.bus, 16);
    assert_eq!(result.exit, BatchExit::Halted);
    assert_eq!(result.executed, 3);
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 12);
    assert!(cpu.state.halted);
}

#[test]
fn unimplemented_is_distinct_from_invalid() {
    let mut cpu = TestCpu::long_mode();
    // CD 80 : int 0x80 is recognized, but delivery is not built here.
    let err = cpu.run(&[0xCD, 0x80]).unwrap_err();
    assert!(matches!(err, EmuError::Unimplemented(_)));
    assert!(err.fault().is_none());
}

#[test]
fn string_copy_with_rep() {
    let mut cpu = TestCpu::long_mode();
    cpu.bus.load(DATA, b"ferrox!!");
    cpu.state.set_gpr64(Gpr::Rsi, DATA);
    cpu.state.set_gpr64(Gpr::Rdi, DATA + 0x100);
    cpu.state.set_gpr64(Gpr::Rcx, 8);

    // F3 A4 : rep movsb
    cpu.run(&[0xF3, 0xA4]).unwrap();
    assert_eq!(&cpu.bus.bytes()[(DATA as usize + 0x100)..][..8], b"ferrox!!");
    assert_eq!(cpu.state.gpr64(Gpr::Rcx), 0);
    assert_eq!(cpu.state.gpr64(Gpr::Rsi), DATA + 8);
}

#[test]
fn cpuid_reports_the_configured_features() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 1);
    cpu.state.set_gpr64(Gpr::Rcx, 0);

    // 0F A2 : cpuid
    cpu.run(&[0x0F, 0xA2]).unwrap();
    let edx = cpu.state.gpr32(Gpr::Rdx);
    let ecx = cpu.state.gpr32(Gpr::Rcx);
    assert_ne!(edx & (1 << 26), 0, "SSE2");
    assert_ne!(ecx & (1 << 0), 0, "SSE3");
}
