//! Destination-width rules: 32-bit register writes zero-extend in 64-bit
//! mode, narrower writes merge.

mod common;

use common::{seed_flags, TestCpu};
use ferrox_types::Gpr;

#[test]
fn movzx_zero_extends_through_bit_63() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0xFFFF_FFFF_FFFF_FFFF);
    cpu.state.set_gpr64(Gpr::Rcx, 0xFF);
    let flags = seed_flags(&mut cpu.state);

    // 0F B6 C1 : movzx eax, cl
    cpu.run(&[0x0F, 0xB6, 0xC1]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0x0000_0000_0000_00FF);
    assert_eq!(cpu.state.rflags, flags, "MOVZX must not touch flags");
}

#[test]
fn sixteen_bit_write_preserves_upper_bits() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0xAAAA_BBBB_CCCC_DDDD);
    cpu.state.set_gpr64(Gpr::Rcx, 0x1234);

    // 66 89 C8 : mov ax, cx
    cpu.run(&[0x66, 0x89, 0xC8]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0xAAAA_BBBB_CCCC_1234);
}

#[test]
fn thirty_two_bit_mov_clears_upper_bits() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0xAAAA_BBBB_CCCC_DDDD);
    cpu.state.set_gpr64(Gpr::Rcx, 0x1234_5678);

    // 89 C8 : mov eax, ecx
    cpu.run(&[0x89, 0xC8]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0x1234_5678);
}

#[test]
fn eight_bit_write_merges_low_byte() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0x1111_1111_1111_1111);
    cpu.state.set_gpr64(Gpr::Rcx, 0xFF);

    // 88 C8 : mov al, cl
    cpu.run(&[0x88, 0xC8]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0x1111_1111_1111_11FF);
}

/// High-byte registers select only when no REX prefix is present; with
/// REX the same encoding means SPL/BPL/SIL/DIL.
#[test]
fn rex_switches_high_byte_to_new_low_byte_registers() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0x0000_0000_0000_AB00); // AH = 0xAB
    cpu.state.set_gpr64(Gpr::Rbp, 0x77);

    // 88 E1 : mov cl, ah
    cpu.run(&[0x88, 0xE1]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rcx) & 0xFF, 0xAB);

    // 40 88 E9 : mov cl, bpl (REX present flips the meaning of 0xE9's reg
    // field from CH-source... to BPL-source)
    cpu.state.set_gpr64(Gpr::Rcx, 0);
    cpu.run(&[0x40, 0x88, 0xE9]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rcx) & 0xFF, 0x77);
}

/// CMOV writes its 32-bit destination even when the condition is false,
/// so the upper half clears either way.
#[test]
fn cmov_zero_extends_unconditionally() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(Gpr::Rax, 0xFFFF_FFFF_1111_1111);
    cpu.state.set_gpr64(Gpr::Rcx, 0x2222_2222);
    // ZF clear, so CMOVZ does not move.
    cpu.state.rflags = ferrox_cpu_core::flags::RFlags::empty();

    // 0F 44 C1 : cmovz eax, ecx
    cpu.run(&[0x0F, 0x44, 0xC1]).unwrap();
    assert_eq!(cpu.state.gpr64(Gpr::Rax), 0x0000_0000_1111_1111);
}
