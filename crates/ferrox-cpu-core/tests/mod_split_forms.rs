//! Opcodes whose register and memory forms are different instructions:
//! 0x0F 0x12 is MOVHLPS (mod=3) vs MOVLPS (mod!=3), 0x0F 0x16 is MOVLHPS
//! vs MOVHPS.

mod common;

use common::{TestCpu, DATA};

const HI: u128 = 0xAAAA_BBBB_CCCC_DDDD_1111_2222_3333_4444;

#[test]
fn movhlps_register_form_copies_high_to_low() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_xmm(0, 0xFFFF_FFFF_FFFF_FFFF_0000_0000_0000_0000u128);
    cpu.state.set_xmm(1, HI);

    // 0F 12 C1 : movhlps xmm0, xmm1
    cpu.run(&[0x0F, 0x12, 0xC1]).unwrap();
    let xmm0 = cpu.state.xmm(0);
    assert_eq!(xmm0 as u64, (HI >> 64) as u64, "low qword = src high qword");
    assert_eq!((xmm0 >> 64) as u64, u64::MAX, "high qword untouched");
}

#[test]
fn movlps_memory_form_loads_low_qword() {
    let mut cpu = TestCpu::long_mode();
    cpu.bus.load(DATA, &0x1122_3344_5566_7788u64.to_le_bytes());
    cpu.state.set_gpr64(ferrox_types::Gpr::Rbx, DATA);
    cpu.state.set_xmm(0, HI);

    // 0F 12 03 : movlps xmm0, [rbx]
    cpu.run(&[0x0F, 0x12, 0x03]).unwrap();
    let xmm0 = cpu.state.xmm(0);
    assert_eq!(xmm0 as u64, 0x1122_3344_5566_7788);
    assert_eq!((xmm0 >> 64) as u64, (HI >> 64) as u64);
}

#[test]
fn movlhps_register_form_copies_low_to_high() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_xmm(0, 0x0000_0000_0000_0000_9999_8888_7777_6666u128);
    cpu.state.set_xmm(2, 0xDEAD_BEEF_CAFE_F00Du128);

    // 0F 16 C2 : movlhps xmm0, xmm2
    cpu.run(&[0x0F, 0x16, 0xC2]).unwrap();
    let xmm0 = cpu.state.xmm(0);
    assert_eq!((xmm0 >> 64) as u64, 0xDEAD_BEEF_CAFE_F00D);
    assert_eq!(xmm0 as u64, 0x9999_8888_7777_6666);
}

#[test]
fn movhps_memory_form_loads_high_qword() {
    let mut cpu = TestCpu::long_mode();
    cpu.bus.load(DATA, &0x0102_0304_0506_0708u64.to_le_bytes());
    cpu.state.set_gpr64(ferrox_types::Gpr::Rbx, DATA);
    cpu.state.set_xmm(0, 0x5555_5555_5555_5555u128);

    // 0F 16 03 : movhps xmm0, [rbx]
    cpu.run(&[0x0F, 0x16, 0x03]).unwrap();
    let xmm0 = cpu.state.xmm(0);
    assert_eq!((xmm0 >> 64) as u64, 0x0102_0304_0506_0708);
    assert_eq!(xmm0 as u64, 0x5555_5555_5555_5555);
}

#[test]
fn movhps_store_writes_exactly_eight_bytes() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_gpr64(ferrox_types::Gpr::Rbx, DATA);
    cpu.state.set_xmm(3, (0x1111_2222_3333_4444u128 << 64) | 0x9999_9999_9999_9999);
    // Sentinel beyond the 8-byte window.
    cpu.bus.load(DATA + 8, &[0xEE; 8]);

    // 0F 17 1B : movhps [rbx], xmm3
    cpu.run(&[0x0F, 0x17, 0x1B]).unwrap();
    let mut stored = [0u8; 8];
    stored.copy_from_slice(&cpu.bus.bytes()[DATA as usize..DATA as usize + 8]);
    assert_eq!(u64::from_le_bytes(stored), 0x1111_2222_3333_4444);
    assert_eq!(&cpu.bus.bytes()[DATA as usize + 8..DATA as usize + 16], &[0xEE; 8]);
}

#[test]
fn group7_mod_split_selects_different_instructions() {
    // 0F 01 /2 with a memory form is LGDT; the same reg value with mod=3
    // and rm=0 is XGETBV.
    use ferrox_cpu_core::state::CR4_OSXSAVE;
    use ferrox_types::Gpr;

    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr4 |= CR4_OSXSAVE;
    cpu.bus.load(DATA, &[0x7F, 0x00]); // limit
    cpu.bus.load(DATA + 2, &0x2000u64.to_le_bytes()); // base
    cpu.state.set_gpr64(Gpr::Rbx, DATA);

    // 0F 01 13 : lgdt [rbx]
    cpu.run(&[0x0F, 0x01, 0x13]).unwrap();
    assert_eq!(cpu.state.gdtr.limit, 0x7F);
    assert_eq!(cpu.state.gdtr.base, 0x2000);

    // 0F 01 D0 : xgetbv
    cpu.state.set_gpr64(Gpr::Rcx, 0);
    cpu.run(&[0x0F, 0x01, 0xD0]).unwrap();
    assert_eq!(cpu.state.gpr32(Gpr::Rax) as u64, cpu.state.xcr0);
}
